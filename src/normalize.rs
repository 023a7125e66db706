//! Pure normalization stage: raw nullable rows into total trip records.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{GeoPoint, RawTrip, TripRecord};

const POINT_PREFIX: &str = "POINT (";

/// Converts an epoch-microsecond value to a UTC timestamp.
///
/// Uses floor division so negative inputs stay well-ordered:
/// `secs = micros / 1e6` (floored), `nanos = (micros mod 1e6) * 1e3`.
pub fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| Error::normalize(format!("timestamp out of range: {micros}")))
}

/// Parses a well-known-text point into (longitude, latitude).
///
/// A null input is not an error and yields the origin. A non-null but
/// malformed point (wrong token count or unparsable number) is a
/// per-record recoverable `Error::Normalize`.
pub fn parse_point(point: Option<&str>) -> Result<GeoPoint> {
    let Some(raw) = point else {
        return Ok(GeoPoint::default());
    };

    let inner = raw.strip_prefix(POINT_PREFIX).unwrap_or(raw);
    let inner = inner.strip_suffix(')').unwrap_or(inner);

    let parts: Vec<&str> = inner.split(' ').collect();
    if parts.len() != 2 {
        return Err(Error::normalize(format!("invalid point format: {inner}")));
    }

    let longitude: f64 = parts[0]
        .parse()
        .map_err(|e| Error::normalize(format!("error parsing longitude: {e}")))?;
    let latitude: f64 = parts[1]
        .parse()
        .map_err(|e| Error::normalize(format!("error parsing latitude: {e}")))?;

    Ok(GeoPoint {
        longitude,
        latitude,
    })
}

/// Normalizes a decoded row into a persisted record.
///
/// All absent optional fields take their zero value; absent timestamps
/// collapse to the epoch. Only malformed point strings make a record
/// unrecoverable, and that failure is isolated to the record.
pub fn normalize(raw: RawTrip) -> Result<TripRecord> {
    let trip_start = micros_to_datetime(raw.trip_start_micros.unwrap_or(0))?;
    let trip_end = micros_to_datetime(raw.trip_end_micros.unwrap_or(0))?;
    let pickup_location = parse_point(raw.pickup_location.as_deref())?;
    let dropoff_location = parse_point(raw.dropoff_location.as_deref())?;

    Ok(TripRecord {
        unique_key: raw.unique_key,
        taxi_id: raw.taxi_id.unwrap_or_default(),
        trip_start,
        trip_end,
        trip_seconds: raw.trip_seconds.unwrap_or_default(),
        trip_miles: raw.trip_miles.unwrap_or_default(),
        pickup_census_tract: raw.pickup_census_tract.unwrap_or_default(),
        dropoff_census_tract: raw.dropoff_census_tract.unwrap_or_default(),
        pickup_community_area: raw.pickup_community_area.unwrap_or_default(),
        dropoff_community_area: raw.dropoff_community_area.unwrap_or_default(),
        fare: raw.fare.unwrap_or_default(),
        tips: raw.tips.unwrap_or_default(),
        tolls: raw.tolls.unwrap_or_default(),
        extras: raw.extras.unwrap_or_default(),
        trip_total: raw.trip_total.unwrap_or_default(),
        payment_type: raw.payment_type.unwrap_or_default(),
        company: raw.company.unwrap_or_default(),
        pickup_latitude: raw.pickup_latitude.unwrap_or_default(),
        pickup_longitude: raw.pickup_longitude.unwrap_or_default(),
        pickup_location,
        dropoff_latitude: raw.dropoff_latitude.unwrap_or_default(),
        dropoff_longitude: raw.dropoff_longitude.unwrap_or_default(),
        dropoff_location,
    })
}
