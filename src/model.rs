//! Trip record types shared by the decoder, pipeline, and store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row as read from the Parquet source, before normalization.
///
/// Every field except the unique key is nullable in the source schema and
/// is materialized here as an `Option`. Timestamps are raw epoch
/// microseconds; pickup/dropoff locations are raw well-known-text strings.
#[derive(Debug, Clone, Default)]
pub struct RawTrip {
    pub unique_key: String,
    pub taxi_id: Option<String>,
    pub trip_start_micros: Option<i64>,
    pub trip_end_micros: Option<i64>,
    pub trip_seconds: Option<f64>,
    pub trip_miles: Option<f64>,
    pub pickup_census_tract: Option<f64>,
    pub dropoff_census_tract: Option<f64>,
    pub pickup_community_area: Option<f64>,
    pub dropoff_community_area: Option<f64>,
    pub fare: Option<f64>,
    pub tips: Option<f64>,
    pub tolls: Option<f64>,
    pub extras: Option<f64>,
    pub trip_total: Option<f64>,
    pub payment_type: Option<String>,
    pub company: Option<String>,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub pickup_location: Option<String>,
    pub dropoff_latitude: Option<f64>,
    pub dropoff_longitude: Option<f64>,
    pub dropoff_location: Option<String>,
}

/// A parsed (longitude, latitude) point. A null source point decodes to
/// the origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// The persisted trip document. All optional source fields have been
/// defaulted, so every field here is total: no `Option` crosses the
/// pipeline boundary into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRecord {
    /// Natural primary key; writes are upserts keyed on this.
    pub unique_key: String,
    pub taxi_id: String,
    pub trip_start: DateTime<Utc>,
    pub trip_end: DateTime<Utc>,
    pub trip_seconds: f64,
    pub trip_miles: f64,
    pub pickup_census_tract: f64,
    pub dropoff_census_tract: f64,
    pub pickup_community_area: f64,
    pub dropoff_community_area: f64,
    pub fare: f64,
    pub tips: f64,
    pub tolls: f64,
    pub extras: f64,
    pub trip_total: f64,
    pub payment_type: String,
    pub company: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub pickup_location: GeoPoint,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub dropoff_location: GeoPoint,
}
