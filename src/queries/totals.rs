//! Daily trip counts over a date range.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::queries::types::DailyTripCount;
use crate::queries::util::date_range_window;
use crate::store::TripStore;

/// Counts trips per UTC calendar day over `[start, end]`, ascending.
///
/// Days without trips are omitted. An end date preceding the start date is
/// a validation error.
pub async fn total_trips<S: TripStore>(
    store: &S,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DailyTripCount>> {
    if end < start {
        return Err(Error::Validation(format!(
            "end date {end} precedes start date {start}"
        )));
    }

    let window = date_range_window(start, end)?;
    let trips = store.scan(window, None).await?;

    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for trip in &trips {
        *days.entry(trip.trip_start.date_naive()).or_default() += 1;
    }

    Ok(days
        .into_iter()
        .map(|(date, total_trips)| DailyTripCount { date, total_trips })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeoPoint, TripRecord};
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn trip(key: &str, y: i32, m: u32, d: u32, h: u32) -> TripRecord {
        let start = Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
        TripRecord {
            unique_key: key.to_string(),
            taxi_id: String::new(),
            trip_start: start,
            trip_end: start,
            trip_seconds: 0.0,
            trip_miles: 0.0,
            pickup_census_tract: 0.0,
            dropoff_census_tract: 0.0,
            pickup_community_area: 0.0,
            dropoff_community_area: 0.0,
            fare: 0.0,
            tips: 0.0,
            tolls: 0.0,
            extras: 0.0,
            trip_total: 0.0,
            payment_type: String::new(),
            company: String::new(),
            pickup_latitude: 0.0,
            pickup_longitude: 0.0,
            pickup_location: GeoPoint::default(),
            dropoff_latitude: 0.0,
            dropoff_longitude: 0.0,
            dropoff_location: GeoPoint::default(),
        }
    }

    #[tokio::test]
    async fn test_total_trips_groups_by_day_ascending() {
        let store = MemoryStore::new();
        let mut trips = Vec::new();
        for i in 0..10 {
            trips.push(trip(&format!("jan01-{i}"), 2020, 1, 1, i % 24));
        }
        for i in 0..5 {
            trips.push(trip(&format!("jan15-{i}"), 2020, 1, 15, i));
        }
        // Outside the queried range.
        trips.push(trip("feb", 2020, 2, 3, 0));
        store.upsert_many(trips).await.unwrap();

        let result = total_trips(
            &store,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            vec![
                DailyTripCount {
                    date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                    total_trips: 10,
                },
                DailyTripCount {
                    date: NaiveDate::from_ymd_opt(2020, 1, 15).unwrap(),
                    total_trips: 5,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_total_trips_includes_whole_end_day() {
        let store = MemoryStore::new();
        store
            .upsert_many(vec![trip("late", 2020, 1, 31, 23)])
            .await
            .unwrap();

        let result = total_trips(
            &store,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].total_trips, 1);
    }

    #[tokio::test]
    async fn test_total_trips_rejects_inverted_range() {
        let store = MemoryStore::new();
        let err = total_trips(
            &store,
            NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
    }
}
