//! Scalar aggregation: mean per-trip speed over one day, in km/h.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};
use crate::model::TripRecord;
use crate::queries::types::SpeedSummary;
use crate::queries::util::{day_window, pool_size, round2};
use crate::store::TripStore;

pub const MILES_TO_KM: f64 = 1.60934;

/// Running totals shared by the scalar workers: (sum of speeds, count).
type Totals = Arc<Mutex<(f64, u64)>>;

/// Computes the mean per-trip speed for `date`.
///
/// Zero-duration trips are filtered out before the map phase, so no
/// division by zero can occur. Workers add each record's speed into the
/// shared totals under a mutex; the per-record compute dominates the lock
/// hold time, so contention stays tolerable. A day with no qualifying
/// trips yields [`Error::NoData`] rather than a NaN.
pub async fn average_speed<S: TripStore>(store: &S, date: NaiveDate) -> Result<SpeedSummary> {
    let window = day_window(date)?;
    let trips = store.scan(window, None).await?;

    let workers = pool_size();
    let (tx, rx) = mpsc::channel::<TripRecord>(100);
    let rx = Arc::new(Mutex::new(rx));
    let totals: Totals = Arc::new(Mutex::new((0.0, 0)));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = Arc::clone(&rx);
        let totals = Arc::clone(&totals);
        handles.push(tokio::spawn(async move {
            loop {
                let next = { rx.lock().await.recv().await };
                let Some(trip) = next else { break };

                let hours = trip.trip_seconds / 3600.0;
                let speed = trip.trip_miles * MILES_TO_KM / hours;

                let mut guard = totals.lock().await;
                guard.0 += speed;
                guard.1 += 1;
            }
        }));
    }

    for trip in trips {
        if trip.trip_seconds <= 0.0 {
            continue;
        }
        if tx.send(trip).await.is_err() {
            break;
        }
    }
    drop(tx);

    for handle in handles {
        handle
            .await
            .map_err(|e| Error::Internal(format!("speed worker panicked: {e}")))?;
    }

    let (sum_of_speeds, count) = *totals.lock().await;
    if count == 0 {
        return Err(Error::NoData);
    }

    Ok(SpeedSummary {
        average_speed: round2(sum_of_speeds / count as f64),
    })
}
