//! Spatial fare aggregation: per-cell average pickup fare for one day.
//!
//! Records are binned into geohash cells at a fixed precision. The map
//! phase runs on a worker pool where each worker owns a private cell map;
//! a single reduction step merges the partial maps, so the per-cell
//! accumulators are never shared between workers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use geohash::Coord;
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::TripRecord;
use crate::queries::types::{HeatmapCell, HeatmapPage, Page, PageMeta};
use crate::queries::util::{day_window, pool_size, round2};
use crate::store::TripStore;

/// Geohash precision for cell assignment. Seven characters is roughly a
/// 153 m x 153 m bucket: city-block scale.
pub const CELL_PRECISION: usize = 7;

/// Per-cell running totals, owned by one worker during the map phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellStats {
    pub fare_sum: f64,
    pub count: u64,
}

impl CellStats {
    fn merge(&mut self, other: CellStats) {
        self.fare_sum += other.fare_sum;
        self.count += other.count;
    }
}

/// Deterministic cell token for a coordinate pair.
///
/// Identical inputs always produce the same token; two points share a
/// token exactly when they fall in the same geohash bucket at
/// [`CELL_PRECISION`].
pub fn cell_token(latitude: f64, longitude: f64) -> Result<String> {
    geohash::encode(
        Coord {
            x: longitude,
            y: latitude,
        },
        CELL_PRECISION,
    )
    .map_err(|e| Error::normalize(format!("unbinnable coordinates ({latitude}, {longitude}): {e}")))
}

/// Computes the per-cell average pickup fare for `date`.
///
/// Pagination bounds the source document scan (skip/limit) before the map
/// phase, not the aggregated cell output: the union of two pages' cells
/// over the same day is not required to equal the unpaginated aggregation,
/// because a cell's contributing records may be split across pages. This
/// mirrors the behavior of the system this one replaces.
///
/// Null-point records, which normalize to `(0, 0)`, are binned like any
/// other record.
pub async fn fare_heatmap<S: TripStore>(
    store: &S,
    date: NaiveDate,
    page: Page,
) -> Result<HeatmapPage> {
    let window = day_window(date)?;
    let trips = store.scan(window, Some(page.bounds())).await?;

    let workers = pool_size();
    let (tx, rx) = mpsc::channel::<TripRecord>(100);
    let rx = Arc::new(Mutex::new(rx));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = Arc::clone(&rx);
        handles.push(tokio::spawn(async move {
            // Private map: no shared mutable state during the map phase.
            let mut cells: HashMap<String, CellStats> = HashMap::new();
            loop {
                let next = { rx.lock().await.recv().await };
                let Some(trip) = next else { break };

                match cell_token(trip.pickup_latitude, trip.pickup_longitude) {
                    Ok(token) => {
                        let stats = cells.entry(token).or_default();
                        stats.fare_sum += trip.fare;
                        stats.count += 1;
                    }
                    Err(e) => {
                        warn!(unique_key = %trip.unique_key, error = %e, "skipping unbinnable record");
                    }
                }
            }
            cells
        }));
    }

    for trip in trips {
        if tx.send(trip).await.is_err() {
            break;
        }
    }
    drop(tx);

    // Reduce: one merge step over the per-worker partial maps.
    let mut merged: HashMap<String, CellStats> = HashMap::new();
    for handle in handles {
        let partial = handle
            .await
            .map_err(|e| Error::Internal(format!("heatmap worker panicked: {e}")))?;
        for (token, stats) in partial {
            merged.entry(token).or_default().merge(stats);
        }
    }

    let mut data: Vec<HeatmapCell> = merged
        .into_iter()
        .map(|(cell_token, stats)| HeatmapCell {
            cell_token,
            average_fare: round2(stats.fare_sum / stats.count as f64),
        })
        .collect();
    data.sort_by(|a, b| a.cell_token.cmp(&b.cell_token));

    Ok(HeatmapPage {
        data,
        meta: PageMeta {
            page: page.page,
            per_page: page.per_page,
        },
    })
}
