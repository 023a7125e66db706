//! Trip store abstraction and the in-memory reference implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::TripRecord;

/// Half-open `[start, end)` window over `trip_start`.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeWindow { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Skip/limit bounds applied to a scan, in scan order.
#[derive(Debug, Clone, Copy)]
pub struct ScanBounds {
    pub skip: u64,
    pub limit: u64,
}

/// Persistent trip storage with upsert-by-unique-key semantics.
///
/// `upsert_many` must be idempotent per key so that a retried or resumed
/// ingestion run never produces duplicate documents.
#[async_trait]
pub trait TripStore: Send + Sync + 'static {
    /// Bulk-writes a batch, inserting new keys and overwriting existing
    /// ones. Returns the number of records written.
    async fn upsert_many(&self, trips: Vec<TripRecord>) -> Result<usize>;

    /// Returns records whose `trip_start` falls in `window`, in a
    /// deterministic order, optionally bounded by skip/limit.
    async fn scan(&self, window: TimeWindow, bounds: Option<ScanBounds>) -> Result<Vec<TripRecord>>;

    /// Total number of stored records.
    async fn len(&self) -> Result<usize>;
}

/// In-memory [`TripStore`] used by the CLI and tests.
///
/// Scans are ordered by `(trip_start, unique_key)` so that skip/limit
/// pagination is deterministic.
#[derive(Default)]
pub struct MemoryStore {
    trips: RwLock<HashMap<String, TripRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn upsert_many(&self, trips: Vec<TripRecord>) -> Result<usize> {
        let n = trips.len();
        let mut guard = self
            .trips
            .write()
            .map_err(|e| Error::persistence(format!("store lock poisoned: {e}"), false))?;
        for trip in trips {
            guard.insert(trip.unique_key.clone(), trip);
        }
        Ok(n)
    }

    async fn scan(&self, window: TimeWindow, bounds: Option<ScanBounds>) -> Result<Vec<TripRecord>> {
        let guard = self
            .trips
            .read()
            .map_err(|e| Error::persistence(format!("store lock poisoned: {e}"), false))?;

        let mut matched: Vec<TripRecord> = guard
            .values()
            .filter(|t| window.contains(t.trip_start))
            .cloned()
            .collect();
        drop(guard);

        matched.sort_by(|a, b| {
            a.trip_start
                .cmp(&b.trip_start)
                .then_with(|| a.unique_key.cmp(&b.unique_key))
        });

        if let Some(ScanBounds { skip, limit }) = bounds {
            matched = matched
                .into_iter()
                .skip(skip as usize)
                .take(limit as usize)
                .collect();
        }

        Ok(matched)
    }

    async fn len(&self) -> Result<usize> {
        let guard = self
            .trips
            .read()
            .map_err(|e| Error::persistence(format!("store lock poisoned: {e}"), false))?;
        Ok(guard.len())
    }
}
