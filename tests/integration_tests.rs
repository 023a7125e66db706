//! End-to-end tests: write a Parquet trip file, run the ingestion
//! pipeline into the in-memory store, and query it.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;

use taxi_trip_etl::decode::ParquetSource;
use taxi_trip_etl::error::Error;
use taxi_trip_etl::model::GeoPoint;
use taxi_trip_etl::pipeline::{CancelFlag, PipelineConfig, ingest};
use taxi_trip_etl::queries::types::Page;
use taxi_trip_etl::queries::{heatmap, speed, totals};
use taxi_trip_etl::store::{MemoryStore, ScanBounds, TimeWindow, TripStore};

const LOOP_LAT: f64 = 41.8781;
const LOOP_LON: f64 = -87.6298;
const OHARE_LAT: f64 = 41.9742;
const OHARE_LON: f64 = -87.9073;

/// Epoch microseconds for a UTC date + hour.
fn micros(date: NaiveDate, hour: u32) -> f64 {
    let ts = date.and_hms_opt(hour, 0, 0).unwrap().and_utc().timestamp();
    (ts * 1_000_000) as f64
}

#[derive(Clone, Default)]
struct TestTrip {
    unique_key: Option<String>,
    start_micros: Option<f64>,
    trip_seconds: Option<f64>,
    trip_miles: Option<f64>,
    fare: Option<f64>,
    pickup_latitude: Option<f64>,
    pickup_longitude: Option<f64>,
    pickup_location: Option<String>,
}

/// Writes a trip Parquet file with the full 23-column schema; columns not
/// covered by [`TestTrip`] are all-null.
fn write_trip_file(path: &Path, rows: &[TestTrip]) {
    let n = rows.len();

    let utf8 = |name: &str| Field::new(name, DataType::Utf8, true);
    let f64f = |name: &str| Field::new(name, DataType::Float64, true);

    let schema = Arc::new(Schema::new(vec![
        utf8("unique_key"),
        utf8("taxi_id"),
        f64f("trip_start_timestamp"),
        f64f("trip_end_timestamp"),
        f64f("trip_seconds"),
        f64f("trip_miles"),
        f64f("pickup_census_tract"),
        f64f("dropoff_census_tract"),
        f64f("pickup_community_area"),
        f64f("dropoff_community_area"),
        f64f("fare"),
        f64f("tips"),
        f64f("tolls"),
        f64f("extras"),
        f64f("trip_total"),
        utf8("payment_type"),
        utf8("company"),
        f64f("pickup_latitude"),
        f64f("pickup_longitude"),
        utf8("pickup_location"),
        f64f("dropoff_latitude"),
        f64f("dropoff_longitude"),
        utf8("dropoff_location"),
    ]));

    let null_f64 = || Arc::new(Float64Array::from(vec![None::<f64>; n])) as ArrayRef;
    let null_utf8 = || Arc::new(StringArray::from(vec![None::<String>; n])) as ArrayRef;
    let f64_col = |values: Vec<Option<f64>>| Arc::new(Float64Array::from(values)) as ArrayRef;
    let utf8_col = |values: Vec<Option<String>>| Arc::new(StringArray::from(values)) as ArrayRef;

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            utf8_col(rows.iter().map(|r| r.unique_key.clone()).collect()),
            null_utf8(), // taxi_id
            f64_col(rows.iter().map(|r| r.start_micros).collect()),
            f64_col(rows.iter().map(|r| r.start_micros).collect()), // trip_end_timestamp
            f64_col(rows.iter().map(|r| r.trip_seconds).collect()),
            f64_col(rows.iter().map(|r| r.trip_miles).collect()),
            null_f64(), // pickup_census_tract
            null_f64(), // dropoff_census_tract
            null_f64(), // pickup_community_area
            null_f64(), // dropoff_community_area
            f64_col(rows.iter().map(|r| r.fare).collect()),
            null_f64(),  // tips
            null_f64(),  // tolls
            null_f64(),  // extras
            null_f64(),  // trip_total
            null_utf8(), // payment_type
            null_utf8(), // company
            f64_col(rows.iter().map(|r| r.pickup_latitude).collect()),
            f64_col(rows.iter().map(|r| r.pickup_longitude).collect()),
            utf8_col(rows.iter().map(|r| r.pickup_location.clone()).collect()),
            null_f64(),  // dropoff_latitude
            null_f64(),  // dropoff_longitude
            null_utf8(), // dropoff_location
        ],
    )
    .unwrap();

    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

#[allow(clippy::too_many_arguments)]
fn test_trip(
    key: &str,
    date: NaiveDate,
    hour: u32,
    miles: f64,
    seconds: f64,
    fare: f64,
    lat: f64,
    lon: f64,
) -> TestTrip {
    TestTrip {
        unique_key: Some(key.to_string()),
        start_micros: Some(micros(date, hour)),
        trip_seconds: Some(seconds),
        trip_miles: Some(miles),
        fare: Some(fare),
        pickup_latitude: Some(lat),
        pickup_longitude: Some(lon),
        pickup_location: Some(format!("POINT ({lon} {lat})")),
    }
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        workers: 2,
        channel_capacity: 8,
        flush_threshold: 4,
        read_batch_size: 16,
    }
}

fn day_start(date: NaiveDate) -> chrono::DateTime<chrono::Utc> {
    date.and_hms_opt(0, 0, 0).unwrap().and_utc()
}

#[tokio::test]
async fn test_convert_and_query_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trips.parquet");

    let jan01 = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let jan15 = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();

    write_trip_file(
        &path,
        &[
            test_trip("a", jan01, 8, 10.0, 3600.0, 10.0, LOOP_LAT, LOOP_LON),
            test_trip("b", jan01, 9, 5.0, 900.0, 20.0, LOOP_LAT, LOOP_LON),
            test_trip("c", jan01, 10, 0.0, 0.0, 30.0, LOOP_LAT, LOOP_LON),
            test_trip("d", jan15, 8, 2.0, 600.0, 5.0, OHARE_LAT, OHARE_LON),
            test_trip("e", jan15, 9, 3.0, 600.0, 7.0, OHARE_LAT, OHARE_LON),
        ],
    );

    let store = Arc::new(MemoryStore::new());
    let source = ParquetSource::open(&path).unwrap();
    assert_eq!(source.total_rows(), 5);

    let summary = ingest(
        Arc::clone(&store),
        source,
        small_config(),
        CancelFlag::new(),
    )
    .await
    .unwrap();
    assert_eq!(summary.committed, 5);
    assert_eq!(summary.dropped, 0);
    assert_eq!(store.len().await.unwrap(), 5);

    // The WKT location was parsed into (longitude, latitude).
    let first = store
        .scan(
            TimeWindow::new(day_start(jan01), day_start(jan15)),
            Some(ScanBounds { skip: 0, limit: 1 }),
        )
        .await
        .unwrap();
    assert_eq!(first[0].unique_key, "a");
    assert_eq!(
        first[0].pickup_location,
        GeoPoint {
            longitude: LOOP_LON,
            latitude: LOOP_LAT,
        }
    );

    // Daily totals over January, ascending.
    let daily = totals::total_trips(
        store.as_ref(),
        jan01,
        NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(daily.len(), 2);
    assert_eq!((daily[0].date, daily[0].total_trips), (jan01, 3));
    assert_eq!((daily[1].date, daily[1].total_trips), (jan15, 2));

    // Average speed on Jan 1: the zero-duration trip is excluded, leaving
    // 16.0934 and 32.1868 km/h.
    let avg = speed::average_speed(store.as_ref(), jan01).await.unwrap();
    assert_eq!(avg.average_speed, 24.14);

    // All Jan 1 pickups share one cell.
    let map = heatmap::fare_heatmap(store.as_ref(), jan01, Page::default())
        .await
        .unwrap();
    assert_eq!(map.data.len(), 1);
    assert_eq!(
        map.data[0].cell_token,
        heatmap::cell_token(LOOP_LAT, LOOP_LON).unwrap()
    );
    assert_eq!(map.data[0].average_fare, 20.0);
    assert_eq!(map.meta.page, 1);
}

#[tokio::test]
async fn test_null_unique_key_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad_key.parquet");

    let jan01 = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let mut rows = vec![
        test_trip("a", jan01, 8, 1.0, 60.0, 3.0, LOOP_LAT, LOOP_LON),
        test_trip("b", jan01, 9, 1.0, 60.0, 3.0, LOOP_LAT, LOOP_LON),
    ];
    rows[1].unique_key = None;
    write_trip_file(&path, &rows);

    let store = Arc::new(MemoryStore::new());
    let source = ParquetSource::open(&path).unwrap();

    let err = ingest(store, source, small_config(), CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[tokio::test]
async fn test_malformed_point_drops_only_that_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad_point.parquet");

    let jan01 = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let jan02 = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    let mut rows = vec![
        test_trip("a", jan01, 8, 1.0, 60.0, 3.0, LOOP_LAT, LOOP_LON),
        test_trip("b", jan01, 9, 1.0, 60.0, 3.0, LOOP_LAT, LOOP_LON),
        test_trip("c", jan01, 10, 1.0, 60.0, 3.0, LOOP_LAT, LOOP_LON),
    ];
    rows[1].pickup_location = Some("POINT (bogus)".to_string());
    write_trip_file(&path, &rows);

    let store = Arc::new(MemoryStore::new());
    let source = ParquetSource::open(&path).unwrap();

    let summary = ingest(
        Arc::clone(&store),
        source,
        small_config(),
        CancelFlag::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.committed, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(store.len().await.unwrap(), 2);

    let keys: Vec<String> = store
        .scan(TimeWindow::new(day_start(jan01), day_start(jan02)), None)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.unique_key)
        .collect();
    assert_eq!(keys, vec!["a", "c"]);
}

#[tokio::test]
async fn test_missing_column_is_fatal_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short_schema.parquet");

    // Two-column file: most of the projection is absent.
    let schema = Arc::new(Schema::new(vec![
        Field::new("unique_key", DataType::Utf8, true),
        Field::new("fare", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec![Some("a")])) as ArrayRef,
            Arc::new(Float64Array::from(vec![Some(5.0)])) as ArrayRef,
        ],
    )
    .unwrap();
    let file = File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let err = ParquetSource::open(&path).unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}
