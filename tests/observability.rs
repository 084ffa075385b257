use std::sync::Arc;

use table_loader::execution::LoadObserver;
use table_loader::ingestion::{CompositeObserver, LoadOptions, Loader, ThroughputLogObserver, TracingObserver};
use table_loader::record::FlightRecord;
use table_loader::store::InMemoryTableStore;

const HEADER: &str = "Year,Quarter,Month,DayofMonth,DayOfWeek,FlightDate,UniqueCarrier,AirlineID,Carrier,TailNum,FlightNum,OriginAirportID,OriginAirportSeqID,OriginCityMarketID,Origin,OriginCityName,OriginState,OriginStateFips,OriginStateName,OriginWac";

fn write_rows(path: &std::path::Path, origin: &str, n: usize) {
    let mut text = format!("{HEADER}\n");
    for _ in 0..n {
        text.push_str(&format!(
            "2016,1,1,6,3,1/6/2016,AA,19805,AA,N3GAAA,1,12478,1247803,31703,{origin},\"New York, NY\",NY,36,New York,22\n"
        ));
    }
    std::fs::write(path, text).unwrap();
}

#[tokio::test]
async fn throughput_log_has_one_line_per_committed_batch() {
    let data = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();
    write_rows(&data.path().join("a.csv"), "JFK", 150);
    write_rows(&data.path().join("b.csv"), "LGA", 30);
    let log_path = logs.path().join("throughput.log");

    let observer = CompositeObserver::new(vec![
        Arc::new(TracingObserver),
        Arc::new(ThroughputLogObserver::new(&log_path)),
    ]);
    let observer: Arc<dyn LoadObserver> = Arc::new(observer);
    let store = Arc::new(InMemoryTableStore::new());
    let loader: Loader<FlightRecord> = Loader::new(
        store.clone(),
        LoadOptions {
            observer: Some(observer),
            ..Default::default()
        },
    )
    .unwrap();

    loader.load_directory(data.path()).await.unwrap();

    let text = std::fs::read_to_string(&log_path).unwrap();
    let sizes: Vec<usize> = text
        .lines()
        .map(|line| {
            let parts: Vec<&str> = line.split(", ").collect();
            assert_eq!(parts.len(), 3, "line {line:?}");
            assert!(parts[0].ends_with('Z'));
            parts[1].parse::<u128>().unwrap();
            parts[2].parse().unwrap()
        })
        .collect();
    assert_eq!(sizes, vec![100, 50, 30]);
    assert_eq!(store.row_count("flights"), 180);
}

#[tokio::test]
async fn metrics_handle_tracks_the_run() {
    let data = tempfile::tempdir().unwrap();
    write_rows(&data.path().join("a.csv"), "ATL", 5);
    let store = Arc::new(InMemoryTableStore::new());
    let loader: Loader<FlightRecord> = Loader::new(store, LoadOptions::default()).unwrap();
    let metrics = loader.metrics();

    let report = loader.load_directory(data.path()).await.unwrap();

    let snap = metrics.snapshot();
    assert_eq!(snap, report.metrics);
    assert_eq!(snap.files_loaded, 1);
    assert_eq!(snap.records_committed, 5);
    assert_eq!(snap.batches_committed, 1);
    assert!(snap.elapsed.is_some());
}
