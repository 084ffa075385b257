use table_loader::RecordError;
use table_loader::ingestion::csv::{ParseOptions, parse_file};
use table_loader::record::FlightRecord;

const FIXTURE: &str = "tests/fixtures/flights_sample.csv";

#[test]
fn parse_fixture_counts_add_up() {
    let parsed = parse_file::<FlightRecord>(FIXTURE, &ParseOptions::default()).unwrap();

    let data_lines = std::fs::read_to_string(FIXTURE).unwrap().lines().count() - 1;
    assert_eq!(parsed.lines_read, data_lines);
    assert_eq!(parsed.records.len(), parsed.lines_read - parsed.failures.len());
    assert_eq!(parsed.records.len(), 5);
}

#[test]
fn parse_fixture_reports_each_bad_line() {
    let parsed = parse_file::<FlightRecord>(FIXTURE, &ParseOptions::default()).unwrap();

    let lines: Vec<u64> = parsed.failures.iter().map(|f| f.line).collect();
    assert_eq!(lines, vec![6, 8, 9, 10]);

    assert!(matches!(
        &parsed.failures[0].reason,
        RecordError::InvalidValue { column, raw, .. } if column == "OriginAirportID" && raw == "N/A"
    ));
    assert!(matches!(
        &parsed.failures[1].reason,
        RecordError::InvalidValue { column, .. } if column == "FlightDate"
    ));
    assert!(matches!(&parsed.failures[2].reason, RecordError::EmptyPartitionKey { .. }));
    assert!(matches!(
        parsed.failures[3].reason,
        RecordError::MissingColumns { expected: 20, found: 7 }
    ));
}

#[test]
fn parse_fixture_strips_quotes_and_ignores_extra_columns() {
    let parsed = parse_file::<FlightRecord>(FIXTURE, &ParseOptions::default()).unwrap();
    let first = &parsed.records[0];
    assert_eq!(first.partition_key, "DFW");
    assert_eq!(first.origin_city_name, "Dallas/Fort Worth, TX");
    assert_eq!(first.tail_num, "N4YBAA");
    assert_eq!(first.origin_wac, "74");
}

#[test]
fn parse_missing_file_is_an_io_error() {
    let err = parse_file::<FlightRecord>("tests/fixtures/does_not_exist.csv", &ParseOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("csv error") || err.to_string().contains("io error"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn parse_twice_yields_fresh_row_keys() {
    let a = parse_file::<FlightRecord>(FIXTURE, &ParseOptions::default()).unwrap();
    let b = parse_file::<FlightRecord>(FIXTURE, &ParseOptions::default()).unwrap();
    assert_eq!(a.records.len(), b.records.len());
    assert!(a.records.iter().zip(&b.records).all(|(x, y)| x.row_key != y.row_key));
}
