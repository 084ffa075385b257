//! Delimited file parsing into typed records.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{LoadResult, RecordError};
use crate::record::TableRecord;

/// Options controlling how a single file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Stop after this many records were produced.
    pub max_records: Option<usize>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            max_records: None,
        }
    }
}

/// A dropped input line and the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// 1-based line number in the file (the header is line 1).
    pub line: u64,
    pub reason: RecordError,
}

/// Result of parsing one file.
#[derive(Debug, Clone)]
pub struct ParsedFile<R> {
    pub path: PathBuf,
    pub records: Vec<R>,
    pub failures: Vec<RowFailure>,
    /// Data lines consumed, excluding the header.
    pub lines_read: usize,
}

/// Parse a delimited file with a header line into records of type `R`.
///
/// Rules:
///
/// - The first line is a header and is skipped.
/// - Only the first `R::schema().width()` columns are used; extra columns are ignored.
/// - Lines that fail to convert are dropped and listed in [`ParsedFile::failures`].
/// - Only I/O failures are returned as errors.
pub fn parse_file<R: TableRecord>(path: impl AsRef<Path>, opts: &ParseOptions) -> LoadResult<ParsedFile<R>> {
    let path = path.as_ref();
    let mut rdr = reader_builder(opts).from_path(path)?;
    let mut parsed = parse_reader(&mut rdr, opts)?;
    parsed.path = path.to_path_buf();
    Ok(parsed)
}

/// Parse records from an existing CSV reader.
///
/// The reader should be configured with headers enabled and `flexible(true)` so short lines
/// surface as per-row failures instead of reader errors; [`reader_builder`] does both.
pub fn parse_reader<R: TableRecord, Rd: Read>(
    rdr: &mut csv::Reader<Rd>,
    opts: &ParseOptions,
) -> LoadResult<ParsedFile<R>> {
    let mut records = Vec::new();
    let mut failures = Vec::new();
    let mut lines_read = 0usize;

    for result in rdr.records() {
        if opts.max_records.is_some_and(|max| records.len() >= max) {
            debug!(max = records.len(), "record cap reached, stopping early");
            break;
        }

        let (line, outcome) = match result {
            Ok(fields) => {
                let line = fields.position().map(|p| p.line()).unwrap_or(0);
                (line, R::from_fields(&fields))
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                let reason = RecordError::Malformed {
                    message: e.to_string(),
                };
                (line, Err(reason))
            }
        };
        lines_read += 1;

        match outcome {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(line, %reason, "dropping line");
                failures.push(RowFailure { line, reason });
            }
        }
    }

    Ok(ParsedFile {
        path: PathBuf::new(),
        records,
        failures,
        lines_read,
    })
}

/// CSV reader settings shared by [`parse_file`] and callers reading from memory.
pub fn reader_builder(opts: &ParseOptions) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .flexible(true)
        .delimiter(opts.delimiter)
        .trim(csv::Trim::All);
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FlightRecord;

    const HEADER: &str = "Year,Quarter,Month,DayofMonth,DayOfWeek,FlightDate,UniqueCarrier,AirlineID,Carrier,TailNum,FlightNum,OriginAirportID,OriginAirportSeqID,OriginCityMarketID,Origin,OriginCityName,OriginState,OriginStateFips,OriginStateName,OriginWac";

    fn row(origin: &str, year: &str) -> String {
        format!("{year},1,1,6,3,2016-01-06,AA,19805,AA,N4YBAA,43,12478,1247803,31703,{origin},\"New York, NY\",NY,36,New York,22")
    }

    fn parse(input: &str, opts: ParseOptions) -> ParsedFile<FlightRecord> {
        let mut rdr = reader_builder(&opts).from_reader(input.as_bytes());
        parse_reader(&mut rdr, &opts).unwrap()
    }

    #[test]
    fn skips_header_and_parses_rows() {
        let input = format!("{HEADER}\n{}\n{}\n", row("JFK", "2016"), row("LGA", "2016"));
        let parsed = parse(&input, ParseOptions::default());
        assert_eq!(parsed.lines_read, 2);
        assert_eq!(parsed.records.len(), 2);
        assert!(parsed.failures.is_empty());
        assert_eq!(parsed.records[1].partition_key, "LGA");
    }

    #[test]
    fn drops_bad_rows_and_keeps_going() {
        let input = format!(
            "{HEADER}\n{}\n{}\n{}\n",
            row("JFK", "2016"),
            row("JFK", "abc"),
            row("JFK", "2017")
        );
        let parsed = parse(&input, ParseOptions::default());
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].line, 3);
        assert_eq!(parsed.records.len(), parsed.lines_read - parsed.failures.len());
    }

    #[test]
    fn short_lines_are_row_failures() {
        let input = format!("{HEADER}\n2016,1,1\n{}\n", row("JFK", "2016"));
        let parsed = parse(&input, ParseOptions::default());
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(
            parsed.failures[0].reason,
            RecordError::MissingColumns { expected: 20, found: 3 }
        );
    }

    #[test]
    fn trailing_columns_are_ignored() {
        let input = format!("{HEADER},Extra\n{},ignored,also\n", row("JFK", "2016"));
        let parsed = parse(&input, ParseOptions::default());
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].origin_wac, "22");
    }

    #[test]
    fn record_cap_stops_early() {
        let rows: Vec<String> = (0..10).map(|_| row("JFK", "2016")).collect();
        let input = format!("{HEADER}\n{}\n", rows.join("\n"));
        let parsed = parse(
            &input,
            ParseOptions {
                max_records: Some(4),
                ..Default::default()
            },
        );
        assert_eq!(parsed.records.len(), 4);
    }

    #[test]
    fn custom_delimiter() {
        let input = format!("{}\n{}\n", HEADER.replace(',', "|"), row("JFK", "2016").replace(',', "|").replace("\"New York| NY\"", "New York NY"));
        let parsed = parse(
            &input,
            ParseOptions {
                delimiter: b'|',
                ..Default::default()
            },
        );
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].origin_city_name, "New York NY");
    }

    #[test]
    fn invalid_utf8_is_a_row_failure() {
        let mut input = format!("{HEADER}\n").into_bytes();
        input.extend_from_slice(b"2016,1,1,6,3,2016-01-06,\xff\xfe,19805\n");
        input.extend_from_slice(format!("{}\n", row("JFK", "2016")).as_bytes());
        let opts = ParseOptions::default();
        let mut rdr = reader_builder(&opts).from_reader(input.as_slice());
        let parsed: ParsedFile<FlightRecord> = parse_reader(&mut rdr, &opts).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(matches!(parsed.failures[0].reason, RecordError::Malformed { .. }));
    }
}
