//! Typed records and the reference flight schema.
//!
//! A [`TableRecord`] knows its column layout and how to build itself from one parsed line. The
//! parser, grouper and chunker are generic over it; [`FlightRecord`] is the shipped schema.

use std::sync::LazyLock;

use chrono::NaiveDate;
use csv::StringRecord;
use uuid::Uuid;

use crate::error::RecordError;
use crate::types::{DataType, Field, Schema, TableEntity, Value};

/// A record type that can be parsed from a delimited line and stored as a [`TableEntity`].
pub trait TableRecord: Sized + Send + Sync {
    /// Column layout, including the partition key column.
    fn schema() -> &'static Schema;

    /// Build a record from the leading `schema().width()` columns of a line.
    ///
    /// Implementations assign a fresh row key to every record.
    fn from_fields(fields: &StringRecord) -> Result<Self, RecordError>;

    /// Partition key; never empty.
    fn partition_key(&self) -> &str;

    /// Unique identifier of this record within the run.
    fn row_key(&self) -> Uuid;

    /// Convert into the entity the store receives.
    fn into_entity(self) -> TableEntity;
}

/// Typed access to the columns of one line, reporting failures by column name.
pub struct FieldReader<'a> {
    fields: &'a StringRecord,
    schema: &'a Schema,
}

impl<'a> FieldReader<'a> {
    /// Wrap a line, failing if it is narrower than the schema.
    pub fn new(fields: &'a StringRecord, schema: &'a Schema) -> Result<Self, RecordError> {
        if fields.len() < schema.width() {
            return Err(RecordError::MissingColumns {
                expected: schema.width(),
                found: fields.len(),
            });
        }
        Ok(Self { fields, schema })
    }

    fn raw(&self, idx: usize) -> &'a str {
        self.fields.get(idx).unwrap_or("").trim()
    }

    fn invalid(&self, idx: usize, message: impl Into<String>) -> RecordError {
        RecordError::InvalidValue {
            column: self.schema.fields[idx].name.clone(),
            raw: self.raw(idx).to_owned(),
            message: message.into(),
        }
    }

    /// Read a required integer column.
    pub fn int32(&self, idx: usize) -> Result<i32, RecordError> {
        debug_assert_eq!(self.schema.fields[idx].data_type, DataType::Int32);
        let raw = self.raw(idx);
        if raw.is_empty() {
            return Err(self.invalid(idx, "missing value"));
        }
        raw.parse::<i32>().map_err(|e| self.invalid(idx, e.to_string()))
    }

    /// Read a string column; empty is allowed.
    pub fn utf8(&self, idx: usize) -> String {
        self.raw(idx).to_owned()
    }

    /// Read a required date column (`YYYY-MM-DD` or `M/D/YYYY`).
    pub fn date(&self, idx: usize) -> Result<NaiveDate, RecordError> {
        debug_assert_eq!(self.schema.fields[idx].data_type, DataType::Date);
        let raw = self.raw(idx);
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
            .map_err(|e| self.invalid(idx, e.to_string()))
    }

    /// Read the partition key column, rejecting empty values.
    pub fn partition_key(&self) -> Result<String, RecordError> {
        let idx = self.schema.partition_column;
        let raw = self.raw(idx);
        if raw.is_empty() {
            return Err(RecordError::EmptyPartitionKey {
                column: self.schema.fields[idx].name.clone(),
            });
        }
        Ok(raw.to_owned())
    }
}

/// Column index of `Origin`, the airport code used as partition key.
pub const FLIGHT_PARTITION_COLUMN: usize = 14;

static FLIGHT_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    use DataType::*;
    Schema::new(
        vec![
            Field::new("Year", Int32),
            Field::new("Quarter", Int32),
            Field::new("Month", Int32),
            Field::new("DayofMonth", Int32),
            Field::new("DayOfWeek", Int32),
            Field::new("FlightDate", Date),
            Field::new("UniqueCarrier", Utf8),
            Field::new("AirlineID", Utf8),
            Field::new("Carrier", Utf8),
            Field::new("TailNum", Utf8),
            Field::new("FlightNum", Utf8),
            Field::new("OriginAirportID", Int32),
            Field::new("OriginAirportSeqID", Int32),
            Field::new("OriginCityMarketID", Int32),
            Field::new("Origin", Utf8),
            Field::new("OriginCityName", Utf8),
            Field::new("OriginState", Utf8),
            Field::new("OriginStateFips", Utf8),
            Field::new("OriginStateName", Utf8),
            Field::new("OriginWac", Utf8),
        ],
        FLIGHT_PARTITION_COLUMN,
    )
});

/// One on-time-performance row, partitioned by origin airport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightRecord {
    /// Origin airport code (`Origin` column).
    pub partition_key: String,
    pub row_key: Uuid,
    pub year: i32,
    pub quarter: i32,
    pub month: i32,
    pub day_of_month: i32,
    pub day_of_week: i32,
    pub flight_date: NaiveDate,
    pub unique_carrier: String,
    pub airline_id: String,
    pub carrier: String,
    pub tail_num: String,
    pub flight_num: String,
    pub origin_airport_id: i32,
    pub origin_airport_seq_id: i32,
    pub origin_city_market_id: i32,
    pub origin_city_name: String,
    pub origin_state: String,
    pub origin_state_fips: String,
    pub origin_state_name: String,
    pub origin_wac: String,
}

impl TableRecord for FlightRecord {
    fn schema() -> &'static Schema {
        &FLIGHT_SCHEMA
    }

    fn from_fields(fields: &StringRecord) -> Result<Self, RecordError> {
        let r = FieldReader::new(fields, Self::schema())?;
        Ok(Self {
            partition_key: r.partition_key()?,
            row_key: Uuid::new_v4(),
            year: r.int32(0)?,
            quarter: r.int32(1)?,
            month: r.int32(2)?,
            day_of_month: r.int32(3)?,
            day_of_week: r.int32(4)?,
            flight_date: r.date(5)?,
            unique_carrier: r.utf8(6),
            airline_id: r.utf8(7),
            carrier: r.utf8(8),
            tail_num: r.utf8(9),
            flight_num: r.utf8(10),
            origin_airport_id: r.int32(11)?,
            origin_airport_seq_id: r.int32(12)?,
            origin_city_market_id: r.int32(13)?,
            origin_city_name: r.utf8(15),
            origin_state: r.utf8(16),
            origin_state_fips: r.utf8(17),
            origin_state_name: r.utf8(18),
            origin_wac: r.utf8(19),
        })
    }

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> Uuid {
        self.row_key
    }

    fn into_entity(self) -> TableEntity {
        let values = vec![
            Value::Int32(self.year),
            Value::Int32(self.quarter),
            Value::Int32(self.month),
            Value::Int32(self.day_of_month),
            Value::Int32(self.day_of_week),
            Value::Date(self.flight_date),
            text(self.unique_carrier),
            text(self.airline_id),
            text(self.carrier),
            text(self.tail_num),
            text(self.flight_num),
            Value::Int32(self.origin_airport_id),
            Value::Int32(self.origin_airport_seq_id),
            Value::Int32(self.origin_city_market_id),
            Value::Utf8(self.partition_key.clone()),
            text(self.origin_city_name),
            text(self.origin_state),
            text(self.origin_state_fips),
            text(self.origin_state_name),
            text(self.origin_wac),
        ];
        let properties = Self::schema()
            .field_names()
            .map(str::to_owned)
            .zip(values)
            .collect();

        TableEntity {
            partition_key: self.partition_key,
            row_key: self.row_key.to_string(),
            properties,
        }
    }
}

fn text(s: String) -> Value {
    if s.is_empty() { Value::Null } else { Value::Utf8(s) }
}
