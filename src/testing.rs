//! Record builders shared by unit tests.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::record::FlightRecord;

pub(crate) fn record(origin: &str) -> FlightRecord {
    FlightRecord {
        partition_key: origin.to_string(),
        row_key: Uuid::new_v4(),
        year: 2016,
        quarter: 1,
        month: 1,
        day_of_month: 6,
        day_of_week: 3,
        flight_date: NaiveDate::from_ymd_opt(2016, 1, 6).unwrap(),
        unique_carrier: "AA".to_string(),
        airline_id: "19805".to_string(),
        carrier: "AA".to_string(),
        tail_num: "N4YBAA".to_string(),
        flight_num: "43".to_string(),
        origin_airport_id: 12478,
        origin_airport_seq_id: 1247803,
        origin_city_market_id: 31703,
        origin_city_name: "New York, NY".to_string(),
        origin_state: "NY".to_string(),
        origin_state_fips: "36".to_string(),
        origin_state_name: "New York".to_string(),
        origin_wac: "22".to_string(),
    }
}

pub(crate) fn records(origin: &str, n: usize) -> Vec<FlightRecord> {
    (0..n).map(|_| record(origin)).collect()
}
