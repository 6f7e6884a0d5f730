use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::time::date_start_ts;

/// An IoTaWatt unit and the measurements synced from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub host: String,
    /// First day of history; used when the store has nothing for a measurement.
    pub bootstrap: NaiveDate,
    pub measurements: Vec<String>,
}

impl Device {
    pub fn new(host: &str, bootstrap: NaiveDate, measurements: &[&str]) -> Self {
        Self {
            host: host.to_string(),
            bootstrap,
            measurements: measurements.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn bootstrap_ts(&self) -> i64 {
        date_start_ts(self.bootstrap)
    }
}
