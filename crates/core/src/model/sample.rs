use serde::{Deserialize, Serialize};

/// One reading in transit between a source and the metrics store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Unix time in seconds.
    pub ts: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(ts: f64, value: f64) -> Self {
        Self { ts, value }
    }

    pub fn ts_millis(&self) -> i64 {
        (self.ts * 1000.0).round() as i64
    }
}
