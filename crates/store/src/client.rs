use std::time::Duration;

use reqwest::Client;
use wattsync_core::config::Config;
use wattsync_core::error::Result;

use crate::http::build_client;

/// Client for a VictoriaMetrics-compatible store.
#[derive(Clone)]
pub struct VmClient {
    pub(crate) http: Client,
    base_url: String,
    pub(crate) lookback: Duration,
}

impl VmClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            lookback: Duration::from_secs(30 * 24 * 60 * 60),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(&cfg.vm_url, cfg.request_timeout)?.with_lookback(cfg.watermark_lookback))
    }

    /// Window searched backwards for the last sample of a series.
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}
