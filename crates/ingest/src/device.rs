use serde::{Deserialize, Serialize};
use serde_json::Value;
use wattsync_core::config::Config;
use wattsync_core::error::{Result, WattError};
use wattsync_core::model::sample::Sample;
use wattsync_store::http::{build_client, expect_success, transport_error};

/// One page of readings from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Rows the device returned, including ones with a null value.
    pub rows: usize,
    pub samples: Vec<Sample>,
    /// Where the next page begins; `None` once the device has nothing more.
    pub next: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageQuery {
    select: String,
    begin: i64,
    end: &'static str,
    group: String,
    missing: &'static str,
    limit: u32,
    header: &'static str,
}

impl PageQuery {
    pub fn new(measurement: &str, begin: i64, group: &str, limit: u32) -> Self {
        Self {
            select: format!("[time.utc.unix,{measurement}]"),
            begin,
            end: "s",
            group: group.to_string(),
            missing: "skip",
            limit,
            header: "yes",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPage {
    data: Option<Vec<Value>>,
    #[serde(default)]
    limit: Option<Value>,
}

fn as_number(v: &Value, what: &str) -> Result<f64> {
    v.as_f64()
        .ok_or_else(|| WattError::Malformed(format!("expected number for {what}, got {v}")))
}

/// Decodes a `/query` body: `data` rows of `[unix_seconds, value]` and an
/// optional `limit` cursor.
pub fn decode_page(body: &str) -> Result<Page> {
    let raw: RawPage = serde_json::from_str(body)
        .map_err(|e| WattError::Malformed(format!("device response: {e}")))?;
    let rows = raw
        .data
        .ok_or_else(|| WattError::Malformed("device response has no data".to_string()))?;

    let mut samples = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some([ts, value, ..]) = row.as_array().map(Vec::as_slice) else {
            return Err(WattError::Malformed(format!("bad device row {row}")));
        };
        // Empty buckets can still come back as null.
        if value.is_null() {
            continue;
        }
        samples.push(Sample::new(
            as_number(ts, "timestamp")?,
            as_number(value, "value")?,
        ));
    }

    let next = match raw.limit {
        None | Some(Value::Null) => None,
        Some(v) => Some(as_number(&v, "limit")?.floor() as i64),
    };

    Ok(Page {
        rows: rows.len(),
        samples,
        next,
    })
}

/// HTTP client for the IoTaWatt `/query` API.
#[derive(Clone)]
pub struct IotaWattClient {
    http: reqwest::Client,
    url_template: String,
    group: String,
    page_limit: u32,
}

impl IotaWattClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            http: build_client(cfg.request_timeout)?,
            url_template: cfg.device_url_template.clone(),
            group: cfg.group.clone(),
            page_limit: cfg.page_limit,
        })
    }

    pub fn url(&self, host: &str) -> String {
        self.url_template.replace("{host}", host)
    }

    pub async fn query_page(&self, host: &str, measurement: &str, begin: i64) -> Result<Page> {
        let url = self.url(host);
        let query = PageQuery::new(measurement, begin, &self.group, self.page_limit);
        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let resp = expect_success(resp).await?;
        let body = resp.text().await.map_err(|e| transport_error(&url, e))?;
        decode_page(&body)
    }
}
