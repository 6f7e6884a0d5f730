use serde::Deserialize;
use wattsync_core::error::{Result, WattError};
use wattsync_core::labels::METRIC_NAME;
use wattsync_core::model::labels::LabelSet;
use wattsync_core::model::sample::Sample;
use wattsync_core::time::promql_duration;

use crate::VmClient;
use crate::http::{expect_success, read_json, transport_error};

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct QueryResponse<T> {
    status: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultData<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct InstantSample {
    value: (f64, String),
}

/// One series of a `query_range` matrix.
#[derive(Debug, Clone, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: LabelSet,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

impl RangeSeries {
    pub fn samples(&self) -> Result<Vec<Sample>> {
        self.values
            .iter()
            .map(|(ts, raw)| {
                raw.parse::<f64>()
                    .map(|v| Sample::new(*ts, v))
                    .map_err(|e| WattError::Malformed(format!("bad sample value {raw}: {e}")))
            })
            .collect()
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Query for the newest sample time of one measurement's series.
pub fn watermark_query(host: &str, measurement: &str, lookback: &str) -> String {
    format!(
        "tlast_over_time({METRIC_NAME}{{location=\"{}\",device=\"{}\"}}[{lookback}])",
        escape_label_value(measurement),
        escape_label_value(host),
    )
}

fn unwrap_data<T>(resp: QueryResponse<T>) -> Result<T> {
    if resp.status != "success" {
        return Err(WattError::Malformed(format!(
            "query status {}: {}",
            resp.status,
            resp.error.unwrap_or_default()
        )));
    }
    resp.data
        .ok_or_else(|| WattError::Malformed("query response has no data".to_string()))
}

fn decode_watermark(resp: QueryResponse<ResultData<InstantSample>>) -> Result<Option<i64>> {
    let data = unwrap_data(resp)?;
    let mut newest: Option<i64> = None;
    for sample in data.result {
        let raw = &sample.value.1;
        let ts = raw
            .parse::<f64>()
            .map_err(|e| WattError::Malformed(format!("bad watermark value {raw}: {e}")))?;
        let ts = ts.floor() as i64;
        newest = Some(newest.map_or(ts, |n| n.max(ts)));
    }
    Ok(newest)
}

impl VmClient {
    /// Latest ingested unix second for `(host, measurement)`, or `None` when
    /// the store has nothing inside the lookback window.
    pub async fn last_timestamp(&self, host: &str, measurement: &str) -> Result<Option<i64>> {
        let lookback = promql_duration(self.lookback);
        let query = watermark_query(host, measurement, &lookback);
        let url = self.url("/api/v1/query");
        let resp = self
            .http
            .get(&url)
            .query(&[("query", query.as_str()), ("step", lookback.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let resp = expect_success(resp).await?;
        decode_watermark(read_json(&url, resp).await?)
    }

    pub async fn query_range(
        &self,
        query: &str,
        start: i64,
        end: i64,
        step: &str,
    ) -> Result<Vec<RangeSeries>> {
        let url = self.url("/api/v1/query_range");
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("query", query.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", step.to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let resp = expect_success(resp).await?;
        let decoded: QueryResponse<ResultData<RangeSeries>> = read_json(&url, resp).await?;
        Ok(unwrap_data(decoded)?.result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use testkit::victoria::FakeVictoria;

    use super::*;

    fn parse(raw: &str) -> QueryResponse<ResultData<InstantSample>> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn watermark_query_scopes_by_location_and_device() {
        assert_eq!(
            watermark_query("iwatt5", "Mains_1", "30d"),
            r#"tlast_over_time(power{location="Mains_1",device="iwatt5"}[30d])"#
        );
    }

    #[test]
    fn watermark_query_escapes_quotes() {
        let q = watermark_query("h", r#"we"ird\name"#, "1d");
        assert!(q.contains(r#"location="we\"ird\\name""#));
    }

    #[test]
    fn decode_watermark_takes_newest() {
        let resp = parse(
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{},"value":[1700000300,"1700000100"]},
                {"metric":{},"value":[1700000300,"1700000200.7"]}
            ]}}"#,
        );
        assert_eq!(decode_watermark(resp).unwrap(), Some(1_700_000_200));
    }

    #[test]
    fn decode_watermark_empty_is_none() {
        let resp = parse(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#);
        assert_eq!(decode_watermark(resp).unwrap(), None);
    }

    #[test]
    fn decode_watermark_rejects_errors_and_garbage() {
        let resp = parse(r#"{"status":"error","error":"bad query"}"#);
        assert!(matches!(decode_watermark(resp), Err(WattError::Malformed(_))));

        let resp = parse(
            r#"{"status":"success","data":{"result":[{"metric":{},"value":[1,"soon"]}]}}"#,
        );
        assert!(decode_watermark(resp).is_err());
    }

    #[test]
    fn range_series_parses_values() {
        let series: RangeSeries = serde_json::from_str(
            r#"{"metric":{"__name__":"Power_Dryer"},"values":[[1700000000,"1.5"],[1700000060,"2"]]}"#,
        )
        .unwrap();
        let samples = series.samples().unwrap();
        assert_eq!(samples, vec![Sample::new(1.7e9, 1.5), Sample::new(1_700_000_060.0, 2.0)]);
        assert_eq!(series.metric.get("__name__"), Some("Power_Dryer"));
    }

    #[tokio::test]
    async fn last_timestamp_round_trips_through_store() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;

        assert_eq!(client.last_timestamp("iwatt6", "Furnace").await?, None);

        client
            .write_samples(
                "iwatt6",
                "Furnace",
                &[Sample::new(1_700_000_000.0, 1.0), Sample::new(1_700_000_060.0, 2.0)],
            )
            .await?;
        assert_eq!(
            client.last_timestamp("iwatt6", "Furnace").await?,
            Some(1_700_000_060)
        );
        assert_eq!(client.last_timestamp("iwatt5", "Furnace").await?, None);
        assert!(vm.queries()[0].contains("[30d]"));
        Ok(())
    }

    #[tokio::test]
    async fn query_range_returns_seeded_matrix() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        vm.seed_range(
            "Power_Dryer",
            serde_json::json!([{"metric": {"__name__": "Power_Dryer"}, "values": [[1700000000, "3"]]}]),
        );
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;

        let series = client.query_range("Power_Dryer", 0, 10, "1m").await?;
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].samples()?, vec![Sample::new(1.7e9, 3.0)]);

        assert!(client.query_range("Power_Other", 0, 10, "1m").await?.is_empty());
        Ok(())
    }
}
