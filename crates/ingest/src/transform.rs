//! One-off reshape of legacy `Power_<measurement>` series into the `power`
//! label scheme used by the sync.

use serde::Serialize;
use tracing::Instrument;
use wattsync_core::error::{Result, WattError};
use wattsync_core::labels::derive_labels;
use wattsync_core::registry::Registry;
use wattsync_core::time::{format_ts, time_chunks};
use wattsync_store::VmClient;
use wattsync_store::write::ImportLine;

/// 2025-01-31T23:59:59Z
pub const DEFAULT_END: i64 = 1_738_367_999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    pub end: i64,
    pub chunk_days: u32,
    pub step: String,
    pub source_prefix: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            end: DEFAULT_END,
            chunk_days: 7,
            step: "1m".to_string(),
            source_prefix: "Power_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub chunks_written: usize,
    pub chunks_empty: usize,
    pub chunks_failed: usize,
    pub points: usize,
}

enum ChunkResult {
    Written(usize),
    Empty,
}

async fn transform_chunk(
    client: &VmClient,
    opts: &TransformOptions,
    host: &str,
    measurement: &str,
    (start, end): (i64, i64),
) -> Result<ChunkResult> {
    let query = format!("{}{measurement}", opts.source_prefix);
    let series = client.query_range(&query, start, end, &opts.step).await?;
    let Some(first) = series.first() else {
        return Ok(ChunkResult::Empty);
    };
    let samples = first.samples()?;
    let line = ImportLine::new(derive_labels(host, measurement), &samples);
    if line.is_empty() {
        return Ok(ChunkResult::Empty);
    }
    client.import(&line).await?;
    Ok(ChunkResult::Written(line.len()))
}

/// Copies every registered measurement from its bootstrap date to
/// `opts.end`, one chunk at a time. Failed chunks are logged and skipped.
pub async fn run_transform(
    registry: &Registry,
    client: &VmClient,
    opts: &TransformOptions,
) -> Result<TransformReport> {
    if opts.chunk_days == 0 {
        return Err(WattError::InvalidArgument(
            "chunk_days must be positive".to_string(),
        ));
    }
    if opts.step.trim().is_empty() {
        return Err(WattError::InvalidArgument("step must not be empty".to_string()));
    }

    let mut report = TransformReport::default();
    for (dev, measurement) in registry.measurements() {
        let host = dev.host.as_str();
        let span = tracing::info_span!("transform", host, measurement);
        async {
            for chunk in time_chunks(dev.bootstrap_ts(), opts.end, opts.chunk_days) {
                let (from, to) = (format_ts(chunk.0), format_ts(chunk.1));
                match transform_chunk(client, opts, host, measurement, chunk).await {
                    Ok(ChunkResult::Written(points)) => {
                        tracing::info!(%from, %to, points, "chunk transformed");
                        report.chunks_written += 1;
                        report.points += points;
                    }
                    Ok(ChunkResult::Empty) => {
                        tracing::debug!(%from, %to, "no source data in chunk");
                        report.chunks_empty += 1;
                    }
                    Err(e) => {
                        tracing::warn!(%from, %to, error = %e, "chunk skipped");
                        report.chunks_failed += 1;
                    }
                }
            }
        }
        .instrument(span)
        .await;
    }

    tracing::info!(
        written = report.chunks_written,
        empty = report.chunks_empty,
        failed = report.chunks_failed,
        points = report.points,
        "transform finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use serde_json::json;
    use testkit::victoria::FakeVictoria;
    use wattsync_core::model::device::Device;

    use super::*;

    fn one_device(measurements: &[&str]) -> Registry {
        Registry::new(vec![Device::new(
            "iwatt5",
            NaiveDate::from_ymd_opt(2021, 9, 18).unwrap(),
            measurements,
        )])
        .unwrap()
    }

    fn one_week() -> TransformOptions {
        TransformOptions {
            end: 1_631_923_200 + 7 * 86_400 - 1,
            ..TransformOptions::default()
        }
    }

    #[test]
    fn default_end_is_end_of_january_2025() {
        assert_eq!(format_ts(DEFAULT_END), "2025-01-31T23:59:59+00:00");
    }

    #[tokio::test]
    async fn relabels_legacy_series() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        vm.seed_range(
            "Power_Mains_1",
            json!([{"metric": {"__name__": "Power_Mains_1", "host": "old"},
                    "values": [[1631923200, "410.5"], [1631923260, "398"]]}]),
        );
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;

        let report = run_transform(&one_device(&["Mains_1"]), &client, &one_week()).await?;

        assert_eq!(report.chunks_written, 1);
        assert_eq!(report.points, 2);
        let imports = vm.imports();
        assert_eq!(imports.len(), 1);
        let expected: std::collections::BTreeMap<String, String> = derive_labels("iwatt5", "Mains_1")
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(imports[0].metric, expected);
        assert_eq!(imports[0].timestamps, vec![1_631_923_200_000, 1_631_923_260_000]);
        assert_eq!(vm.queries(), vec!["Power_Mains_1".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_and_bad_chunks_are_skipped() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        vm.seed_range(
            "Power_Dryer",
            json!([{"metric": {}, "values": [[1631923200, "not a number"]]}]),
        );
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;
        let opts = TransformOptions {
            end: 1_631_923_200 + 14 * 86_400 - 1,
            ..TransformOptions::default()
        };

        let report = run_transform(&one_device(&["Washer", "Dryer"]), &client, &opts).await?;

        assert_eq!(report.chunks_empty, 2);
        assert_eq!(report.chunks_failed, 2);
        assert_eq!(report.chunks_written, 0);
        assert!(vm.imports().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn rejects_zero_chunk_days() -> anyhow::Result<()> {
        let client = VmClient::new("http://127.0.0.1:1", Duration::from_secs(1))?;
        let opts = TransformOptions {
            chunk_days: 0,
            ..TransformOptions::default()
        };
        let err = run_transform(&one_device(&["Dryer"]), &client, &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, WattError::InvalidArgument(_)));
        Ok(())
    }

    #[tokio::test]
    async fn import_failures_do_not_stop_the_job() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        vm.seed_range("Power_Dryer", json!([{"metric": {}, "values": [[1631923200, "1"]]}]));
        vm.fail_imports(true);
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;

        let report = run_transform(&one_device(&["Dryer", "Washer"]), &client, &one_week()).await?;

        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.chunks_empty, 1);
        Ok(())
    }
}
