use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use wattsync_core::config::Config;
use wattsync_core::model::device::Device;
use wattsync_core::registry::Registry;

use crate::paginate::{PaginateOutcome, paginate};
use crate::source::{DeviceSource, MetricsSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Seconds added to the watermark before the next request.
    pub resume_offset: i64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { resume_offset: 5 }
    }
}

impl SyncOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            resume_offset: cfg.resume_offset.as_secs() as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementReport {
    pub host: String,
    pub measurement: String,
    pub start: i64,
    /// False when the pass started from the device's bootstrap date.
    pub resumed: bool,
    pub outcome: PaginateOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub measurements: Vec<MeasurementReport>,
}

impl SyncReport {
    pub fn samples_written(&self) -> usize {
        self.measurements.iter().map(|m| m.outcome.samples).sum()
    }

    pub fn failures(&self) -> usize {
        self.measurements
            .iter()
            .filter(|m| m.outcome.end.is_failure())
            .count()
    }
}

/// First `begin` for a measurement: just past the watermark, or the
/// device's bootstrap date when nothing has been stored yet.
pub fn start_for(device: &Device, watermark: Option<i64>, opts: &SyncOptions) -> i64 {
    match watermark {
        Some(ts) => ts + opts.resume_offset,
        None => device.bootstrap_ts(),
    }
}

/// One pass over every registered measurement, strictly in order.
pub async fn run_pass<D, S>(
    registry: &Registry,
    device: &D,
    sink: &S,
    opts: &SyncOptions,
) -> SyncReport
where
    D: DeviceSource,
    S: MetricsSink,
{
    let started_at = Utc::now();
    let mut measurements = Vec::with_capacity(registry.len());

    for (dev, measurement) in registry.measurements() {
        let host = dev.host.as_str();
        let span = tracing::info_span!("measurement", host, measurement);
        let report = async {
            let watermark = match sink.last_timestamp(host, measurement).await {
                Ok(w) => w,
                Err(e) => {
                    tracing::warn!(error = %e, "watermark lookup failed, using bootstrap date");
                    None
                }
            };
            let start = start_for(dev, watermark, opts);
            if watermark.is_none() {
                tracing::warn!(
                    begin = start,
                    bootstrap = %dev.bootstrap,
                    "no watermark, backfilling from bootstrap date"
                );
            }
            let outcome = paginate(device, sink, host, measurement, start).await;
            tracing::debug!(pages = outcome.pages, samples = outcome.samples, end = ?outcome.end, "measurement done");
            MeasurementReport {
                host: host.to_string(),
                measurement: measurement.to_string(),
                start,
                resumed: watermark.is_some(),
                outcome,
            }
        }
        .instrument(span)
        .await;
        measurements.push(report);
    }

    let report = SyncReport {
        started_at,
        finished_at: Utc::now(),
        measurements,
    };
    tracing::info!(
        measurements = report.measurements.len(),
        samples = report.samples_written(),
        failures = report.failures(),
        "sync pass finished"
    );
    report
}

/// Runs a pass every `interval` until `shutdown` resolves. A pass in flight
/// is abandoned at its next await point.
pub async fn run_forever<D, S, F>(
    registry: &Registry,
    device: &D,
    sink: &S,
    opts: &SyncOptions,
    interval: Duration,
    shutdown: F,
) -> usize
where
    D: DeviceSource,
    S: MetricsSink,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut passes = 0;
    loop {
        let pass = run_pass(registry, device, sink, opts)
            .instrument(tracing::info_span!("sync_pass", pass = passes + 1));
        tokio::select! {
            _ = &mut shutdown => break,
            _ = pass => passes += 1,
        }

        tracing::debug!(?interval, "sleeping until next pass");
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::info!(passes, "sync loop stopped");
    passes
}
