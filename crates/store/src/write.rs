use serde::Serialize;
use wattsync_core::error::Result;
use wattsync_core::labels::derive_labels;
use wattsync_core::model::labels::LabelSet;
use wattsync_core::model::sample::Sample;

use crate::VmClient;
use crate::http::{expect_success, transport_error};

/// One line of the `/api/v1/import` JSON format.
///
/// `values` and `timestamps` are positionally aligned; timestamps are
/// milliseconds.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportLine {
    pub metric: LabelSet,
    pub values: Vec<f64>,
    pub timestamps: Vec<i64>,
}

impl ImportLine {
    pub fn new(metric: LabelSet, samples: &[Sample]) -> Self {
        let (values, timestamps) = samples
            .iter()
            .filter(|s| s.value.is_finite())
            .map(|s| (s.value, s.ts_millis()))
            .unzip();
        Self {
            metric,
            values,
            timestamps,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl VmClient {
    pub async fn import(&self, line: &ImportLine) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }

        let url = self.url("/api/v1/import");
        let resp = self
            .http
            .post(&url)
            .json(line)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        expect_success(resp).await?;
        tracing::debug!(points = line.len(), "imported series batch");
        Ok(())
    }

    /// Writes one page of device readings under the derived label set.
    pub async fn write_samples(
        &self,
        host: &str,
        measurement: &str,
        samples: &[Sample],
    ) -> Result<usize> {
        let line = ImportLine::new(derive_labels(host, measurement), samples);
        self.import(&line).await?;
        Ok(line.len())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use testkit::victoria::FakeVictoria;

    use super::*;

    #[test]
    fn import_line_aligns_values_and_millis() {
        let line = ImportLine::new(
            derive_labels("iwatt5", "Mains_1"),
            &[Sample::new(1_700_000_000.0, 12.5), Sample::new(1_700_000_060.0, 13.0)],
        );
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["values"], serde_json::json!([12.5, 13.0]));
        assert_eq!(
            json["timestamps"],
            serde_json::json!([1_700_000_000_000i64, 1_700_000_060_000i64])
        );
        assert_eq!(json["metric"]["__name__"], "power");
        assert_eq!(json["metric"]["pair"], "Mains");
        assert_eq!(json["metric"]["device"], "iwatt5");
    }

    #[test]
    fn import_line_drops_non_finite_values() {
        let line = ImportLine::new(
            LabelSet::new(),
            &[Sample::new(1.0, f64::NAN), Sample::new(2.0, 4.0)],
        );
        assert_eq!(line.values, vec![4.0]);
        assert_eq!(line.timestamps, vec![2000]);
    }

    #[tokio::test]
    async fn write_samples_posts_one_line() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;

        let written = client
            .write_samples("iwatt6", "Furnace", &[Sample::new(100.0, 1.5)])
            .await?;
        assert_eq!(written, 1);

        let imports = vm.imports();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].metric.get("hvac").map(String::as_str), Some("True"));
        assert_eq!(imports[0].timestamps, vec![100_000]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;
        assert_eq!(client.write_samples("iwatt6", "Furnace", &[]).await?, 0);
        assert!(vm.imports().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_import_is_a_status_error() -> anyhow::Result<()> {
        let vm = FakeVictoria::start().await?;
        vm.fail_imports(true);
        let client = VmClient::new(&vm.base_url(), Duration::from_secs(5))?;

        let err = client
            .write_samples("iwatt6", "Furnace", &[Sample::new(100.0, 1.5)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            wattsync_core::WattError::Status { status: 500, .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_store_is_a_transport_error() -> anyhow::Result<()> {
        let client = VmClient::new("http://127.0.0.1:1", Duration::from_secs(2))?;
        let err = client
            .write_samples("iwatt6", "Furnace", &[Sample::new(100.0, 1.5)])
            .await
            .unwrap_err();
        assert!(matches!(err, wattsync_core::WattError::Transport(_)));
        Ok(())
    }
}
