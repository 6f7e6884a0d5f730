use std::future::Future;

use wattsync_core::error::Result;
use wattsync_core::model::sample::Sample;
use wattsync_store::VmClient;

use crate::device::{IotaWattClient, Page};

/// Where readings come from.
pub trait DeviceSource: Send + Sync {
    fn fetch_page(
        &self,
        host: &str,
        measurement: &str,
        begin: i64,
    ) -> impl Future<Output = Result<Page>> + Send;
}

/// Where readings go, and how far they got.
pub trait MetricsSink: Send + Sync {
    /// Newest stored unix second for the measurement's series.
    fn last_timestamp(
        &self,
        host: &str,
        measurement: &str,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;

    fn write_samples(
        &self,
        host: &str,
        measurement: &str,
        samples: &[Sample],
    ) -> impl Future<Output = Result<()>> + Send;
}

impl DeviceSource for IotaWattClient {
    async fn fetch_page(&self, host: &str, measurement: &str, begin: i64) -> Result<Page> {
        self.query_page(host, measurement, begin).await
    }
}

impl MetricsSink for VmClient {
    async fn last_timestamp(&self, host: &str, measurement: &str) -> Result<Option<i64>> {
        VmClient::last_timestamp(self, host, measurement).await
    }

    async fn write_samples(&self, host: &str, measurement: &str, samples: &[Sample]) -> Result<()> {
        VmClient::write_samples(self, host, measurement, samples)
            .await
            .map(|_| ())
    }
}
