use std::time::Duration;

use wattsync_core::config::Config;
use wattsync_core::error::Result;
use wattsync_core::model::silence::{PostableSilence, Silence, SilenceCreated};
use wattsync_store::http::{build_client, expect_success, read_json, transport_error};

/// Client for the Alertmanager v2 silence endpoints.
#[derive(Clone)]
pub struct AlertmanagerClient {
    http: reqwest::Client,
    base_url: String,
}

impl AlertmanagerClient {
    /// `base_url` includes the API prefix, e.g. `http://am:9093/api/v2`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(&cfg.alertmanager_url, cfg.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn create(&self, silence: &PostableSilence) -> Result<String> {
        let url = self.url("/silences");
        let resp = self
            .http
            .post(&url)
            .json(silence)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let resp = expect_success(resp).await?;
        let created: SilenceCreated = read_json(&url, resp).await?;
        Ok(created.silence_id)
    }

    pub async fn list(&self) -> Result<Vec<Silence>> {
        let url = self.url("/silences");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let resp = expect_success(resp).await?;
        read_json(&url, resp).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/silence/{id}"));
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        expect_success(resp).await?;
        Ok(())
    }
}
