//! Shared reqwest plumbing for the HTTP clients.

use std::time::Duration;

use reqwest::{Client, Response};
use wattsync_core::error::{Result, WattError};

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WattError::Internal(format!("failed to build http client: {e}")))
}

pub fn transport_error(url: &str, err: reqwest::Error) -> WattError {
    WattError::Transport(format!("{url}: {err}"))
}

/// Passes 2xx responses through, turns anything else into `WattError::Status`.
pub async fn expect_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(WattError::status(status.as_u16(), &body))
}

pub async fn read_json<T: serde::de::DeserializeOwned>(url: &str, resp: Response) -> Result<T> {
    let body = resp.text().await.map_err(|e| transport_error(url, e))?;
    serde_json::from_str(&body)
        .map_err(|e| WattError::Malformed(format!("{url}: {e}")))
}
