use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

/// A `/query` call as the device saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub host: String,
    pub measurement: String,
    pub params: HashMap<String, String>,
}

impl DeviceRequest {
    pub fn begin(&self) -> Option<i64> {
        self.params.get("begin").and_then(|b| b.parse().ok())
    }
}

#[derive(Default)]
struct IotaState {
    readings: HashMap<(String, String), Vec<(i64, f64)>>,
    requests: Vec<DeviceRequest>,
    failing: HashSet<String>,
    malformed: HashSet<String>,
}

type Shared = Arc<Mutex<IotaState>>;

/// Serves any number of IoTaWatt hosts under `/{host}/query`.
#[derive(Clone)]
pub struct FakeIotaWatt {
    addr: SocketAddr,
    state: Shared,
}

impl FakeIotaWatt {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Shared::default();
        let router = Router::new()
            .route("/{host}/query", get(device_query))
            .with_state(state.clone());
        let addr = crate::serve(router).await?;
        Ok(Self { addr, state })
    }

    /// Value for the `device_url_template` setting.
    pub fn url_template(&self) -> String {
        format!("http://{}/{{host}}/query", self.addr)
    }

    /// A NaN value is served as `null`, the way the device reports an empty bucket.
    pub fn add_readings(&self, host: &str, measurement: &str, readings: &[(i64, f64)]) {
        let mut s = lock(&self.state);
        let series = s
            .readings
            .entry((host.to_string(), measurement.to_string()))
            .or_default();
        series.extend_from_slice(readings);
        series.sort_by_key(|(ts, _)| *ts);
    }

    pub fn fail_host(&self, host: &str) {
        lock(&self.state).failing.insert(host.to_string());
    }

    pub fn malformed_host(&self, host: &str) {
        lock(&self.state).malformed.insert(host.to_string());
    }

    pub fn requests(&self) -> Vec<DeviceRequest> {
        lock(&self.state).requests.clone()
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, IotaState> {
    state.lock().expect("fake iotawatt state poisoned")
}

fn selected_measurement(select: &str) -> Option<String> {
    select
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .nth(1)
        .map(|m| m.trim().to_string())
}

async fn device_query(
    State(state): State<Shared>,
    Path(host): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(measurement) = params.get("select").and_then(|s| selected_measurement(s)) else {
        return (StatusCode::BAD_REQUEST, "missing select").into_response();
    };
    let mut s = lock(&state);
    s.requests.push(DeviceRequest {
        host: host.clone(),
        measurement: measurement.clone(),
        params: params.clone(),
    });

    if s.failing.contains(&host) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "device offline").into_response();
    }
    if s.malformed.contains(&host) {
        return Json(json!({"unexpected": true})).into_response();
    }

    let Some(begin) = params.get("begin").and_then(|b| b.parse::<i64>().ok()) else {
        return (StatusCode::BAD_REQUEST, "bad begin").into_response();
    };
    let limit = params
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(1000);

    let rows: Vec<(i64, f64)> = s
        .readings
        .get(&(host, measurement.clone()))
        .map(|r| r.iter().copied().filter(|(ts, _)| *ts >= begin).collect())
        .unwrap_or_default();

    let page: Vec<_> = rows.iter().take(limit).map(|(ts, v)| json!([ts, v])).collect();
    let mut body = json!({
        "range": [begin, chrono::Utc::now().timestamp()],
        "labels": ["Time", measurement],
        "data": page,
    });
    if let Some((next, _)) = rows.get(limit) {
        body["limit"] = json!(next);
    }
    Json(body).into_response()
}
