use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

/// One decoded `/api/v1/import` line.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImportRecord {
    pub metric: BTreeMap<String, String>,
    pub values: Vec<f64>,
    pub timestamps: Vec<i64>,
}

#[derive(Default)]
struct VictoriaState {
    imports: Vec<ImportRecord>,
    ranges: HashMap<String, Value>,
    queries: Vec<String>,
    fail_imports: bool,
}

type Shared = Arc<Mutex<VictoriaState>>;

/// Minimal VictoriaMetrics: import, `tlast_over_time` lookups and canned
/// `query_range` matrices.
#[derive(Clone)]
pub struct FakeVictoria {
    addr: SocketAddr,
    state: Shared,
}

impl FakeVictoria {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Shared::default();
        let router = Router::new()
            .route("/api/v1/import", post(import))
            .route("/api/v1/query", get(query))
            .route("/api/v1/query_range", get(query_range))
            .with_state(state.clone());
        let addr = crate::serve(router).await?;
        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn imports(&self) -> Vec<ImportRecord> {
        lock(&self.state).imports.clone()
    }

    /// Query strings received on `/api/v1/query` and `/api/v1/query_range`.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.state).queries.clone()
    }

    pub fn fail_imports(&self, fail: bool) {
        lock(&self.state).fail_imports = fail;
    }

    /// Stores points (unix seconds) as if they had been imported earlier.
    pub fn seed(&self, metric: &[(&str, &str)], points: &[(i64, f64)]) {
        lock(&self.state).imports.push(ImportRecord {
            metric: metric
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            values: points.iter().map(|(_, v)| *v).collect(),
            timestamps: points.iter().map(|(ts, _)| ts * 1000).collect(),
        });
    }

    pub fn seed_range(&self, query: &str, result: Value) {
        lock(&self.state).ranges.insert(query.to_string(), result);
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, VictoriaState> {
    state.lock().expect("fake victoria state poisoned")
}

async fn import(State(state): State<Shared>, body: String) -> StatusCode {
    let mut s = lock(&state);
    if s.fail_imports {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<ImportRecord>(line) {
            Ok(record) if record.values.len() == record.timestamps.len() => {
                s.imports.push(record);
            }
            _ => return StatusCode::BAD_REQUEST,
        }
    }
    StatusCode::NO_CONTENT
}

static SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_][a-zA-Z0-9_]*)="((?:[^"\\]|\\.)*)""#).expect("selector regex")
});

static METRIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z_][a-zA-Z0-9_]*)\{").expect("metric regex"));

fn selectors(query: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = SELECTOR
        .captures_iter(query)
        .map(|c| {
            let value = c[2].replace("\\\"", "\"").replace("\\\\", "\\");
            (c[1].to_string(), value)
        })
        .collect();
    if let Some(name) = METRIC.captures(query) {
        out.push(("__name__".to_string(), name[1].to_string()));
    }
    out
}

async fn query(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(q) = params.get("query") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "error": "missing query"})),
        )
            .into_response();
    };
    let wanted = selectors(q);
    let mut s = lock(&state);
    s.queries.push(q.clone());

    let newest = s
        .imports
        .iter()
        .filter(|r| wanted.iter().all(|(k, v)| r.metric.get(k) == Some(v)))
        .flat_map(|r| r.timestamps.iter().copied())
        .max();
    let now = chrono::Utc::now().timestamp();
    let result = match newest {
        Some(ms) => json!([{"metric": {}, "value": [now, (ms / 1000).to_string()]}]),
        None => json!([]),
    };
    Json(json!({"status": "success", "data": {"resultType": "vector", "result": result}}))
        .into_response()
}

async fn query_range(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(q) = params.get("query") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let mut s = lock(&state);
    s.queries.push(q.clone());
    let result = s.ranges.get(q).cloned().unwrap_or_else(|| json!([]));
    Json(json!({"status": "success", "data": {"resultType": "matrix", "result": result}}))
        .into_response()
}
