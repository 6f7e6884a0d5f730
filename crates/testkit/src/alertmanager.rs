use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use wattsync_core::model::silence::{PostableSilence, Silence, SilenceStatus};

#[derive(Default)]
struct AmState {
    silences: Vec<Silence>,
    deleted: Vec<String>,
    reject_creates: bool,
    fail_list: bool,
    failing_deletes: HashSet<String>,
}

type Shared = Arc<Mutex<AmState>>;

/// Alertmanager v2 silence endpoints backed by a vector.
#[derive(Clone)]
pub struct FakeAlertmanager {
    addr: SocketAddr,
    state: Shared,
}

impl FakeAlertmanager {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Shared::default();
        let router = Router::new()
            .route("/api/v2/silences", get(list).post(create))
            .route("/api/v2/silence/{id}", delete(remove))
            .with_state(state.clone());
        let addr = crate::serve(router).await?;
        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v2", self.addr)
    }

    pub fn seed(&self, silence: Silence) {
        lock(&self.state).silences.push(silence);
    }

    pub fn silences(&self) -> Vec<Silence> {
        lock(&self.state).silences.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        lock(&self.state).deleted.clone()
    }

    pub fn reject_creates(&self, reject: bool) {
        lock(&self.state).reject_creates = reject;
    }

    pub fn fail_list(&self, fail: bool) {
        lock(&self.state).fail_list = fail;
    }

    pub fn fail_delete(&self, id: &str) {
        lock(&self.state).failing_deletes.insert(id.to_string());
    }
}

fn lock(state: &Shared) -> MutexGuard<'_, AmState> {
    state.lock().expect("fake alertmanager state poisoned")
}

async fn list(State(state): State<Shared>) -> Response {
    let s = lock(&state);
    if s.fail_list {
        return (StatusCode::SERVICE_UNAVAILABLE, "listing unavailable").into_response();
    }
    Json(s.silences.clone()).into_response()
}

async fn create(State(state): State<Shared>, Json(body): Json<PostableSilence>) -> Response {
    let mut s = lock(&state);
    if s.reject_creates {
        return (StatusCode::BAD_REQUEST, "silence rejected").into_response();
    }
    let id = uuid::Uuid::new_v4().to_string();
    s.silences.push(Silence {
        id: id.clone(),
        matchers: body.matchers,
        status: SilenceStatus {
            state: "active".to_string(),
        },
        comment: body.comment,
        created_by: body.created_by,
        starts_at: Some(body.starts_at),
        ends_at: Some(body.ends_at),
        updated_at: Some(Utc::now()),
    });
    Json(json!({"silenceID": id})).into_response()
}

async fn remove(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    let mut s = lock(&state);
    if s.failing_deletes.contains(&id) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let Some(silence) = s.silences.iter_mut().find(|x| x.id == id) else {
        return StatusCode::NOT_FOUND;
    };
    silence.status.state = "expired".to_string();
    s.deleted.push(id);
    StatusCode::OK
}
