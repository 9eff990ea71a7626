//! Mock Counsel API for gateway tests.
//!
//! Routes live under `/api/v1` like the real API. Protected routes accept only
//! `Bearer <valid access token>`; `/auth/refresh` accepts only
//! `MockApi::REFRESH_TOKEN` and rotates the valid access token to
//! `MockApi::FRESH_TOKEN`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub struct MockState {
    valid_access: Mutex<String>,
    refresh_calls: AtomicUsize,
    refresh_delay_ms: AtomicU64,
    refresh_fails: AtomicBool,
    always_unauthorized_hits: AtomicUsize,
    authorizations: Mutex<Vec<Option<String>>>,
}

impl MockState {
    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let valid = format!("Bearer {}", self.valid_access.lock().unwrap());
        let ok = presented.as_deref() == Some(valid.as_str());
        self.authorizations.lock().unwrap().push(presented);
        ok
    }
}

pub struct MockApi {
    pub base_url: String,
    pub state: Arc<MockState>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockApi {
    pub const VALID_TOKEN: &'static str = "at_valid";
    pub const FRESH_TOKEN: &'static str = "at_fresh";
    pub const REFRESH_TOKEN: &'static str = "rt_valid";

    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            valid_access: Mutex::new(Self::VALID_TOKEN.to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay_ms: AtomicU64::new(0),
            refresh_fails: AtomicBool::new(false),
            always_unauthorized_hits: AtomicUsize::new(0),
            authorizations: Mutex::new(Vec::new()),
        });

        let api = Router::new()
            .route("/auth/refresh", post(refresh))
            .route("/cases", get(list_cases))
            .route("/cases/{id}", delete(delete_case))
            .route("/contracts", post(create_contract))
            .route("/search", get(search))
            .route("/always-401", get(always_unauthorized));
        let app = Router::new()
            .nest("/api/v1", api)
            .fallback(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({"message": "Case not found", "statusCode": 404})),
                )
            })
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api/v1"),
            state,
            _server: server,
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn always_unauthorized_hits(&self) -> usize {
        self.state.always_unauthorized_hits.load(Ordering::SeqCst)
    }

    /// Authorization headers seen by protected routes, in arrival order.
    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.state.authorizations.lock().unwrap().clone()
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state
            .refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self) {
        self.state.refresh_fails.store(true, Ordering::SeqCst);
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Unauthorized", "statusCode": 401})),
    )
        .into_response()
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.refresh_fails.load(Ordering::SeqCst)
        || body["refresh_token"] != MockApi::REFRESH_TOKEN
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid refresh token"})),
        )
            .into_response();
    }

    *state.valid_access.lock().unwrap() = MockApi::FRESH_TOKEN.to_string();
    Json(json!({"access_token": MockApi::FRESH_TOKEN, "expires_in": 900})).into_response()
}

async fn list_cases(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": [{"id": "case_1", "title": "Lease dispute"}], "total": 1}))
        .into_response()
}

async fn delete_case(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn create_contract(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    match body.get("title").and_then(Value::as_str) {
        Some(title) if !title.is_empty() => (
            StatusCode::CREATED,
            Json(json!({"id": "contract_1", "title": title})),
        )
            .into_response(),
        _ => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": ["title should not be empty", "title must be a string"],
                "error": "Unprocessable Entity"
            })),
        )
            .into_response(),
    }
}

async fn search(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Json(json!(params)).into_response()
}

async fn always_unauthorized(State(state): State<Arc<MockState>>) -> Response {
    state.always_unauthorized_hits.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}
