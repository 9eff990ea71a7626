//! Gateway client
//!
//! The single entry point collaborators use to talk to the Counsel API. Each
//! call sends the request with the current access token, and on a 401 with a
//! refresh token available obtains a new token from the refresh coordinator
//! and resends once. Everything else surfaces as a typed `Error`.
//!
//! The client is cheap to clone; clones share the session and coordinator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Secret;
use counsel_auth::SessionStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::coordinator::{HttpRefresher, RefreshCoordinator, TokenRefresher};
use crate::error::{Error, Result};
use crate::metrics;
use crate::request::RequestDescriptor;
use crate::response::RawResponse;
use crate::retry::{RetryPolicy, Step};
use crate::session::SessionHandle;

/// Default per-request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on one refresh exchange
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a `GatewayClient`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API root, e.g. `http://localhost:3001/api/v1`. Paths are appended to it.
    pub base_url: String,
    pub request_timeout: Duration,
    /// `None` lets a refresh wait as long as the HTTP client allows.
    pub refresh_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_timeout: Some(DEFAULT_REFRESH_TIMEOUT),
            retry: RetryPolicy::default(),
        }
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    session: Arc<SessionHandle>,
    coordinator: Arc<RefreshCoordinator>,
}

/// Authenticated client for the Counsel API.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl GatewayClient {
    /// Restore the session from `store` and wire an HTTP refresher against
    /// the same base URL.
    pub async fn new(config: GatewayConfig, store: SessionStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("building http client: {e}")))?;
        let session = Arc::new(SessionHandle::load(store).await);
        let refresher = Arc::new(HttpRefresher::new(http.clone(), config.base_url.clone()));
        Ok(Self::with_parts(config, http, session, refresher))
    }

    /// Assemble a client from explicit parts.
    pub fn with_parts(
        config: GatewayConfig,
        http: reqwest::Client,
        session: Arc<SessionHandle>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            session.clone(),
            refresher,
            config.refresh_timeout,
        ));
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.base_url,
                retry: config.retry,
                session,
                coordinator,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.inner.session
    }

    pub fn store(&self) -> &SessionStore {
        self.inner.session.store()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(RequestDescriptor::get(path).query(query)?).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(RequestDescriptor::post(path).json(body)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(RequestDescriptor::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(RequestDescriptor::delete(path)).await
    }

    /// Send `request`, refreshing and resending on an expired access token.
    pub async fn send<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        let span = info_span!(
            "gateway_request",
            %request_id,
            method = %request.method(),
            path = request.path(),
        );
        self.execute(request).instrument(span).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        let mut token = self.inner.session.access_token().await;
        let mut retries_used = 0;
        loop {
            let response = self.attempt(&request, token.as_ref()).await?;
            let has_refresh_token = self.inner.session.has_refresh_token().await;
            match self
                .inner
                .retry
                .next_step(response.status, retries_used, has_refresh_token)
            {
                Step::Accept => return response.decode(),
                Step::Refresh => {
                    info!("access token rejected, refreshing");
                    let fresh = self.inner.coordinator.acquire(token.as_ref()).await?;
                    token = Some(fresh);
                    retries_used += 1;
                }
                Step::Reject => {
                    let err = response.into_error();
                    if err.is_session_ended() {
                        warn!(error = %err, "request unauthorized, session cannot be recovered");
                    } else {
                        debug!(error = %err, "request failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &RequestDescriptor,
        token: Option<&Secret<String>>,
    ) -> Result<RawResponse> {
        let wire = request.build(&self.inner.base_url, token.map(Secret::expose_str))?;
        let method = wire.method.clone();
        let started = Instant::now();

        let response = wire
            .into_reqwest(&self.inner.http)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "request failed to send");
                Error::Transport(e.to_string())
            })?;
        let raw = RawResponse::read(response).await?;

        metrics::record_response(method.as_str(), raw.status.as_u16());
        debug!(
            status = raw.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            authorized = token.is_some(),
            "response received"
        );
        Ok(raw)
    }

    /// Install tokens from a login response.
    pub async fn set_tokens(
        &self,
        access_token: impl Into<Secret<String>>,
        refresh_token: impl Into<Secret<String>>,
    ) {
        self.inner
            .session
            .set_tokens(access_token.into(), refresh_token.into())
            .await;
    }

    /// Drop the session and its persisted tokens.
    pub async fn clear_session(&self) {
        self.inner.session.clear().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated().await
    }

    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.inner.session.refresh_token().await
    }

    /// Refresh now. Shares the exchange with any refresh already in flight.
    pub async fn refresh_session(&self) -> Result<Secret<String>> {
        self.inner.coordinator.refresh_now().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockApi;
    use counsel_auth::{FileStore, Session};
    use serde_json::{Value, json};

    async fn client_with(api: &MockApi, access: Option<&str>, refresh: Option<&str>) -> GatewayClient {
        let store = SessionStore::in_memory();
        if let (Some(access), Some(refresh)) = (access, refresh) {
            store.save(&Secret::from(access), &Secret::from(refresh)).await;
        } else if let Some(refresh) = refresh {
            store
                .backend()
                .set(&[(counsel_auth::REFRESH_TOKEN_KEY, refresh)])
                .await
                .unwrap();
        }
        GatewayClient::new(GatewayConfig::new(api.base_url.clone()), store)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn valid_token_needs_no_refresh() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        let cases: Value = client.get("/cases").await.unwrap();
        assert_eq!(cases["total"], 1);
        assert_eq!(api.refresh_calls(), 0);
        assert_eq!(
            api.authorizations(),
            vec![Some(format!("Bearer {}", MockApi::VALID_TOKEN))]
        );
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_request_resent() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some("at_expired"), Some(MockApi::REFRESH_TOKEN)).await;

        let cases: Value = client.get("/cases").await.unwrap();
        assert_eq!(cases["data"][0]["id"], "case_1");
        assert_eq!(api.refresh_calls(), 1);
        assert_eq!(
            api.authorizations(),
            vec![
                Some("Bearer at_expired".to_string()),
                Some(format!("Bearer {}", MockApi::FRESH_TOKEN)),
            ]
        );
        assert_eq!(
            client.store().load().await,
            Session::new(MockApi::FRESH_TOKEN, MockApi::REFRESH_TOKEN)
        );
    }

    #[tokio::test]
    async fn concurrent_expired_requests_refresh_once() {
        let api = MockApi::start().await;
        api.set_refresh_delay(Duration::from_millis(100));
        let client = client_with(&api, Some("at_expired"), Some(MockApi::REFRESH_TOKEN)).await;

        let calls = (0..10).map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get::<Value>("/cases").await })
        });
        let calls: Vec<_> = calls.collect();
        for call in calls {
            let cases = call.await.unwrap().unwrap();
            assert_eq!(cases["total"], 1);
        }
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn second_unauthorized_is_not_retried_again() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        let err = client.get::<Value>("/always-401").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.is_session_ended());
        assert_eq!(api.always_unauthorized_hits(), 2);
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_clears_session() {
        let api = MockApi::start().await;
        api.fail_refresh();
        let client = client_with(&api, Some("at_expired"), Some(MockApi::REFRESH_TOKEN)).await;

        let err = client.get::<Value>("/cases").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(counsel_auth::Error::InvalidCredentials(_))
        ));
        assert!(err.is_session_ended());
        assert!(!client.is_authenticated().await);
        assert!(client.refresh_token().await.is_none());
        assert_eq!(client.store().load().await, Session::empty());

        // The next call goes out without a bearer and does not refresh again
        let err = client.get::<Value>("/cases").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(api.authorizations().last(), Some(&None));
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_token_is_final() {
        let api = MockApi::start().await;
        let client = client_with(&api, None, None).await;

        let err = client.get::<Value>("/cases").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "Unauthorized");
        assert_eq!(api.refresh_calls(), 0);
        assert_eq!(api.authorizations(), vec![None]);
    }

    #[tokio::test]
    async fn lone_refresh_token_recovers_session() {
        let api = MockApi::start().await;
        let client = client_with(&api, None, Some(MockApi::REFRESH_TOKEN)).await;

        let cases: Value = client.get("/cases").await.unwrap();
        assert_eq!(cases["total"], 1);
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn ordinary_errors_carry_server_message() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        let err = client.get::<Value>("/cases/unknown/notes").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Case not found");
        assert!(!err.is_session_ended());

        let err = client
            .post::<Value, _>("/contracts", &json!({"title": ""}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert_eq!(
            err.to_string(),
            "title should not be empty, title must be a string"
        );
        assert_eq!(api.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        let created: Value = client
            .post("/contracts", &json!({"title": "NDA"}))
            .await
            .unwrap();
        assert_eq!(created, json!({"id": "contract_1", "title": "NDA"}));
    }

    #[tokio::test]
    async fn no_content_decodes_as_unit() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        client.delete::<()>("/cases/case_1").await.unwrap();
    }

    #[tokio::test]
    async fn query_parameters_reach_server() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        let echoed: Value = client
            .get_with_query("/search", &json!({"q": "lease & rent", "page": 2, "archived": null}))
            .await
            .unwrap();
        assert_eq!(echoed, json!({"q": "lease & rent", "page": "2"}));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GatewayClient::new(
            GatewayConfig::new(format!("http://{addr}/api/v1")),
            SessionStore::in_memory(),
        )
        .await
        .unwrap();
        let err = client.get::<Value>("/cases").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn explicit_refresh_updates_session() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        let token = client.refresh_session().await.unwrap();
        assert!(token.matches(MockApi::FRESH_TOKEN));
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let api = MockApi::start().await;

        let store = SessionStore::new(Arc::new(FileStore::open(path.clone()).await.unwrap()));
        let client = GatewayClient::new(GatewayConfig::new(api.base_url.clone()), store)
            .await
            .unwrap();
        assert!(!client.is_authenticated().await);
        client
            .set_tokens("at_expired", MockApi::REFRESH_TOKEN)
            .await;
        let _: Value = client.get("/cases").await.unwrap();
        drop(client);

        let store = SessionStore::new(Arc::new(FileStore::open(path).await.unwrap()));
        let reopened = GatewayClient::new(GatewayConfig::new(api.base_url.clone()), store)
            .await
            .unwrap();
        let access = reopened.session().access_token().await.unwrap();
        assert!(access.matches(MockApi::FRESH_TOKEN));
        let _: Value = reopened.get("/cases").await.unwrap();
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn clear_session_signs_out() {
        let api = MockApi::start().await;
        let client = client_with(&api, Some(MockApi::VALID_TOKEN), Some(MockApi::REFRESH_TOKEN)).await;

        client.clear_session().await;
        assert!(!client.is_authenticated().await);
        let err = client.get::<Value>("/cases").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(api.refresh_calls(), 0);
    }
}
