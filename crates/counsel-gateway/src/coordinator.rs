//! Single-flight token refresh
//!
//! At most one refresh exchange is in flight per session. The first caller
//! that needs a refresh while the coordinator is `Idle` becomes the leader:
//! it moves the state to `Refreshing` and spawns the exchange. Callers that
//! arrive while `Refreshing` are followers and subscribe to the same outcome.
//! The check and the transition happen under one lock, so two callers can
//! never both see `Idle` and both start an exchange.
//!
//! The outcome is broadcast on a `watch` channel: every waiter receives the
//! same new token, or a clone of the same error. The exchange runs in its own
//! task, so dropping the leader's future does not strand the followers.
//!
//! State transitions:
//! - Idle → Refreshing (leader starts the exchange)
//! - Refreshing → Refreshing (follower joins)
//! - Refreshing → Idle (exchange finished, timed out, or its task died)

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use counsel_auth::RefreshResponse;
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::session::SessionHandle;

/// Outcome shared by the leader and every follower of one refresh.
type Outcome = Result<Secret<String>>;

/// Performs the refresh-token exchange.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenRefresher>`).
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = counsel_auth::Result<RefreshResponse>> + Send + 'a>>;
}

/// Refresh against the API's `/auth/refresh` endpoint.
pub struct HttpRefresher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRefresher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl TokenRefresher for HttpRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = counsel_auth::Result<RefreshResponse>> + Send + 'a>> {
        Box::pin(counsel_auth::refresh_access_token(
            &self.client,
            &self.base_url,
            refresh_token,
        ))
    }
}

enum RefreshState {
    Idle,
    Refreshing {
        outcome: watch::Receiver<Option<Outcome>>,
        followers: usize,
    },
}

/// Coordinates refreshes for one session.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    session: Arc<SessionHandle>,
    refresher: Arc<dyn TokenRefresher>,
    timeout: Option<Duration>,
}

impl RefreshCoordinator {
    /// `timeout` bounds each exchange; on expiry every waiter gets
    /// `Error::RefreshTimeout` and the session is cleared.
    pub fn new(
        session: Arc<SessionHandle>,
        refresher: Arc<dyn TokenRefresher>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            session,
            refresher,
            timeout,
        }
    }

    /// Get a usable access token after a request sent with `sent_with` was
    /// rejected.
    ///
    /// Joins the in-flight refresh if there is one. Otherwise, if the session
    /// already holds a different access token (a refresh finished after that
    /// request went out), returns it without a network call. Otherwise starts
    /// a refresh as leader.
    pub async fn acquire(self: &Arc<Self>, sent_with: Option<&Secret<String>>) -> Result<Secret<String>> {
        let receiver = {
            let mut state = self.state.lock().await;
            if let RefreshState::Refreshing { outcome, followers } = &mut *state {
                *followers += 1;
                debug!(followers = *followers, "joining in-flight token refresh");
                outcome.clone()
            } else {
                let session = self.session.snapshot().await;
                if let Some(current) = session.access_token()
                    && Some(current) != sent_with
                {
                    debug!("access token already refreshed, reusing it");
                    return Ok(current.clone());
                }
                let Some(refresh_token) = session.refresh_token().cloned() else {
                    return Err(counsel_auth::Error::MissingRefreshToken.into());
                };

                let (sender, receiver) = watch::channel(None);
                *state = RefreshState::Refreshing {
                    outcome: receiver.clone(),
                    followers: 0,
                };
                info!("starting token refresh");
                tokio::spawn(
                    Arc::clone(self)
                        .run_exchange(refresh_token, sender)
                        .instrument(info_span!("token_refresh")),
                );
                receiver
            }
        };

        self.wait(receiver).await
    }

    /// Force a refresh with the current refresh token, or join the one in
    /// flight.
    pub async fn refresh_now(self: &Arc<Self>) -> Result<Secret<String>> {
        let current = self.session.access_token().await;
        self.acquire(current.as_ref()).await
    }

    /// Followers waiting on the in-flight refresh, `None` when idle.
    pub async fn followers(&self) -> Option<usize> {
        match &*self.state.lock().await {
            RefreshState::Idle => None,
            RefreshState::Refreshing { followers, .. } => Some(*followers),
        }
    }

    async fn wait(&self, mut receiver: watch::Receiver<Option<Outcome>>) -> Outcome {
        let published = match receiver.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        match published {
            Some(outcome) => outcome,
            None => {
                warn!("token refresh task ended without publishing a result");
                self.reset_abandoned(&receiver).await;
                Err(Error::RefreshAborted)
            }
        }
    }

    /// Return to `Idle` if the state still points at the abandoned channel.
    async fn reset_abandoned(&self, receiver: &watch::Receiver<Option<Outcome>>) {
        let mut state = self.state.lock().await;
        if let RefreshState::Refreshing { outcome, .. } = &*state
            && outcome.same_channel(receiver)
        {
            *state = RefreshState::Idle;
        }
    }

    /// Leader side: run the exchange to completion, update the session, then
    /// go back to `Idle` and publish the outcome to every waiter.
    async fn run_exchange(
        self: Arc<Self>,
        refresh_token: Secret<String>,
        sender: watch::Sender<Option<Outcome>>,
    ) {
        let exchange = self.refresher.refresh(refresh_token.expose_str());
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result.map_err(Error::from),
                Err(_) => Err(Error::RefreshTimeout(limit)),
            },
            None => exchange.await.map_err(Error::from),
        };

        let outcome = match result {
            Ok(response) => {
                info!(expires_in = response.expires_in, "token refresh succeeded");
                metrics::record_refresh("success");
                let access = response.access_token;
                self.session
                    .apply_refresh(&refresh_token, access.clone(), response.refresh_token)
                    .await;
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing session");
                metrics::record_refresh(match e {
                    Error::RefreshTimeout(_) => "timeout",
                    _ => "failure",
                });
                self.session.clear_if_current(&refresh_token).await;
                Err(e)
            }
        };

        let mut state = self.state.lock().await;
        let followers = match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Refreshing { followers, .. } => followers,
            RefreshState::Idle => 0,
        };
        metrics::record_followers(followers);
        debug!(followers, "publishing token refresh outcome");
        sender.send_replace(Some(outcome));
    }
}
