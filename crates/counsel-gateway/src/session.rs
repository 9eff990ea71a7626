//! Shared session handle
//!
//! One `SessionHandle` exists per client. It is created by the composition
//! root and shared by `Arc` with the gateway and the refresh coordinator.
//! Reads are cheap clones of the current tokens; writes come only from login
//! (`set_tokens`), refresh completion, and logout (`clear`).

use common::Secret;
use counsel_auth::{Session, SessionStore};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory session plus its persistence.
///
/// Writes hold the lock through persistence so the on-disk order of updates
/// matches the in-memory order.
pub struct SessionHandle {
    session: RwLock<Session>,
    store: SessionStore,
}

impl SessionHandle {
    /// Restore the session persisted in `store`.
    pub async fn load(store: SessionStore) -> Self {
        let session = store.load().await;
        info!(
            authenticated = session.is_authenticated(),
            "session restored"
        );
        Self::new(session, store)
    }

    pub fn new(session: Session, store: SessionStore) -> Self {
        Self {
            session: RwLock::new(session),
            store,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.session.read().await.access_token().cloned()
    }

    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.session.read().await.refresh_token().cloned()
    }

    pub async fn has_refresh_token(&self) -> bool {
        self.session.read().await.refresh_token().is_some()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_authenticated()
    }

    /// Install a freshly issued token pair (login) and persist it.
    pub async fn set_tokens(&self, access_token: Secret<String>, refresh_token: Secret<String>) {
        let mut session = self.session.write().await;
        self.store.save(&access_token, &refresh_token).await;
        *session = Session::new(access_token, refresh_token);
        debug!("session tokens set");
    }

    /// Install a refreshed access token if the session still holds the
    /// refresh token the exchange was made with. Returns whether it applied.
    pub async fn apply_refresh(
        &self,
        exchanged_with: &Secret<String>,
        access_token: Secret<String>,
        rotated: Option<Secret<String>>,
    ) -> bool {
        let mut session = self.session.write().await;
        if session.refresh_token() != Some(exchanged_with) {
            debug!("session changed during refresh, discarding refreshed token");
            return false;
        }
        session.apply_refresh(access_token, rotated);
        if let (Some(access), Some(refresh)) = (session.access_token(), session.refresh_token()) {
            self.store.save(access, refresh).await;
        }
        true
    }

    /// Drop both tokens and wipe them from the store.
    pub async fn clear(&self) {
        let mut session = self.session.write().await;
        session.clear();
        self.store.clear().await;
        debug!("session cleared");
    }

    /// Clear only if the session still holds `refresh_token`, so a failed
    /// refresh cannot wipe out a login that happened while it was in flight.
    /// Returns whether it cleared.
    pub async fn clear_if_current(&self, refresh_token: &Secret<String>) -> bool {
        let mut session = self.session.write().await;
        if session.refresh_token() != Some(refresh_token) {
            debug!("session changed during refresh, keeping it");
            return false;
        }
        session.clear();
        self.store.clear().await;
        debug!("session cleared after failed refresh");
        true
    }
}
