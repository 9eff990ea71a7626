//! The access/refresh token pair
//!
//! An access token is never held without its refresh token: constructors
//! enforce the pairing, and clearing drops both together. A refresh token on
//! its own is allowed (e.g. restored after the access token was lost); the
//! first request then goes out unauthenticated and the 401 path refreshes it.

use common::Secret;
use tracing::warn;

/// Credentials for one signed-in client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    access_token: Option<Secret<String>>,
    refresh_token: Option<Secret<String>>,
}

impl Session {
    /// A signed-out session.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A signed-in session holding both tokens.
    pub fn new(access_token: impl Into<Secret<String>>, refresh_token: impl Into<Secret<String>>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Rebuild a session from independently persisted entries.
    ///
    /// An orphaned access token (no refresh token next to it) is dropped.
    pub fn from_parts(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        match (access_token, refresh_token) {
            (access, Some(refresh)) => Self {
                access_token: access.map(Secret::new),
                refresh_token: Some(Secret::new(refresh)),
            },
            (Some(_), None) => {
                warn!("discarding stored access token without a refresh token");
                Self::empty()
            }
            (None, None) => Self::empty(),
        }
    }

    pub fn access_token(&self) -> Option<&Secret<String>> {
        self.access_token.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&Secret<String>> {
        self.refresh_token.as_ref()
    }

    /// Both tokens present.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// Install a refreshed access token, keeping the current refresh token
    /// unless the server rotated it.
    ///
    /// No-op on a session without a refresh token, so the pairing invariant
    /// survives a refresh landing after logout.
    pub fn apply_refresh(&mut self, access_token: Secret<String>, rotated: Option<Secret<String>>) {
        if self.refresh_token.is_none() {
            return;
        }
        self.access_token = Some(access_token);
        if let Some(refresh) = rotated {
            self.refresh_token = Some(refresh);
        }
    }

    /// Drop both tokens.
    pub fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }
}
