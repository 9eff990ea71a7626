//! Error types for session credential operations

/// Errors from token exchange and session persistence.
///
/// `Clone` so a single refresh failure can be handed to every request that
/// was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("refresh token rejected: {0}")]
    InvalidCredentials(String),

    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("session store parse error: {0}")]
    StoreParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
