//! Error types raised to gateway callers

use std::time::Duration;

/// Errors from gateway requests.
///
/// `Clone` because one refresh outcome is fanned out to every waiting
/// request; each receives an identical copy of the same error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The request could not be sent or no response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status. `message` comes from the JSON error body, or is
    /// `HTTP <status>` when the body has none.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The refresh exchange failed, or there was no refresh token to use.
    #[error(transparent)]
    Auth(#[from] counsel_auth::Error),

    #[error("token refresh timed out after {0:?}")]
    RefreshTimeout(Duration),

    #[error("token refresh ended without a result")]
    RefreshAborted,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl Error {
    /// HTTP status of the failed response, if the error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the caller should treat the session as over and send the user
    /// back to sign-in: a failed or timed-out refresh, or a 401 the refresh
    /// path could not recover.
    pub fn is_session_ended(&self) -> bool {
        matches!(
            self,
            Error::Auth(_)
                | Error::RefreshTimeout(_)
                | Error::RefreshAborted
                | Error::Http { status: 401, .. }
        )
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_server_message() {
        let err = Error::Http {
            status: 422,
            message: "title is required".into(),
        };
        assert_eq!(err.to_string(), "title is required");
        assert_eq!(err.status(), Some(422));
        assert!(!err.is_session_ended());
    }

    #[test]
    fn refresh_errors_pass_through_verbatim() {
        let inner = counsel_auth::Error::Refresh("refresh endpoint returned 400".into());
        let err = Error::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert!(err.is_session_ended());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn terminal_unauthorized_ends_session() {
        let err = Error::Http {
            status: 401,
            message: "HTTP 401".into(),
        };
        assert!(err.is_session_ended());

        let forbidden = Error::Http {
            status: 403,
            message: "forbidden".into(),
        };
        assert!(!forbidden.is_session_ended());
    }

    #[test]
    fn timeout_mentions_duration() {
        let err = Error::RefreshTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "token refresh timed out after 30s");
        assert!(err.is_session_ended());
    }
}
