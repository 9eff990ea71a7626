//! Access token refresh
//!
//! POSTs the refresh token to `{base_url}/auth/refresh` and returns the new
//! access token. The API does not rotate refresh tokens; a `refresh_token`
//! field in the response is honoured if the server ever starts sending one.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::constants::REFRESH_PATH;
use crate::error::{Error, Result};

/// Response from the refresh endpoint.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access_token: Secret<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    /// Present only if the server rotated the refresh token
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Exchange a refresh token for a new access token.
///
/// Any non-success status is a refresh failure; 401/403 mean the refresh
/// token itself was revoked or expired.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<RefreshResponse> {
    let url = format!("{}{REFRESH_PATH}", base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&RefreshRequest {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::Refresh(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<RefreshResponse>()
        .await
        .map_err(|e| Error::Refresh(format!("invalid refresh response: {e}")))
}
