//! Account endpoints
//!
//! Every call goes through the gateway client, so account requests get the
//! same bearer handling and refresh-on-401 as the rest of the API.

use common::Secret;
use counsel_auth::USER_DATA_KEY;
use counsel_gateway::GatewayClient;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::Result;
use crate::types::{
    AuthResponse, EmailVerificationResponse, LoginRequest, MessageResponse, RegisterRequest,
    RegisterResponse, RevokeAllResponse, TokenValidation, User,
};

#[derive(Serialize)]
struct TokenBody<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct EmailBody<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetPasswordBody<'a> {
    token: &'a str,
    password: &'a str,
}

/// Account operations for the session held by `gateway`.
#[derive(Clone)]
pub struct AccountApi {
    gateway: GatewayClient,
}

impl AccountApi {
    pub fn new(gateway: GatewayClient) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Sign in and install the issued token pair. The profile cache is
    /// best-effort: a failed write is logged and the login still succeeds.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse> {
        let response: AuthResponse = self.gateway.post("/auth/login", credentials).await?;
        self.gateway
            .set_tokens(
                response.access_token.clone(),
                response.refresh_token.clone(),
            )
            .await;
        self.cache_user(&response.user).await;
        info!(user_id = %response.user.id, "signed in");
        Ok(response)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        self.gateway.post("/auth/register", request).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<EmailVerificationResponse> {
        self.gateway
            .post("/auth/verify-email", &TokenBody { token })
            .await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<MessageResponse> {
        self.gateway
            .post("/auth/resend-verification", &EmailBody { email })
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse> {
        self.gateway
            .post("/auth/forgot-password", &EmailBody { email })
            .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        password: &Secret<String>,
    ) -> Result<MessageResponse> {
        let body = ResetPasswordBody {
            token,
            password: password.expose_str(),
        };
        self.gateway.post("/auth/reset-password", &body).await
    }

    /// Fetch the signed-in user's profile and refresh the cached copy.
    pub async fn profile(&self) -> Result<User> {
        let user: User = self.gateway.get("/auth/profile").await?;
        self.cache_user(&user).await;
        Ok(user)
    }

    /// Sign out on the server, then locally. The local session and profile
    /// cache are cleared whether or not the server call succeeded.
    pub async fn logout(&self, refresh_token: Option<Secret<String>>) -> Result<MessageResponse> {
        let token = match refresh_token {
            Some(token) => Some(token),
            None => self.gateway.refresh_token().await,
        };
        let body = match &token {
            Some(token) => json!({ "refresh_token": token.expose_str() }),
            None => json!({}),
        };

        let result = self.gateway.post("/auth/logout", &body).await;
        if let Err(e) = &result {
            warn!(error = %e, "server logout failed, clearing local session anyway");
        }
        self.sign_out_locally().await;
        result
    }

    /// Refresh the access token now. Shares the exchange with any refresh
    /// already triggered by a 401.
    pub async fn refresh(&self) -> Result<Secret<String>> {
        self.gateway.refresh_session().await
    }

    pub async fn validate_token(&self, token: &str) -> Result<TokenValidation> {
        self.gateway
            .post("/auth/validate-token", &TokenBody { token })
            .await
    }

    /// The token travels as one path segment, so it is percent-encoded.
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<MessageResponse> {
        self.gateway
            .delete(&format!(
                "/auth/revoke-token/{}",
                urlencoding::encode(token)
            ))
            .await
    }

    /// Revoke every refresh token for the account, then sign out locally.
    pub async fn revoke_all_tokens(&self) -> Result<RevokeAllResponse> {
        let response: RevokeAllResponse = self.gateway.delete("/auth/revoke-all-tokens").await?;
        info!(count = response.count, "revoked all refresh tokens");
        self.sign_out_locally().await;
        Ok(response)
    }

    /// The cached profile, if one was stored and still parses.
    pub async fn current_user(&self) -> Option<User> {
        let raw = match self.gateway.store().backend().get(USER_DATA_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                error!(error = %e, "failed to read cached user");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "cached user is not valid JSON, ignoring it");
                None
            }
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.gateway.is_authenticated().await
    }

    pub async fn is_email_verified(&self) -> bool {
        self.current_user()
            .await
            .and_then(|user| user.is_email_verified)
            .unwrap_or(false)
    }

    async fn cache_user(&self, user: &User) {
        let raw = match serde_json::to_string(user) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "failed to encode user for cache");
                return;
            }
        };
        if let Err(e) = self
            .gateway
            .store()
            .backend()
            .set(&[(USER_DATA_KEY, raw.as_str())])
            .await
        {
            error!(error = %e, "failed to cache user");
        }
    }

    async fn sign_out_locally(&self) {
        self.gateway.clear_session().await;
        if let Err(e) = self.gateway.store().backend().remove(&[USER_DATA_KEY]).await {
            error!(error = %e, "failed to clear cached user");
        }
    }
}
