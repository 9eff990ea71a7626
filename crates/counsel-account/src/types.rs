//! Account request and response bodies
//!
//! Field names follow the API: token fields are snake_case, profile fields
//! camelCase. Passwords are held in `Secret` and only exposed while the body
//! is serialized.

use common::Secret;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    User,
}

/// Signed-in user profile.
///
/// Only the fields the client acts on are typed; everything else the API
/// returns (wallet, timestamps, demographics) is kept in `extra` so the cached
/// copy round-trips without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_email_verified: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

fn expose<S: Serializer>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_str())
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(serialize_with = "expose")]
    pub password: Secret<String>,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<Secret<String>>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    #[serde(serialize_with = "expose")]
    pub password: Secret<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Login response: the token pair plus the user it belongs to.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationResponse {
    pub message: String,
    pub can_login: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevokeAllResponse {
    pub message: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub user: Option<User>,
    /// Expiry as a unix timestamp in seconds
    #[serde(default)]
    pub exp: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_response_debug_hides_tokens() {
        let raw = r#"{"access_token":"at_SECRET","refresh_token":"rt_SECRET","expires_in":900,"user":{"id":"u_1","email":"a@b.c","role":"USER"}}"#;
        let response: AuthResponse = serde_json::from_str(raw).unwrap();
        assert!(response.access_token.matches("at_SECRET"));
        assert!(response.refresh_token.matches("rt_SECRET"));

        let debug = format!("{response:?}");
        assert!(!debug.contains("at_SECRET"));
        assert!(!debug.contains("rt_SECRET"));
        assert!(debug.contains("u_1"));
    }

    #[test]
    fn user_keeps_unknown_fields() {
        let raw = json!({
            "id": "u_1",
            "email": "ada@example.com",
            "role": "USER",
            "firstName": "Ada",
            "isEmailVerified": true,
            "wallet": {"balance": 10},
            "createdAt": "2025-01-01T00:00:00Z"
        });
        let user: User = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.first_name.as_deref(), Some("Ada"));
        assert_eq!(user.is_email_verified, Some(true));
        assert_eq!(user.extra["wallet"]["balance"], 10);
        assert_eq!(serde_json::to_value(&user).unwrap(), raw);
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let mut user: User = serde_json::from_value(json!({
            "id": "u_1", "email": "ada@example.com", "role": "ADMIN"
        }))
        .unwrap();
        assert_eq!(user.display_name(), "ada@example.com");
        user.first_name = Some("Ada".into());
        assert_eq!(user.display_name(), "Ada");
        user.last_name = Some("Lovelace".into());
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn password_is_sent_but_never_debug_printed() {
        let login = LoginRequest::new("ada@example.com", "hunter2");
        assert_eq!(
            serde_json::to_value(&login).unwrap(),
            json!({"email": "ada@example.com", "password": "hunter2"})
        );
        assert!(!format!("{login:?}").contains("hunter2"));
    }

    #[test]
    fn register_uses_camel_case() {
        let register = RegisterRequest {
            email: "ada@example.com".into(),
            password: Secret::from("hunter2"),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            role: None,
        };
        let body = serde_json::to_value(&register).unwrap();
        assert_eq!(body["firstName"], "Ada");
        assert_eq!(body["lastName"], "Lovelace");
        assert!(body.get("role").is_none());
    }
}
