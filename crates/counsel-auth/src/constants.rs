//! Endpoint paths and persisted key names
//!
//! Paths are relative to the API base URL handed to the gateway at
//! construction (e.g. `http://localhost:3001/api/v1`).

/// Token refresh endpoint. Body `{ "refresh_token": ... }`.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Store key for the current access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Store key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Store key for the cached user profile. Owned by the account layer; session
/// load/save/clear never touch it.
pub const USER_DATA_KEY: &str = "user_data";
