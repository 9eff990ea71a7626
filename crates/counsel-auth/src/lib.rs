//! Counsel session credentials
//!
//! Holds the access/refresh token pair, persists it across restarts, and
//! performs the `/auth/refresh` exchange. This crate knows nothing about
//! request retries or concurrency; the gateway crate builds the single-flight
//! refresh protocol on top of it.
//!
//! Credential flow:
//! 1. Login response tokens stored via `store::SessionStore::save()`
//! 2. Client construction restores them with `store::SessionStore::load()`
//! 3. A 401 makes the gateway call `token::refresh_access_token()`
//! 4. The new access token is saved, or `store::SessionStore::clear()` runs on failure

pub mod constants;
pub mod error;
pub mod session;
pub mod store;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use session::Session;
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStore};
pub use token::{RefreshResponse, refresh_access_token};
