//! Authenticated API gateway client
//!
//! Attaches bearer credentials to every request, refreshes an expired access
//! token on 401, and guarantees that concurrent requests hitting the same
//! expired token share one refresh call instead of each issuing their own.
//!
//! Request lifecycle:
//! 1. `GatewayClient` builds the wire request with the current access token
//! 2. `RetryPolicy` decides what to do with the response status
//! 3. On a refreshable 401, `RefreshCoordinator` either starts the refresh
//!    (leader) or waits for the one already in flight (follower)
//! 4. The request is resent exactly once with the new token
//! 5. Anything else resolves to the parsed body or a typed `Error`

pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod request;
pub mod response;
pub mod retry;
pub mod session;

#[cfg(test)]
mod test_support;

pub use client::{GatewayClient, GatewayConfig};
pub use coordinator::{HttpRefresher, RefreshCoordinator, TokenRefresher};
pub use error::{Error, Result};
pub use request::{RequestDescriptor, WireRequest};
pub use retry::{RetryPolicy, Step};
pub use session::SessionHandle;
