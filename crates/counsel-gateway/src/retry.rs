//! Refresh-and-retry policy
//!
//! The only failure the gateway recovers from locally is an expired access
//! token with a usable refresh token. The policy is a plain value so the
//! "one retry, only on 401, only with a refresh token" rule can be checked
//! without a server.

use reqwest::StatusCode;

/// What to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Success status: decode the body.
    Accept,
    /// Refreshable 401: obtain a new access token and resend.
    Refresh,
    /// Anything else: raise a typed error.
    Reject,
}

/// Bound on refresh-and-retry cycles per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_refresh_retries: u32,
}

impl Default for RetryPolicy {
    /// One refresh-and-retry per call. A second 401 is final.
    fn default() -> Self {
        Self {
            max_refresh_retries: 1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_refresh_retries: u32) -> Self {
        Self {
            max_refresh_retries,
        }
    }

    /// Never refresh; every 401 is terminal.
    pub fn never() -> Self {
        Self::new(0)
    }

    pub fn max_refresh_retries(&self) -> u32 {
        self.max_refresh_retries
    }

    /// Decide the next step for a response received on `retries_used`
    /// refresh-retries so far (0 for the first attempt).
    pub fn next_step(&self, status: StatusCode, retries_used: u32, has_refresh_token: bool) -> Step {
        if status.is_success() {
            return Step::Accept;
        }
        if status == StatusCode::UNAUTHORIZED
            && has_refresh_token
            && retries_used < self.max_refresh_retries
        {
            return Step::Refresh;
        }
        Step::Reject
    }
}
