//! Shared types for the Counsel workspace
//!
//! `Secret` keeps bearer tokens and passwords out of logs; `Error` covers
//! configuration loading for binaries that embed the gateway.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
