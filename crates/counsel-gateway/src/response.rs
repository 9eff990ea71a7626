//! Response classification and decoding
//!
//! Every response is read fully into a `RawResponse` before the retry policy
//! looks at it. Success bodies decode into the caller's type; failures become
//! `Error::Http` with the server's `message` when it sent one.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Status and full body of a response.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Read a reqwest response to completion.
    pub async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;
        Ok(Self {
            status,
            body: body.to_vec(),
        })
    }

    /// Decode a success body. An empty body decodes as JSON `null`, so
    /// callers expecting no content can ask for `()` or `Option<T>`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return T::deserialize(Value::Null)
                .map_err(|e| Error::Decode(format!("empty body for {}: {e}", self.status)));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Decode(format!("{} response: {e}", self.status)))
    }

    /// Typed error for a non-success response.
    pub fn into_error(self) -> Error {
        let status = self.status.as_u16();
        let message = error_message(&self.body).unwrap_or_else(|| format!("HTTP {status}"));
        Error::Http { status, message }
    }
}

/// Error body shape: `{ "message": "..." }`. Validation failures send an
/// array of messages instead.
#[derive(Deserialize)]
struct ErrorBody {
    message: Option<MessageField>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageField {
    One(String),
    Many(Vec<String>),
}

fn error_message(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    let message = match parsed.message? {
        MessageField::One(message) => message,
        MessageField::Many(messages) => messages.join(", "),
    };
    (!message.trim().is_empty()).then_some(message)
}
