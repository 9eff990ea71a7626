//! Request construction
//!
//! A `RequestDescriptor` captures what the caller asked for (method, path,
//! query, JSON body, extra headers) and never changes after construction. The
//! gateway turns it into a `WireRequest` once per attempt with whatever
//! access token is current, so a retry after refresh reuses the same
//! descriptor with a different token.

use std::fmt::Display;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

const JSON: &str = "application/json";

/// What to send, independent of credentials.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::InvalidRequest(format!("serializing request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Append query parameters from any value that serializes to a flat
    /// object. Strings are sent as-is, numbers and booleans in their JSON
    /// text form, and `null` fields (e.g. `None`) are skipped.
    pub fn query<Q: Serialize + ?Sized>(mut self, params: &Q) -> Result<Self> {
        let value = serde_json::to_value(params)
            .map_err(|e| Error::InvalidRequest(format!("serializing query: {e}")))?;
        let Value::Object(fields) = value else {
            return Err(Error::InvalidRequest(
                "query parameters must serialize to an object".into(),
            ));
        };
        for (key, value) in fields {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(Error::InvalidRequest(format!(
                        "query parameter {key} must be a string, number or boolean"
                    )));
                }
            };
            self.query.push((key, text));
        }
        Ok(self)
    }

    /// Append a single query parameter.
    pub fn query_pair(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add an extra header. `Authorization` is managed by the gateway and
    /// rejected here.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("invalid header name {name}: {e}")))?;
        if name == AUTHORIZATION {
            return Err(Error::InvalidRequest(
                "authorization header is set from the session".into(),
            ));
        }
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("invalid value for {name}: {e}")))?;
        self.headers.push((name, value));
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Produce the wire request against `base_url`, authorized with
    /// `access_token` when one is given. Pure: no I/O, no session access.
    pub fn build(&self, base_url: &str, access_token: Option<&str>) -> Result<WireRequest> {
        let base = base_url.trim_end_matches('/');
        let joined = if self.path.starts_with('/') {
            format!("{base}{}", self.path)
        } else {
            format!("{base}/{}", self.path)
        };
        let mut url = Url::parse(&joined)
            .map_err(|e| Error::InvalidRequest(format!("invalid url {joined}: {e}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                self.query
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            );
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(token) = access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::InvalidRequest(format!("invalid access token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let body = self
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| Error::InvalidRequest(format!("encoding request body: {e}")))?;

        Ok(WireRequest {
            method: self.method.clone(),
            url,
            headers,
            body,
        })
    }
}

/// A fully resolved request, ready to hand to reqwest.
#[derive(Debug)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl WireRequest {
    /// The `Authorization` header value, if one was attached.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn into_reqwest(self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let builder = client
            .request(self.method, self.url)
            .headers(self.headers);
        match self.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}
