//! Fully-read HTTP response.

use lark_core::{TaskError, TaskResult};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

/// A completed HTTP response with its body already read into memory.
#[derive(Debug, Clone)]
pub struct Response {
    pub(crate) status: u16,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Vec<u8>,
    pub(crate) url: String,
}

impl Response {
    /// The status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns a header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The final URL after redirects.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw body bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> TaskResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body decoded as an untyped JSON value.
    pub fn json_value(&self) -> TaskResult<serde_json::Value> {
        self.json()
    }

    /// Fails with [`TaskError::Http`] if the status is 400 or above.
    pub fn raise_for_status(self) -> TaskResult<Self> {
        if self.status >= 400 {
            Err(TaskError::Http {
                status: self.status,
            })
        } else {
            Ok(self)
        }
    }
}
