//! Outbound request description.

use std::time::Duration;

use lark_core::{TaskError, TaskResult};
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use url::{Url, form_urlencoded};

/// Request payload.
#[derive(Debug, Clone)]
pub(crate) enum Body {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// An outbound HTTP request, built fluently and executed through
/// [`HttpClient::request`](super::HttpClient::request).
///
/// ```rust,ignore
/// let req = Request::get("https://api.github.com/search/repositories")
///     .query("q", "lark")
///     .header("Accept", "application/vnd.github+json");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<Body>,
    pub(crate) timeout: Option<Duration>,
}

impl Request {
    /// Creates a request with an arbitrary method.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Appends a query parameter. Values are percent-encoded.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds an `Authorization: Bearer <token>` header.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    /// Sets an `application/x-www-form-urlencoded` body.
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.body = Some(Body::Form(fields));
        self
    }

    /// Overrides the client's default timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL without the query parameters added through [`query`](Self::query).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolves the final URL with query parameters appended.
    pub(crate) fn resolved_url(&self) -> TaskResult<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| TaskError::transport(format!("invalid url {}: {e}", self.url)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }

    /// Converts into a `reqwest` request bound to `client`.
    pub(crate) fn build(&self, client: &reqwest::Client) -> TaskResult<reqwest::Request> {
        let mut builder = client.request(self.method.clone(), self.resolved_url()?);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &self.body {
            Some(Body::Json(value)) => builder.json(value),
            Some(Body::Form(fields)) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields)
                    .finish();
                builder
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(encoded)
            }
            None => builder,
        };
        builder
            .build()
            .map_err(|e| TaskError::transport(format!("invalid request: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_are_encoded() {
        let req = Request::get("https://api.example.com/search?page=1")
            .query("q", "rust lang")
            .query("limit", 5);
        let url = req.resolved_url().unwrap();
        assert_eq!(url.query(), Some("page=1&q=rust+lang&limit=5"));
    }

    #[test]
    fn test_invalid_url_is_transport_error() {
        let err = Request::get("not a url").resolved_url().unwrap_err();
        assert!(matches!(err, TaskError::Transport(_)));
    }

    #[test]
    fn test_form_body() {
        let client = reqwest::Client::new();
        let req = Request::post("https://id.twitch.tv/oauth2/token")
            .form([("client_id", "abc"), ("grant_type", "client_credentials")])
            .build(&client)
            .unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(
            req.headers().get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        let body = req.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"client_id=abc&grant_type=client_credentials");
    }
}
