//! Cancellable HTTP client shared by the storage providers.
//!
//! Every request is raced against the caller's [`CancellationToken`]. When the
//! token fires first the in-flight `reqwest` future is dropped, which aborts the
//! underlying connection, and the call resolves to [`FileBrowserError::Aborted`].
//! Responses are fully buffered so providers can parse JSON or XML bodies and
//! report non-2xx statuses with the backend's error text attached.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::{FileBrowserError, Result};

/// Per-call options accepted by every provider operation.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(signal: CancellationToken) -> Self {
        Self {
            signal: Some(signal),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// HTTP method for requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body as bytes
    pub body: Vec<u8>,
}

impl Response {
    /// Returns true if the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Attempt to deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx response into [`FileBrowserError::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FileBrowserError::Http {
                status: self.status,
                body: self.text(),
            })
        }
    }
}

/// Thin wrapper around a pooled `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.inner.clone(), Method::Get, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.inner.clone(), Method::Post, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.inner.clone(), Method::Put, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.inner.clone(), Method::Delete, url)
    }
}

/// A builder for constructing HTTP requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    client: reqwest::Client,
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    raw_query: Option<String>,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
}

impl RequestBuilder {
    fn new(client: reqwest::Client, method: Method, url: impl Into<String>) -> Self {
        Self {
            client,
            method,
            url: url.into(),
            query: Vec::new(),
            raw_query: None,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Append a percent-encoded query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter only when a value is present.
    pub fn query_opt(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    /// Append an already-encoded query string verbatim, e.g. a SAS token.
    pub fn raw_query(mut self, query: impl Into<String>) -> Self {
        self.raw_query = Some(query.into());
        self
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Result<Self> {
        let json_bytes = serde_json::to_vec(value)?;
        self.body = Some(json_bytes);
        self.headers
            .insert("content-type".to_owned(), "application/json".to_owned());
        Ok(self)
    }

    /// The URL that will be requested, query string included.
    pub fn full_url(&self) -> String {
        let mut parts: Vec<String> = self
            .query
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect();
        if let Some(raw) = self.raw_query.as_deref().filter(|raw| !raw.is_empty()) {
            parts.push(raw.trim_start_matches('?').to_owned());
        }

        if parts.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{}", self.url, parts.join("&"))
    }

    /// Send the request, aborting if the options' signal fires first.
    pub async fn send(self, options: &RequestOptions) -> Result<Response> {
        let request = self.build();
        match &options.signal {
            Some(signal) => {
                tokio::select! {
                    biased;
                    () = signal.cancelled() => Err(FileBrowserError::Aborted),
                    result = Self::execute(request) => result,
                }
            }
            None => Self::execute(request).await,
        }
    }

    fn build(self) -> reqwest::RequestBuilder {
        let url = self.full_url();
        let mut request = match self.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        if let Some(body) = self.body {
            request = request.body(body);
        }

        request
    }

    async fn execute(request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request.send().await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(Response { status, body })
    }
}
