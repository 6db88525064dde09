//! Buffered HTTP responses with case-insensitive header access.

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::error::{Error, ErrorKind, Result};

/// A fully buffered HTTP response: status, headers, body text.
///
/// The NTLM handshake and the request orchestrator both need headers and the
/// complete body after the exchange finishes, so responses are read eagerly.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: String,
}

impl Response {
    /// Buffer a reqwest response.
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Construct a response from parts. Useful for tests.
    pub fn from_parts(status: u16, headers: HeaderMap, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// All response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The response body as text.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Consume the response, returning the body.
    pub fn into_body(self) -> String {
        self.body
    }

    /// Deserialize the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| Error::with_source(ErrorKind::Body(format!("invalid JSON body: {e}")), e))
    }
}
