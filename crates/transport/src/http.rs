//! HTTP seam for the verification exchanges.
//!
//! [`HttpTransport`] is deliberately tiny: one owned request in, status and
//! body text out. Everything protocol-specific (status interpretation, JSON
//! payload shapes) lives in [`SessionClient`](crate::SessionClient) and
//! [`NodeVerification`](crate::NodeVerification), so tests can swap in a
//! scripted transport without a network.

use std::future::Future;
use std::time::Duration;

use url::Url;

use crate::TransportError;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// HTTP method subset used by the login flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    /// JSON body, sent with `content-type: application/json`.
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// A bodiless `GET`.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// A `POST`, optionally carrying a JSON body.
    pub fn post(url: Url, body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: Vec::new(),
            body,
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// A received response. Any status is a response; only transport failures
/// are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Sends HTTP requests.
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and returns the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if no response was received.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        (**self).send(request)
    }
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// [`HttpTransport`] backed by a pooled `reqwest::Client` (rustls).
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport. `timeout` bounds each whole request; `None`
    /// leaves requests unbounded and timeouts to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the TLS backend fails to load.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        tracing::debug!(?method, host = url.host_str().unwrap_or_default(), path = url.path(), "http request");

        let mut builder = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "http send failed");
            TransportError::Network(e.to_string())
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            tracing::error!(status, error = %e, "http body read failed");
            TransportError::Network(e.to_string())
        })?;

        tracing::debug!(status, body_len = body.len(), "http response");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        let redirect = HttpResponse {
            status: 302,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[test]
    fn request_builders() {
        let url = Url::parse("https://device.local/verify_external").unwrap();
        let req = HttpRequest::post(url.clone(), None).header("x-user-token", "admin");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.headers, vec![("x-user-token", "admin".to_owned())]);
        assert_eq!(HttpRequest::get(url).body, None);
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let transport = ReqwestTransport::new(Some(Duration::from_secs(2))).unwrap();
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();
        let result = transport.send(HttpRequest::get(url)).await;
        assert!(matches!(result, Err(TransportError::Network(_))));
    }
}
