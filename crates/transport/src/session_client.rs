//! LNURL-auth callback submission.

use serde::Deserialize;
use url::Url;

use crate::{HttpRequest, HttpTransport, TransportError};

/// Result of submitting a signed callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The service accepted the signature. The session itself arrives over
    /// the realtime channel.
    Accepted,
    /// The service refused the signature (non-2xx, or an LNURL `ERROR` body).
    Rejected { status: u16, reason: String },
}

/// LNURL status body: `{"status":"OK"}` or `{"status":"ERROR","reason":"..."}`.
#[derive(Deserialize)]
struct LnurlStatus {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Submits signed callbacks over an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct SessionClient<T> {
    http: T,
}

impl<T: HttpTransport> SessionClient<T> {
    pub fn new(http: T) -> Self {
        Self { http }
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.http
    }

    /// `GET`s the callback URL.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the service is unreachable.
    /// Refusals are [`SubmitOutcome::Rejected`], not errors.
    pub async fn submit(&self, callback: &Url) -> Result<SubmitOutcome, TransportError> {
        let host = callback.host_str().unwrap_or_default().to_owned();
        let response = self.http.send(HttpRequest::get(callback.clone())).await?;

        if !response.is_success() {
            tracing::warn!(%host, status = response.status, body = %response.body, "callback rejected");
            return Ok(SubmitOutcome::Rejected {
                status: response.status,
                reason: response.body,
            });
        }

        if let Ok(body) = serde_json::from_str::<LnurlStatus>(&response.body) {
            if body.status.eq_ignore_ascii_case("ERROR") {
                let reason = body.reason.unwrap_or_default();
                tracing::warn!(%host, status = response.status, %reason, "callback returned LNURL error");
                return Ok(SubmitOutcome::Rejected {
                    status: response.status,
                    reason,
                });
            }
        }

        tracing::info!(%host, "callback accepted");
        Ok(SubmitOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHttp;
    use crate::Method;

    fn callback() -> Url {
        Url::parse("https://host/auth?k1=abcd&sig=30&key=02&t=1").unwrap()
    }

    #[tokio::test]
    async fn ok_body_is_accepted() {
        let http = MockHttp::new();
        http.respond(200, r#"{"status":"OK"}"#);
        let client = SessionClient::new(&http);

        assert_eq!(client.submit(&callback()).await.unwrap(), SubmitOutcome::Accepted);

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url, callback());
    }

    #[tokio::test]
    async fn non_json_success_is_accepted() {
        let http = MockHttp::new();
        http.respond(204, "");
        let client = SessionClient::new(&http);
        assert_eq!(client.submit(&callback()).await.unwrap(), SubmitOutcome::Accepted);
    }

    #[tokio::test]
    async fn non_2xx_is_rejected() {
        let http = MockHttp::new();
        http.respond(403, "expired challenge");
        let client = SessionClient::new(&http);

        assert_eq!(
            client.submit(&callback()).await.unwrap(),
            SubmitOutcome::Rejected {
                status: 403,
                reason: "expired challenge".into()
            }
        );
    }

    #[tokio::test]
    async fn lnurl_error_body_is_rejected() {
        let http = MockHttp::new();
        http.respond(200, r#"{"status":"ERROR","reason":"bad signature"}"#);
        let client = SessionClient::new(&http);

        assert_eq!(
            client.submit(&callback()).await.unwrap(),
            SubmitOutcome::Rejected {
                status: 200,
                reason: "bad signature".into()
            }
        );
    }

    #[tokio::test]
    async fn network_failure_propagates() {
        let http = MockHttp::new();
        http.fail("connection refused");
        let client = SessionClient::new(&http);

        assert!(matches!(
            client.submit(&callback()).await,
            Err(TransportError::Network(_))
        ));
    }
}
