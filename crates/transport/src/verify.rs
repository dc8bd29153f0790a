//! Node-verification exchange with an external signing device.
//!
//! A three-step saga, each step one HTTP call:
//!
//! | Step | Request | Payload kept |
//! |------|---------|--------------|
//! | [`VerificationStep::RequestToken`] | `POST <device>/verify_external` | `response.token`, `response.info` |
//! | [`VerificationStep::RequestSignature`] | `GET <device>/signer/<challenge>` | `response.sig` |
//! | [`VerificationStep::Submit`] | `POST <verifier>/verify/<id>?token=<token>` | -- |
//!
//! Device calls carry the admin token in `x-user-token`. The submit body is
//! the device `info` object plus `verification_signature` and `url`.
//!
//! # States
//!
//! ```text
//! TokenRequested -> SignatureRequested -> Submitted -> Verified
//!        \                  \                 \
//!         +------------------+-----------------+----> Failed { step, reason }
//! ```
//!
//! A refusal or a missing field parks the machine in `Failed` with everything
//! gathered so far intact; [`NodeVerification::retry`] re-runs only the
//! failed step. Network errors are returned to the caller and leave the
//! state untouched, so calling [`NodeVerification::run`] again resumes.

use std::fmt;

use config::constants::{SIGNER_CHALLENGE, USER_TOKEN_HEADER};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::{HttpRequest, HttpResponse, HttpTransport, Session, TransportError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The three network steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStep {
    RequestToken,
    RequestSignature,
    Submit,
}

impl fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestToken => write!(f, "request token"),
            Self::RequestSignature => write!(f, "request signature"),
            Self::Submit => write!(f, "submit"),
        }
    }
}

/// Where the saga stands. Each non-terminal state names the step that runs
/// next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationState {
    TokenRequested,
    SignatureRequested,
    Submitted,
    Verified(Session),
    Failed {
        step: VerificationStep,
        reason: String,
    },
}

impl VerificationState {
    /// `true` for `Verified` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified(_) | Self::Failed { .. })
    }

    fn for_step(step: VerificationStep) -> Self {
        match step {
            VerificationStep::RequestToken => Self::TokenRequested,
            VerificationStep::RequestSignature => Self::SignatureRequested,
            VerificationStep::Submit => Self::Submitted,
        }
    }
}

/// Inputs of one verification attempt.
#[derive(Clone)]
pub struct VerificationRequest {
    /// Base URL of the signing device.
    pub device_url: Url,
    /// Admin token for the device.
    pub admin_token: String,
    /// Base URL of the verifying backend.
    pub verifier_url: Url,
    /// Backend-issued challenge id.
    pub challenge_id: String,
}

impl fmt::Debug for VerificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationRequest")
            .field("device_url", &self.device_url.as_str())
            .field("verifier_url", &self.verifier_url.as_str())
            .field("challenge_id", &self.challenge_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: Option<T>,
}

#[derive(Deserialize)]
struct TokenPayload {
    token: Option<String>,
    info: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct SignaturePayload {
    sig: Option<String>,
}

/// Outcome of a single step.
enum StepResult {
    Advanced(VerificationState),
    Failed(String),
}

// ---------------------------------------------------------------------------
// NodeVerification
// ---------------------------------------------------------------------------

/// The node-verification state machine.
pub struct NodeVerification<T> {
    http: T,
    request: VerificationRequest,
    state: VerificationState,
    token: Option<String>,
    info: Option<Map<String, Value>>,
    signature: Option<String>,
}

impl<T: HttpTransport> NodeVerification<T> {
    /// Creates a machine in `TokenRequested`. Nothing is sent yet.
    pub fn new(http: T, request: VerificationRequest) -> Self {
        Self {
            http,
            request,
            state: VerificationState::TokenRequested,
            token: None,
            info: None,
            signature: None,
        }
    }

    pub fn state(&self) -> &VerificationState {
        &self.state
    }

    /// The session, once verified.
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            VerificationState::Verified(session) => Some(session),
            _ => None,
        }
    }

    /// Runs steps until `Verified` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on network failure; the state stays at the
    /// step that was in flight.
    pub async fn run(&mut self) -> Result<&VerificationState, TransportError> {
        while !self.state.is_terminal() {
            self.advance().await?;
        }
        Ok(&self.state)
    }

    /// Re-runs the failed step, then continues. A no-op on `Verified`.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn retry(&mut self) -> Result<&VerificationState, TransportError> {
        if let VerificationState::Failed { step, .. } = &self.state {
            tracing::info!(%step, "retrying node verification step");
            self.state = VerificationState::for_step(*step);
        }
        self.run().await
    }

    /// Executes exactly one step. Terminal states are left as they are.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn advance(&mut self) -> Result<&VerificationState, TransportError> {
        let step = match self.state {
            VerificationState::TokenRequested => VerificationStep::RequestToken,
            VerificationState::SignatureRequested => VerificationStep::RequestSignature,
            VerificationState::Submitted => VerificationStep::Submit,
            VerificationState::Verified(_) | VerificationState::Failed { .. } => {
                return Ok(&self.state);
            }
        };

        let result = match step {
            VerificationStep::RequestToken => self.request_token().await?,
            VerificationStep::RequestSignature => self.request_signature().await?,
            VerificationStep::Submit => self.submit().await?,
        };

        self.state = match result {
            StepResult::Advanced(next) => {
                tracing::debug!(%step, "node verification step done");
                next
            }
            StepResult::Failed(reason) => {
                tracing::warn!(%step, %reason, "node verification step failed");
                VerificationState::Failed { step, reason }
            }
        };
        Ok(&self.state)
    }

    async fn request_token(&mut self) -> Result<StepResult, TransportError> {
        let url = endpoint(&self.request.device_url, &["verify_external"])?;
        let req = HttpRequest::post(url, None)
            .header(USER_TOKEN_HEADER, self.request.admin_token.clone());
        let response = self.http.send(req).await?;

        let payload = match parse_envelope::<TokenPayload>(&response) {
            Ok(p) => p,
            Err(reason) => return Ok(StepResult::Failed(reason)),
        };
        let Some(token) = payload.token.filter(|t| !t.is_empty()) else {
            return Ok(StepResult::Failed("missing response.token".into()));
        };
        let Some(info) = payload.info else {
            return Ok(StepResult::Failed("missing response.info".into()));
        };

        tracing::debug!(token_len = token.len(), info_fields = info.len(), "device token received");
        self.token = Some(token);
        self.info = Some(info);
        Ok(StepResult::Advanced(VerificationState::SignatureRequested))
    }

    async fn request_signature(&mut self) -> Result<StepResult, TransportError> {
        let url = endpoint(&self.request.device_url, &["signer", SIGNER_CHALLENGE])?;
        let req = HttpRequest::get(url).header(USER_TOKEN_HEADER, self.request.admin_token.clone());
        let response = self.http.send(req).await?;

        let payload = match parse_envelope::<SignaturePayload>(&response) {
            Ok(p) => p,
            Err(reason) => return Ok(StepResult::Failed(reason)),
        };
        let Some(sig) = payload.sig.filter(|s| !s.is_empty()) else {
            return Ok(StepResult::Failed("missing response.sig".into()));
        };

        self.signature = Some(sig);
        Ok(StepResult::Advanced(VerificationState::Submitted))
    }

    async fn submit(&mut self) -> Result<StepResult, TransportError> {
        let (Some(token), Some(info), Some(sig)) = (&self.token, &self.info, &self.signature)
        else {
            return Ok(StepResult::Failed("earlier step data missing".into()));
        };

        let mut body = info.clone();
        body.insert("verification_signature".into(), Value::String(sig.clone()));
        body.insert("url".into(), Value::String(device_base(&self.request.device_url)));

        let mut url = endpoint(
            &self.request.verifier_url,
            &["verify", self.request.challenge_id.as_str()],
        )?;
        url.query_pairs_mut().append_pair("token", token);

        let response = self
            .http
            .send(HttpRequest::post(url, Some(Value::Object(body))))
            .await?;

        if !response.is_success() {
            return Ok(StepResult::Failed(format!(
                "verifier returned {}: {}",
                response.status, response.body
            )));
        }

        let session = Session {
            token: token.clone(),
            pubkey: string_field(info, &["pubkey", "identity_pubkey"]).unwrap_or_default(),
            alias: string_field(info, &["alias"]),
        };
        tracing::info!(pubkey = %session.pubkey, "node verified");
        Ok(StepResult::Advanced(VerificationState::Verified(session)))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Appends path segments to a base URL, ignoring a trailing slash.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|()| TransportError::InvalidEndpoint {
            url: base.to_string(),
            reason: "URL cannot be a base".into(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn device_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_owned()
}

fn parse_envelope<P: for<'de> Deserialize<'de>>(response: &HttpResponse) -> Result<P, String> {
    if !response.is_success() {
        return Err(format!("device returned {}: {}", response.status, response.body));
    }
    serde_json::from_str::<Envelope<P>>(&response.body)
        .map_err(|e| format!("unreadable payload: {e}"))?
        .response
        .ok_or_else(|| "missing response".to_owned())
}

fn string_field(info: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| info.get(*name).and_then(Value::as_str))
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use crate::mock::MockHttp;

    const TOKEN_BODY: &str =
        r##"{"response":{"token":"tok-1","info":{"pubkey":"02ab","alias":"alice","color":"#fff"}}}"##;
    const SIG_BODY: &str = r#"{"response":{"sig":"d5f8sig"}}"#;

    fn request() -> VerificationRequest {
        VerificationRequest {
            device_url: Url::parse("http://device.local:3001/").unwrap(),
            admin_token: "admin-secret".into(),
            verifier_url: Url::parse("https://api.example.com/api").unwrap(),
            challenge_id: "ch-42".into(),
        }
    }

    #[tokio::test]
    async fn happy_path_verifies() {
        let http = MockHttp::new();
        http.respond(200, TOKEN_BODY)
            .respond(200, SIG_BODY)
            .respond(200, "{}");

        let mut saga = NodeVerification::new(&http, request());
        let state = saga.run().await.unwrap().clone();

        assert_eq!(
            state,
            VerificationState::Verified(Session {
                token: "tok-1".into(),
                pubkey: "02ab".into(),
                alias: Some("alice".into()),
            })
        );

        let reqs = http.requests();
        assert_eq!(reqs.len(), 3);

        assert_eq!(reqs[0].method, Method::Post);
        assert_eq!(reqs[0].url.as_str(), "http://device.local:3001/verify_external");
        assert_eq!(reqs[0].headers, vec![("x-user-token", "admin-secret".to_owned())]);

        assert_eq!(reqs[1].method, Method::Get);
        assert_eq!(
            reqs[1].url.as_str(),
            "http://device.local:3001/signer/U3BoaW54IFZlcmlmaWNhdGlvbg=="
        );
        assert_eq!(reqs[1].headers, reqs[0].headers);

        assert_eq!(reqs[2].method, Method::Post);
        assert_eq!(
            reqs[2].url.as_str(),
            "https://api.example.com/api/verify/ch-42?token=tok-1"
        );
        assert!(reqs[2].headers.is_empty());
        let body = reqs[2].body.as_ref().unwrap();
        assert_eq!(body["verification_signature"], "d5f8sig");
        assert_eq!(body["url"], "http://device.local:3001");
        assert_eq!(body["color"], "#fff");
        assert_eq!(body["alias"], "alice");
    }

    #[tokio::test]
    async fn advance_walks_one_state_at_a_time() {
        let http = MockHttp::new();
        http.respond(200, TOKEN_BODY).respond(200, SIG_BODY);

        let mut saga = NodeVerification::new(&http, request());
        assert_eq!(saga.state(), &VerificationState::TokenRequested);
        assert_eq!(
            saga.advance().await.unwrap(),
            &VerificationState::SignatureRequested
        );
        assert_eq!(saga.advance().await.unwrap(), &VerificationState::Submitted);
        assert!(saga.session().is_none());
    }

    #[tokio::test]
    async fn missing_signature_fails_attributably() {
        let http = MockHttp::new();
        http.respond(200, TOKEN_BODY).respond(200, r#"{"response":{}}"#);

        let mut saga = NodeVerification::new(&http, request());
        let state = saga.run().await.unwrap().clone();

        assert_eq!(
            state,
            VerificationState::Failed {
                step: VerificationStep::RequestSignature,
                reason: "missing response.sig".into(),
            }
        );
    }

    #[tokio::test]
    async fn retry_reruns_only_failed_step() {
        let http = MockHttp::new();
        http.respond(200, TOKEN_BODY)
            .respond(500, "device busy")
            .respond(200, SIG_BODY)
            .respond(200, "{}");

        let mut saga = NodeVerification::new(&http, request());
        let failed = saga.run().await.unwrap().clone();
        assert!(matches!(
            failed,
            VerificationState::Failed {
                step: VerificationStep::RequestSignature,
                ..
            }
        ));

        saga.retry().await.unwrap();
        assert!(saga.session().is_some());

        let paths: Vec<String> = http.requests().iter().map(|r| r.url.path().to_owned()).collect();
        assert_eq!(
            paths,
            vec![
                "/verify_external",
                "/signer/U3BoaW54IFZlcmlmaWNhdGlvbg==",
                "/signer/U3BoaW54IFZlcmlmaWNhdGlvbg==",
                "/api/verify/ch-42",
            ]
        );
    }

    #[tokio::test]
    async fn verifier_rejection_fails_submit() {
        let http = MockHttp::new();
        http.respond(200, TOKEN_BODY)
            .respond(200, SIG_BODY)
            .respond(401, "challenge expired");

        let mut saga = NodeVerification::new(&http, request());
        assert_eq!(
            saga.run().await.unwrap(),
            &VerificationState::Failed {
                step: VerificationStep::Submit,
                reason: "verifier returned 401: challenge expired".into(),
            }
        );
    }

    #[tokio::test]
    async fn network_error_propagates_and_resumes() {
        let http = MockHttp::new();
        http.fail("connection reset")
            .respond(200, TOKEN_BODY)
            .respond(200, SIG_BODY)
            .respond(200, "{}");

        let mut saga = NodeVerification::new(&http, request());
        assert!(matches!(saga.run().await, Err(TransportError::Network(_))));
        assert_eq!(saga.state(), &VerificationState::TokenRequested);

        saga.run().await.unwrap();
        assert!(saga.session().is_some());
    }

    #[tokio::test]
    async fn garbage_token_payload_fails_first_step() {
        let http = MockHttp::new();
        http.respond(200, "<html>");

        let mut saga = NodeVerification::new(&http, request());
        assert!(matches!(
            saga.run().await.unwrap(),
            VerificationState::Failed {
                step: VerificationStep::RequestToken,
                ..
            }
        ));
        assert_eq!(http.call_count(), 1);
    }

    #[test]
    fn request_debug_hides_admin_token() {
        assert!(!format!("{:?}", request()).contains("admin-secret"));
    }
}
