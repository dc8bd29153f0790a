//! Lightning key login SDK.
//!
//! [`SessionContext`] owns everything one login profile needs and runs the
//! two ways of proving control of a Lightning key:
//!
//! | Flow | Entry point | Session arrives via |
//! |------|-------------|---------------------|
//! | LNURL-auth | [`SessionContext::login_with_challenge`] | realtime `lnauth_success` push |
//! | Node verification | [`SessionContext::verify_node`] | the verifier's answer to step three |
//!
//! The LNURL pipeline runs sequentially in the caller's task:
//!
//! ```text
//! challenge --parse--> nonce --sign--> signature --build--> callback URL --submit-->
//! ```
//!
//! The callback is only submitted once the realtime channel is OPEN, so the
//! backend's push has somewhere to land. Only a push whose `k1` matches the
//! nonce being answered installs a session; pushes for earlier or foreign
//! challenges are dropped.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use config::Deployment;
//! use signer::PersistedSecureKeySource;
//! use storage::InMemoryStore;
//! use transport::NoopObserver;
//!
//! # async fn example(challenge: &str) -> Result<(), sdk::AuthError> {
//! let store = Arc::new(InMemoryStore::new());
//! let ctx = sdk::SessionContext::with_network(
//!     Deployment::PRODUCTION,
//!     Arc::clone(&store),
//!     None,
//!     Arc::new(NoopObserver),
//! )?;
//!
//! let keys = PersistedSecureKeySource::new(store);
//! ctx.login_with_challenge(challenge, &keys).await?;
//! let session = ctx.wait_for_session().await?;
//!
//! ctx.logout();
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::AuthError;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use config::Deployment;
use lnurl::SignedResponse;
use signer::{KeySource, LnurlSigner};
use storage::LocalStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use transport::{
    ChannelObserver, HttpTransport, NodeVerification, PushEvent, ReadyState, RealtimeChannel,
    ReqwestTransport, Session, Socket, SessionClient, SocketFactory, SubmitOutcome,
    TransportError, TungsteniteFactory, VerificationRequest, VerificationState,
};
use url::Url;

// ---------------------------------------------------------------------------
// Login state
// ---------------------------------------------------------------------------

/// State shared between the context and the socket task's observer.
struct LoginState {
    session: watch::Sender<Option<Session>>,

    /// Nonce of the challenge currently being answered.
    pending_nonce: Mutex<Option<String>>,

    /// Last lifecycle state any socket reported. Used to wake waiters; the
    /// current socket's own ready state is the source of truth.
    socket_state: watch::Sender<ReadyState>,
}

impl LoginState {
    fn pending_nonce(&self) -> MutexGuard<'_, Option<String>> {
        self.pending_nonce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs the session if `k1` answers the pending challenge.
    fn accept_push(&self, k1: &str, session: Session) {
        let mut pending = self.pending_nonce();
        match pending.as_deref() {
            Some(nonce) if nonce.eq_ignore_ascii_case(k1) => {
                *pending = None;
                tracing::info!(pubkey = %session.pubkey, token_len = session.token.len(), "login succeeded");
                self.session.send_replace(Some(session));
            }
            _ => tracing::warn!(%k1, "ignoring stale login push"),
        }
    }
}

/// Installs sessions from login pushes, then forwards to the application.
struct SessionObserver {
    state: Arc<LoginState>,
    inner: Arc<dyn ChannelObserver>,
}

impl ChannelObserver for SessionObserver {
    fn on_open(&self) {
        tracing::debug!("realtime channel open");
        self.state.socket_state.send_replace(ReadyState::Open);
        self.inner.on_open();
    }

    fn on_event(&self, event: PushEvent) {
        if let PushEvent::LoginSuccess(success) = &event {
            self.state
                .accept_push(&success.k1, success.clone().into_session());
        }
        self.inner.on_event(event);
    }

    fn on_close(&self, reason: Option<String>) {
        tracing::warn!(reason = reason.as_deref().unwrap_or_default(), "realtime channel closed");
        self.state.socket_state.send_replace(ReadyState::Closed);
        self.inner.on_close(reason);
    }

    fn on_error(&self, error: &str) {
        tracing::warn!(%error, "realtime channel error");
        self.state.socket_state.send_replace(ReadyState::Closed);
        self.inner.on_error(error);
    }
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Login state for one profile: deployment, HTTP client, realtime channel,
/// and the current session.
///
/// Dropping the context cancels pending [`wait_for_session`](Self::wait_for_session)
/// calls and closes the channel.
pub struct SessionContext<H: HttpTransport, F: SocketFactory, S: LocalStore> {
    deployment: Deployment,
    client: SessionClient<H>,
    channel: RealtimeChannel<F, S>,
    state: Arc<LoginState>,
    cancel: CancellationToken,
}

impl<S: LocalStore> SessionContext<ReqwestTransport, TungsteniteFactory, S> {
    /// Builds a context on the real network stack.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the HTTP client cannot be built.
    pub fn with_network(
        deployment: Deployment,
        store: S,
        timeout: Option<Duration>,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<Self, AuthError> {
        let http = ReqwestTransport::new(timeout)?;
        Ok(Self::new(deployment, http, TungsteniteFactory, store, observer))
    }
}

impl<H: HttpTransport, F: SocketFactory, S: LocalStore> SessionContext<H, F, S> {
    /// Creates a logged-out context. Nothing is connected yet.
    pub fn new(
        deployment: Deployment,
        http: H,
        factory: F,
        store: S,
        observer: Arc<dyn ChannelObserver>,
    ) -> Self {
        let state = Arc::new(LoginState {
            session: watch::Sender::new(None),
            pending_nonce: Mutex::new(None),
            socket_state: watch::Sender::new(ReadyState::Closed),
        });
        let observer: Arc<dyn ChannelObserver> = Arc::new(SessionObserver {
            state: Arc::clone(&state),
            inner: observer,
        });

        tracing::debug!(deployment = deployment.name, api_url = deployment.api_url, "session context created");

        Self {
            deployment,
            client: SessionClient::new(http),
            channel: RealtimeChannel::new(factory, store, deployment, observer),
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn channel(&self) -> &RealtimeChannel<F, S> {
        &self.channel
    }

    /// Starts opening the realtime channel, or reuses the open one. Does not
    /// wait for the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Cancelled`] after shutdown, or the channel's
    /// [`TransportError`].
    pub fn connect(&self) -> Result<(), AuthError> {
        self.check_cancelled()?;
        self.channel.create_or_reuse()?;
        Ok(())
    }

    /// Answers an LNURL-auth challenge with the key from `keys`.
    ///
    /// Parses and signs locally, waits for the realtime channel to be OPEN,
    /// then submits the callback. The session itself is pushed over the
    /// channel; await it with [`wait_for_session`](Self::wait_for_session).
    ///
    /// Only the most recent challenge is pending: a push answering an earlier
    /// one is ignored. Callers bound the whole call with their own timeout.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Encoding`] / [`AuthError::MalformedChallenge`] for a bad
    ///   challenge. Nothing is sent.
    /// - [`AuthError::Key`] / [`AuthError::Signing`] if no signature could be made.
    /// - [`AuthError::Transport`] if the channel closes before opening, or the
    ///   service is unreachable. The callback is not sent in the first case.
    /// - [`AuthError::Cancelled`] if the context shuts down while waiting.
    ///
    /// A refusal by the service is `Ok(SubmitOutcome::Rejected { .. })`.
    pub async fn login_with_challenge(
        &self,
        challenge: &str,
        keys: &(impl KeySource + ?Sized),
    ) -> Result<SubmitOutcome, AuthError> {
        self.check_cancelled()?;

        let parsed = lnurl::parse(challenge, self.deployment.sandbox_remaps())?;
        tracing::debug!(
            host = parsed.base_url.host_str().unwrap_or_default(),
            tag = parsed.tag.as_deref().unwrap_or_default(),
            "challenge parsed"
        );

        let signer = LnurlSigner::new(keys.key_pair()?);
        let signature = signer.sign(&parsed.nonce)?;
        let response = SignedResponse::new(parsed.nonce, signature, signer.public_key_hex());
        let callback = lnurl::build(&parsed.base_url, &response);

        *self.state.pending_nonce() = Some(response.nonce.clone());

        let socket_events = self.state.socket_state.subscribe();
        let socket = self.channel.create_or_reuse()?;
        self.wait_until_open(&*socket, socket_events).await?;

        let outcome = self.client.submit(&callback).await?;
        match &outcome {
            SubmitOutcome::Accepted => {
                tracing::info!(pubkey = %response.public_key, "challenge answered");
            }
            SubmitOutcome::Rejected { .. } => {
                let mut pending = self.state.pending_nonce();
                if pending.as_deref() == Some(response.nonce.as_str()) {
                    *pending = None;
                }
            }
        }
        Ok(outcome)
    }

    /// Waits for `socket` to leave CONNECTING. `events` must be subscribed
    /// before the socket was created so no transition is missed.
    async fn wait_until_open(
        &self,
        socket: &F::Socket,
        mut events: watch::Receiver<ReadyState>,
    ) -> Result<(), AuthError> {
        loop {
            match socket.ready_state() {
                ReadyState::Open => return Ok(()),
                ReadyState::Closing | ReadyState::Closed => {
                    tracing::warn!("realtime channel closed before opening");
                    return Err(TransportError::Network(
                        "realtime channel closed before opening".into(),
                    )
                    .into());
                }
                ReadyState::Connecting => {}
            }

            tokio::select! {
                changed = events.changed() => {
                    if changed.is_err() {
                        return Err(AuthError::Cancelled);
                    }
                }
                () = self.cancel.cancelled() => return Err(AuthError::Cancelled),
            }
        }
    }

    /// Starts a node-verification saga against `device_url`, verified by this
    /// deployment's API.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the deployment API URL is unusable.
    pub fn node_verification(
        &self,
        device_url: Url,
        admin_token: impl Into<String>,
        challenge_id: impl Into<String>,
    ) -> Result<NodeVerification<&H>, AuthError> {
        let verifier_url =
            Url::parse(self.deployment.api_url).map_err(|e| TransportError::InvalidEndpoint {
                url: self.deployment.api_url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(NodeVerification::new(
            self.client.transport(),
            VerificationRequest {
                device_url,
                admin_token: admin_token.into(),
                verifier_url,
                challenge_id: challenge_id.into(),
            },
        ))
    }

    /// Drives `saga` to a terminal state. A `Failed` saga resumes at its
    /// failed step. On `Verified` the session is installed in this context.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Cancelled`] after shutdown, or
    /// [`AuthError::Transport`] on network failure (the saga can be driven
    /// again afterwards).
    pub async fn verify_node<T: HttpTransport>(
        &self,
        saga: &mut NodeVerification<T>,
    ) -> Result<VerificationState, AuthError> {
        self.check_cancelled()?;

        let state = match saga.state() {
            VerificationState::Failed { .. } => saga.retry().await?,
            _ => saga.run().await?,
        }
        .clone();

        if let VerificationState::Verified(session) = &state {
            self.state.session.send_replace(Some(session.clone()));
        }
        Ok(state)
    }

    /// The current session, if logged in.
    pub fn session(&self) -> Option<Session> {
        self.state.session.borrow().clone()
    }

    /// Waits until a session is installed.
    ///
    /// Returns immediately if already logged in. Callers bound the wait
    /// themselves (e.g. with `tokio::time::timeout`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Cancelled`] if the context shuts down first.
    pub async fn wait_for_session(&self) -> Result<Session, AuthError> {
        let mut rx = self.state.session.subscribe();
        tokio::select! {
            result = rx.wait_for(Option::is_some) => {
                result.ok().and_then(|s| s.clone()).ok_or(AuthError::Cancelled)
            }
            () = self.cancel.cancelled() => Err(AuthError::Cancelled),
        }
    }

    /// Forgets the session and any pending challenge, and closes the realtime
    /// channel.
    ///
    /// The context stays usable; the next login reconnects with the same
    /// client id.
    pub fn logout(&self) {
        self.state.pending_nonce().take();
        if self.state.session.send_replace(None).is_some() {
            tracing::info!("logged out");
        }
        self.channel.close();
    }

    /// Cancels pending waits, forgets the session, and closes the channel.
    /// Later operations return [`AuthError::Cancelled`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.logout();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn check_cancelled(&self) -> Result<(), AuthError> {
        if self.cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        Ok(())
    }
}

impl<H: HttpTransport, F: SocketFactory, S: LocalStore> Drop for SessionContext<H, F, S> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.channel.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
