//! Persistent duplex channel to the marketplace backend.
//!
//! The backend pushes login results (and other events) to the client over a
//! websocket keyed by a stable client id:
//!
//! ```text
//! ws(s)://<api host>/websocket?uniqueId=<client id>
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Unconnected --create_or_reuse--> Connecting --open--> Open
//!      ^                                                  |
//!      +------------------- close / error ----------------+
//! ```
//!
//! There is no automatic reconnection: the next [`RealtimeChannel::create_or_reuse`]
//! call after a drop builds a fresh socket with the same client id.
//!
//! # Concurrency
//!
//! The socket slot and the read-else-generate of the client id sit behind one
//! [`std::sync::Mutex`], so concurrent callers never see two ids and never
//! hold two live sockets. Socket I/O runs on a spawned tokio task that
//! reports through an atomic [`ReadyState`] and the [`ChannelObserver`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use config::Deployment;
use config::constants::{CLIENT_ID_KEY, CLIENT_ID_PARAM};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use storage::{LocalStore, StorageError};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{Session, TransportError};

// ---------------------------------------------------------------------------
// Ready state
// ---------------------------------------------------------------------------

/// Socket ready state, mirroring the browser websocket states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Lock-free ready-state cell shared between a socket handle and its task.
#[derive(Debug)]
pub(crate) struct AtomicReadyState(AtomicU8);

impl AtomicReadyState {
    pub(crate) fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

/// Push message tag announcing a completed LNURL-auth login.
const LOGIN_SUCCESS_MSG: &str = "lnauth_success";

/// Payload of an `lnauth_success` push.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginSuccess {
    /// The nonce the wallet signed.
    pub k1: String,
    /// Session token issued for this login.
    pub jwt: String,
    /// Public key that signed the nonce.
    pub pubkey: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl LoginSuccess {
    /// Converts the push into a [`Session`].
    pub fn into_session(self) -> Session {
        Session {
            token: self.jwt,
            pubkey: self.pubkey,
            alias: self.alias,
        }
    }
}

/// A text frame received on the channel.
#[derive(Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// The backend verified a wallet signature for this client.
    LoginSuccess(LoginSuccess),
    /// Any other frame, verbatim.
    Raw(String),
}

impl PushEvent {
    /// Classifies a text frame.
    pub fn parse(text: &str) -> Self {
        #[derive(Deserialize)]
        struct Tagged {
            msg: String,
            #[serde(flatten)]
            rest: serde_json::Value,
        }

        match serde_json::from_str::<Tagged>(text) {
            Ok(tagged) if tagged.msg == LOGIN_SUCCESS_MSG => {
                match serde_json::from_value::<LoginSuccess>(tagged.rest) {
                    Ok(success) => Self::LoginSuccess(success),
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed login success push");
                        Self::Raw(text.to_owned())
                    }
                }
            }
            _ => Self::Raw(text.to_owned()),
        }
    }
}

impl std::fmt::Debug for PushEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoginSuccess(s) => f
                .debug_struct("LoginSuccess")
                .field("k1", &s.k1)
                .field("pubkey", &s.pubkey)
                .field("alias", &s.alias)
                .finish_non_exhaustive(),
            Self::Raw(text) => f.debug_tuple("Raw").field(&text.len()).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Callbacks for channel lifecycle and traffic. All methods default to no-ops.
///
/// Called from the socket task; implementations must not block.
pub trait ChannelObserver: Send + Sync {
    fn on_open(&self) {}
    fn on_event(&self, _event: PushEvent) {}
    fn on_close(&self, _reason: Option<String>) {}
    fn on_error(&self, _error: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChannelObserver for NoopObserver {}

/// A live (or dying) socket handle.
pub trait Socket: Send + Sync {
    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Starts closing the socket. Idempotent.
    fn close(&self);
}

/// Constructs sockets. One call is one connection attempt.
pub trait SocketFactory: Send + Sync {
    type Socket: Socket;

    /// Starts connecting to `endpoint`, reporting through `observer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot even be started.
    fn connect(
        &self,
        endpoint: &Url,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<Self::Socket, TransportError>;
}

impl<F: SocketFactory + ?Sized> SocketFactory for Arc<F> {
    type Socket = F::Socket;

    fn connect(
        &self,
        endpoint: &Url,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<Self::Socket, TransportError> {
        (**self).connect(endpoint, observer)
    }
}

// ---------------------------------------------------------------------------
// RealtimeChannel
// ---------------------------------------------------------------------------

/// Owner of the single realtime connection for one profile.
pub struct RealtimeChannel<F: SocketFactory, S> {
    factory: F,
    store: S,
    deployment: Deployment,
    observer: Arc<dyn ChannelObserver>,
    slot: Mutex<Option<Arc<F::Socket>>>,
}

impl<F: SocketFactory, S: LocalStore> RealtimeChannel<F, S> {
    /// Creates an unconnected channel.
    pub fn new(
        factory: F,
        store: S,
        deployment: Deployment,
        observer: Arc<dyn ChannelObserver>,
    ) -> Self {
        Self {
            factory,
            store,
            deployment,
            observer,
            slot: Mutex::new(None),
        }
    }

    /// Returns the open socket, or connects a new one.
    ///
    /// An OPEN socket is returned unchanged. Any other socket in the slot
    /// (still connecting, closing, closed) is closed and replaced, so the
    /// channel never ends up with two open connections.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Storage`] if the client id cannot be read or saved.
    /// - [`TransportError::InvalidEndpoint`] if the API URL is unusable.
    /// - Whatever the factory returns for a failed start.
    pub fn create_or_reuse(&self) -> Result<Arc<F::Socket>, TransportError> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;

        if let Some(socket) = slot.as_ref() {
            if socket.ready_state() == ReadyState::Open {
                return Ok(Arc::clone(socket));
            }
        }
        if let Some(stale) = slot.take() {
            tracing::debug!(state = ?stale.ready_state(), "replacing stale realtime socket");
            stale.close();
        }

        let client_id = self.load_or_create_client_id()?;
        let endpoint = self.endpoint(&client_id)?;

        tracing::info!(
            deployment = self.deployment.name,
            host = endpoint.host_str().unwrap_or_default(),
            "opening realtime channel"
        );

        let socket = Arc::new(
            self.factory
                .connect(&endpoint, Arc::clone(&self.observer))?,
        );
        *slot = Some(Arc::clone(&socket));
        Ok(socket)
    }

    /// Returns the persisted client id, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Storage`] on store failure.
    pub fn client_id(&self) -> Result<String, TransportError> {
        let _slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        self.load_or_create_client_id()
    }

    /// Ready state of the current socket; `Closed` if there is none.
    pub fn ready_state(&self) -> ReadyState {
        self.slot
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.ready_state()))
            .unwrap_or(ReadyState::Closed)
    }

    /// Closes and forgets the current socket, if any.
    pub fn close(&self) {
        let stale = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(socket) = stale {
            tracing::info!("closing realtime channel");
            socket.close();
        }
    }

    /// Must be called with the slot lock held.
    fn load_or_create_client_id(&self) -> Result<String, TransportError> {
        if let Some(id) = self.store.get(CLIENT_ID_KEY)? {
            if !id.is_empty() {
                return Ok(id);
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.store.set(CLIENT_ID_KEY, &id)?;
        tracing::debug!("generated realtime client id");
        Ok(id)
    }

    fn endpoint(&self, client_id: &str) -> Result<Url, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            url: self.deployment.api_url.to_owned(),
            reason: reason.to_owned(),
        };

        let mut url = Url::parse(self.deployment.api_url).map_err(|e| invalid(&e.to_string()))?;
        let scheme = if self.deployment.is_tls() { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| invalid("cannot switch to a websocket scheme"))?;
        url.set_path(self.deployment.websocket_path);
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .append_pair(CLIENT_ID_PARAM, client_id);
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// tokio-tungstenite implementation
// ---------------------------------------------------------------------------

/// [`SocketFactory`] backed by `tokio-tungstenite`.
///
/// Each connection runs on its own task on the current tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteFactory;

/// Handle to a `tokio-tungstenite` connection task.
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct TungsteniteSocket {
    state: Arc<AtomicReadyState>,
    cancel: CancellationToken,
}

impl Socket for TungsteniteSocket {
    fn ready_state(&self) -> ReadyState {
        self.state.load()
    }

    fn close(&self) {
        if self.state.load() != ReadyState::Closed {
            self.state.store(ReadyState::Closing);
        }
        self.cancel.cancel();
    }
}

impl Drop for TungsteniteSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SocketFactory for TungsteniteFactory {
    type Socket = TungsteniteSocket;

    fn connect(
        &self,
        endpoint: &Url,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<TungsteniteSocket, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let state = Arc::new(AtomicReadyState::new(ReadyState::Connecting));
        let cancel = CancellationToken::new();

        runtime.spawn(run_socket(
            endpoint.to_string(),
            Arc::clone(&state),
            cancel.clone(),
            observer,
        ));

        Ok(TungsteniteSocket { state, cancel })
    }
}

async fn run_socket(
    endpoint: String,
    state: Arc<AtomicReadyState>,
    cancel: CancellationToken,
    observer: Arc<dyn ChannelObserver>,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            state.store(ReadyState::Closed);
            observer.on_close(None);
            return;
        }
        result = tokio_tungstenite::connect_async(endpoint.as_str()) => result,
    };

    let ws = match connected {
        Ok((ws, _response)) => ws,
        Err(e) => {
            tracing::warn!(error = %e, "realtime connect failed");
            state.store(ReadyState::Closed);
            observer.on_error(&e.to_string());
            observer.on_close(None);
            return;
        }
    };

    state.store(ReadyState::Open);
    tracing::info!("realtime channel open");
    observer.on_open();

    let (mut sink, mut stream) = ws.split();
    let mut close_reason = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                state.store(ReadyState::Closing);
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => observer.on_event(PushEvent::parse(&text)),
                Some(Ok(Message::Close(frame))) => {
                    close_reason = frame.map(|f| f.reason.into_owned());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "realtime channel dropped");
                    observer.on_error(&e.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    state.store(ReadyState::Closed);
    tracing::info!(reason = close_reason.as_deref(), "realtime channel closed");
    observer.on_close(close_reason);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
