//! Scriptable in-process transports.
//!
//! Available under `cfg(test)` and the `mock` feature, so downstream crates
//! can drive the login pipeline without a network:
//!
//! | Type | Stands in for |
//! |------|---------------|
//! | [`MockHttp`] | [`ReqwestTransport`](crate::ReqwestTransport) |
//! | [`MockSocketFactory`] / [`MockSocket`] | [`TungsteniteFactory`](crate::TungsteniteFactory) |
//! | [`RecordingObserver`] | an application [`ChannelObserver`] |

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::realtime::AtomicReadyState;
use crate::{
    ChannelObserver, HttpRequest, HttpResponse, HttpTransport, PushEvent, ReadyState, Socket,
    SocketFactory, TransportError,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// HTTP transport that replays scripted responses in order and records
/// every request it sees.
///
/// An exhausted script answers with [`TransportError::Network`].
#[derive(Debug, Default)]
pub struct MockHttp {
    script: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn respond(&self, status: u16, body: impl Into<String>) -> &Self {
        lock(&self.script).push_back(Ok(HttpResponse {
            status,
            body: body.into(),
        }));
        self
    }

    /// Queues a network failure.
    pub fn fail(&self, reason: impl Into<String>) -> &Self {
        lock(&self.script).push_back(Err(reason.into()));
        self
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl HttpTransport for MockHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(request);
        match lock(&self.script).pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(TransportError::Network(reason)),
            None => Err(TransportError::Network("no scripted response".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

struct MockSocketInner {
    state: AtomicReadyState,
    observer: Arc<dyn ChannelObserver>,
}

/// Socket whose lifecycle is driven by the test.
#[derive(Clone)]
pub struct MockSocket {
    inner: Arc<MockSocketInner>,
}

impl MockSocket {
    /// Completes the handshake: OPEN, then `on_open`.
    pub fn open(&self) {
        self.inner.state.store(ReadyState::Open);
        self.inner.observer.on_open();
    }

    /// Delivers a text frame.
    pub fn push(&self, text: &str) {
        self.inner.observer.on_event(PushEvent::parse(text));
    }

    /// Simulates the server dropping the connection.
    pub fn drop_connection(&self, reason: Option<&str>) {
        self.inner.state.store(ReadyState::Closed);
        self.inner.observer.on_close(reason.map(str::to_owned));
    }
}

impl Socket for MockSocket {
    fn ready_state(&self) -> ReadyState {
        self.inner.state.load()
    }

    fn close(&self) {
        self.inner.state.store(ReadyState::Closed);
    }
}

/// Factory that counts constructions and hands out [`MockSocket`]s.
pub struct MockSocketFactory {
    open_on_connect: bool,
    constructions: AtomicUsize,
    endpoints: Mutex<Vec<Url>>,
    sockets: Mutex<Vec<MockSocket>>,
}

impl MockSocketFactory {
    /// Sockets report OPEN as soon as they are constructed.
    pub fn opening() -> Self {
        Self::new(true)
    }

    /// Sockets stay CONNECTING until [`MockSocket::open`] is called.
    pub fn connecting() -> Self {
        Self::new(false)
    }

    fn new(open_on_connect: bool) -> Self {
        Self {
            open_on_connect,
            constructions: AtomicUsize::new(0),
            endpoints: Mutex::new(Vec::new()),
            sockets: Mutex::new(Vec::new()),
        }
    }

    /// Number of connection attempts made.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Endpoints of every attempt, oldest first.
    pub fn endpoints(&self) -> Vec<Url> {
        lock(&self.endpoints).clone()
    }

    /// The most recently constructed socket.
    pub fn last_socket(&self) -> Option<MockSocket> {
        lock(&self.sockets).last().cloned()
    }
}

impl SocketFactory for MockSocketFactory {
    type Socket = MockSocket;

    fn connect(
        &self,
        endpoint: &Url,
        observer: Arc<dyn ChannelObserver>,
    ) -> Result<MockSocket, TransportError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        lock(&self.endpoints).push(endpoint.clone());

        let socket = MockSocket {
            inner: Arc::new(MockSocketInner {
                state: AtomicReadyState::new(ReadyState::Connecting),
                observer,
            }),
        };
        if self.open_on_connect {
            socket.open();
        }
        lock(&self.sockets).push(socket.clone());
        Ok(socket)
    }
}

/// Observer that records everything it is told.
#[derive(Default)]
pub struct RecordingObserver {
    opens: AtomicUsize,
    closes: AtomicUsize,
    errors: AtomicUsize,
    events: Mutex<Vec<PushEvent>>,
}

impl RecordingObserver {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<PushEvent> {
        lock(&self.events).clone()
    }
}

impl ChannelObserver for RecordingObserver {
    fn on_open(&self) {
        self.opens.fetch_add(1, Ordering::SeqCst);
    }

    fn on_event(&self, event: PushEvent) {
        lock(&self.events).push(event);
    }

    fn on_close(&self, _reason: Option<String>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}
