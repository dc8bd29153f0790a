//! Transport layer for Lightning key login.
//!
//! Everything that touches the network lives here, behind two seams:
//!
//! | Seam | Production impl | Used by |
//! |------|-----------------|---------|
//! | [`HttpTransport`] | [`ReqwestTransport`] | [`SessionClient`], [`NodeVerification`] |
//! | [`SocketFactory`] | [`TungsteniteFactory`] | [`RealtimeChannel`] |
//!
//! # Feature flags
//!
//! - **`mock`**: exposes [`mock`], scriptable in-process implementations of
//!   both seams for downstream tests.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session_client`] | LNURL-auth callback submission |
//! | [`verify`] | node-verification saga against an external signing device |
//! | [`realtime`] | persistent websocket keyed by a stored client id |
//! | [`session`] | the [`Session`] produced by either flow |

mod error;
pub mod http;
pub mod realtime;
pub mod session;
pub mod session_client;
pub mod verify;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::TransportError;
pub use http::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use realtime::{
    ChannelObserver, LoginSuccess, NoopObserver, PushEvent, ReadyState, RealtimeChannel, Socket,
    SocketFactory, TungsteniteFactory, TungsteniteSocket,
};
pub use session::Session;
pub use session_client::{SessionClient, SubmitOutcome};
pub use verify::{NodeVerification, VerificationRequest, VerificationState, VerificationStep};
