//! Transport error type.

use std::fmt;

use storage::StorageError;

/// Errors from the HTTP and realtime transports.
///
/// Device rejections are not errors: they surface as
/// [`SubmitOutcome::Rejected`](crate::SubmitOutcome) or
/// [`VerificationState::Failed`](crate::VerificationState).
#[derive(Debug)]
pub enum TransportError {
    /// The peer could not be reached, or the connection broke mid-request.
    Network(String),

    /// An endpoint URL could not be constructed.
    InvalidEndpoint { url: String, reason: String },

    /// The persisted client id could not be read or written.
    Storage(StorageError),

    /// A socket was requested outside a tokio runtime.
    NoRuntime,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(detail) => write!(f, "network error: {detail}"),
            Self::InvalidEndpoint { url, reason } => {
                write!(f, "invalid endpoint '{url}': {reason}")
            }
            Self::Storage(e) => write!(f, "client id storage: {e}"),
            Self::NoRuntime => write!(f, "no tokio runtime available for the socket task"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for TransportError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
