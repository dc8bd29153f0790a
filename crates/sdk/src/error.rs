//! SDK error types.
//!
//! [`AuthError`] is the unified error type for the login pipeline. Each
//! variant wraps the component error it came from, available through
//! [`std::error::Error::source`].

use std::fmt;

use codec::EncodingError;
use lnurl::ChallengeError;
use signer::{KeyError, SignError};
use transport::TransportError;

// ---------------------------------------------------------------------------
// AuthError
// ---------------------------------------------------------------------------

/// Errors from login operations.
///
/// Device and service refusals are not errors; they come back as
/// [`transport::SubmitOutcome::Rejected`] or
/// [`transport::VerificationState::Failed`].
#[derive(Debug)]
pub enum AuthError {
    /// The context has been shut down.
    Cancelled,

    /// The challenge token or a hex value is malformed.
    Encoding(EncodingError),

    /// The decoded challenge is not a usable callback URL.
    MalformedChallenge(String),

    /// The identity key could not be derived or loaded.
    Key(KeyError),

    /// The nonce could not be signed.
    Signing(SignError),

    /// A network call failed.
    Transport(TransportError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "session context cancelled"),
            Self::Encoding(e) => write!(f, "encoding error: {e}"),
            Self::MalformedChallenge(detail) => write!(f, "malformed challenge: {detail}"),
            Self::Key(e) => write!(f, "key error: {e}"),
            Self::Signing(e) => write!(f, "signing failed: {e}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Key(e) => Some(e),
            Self::Signing(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Cancelled | Self::MalformedChallenge(_) => None,
        }
    }
}

impl From<ChallengeError> for AuthError {
    fn from(e: ChallengeError) -> Self {
        match e {
            ChallengeError::Encoding(e) => Self::Encoding(e),
            ChallengeError::Malformed(detail) => Self::MalformedChallenge(detail),
        }
    }
}

impl From<KeyError> for AuthError {
    fn from(e: KeyError) -> Self {
        Self::Key(e)
    }
}

impl From<SignError> for AuthError {
    fn from(e: SignError) -> Self {
        match e {
            SignError::Encoding(e) => Self::Encoding(e),
            other => Self::Signing(other),
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
