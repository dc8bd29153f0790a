//! Challenge parsing errors.

use std::fmt;

use codec::EncodingError;

/// Errors produced while turning a raw challenge into a callback target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    /// The bech32 token (or its hex content) is malformed.
    Encoding(EncodingError),

    /// The decoded payload is not UTF-8, not a URL, or not an HTTP(S) target.
    Malformed(String),
}

impl fmt::Display for ChallengeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "challenge encoding: {e}"),
            Self::Malformed(detail) => write!(f, "malformed challenge: {detail}"),
        }
    }
}

impl std::error::Error for ChallengeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Malformed(_) => None,
        }
    }
}

impl From<EncodingError> for ChallengeError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}
