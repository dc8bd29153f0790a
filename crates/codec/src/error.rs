//! Codec error type.

use std::fmt;

/// Errors from bech32 and hex decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The hex string has an odd number of characters.
    OddLength,

    /// A character outside `[0-9a-fA-F]` was found at the given byte offset.
    InvalidHexDigit { position: usize },

    /// The bech32 string failed to parse or its checksum is wrong.
    Bech32(String),

    /// The bech32 token exceeds the maximum decode length.
    TooLong(usize),

    /// The bech32 human-readable part is not `lnurl`.
    UnexpectedHrp(String),

    /// The decoded payload is not valid UTF-8.
    InvalidUtf8,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OddLength => write!(f, "Hex string must have an even length"),
            Self::InvalidHexDigit { position } => {
                write!(f, "invalid hex digit at position {position}")
            }
            Self::Bech32(e) => write!(f, "bech32 error: {e}"),
            Self::TooLong(len) => write!(
                f,
                "bech32 token is {len} characters, limit is {}",
                crate::url_token::MAX_TOKEN_LEN
            ),
            Self::UnexpectedHrp(hrp) => write!(f, "unexpected bech32 prefix: {hrp}"),
            Self::InvalidUtf8 => write!(f, "decoded payload is not valid UTF-8"),
        }
    }
}

impl std::error::Error for EncodingError {}
