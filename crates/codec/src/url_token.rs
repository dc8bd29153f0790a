//! Bech32 challenge tokens.
//!
//! A login challenge is a callback URL. Servers hand it to wallets either
//! literally or packed into a bech32 token so it fits a QR code:
//!
//! ```text
//! LNURL1DP68GURN8GHJ7UM9WFMXJCM99E3K7MF0V9CXJ0M385EKVCENXC6R2C35XVUKXEFCV5MKVV34X5EKZD3EV56NYD3HXQURZEPEXEJXXEPNXSCRVWFNV9NXZCN9XQ6XYEFHVGCXXCMYXYMNSERXFQ5FNS
//! ```
//!
//! The HRP is `lnurl`; the data part is the UTF-8 URL in 5-bit words
//! followed by a 6-character checksum.
//!
//! | Input | Result |
//! |-------|--------|
//! | `https://...` / `http://...` / `keyauth://...` | returned unchanged |
//! | `lightning:LNURL1...` | scheme stripped, then bech32-decoded |
//! | `LNURL1...` / `lnurl1...` | bech32-decoded |
//! | mixed-case bech32 | rejected |
//!
//! Tokens longer than [`MAX_TOKEN_LEN`] characters are rejected before any
//! checksum work, matching the limit wallets apply.

use std::borrow::Cow;

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};

use crate::EncodingError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Human-readable part of a login challenge token.
pub const HRP_LNURL: &str = "lnurl";

/// Maximum accepted token length in characters (the bech32 code length).
pub const MAX_TOKEN_LEN: usize = 1023;

/// URI scheme wallets prepend to tokens in QR payloads.
const LIGHTNING_SCHEME: &str = "lightning:";

/// Schemes that mark the input as a literal URL rather than a token.
const LITERAL_SCHEMES: [&str; 3] = ["https://", "http://", "keyauth://"];

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes a challenge into its callback URL string.
///
/// Literal URLs pass through unchanged; bech32 tokens are decoded and the
/// payload is read as UTF-8.
///
/// # Errors
///
/// Everything [`decode_bytes`] rejects, plus [`EncodingError::InvalidUtf8`]
/// when the payload is not text.
pub fn decode(challenge: &str) -> Result<String, EncodingError> {
    let bytes = decode_bytes(challenge)?;
    String::from_utf8(bytes).map_err(|_| EncodingError::InvalidUtf8)
}

/// Decodes a challenge into the raw payload bytes, without UTF-8 checks.
///
/// # Errors
///
/// - [`EncodingError::TooLong`] if the token exceeds [`MAX_TOKEN_LEN`].
/// - [`EncodingError::Bech32`] for mixed case, bad characters or a bad checksum.
/// - [`EncodingError::UnexpectedHrp`] if the prefix is not [`HRP_LNURL`].
pub fn decode_bytes(challenge: &str) -> Result<Vec<u8>, EncodingError> {
    let input = strip_lightning_scheme(challenge.trim());

    if is_literal_url(input) {
        return Ok(input.as_bytes().to_vec());
    }

    if input.len() > MAX_TOKEN_LEN {
        return Err(EncodingError::TooLong(input.len()));
    }

    let has_upper = input.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = input.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        return Err(EncodingError::Bech32("mixed-case string".into()));
    }

    let normalized: Cow<'_, str> = if has_upper {
        Cow::Owned(input.to_ascii_lowercase())
    } else {
        Cow::Borrowed(input)
    };

    let checked = CheckedHrpstring::new::<Bech32>(&normalized)
        .map_err(|e| EncodingError::Bech32(e.to_string()))?;

    let hrp = checked.hrp();
    if hrp.as_str() != HRP_LNURL {
        return Err(EncodingError::UnexpectedHrp(hrp.as_str().to_owned()));
    }

    Ok(checked.byte_iter().collect())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Packs a callback URL into an uppercase `LNURL1...` token.
///
/// # Errors
///
/// Returns [`EncodingError::Bech32`] if the URL is too long to encode.
pub fn encode(url: &str) -> Result<String, EncodingError> {
    let hrp = Hrp::parse(HRP_LNURL).map_err(|e| EncodingError::Bech32(e.to_string()))?;
    bech32::encode_upper::<Bech32>(hrp, url.as_bytes())
        .map_err(|e| EncodingError::Bech32(e.to_string()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_lightning_scheme(s: &str) -> &str {
    match s.get(..LIGHTNING_SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(LIGHTNING_SCHEME) => {
            &s[LIGHTNING_SCHEME.len()..]
        }
        _ => s,
    }
}

fn is_literal_url(s: &str) -> bool {
    LITERAL_SCHEMES.iter().any(|scheme| {
        s.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
