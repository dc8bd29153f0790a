//! Encoding primitives for Lightning key login.
//!
//! This crate provides the pure, I/O-free conversions used by the rest of
//! the workspace:
//!
//! - [`url_token`] -- bech32 (`LNURL1...`) challenge tokens <-> callback URLs
//! - [`hex`] -- hex string <-> byte conversion
//!
//! Every function is deterministic. Malformed input always fails with an
//! [`EncodingError`]; nothing is silently repaired.

mod error;
pub mod hex;
pub mod url_token;

pub use error::EncodingError;
pub use hex::{bytes_to_hex, hex_to_bytes};
pub use url_token::{decode, decode_bytes, encode};
