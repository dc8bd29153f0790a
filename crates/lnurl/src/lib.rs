//! LNURL-auth challenge handling.
//!
//! The two pure stages of the login pipeline that sit on either side of
//! signing:
//!
//! | Stage | Entry point | Output |
//! |-------|-------------|--------|
//! | Parse | [`challenge::parse`] | [`ParsedChallenge`]: callback base URL + nonce |
//! | Build | [`callback::build`] | callback URL carrying `sig`, `key`, `t` |
//!
//! Neither stage performs I/O. Submitting the callback is
//! `transport::SessionClient`'s job.

pub mod callback;
pub mod challenge;
mod error;

pub use callback::{SignedResponse, build};
pub use challenge::{ParsedChallenge, parse};
pub use error::ChallengeError;
