//! Identities and signing for Lightning key login.
//!
//! This crate provides:
//!
//! - [`keys`] -- [`KeyPair`], seed derivation and the [`KeySource`] trait
//! - [`ecdsa`] -- ECDSA sign/verify primitives over secp256k1 raw bytes
//! - [`LnurlSigner`] -- signs hex nonces into hex DER signatures
//! - [`verify`] -- checks a hex signature against a hex nonce and key
//!
//! # Design
//!
//! [`KeySource`] is the seam: where the key lives (derived from a seed, or
//! generated and persisted) is hidden behind it, and [`LnurlSigner`] signs
//! with whatever key pair it hands out.

pub mod ecdsa;
pub mod keys;
mod nonce;

pub use keys::{
    DeterministicSeedKeySource, KeyError, KeyPair, KeySource, PersistedSecureKeySource,
    derive_key_pair,
};
pub use nonce::{LnurlSigner, SignError, verify};
