//! Nonce signer for login challenges.

use std::fmt;

use bitcoin::secp256k1::{Secp256k1, SignOnly};
use codec::{EncodingError, bytes_to_hex, hex_to_bytes};

use crate::ecdsa::{self, EcdsaError};
use crate::keys::KeyPair;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors produced while signing or verifying a hex nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    /// The nonce, signature or public key was not valid hex.
    Encoding(EncodingError),
    /// Signature decoding or verification failed.
    Ecdsa(EcdsaError),
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "encoding: {e}"),
            Self::Ecdsa(e) => write!(f, "ecdsa: {e}"),
        }
    }
}

impl std::error::Error for SignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Ecdsa(e) => Some(e),
        }
    }
}

impl From<EncodingError> for SignError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

impl From<EcdsaError> for SignError {
    fn from(e: EcdsaError) -> Self {
        Self::Ecdsa(e)
    }
}

// ---------------------------------------------------------------------------
// LnurlSigner
// ---------------------------------------------------------------------------

/// Signs server nonces with a login identity.
///
/// Holds the pre-serialized compressed public key. The
/// [`Secp256k1<SignOnly>`] context is much cheaper than a full verification
/// context.
pub struct LnurlSigner {
    key_pair: KeyPair,
    public_key: [u8; 33],
    secp: Secp256k1<SignOnly>,
}

impl LnurlSigner {
    /// Creates a signer for the given identity.
    pub fn new(key_pair: KeyPair) -> Self {
        let public_key = key_pair.public_key().serialize();
        Self {
            key_pair,
            public_key,
            secp: Secp256k1::signing_only(),
        }
    }

    /// Returns the identity this signer uses.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Returns the compressed public key as lowercase hex.
    pub fn public_key_hex(&self) -> String {
        bytes_to_hex(&self.public_key)
    }

    /// Signs a hex-encoded nonce, returning the DER signature as lowercase hex.
    ///
    /// The decoded nonce bytes are signed directly (see
    /// [`ecdsa::raw_digest`]). Identical inputs always yield identical output.
    ///
    /// # Errors
    ///
    /// Returns [`SignError::Encoding`] if `nonce_hex` is not even-length hex.
    pub fn sign(&self, nonce_hex: &str) -> Result<String, SignError> {
        let nonce = hex_to_bytes(nonce_hex)?;
        let sig = ecdsa::sign_raw(&self.secp, self.key_pair.secret_key(), &nonce);
        tracing::debug!(nonce_len = nonce.len(), "signed login nonce");
        Ok(bytes_to_hex(&sig.serialize_der()))
    }
}

/// Verifies a hex DER signature over a hex nonce against a hex public key.
///
/// # Errors
///
/// - [`SignError::Encoding`] if any argument is not valid hex.
/// - [`SignError::Ecdsa`] if the key or signature is malformed, or the
///   signature does not verify.
pub fn verify(nonce_hex: &str, sig_hex: &str, pubkey_hex: &str) -> Result<(), SignError> {
    let nonce = hex_to_bytes(nonce_hex)?;
    let sig = ecdsa::signature_from_der(&hex_to_bytes(sig_hex)?)?;
    let public_key = ecdsa::public_key_from_slice(&hex_to_bytes(pubkey_hex)?)?;

    let secp = Secp256k1::verification_only();
    ecdsa::verify_raw(&secp, &public_key, &nonce, &sig)?;
    Ok(())
}
