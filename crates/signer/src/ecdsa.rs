//! ECDSA signing and verification over secp256k1.
//!
//! Thin wrappers around `bitcoin::secp256k1::ecdsa` for signing raw
//! challenge bytes, plus a unified error type.
//!
//! # Operations
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`sign_digest`] | ECDSA-sign a 32-byte digest |
//! | [`verify_digest`] | Verify signature against a 32-byte digest |
//! | [`sign_raw`] | Map raw bytes onto a digest (no hashing), then sign |
//! | [`verify_raw`] | Map raw bytes onto a digest, then verify |
//!
//! # Raw byte mapping
//!
//! Login nonces are signed as-is, not hashed. ECDSA signs a 256-bit integer,
//! so [`raw_digest`] maps the bytes the way `bits2int` does: up to 32 bytes
//! are left-padded with zeros (same integer value), longer input keeps its
//! leftmost 32 bytes.
//!
//! libsecp256k1 derives nonces per RFC 6979 and always emits low-S
//! signatures, so the same key and bytes give byte-identical DER output.
//!
//! All functions accept a `Secp256k1` context as parameter so callers can
//! share a single context across operations.

use std::fmt;

use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing, Verification};

/// Digest width of secp256k1 ECDSA.
const DIGEST_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors returned by ECDSA operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcdsaError {
    /// The signature does not verify against the given public key and digest.
    VerificationFailed,
    /// The provided bytes are not a valid DER-encoded ECDSA signature.
    InvalidDer,
    /// The provided bytes are not a valid SEC1 public key.
    InvalidPublicKey,
}

impl fmt::Display for EcdsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerificationFailed => write!(f, "ECDSA signature verification failed"),
            Self::InvalidDer => write!(f, "invalid DER-encoded ECDSA signature"),
            Self::InvalidPublicKey => write!(f, "invalid secp256k1 public key"),
        }
    }
}

impl std::error::Error for EcdsaError {}

// ---------------------------------------------------------------------------
// Raw byte mapping
// ---------------------------------------------------------------------------

/// Maps raw message bytes onto a 32-byte ECDSA digest without hashing.
pub fn raw_digest(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    if bytes.len() <= DIGEST_LEN {
        digest[DIGEST_LEN - bytes.len()..].copy_from_slice(bytes);
    } else {
        digest.copy_from_slice(&bytes[..DIGEST_LEN]);
    }
    digest
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// ECDSA-sign a 32-byte digest.
///
/// Zero heap allocations.
pub fn sign_digest(
    secp: &Secp256k1<impl Signing>,
    secret_key: &SecretKey,
    digest: &[u8; DIGEST_LEN],
) -> Signature {
    let msg = Message::from_digest(*digest);
    secp.sign_ecdsa(&msg, secret_key)
}

/// ECDSA-sign raw bytes directly, without hashing them first.
///
/// Equivalent to `sign_digest(secp, sk, &raw_digest(bytes))`.
pub fn sign_raw(secp: &Secp256k1<impl Signing>, secret_key: &SecretKey, bytes: &[u8]) -> Signature {
    sign_digest(secp, secret_key, &raw_digest(bytes))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify an ECDSA signature against a 32-byte digest.
///
/// # Errors
///
/// Returns [`EcdsaError::VerificationFailed`] if the signature is invalid.
pub fn verify_digest(
    secp: &Secp256k1<impl Verification>,
    public_key: &PublicKey,
    digest: &[u8; DIGEST_LEN],
    signature: &Signature,
) -> Result<(), EcdsaError> {
    let msg = Message::from_digest(*digest);
    secp.verify_ecdsa(&msg, signature, public_key)
        .map_err(|_| EcdsaError::VerificationFailed)
}

/// Verify an ECDSA signature over raw bytes (see [`raw_digest`]).
///
/// # Errors
///
/// Returns [`EcdsaError::VerificationFailed`] if the signature is invalid.
pub fn verify_raw(
    secp: &Secp256k1<impl Verification>,
    public_key: &PublicKey,
    bytes: &[u8],
    signature: &Signature,
) -> Result<(), EcdsaError> {
    verify_digest(secp, public_key, &raw_digest(bytes), signature)
}

// ---------------------------------------------------------------------------
// Deserialization helpers
// ---------------------------------------------------------------------------

/// Decode a DER-encoded ECDSA signature.
///
/// # Errors
///
/// Returns [`EcdsaError::InvalidDer`] if the bytes are not valid DER.
pub fn signature_from_der(bytes: &[u8]) -> Result<Signature, EcdsaError> {
    Signature::from_der(bytes).map_err(|_| EcdsaError::InvalidDer)
}

/// Decode a compressed or uncompressed SEC1 public key.
///
/// # Errors
///
/// Returns [`EcdsaError::InvalidPublicKey`] if the bytes are not a curve point.
pub fn public_key_from_slice(bytes: &[u8]) -> Result<PublicKey, EcdsaError> {
    PublicKey::from_slice(bytes).map_err(|_| EcdsaError::InvalidPublicKey)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keypair() -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0xcd; 32]).expect("valid secret key");
        let pk = PublicKey::from_secret_key(&secp, &sk);
        (sk, pk)
    }

    #[test]
    fn raw_digest_left_pads_short_input() {
        let digest = raw_digest(&[0xab, 0xcd]);
        assert_eq!(&digest[..30], &[0u8; 30]);
        assert_eq!(&digest[30..], &[0xab, 0xcd]);
    }

    #[test]
    fn raw_digest_keeps_exact_width() {
        let bytes = [0x5a; 32];
        assert_eq!(raw_digest(&bytes), bytes);
    }

    #[test]
    fn raw_digest_truncates_long_input_from_the_left() {
        let mut bytes = vec![0x11; 32];
        bytes.extend_from_slice(&[0x22; 8]);
        assert_eq!(raw_digest(&bytes), [0x11; 32]);
    }

    #[test]
    fn raw_digest_of_empty_input_is_zero() {
        assert_eq!(raw_digest(&[]), [0u8; 32]);
    }

    #[test]
    fn sign_and_verify_digest() {
        let secp = Secp256k1::new();
        let (sk, pk) = test_keypair();
        let digest = [0xab; 32];

        let sig = sign_digest(&secp, &sk, &digest);
        verify_digest(&secp, &pk, &digest, &sig).expect("should verify");
    }

    #[test]
    fn sign_and_verify_raw() {
        let secp = Secp256k1::new();
        let (sk, pk) = test_keypair();

        let sig = sign_raw(&secp, &sk, &[0xab, 0xcd]);
        verify_raw(&secp, &pk, &[0xab, 0xcd], &sig).expect("should verify");
    }

    #[test]
    fn sign_raw_is_deterministic() {
        let secp = Secp256k1::new();
        let (sk, _pk) = test_keypair();

        let a = sign_raw(&secp, &sk, b"same nonce");
        let b = sign_raw(&secp, &sk, b"same nonce");
        assert_eq!(a.serialize_der(), b.serialize_der());
    }

    #[test]
    fn wrong_bytes_fail_verification() {
        let secp = Secp256k1::new();
        let (sk, pk) = test_keypair();

        let sig = sign_raw(&secp, &sk, &[0x01]);
        let result = verify_raw(&secp, &pk, &[0x02], &sig);

        assert_eq!(result, Err(EcdsaError::VerificationFailed));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let secp = Secp256k1::new();
        let (sk, _pk) = test_keypair();
        let other_sk = SecretKey::from_slice(&[0xef; 32]).expect("valid");
        let other_pk = PublicKey::from_secret_key(&secp, &other_sk);

        let sig = sign_raw(&secp, &sk, b"test");
        let result = verify_raw(&secp, &other_pk, b"test", &sig);

        assert_eq!(result, Err(EcdsaError::VerificationFailed));
    }

    #[test]
    fn signatures_are_low_s() {
        let secp = Secp256k1::new();
        let (sk, _pk) = test_keypair();

        for i in 0u8..16 {
            let sig = sign_raw(&secp, &sk, &[i; 4]);
            let mut normalized = sig;
            normalized.normalize_s();
            assert_eq!(sig, normalized);
        }
    }

    #[test]
    fn der_roundtrip() {
        let secp = Secp256k1::new();
        let (sk, pk) = test_keypair();

        let sig = sign_raw(&secp, &sk, b"roundtrip test");
        let der = sig.serialize_der();
        let recovered = signature_from_der(&der).expect("valid DER");

        verify_raw(&secp, &pk, b"roundtrip test", &recovered).expect("should verify");
    }

    #[test]
    fn invalid_der_rejected() {
        assert_eq!(signature_from_der(b"garbage"), Err(EcdsaError::InvalidDer));
    }

    #[test]
    fn invalid_public_key_rejected() {
        assert_eq!(
            public_key_from_slice(&[0x02; 10]),
            Err(EcdsaError::InvalidPublicKey)
        );
    }

    #[test]
    fn error_display() {
        assert_eq!(
            EcdsaError::VerificationFailed.to_string(),
            "ECDSA signature verification failed"
        );
    }
}
