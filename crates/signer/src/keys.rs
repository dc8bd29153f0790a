//! Login identities: key pairs and where they come from.
//!
//! | Source | Key material | Persistence |
//! |--------|--------------|-------------|
//! | [`DeterministicSeedKeySource`] | `SHA-256(seed)` | none, rederived on every call |
//! | [`PersistedSecureKeySource`] | OS CSPRNG | hex in a [`LocalStore`], written before first use |
//!
//! The seed-derived source exists for bootstrap and test identities: anyone
//! who knows the phrase knows the key. Production logins use the persisted
//! source.

use std::fmt;
use std::sync::Mutex;

use bitcoin::hashes::{Hash, sha256};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use codec::{bytes_to_hex, hex_to_bytes};
use storage::{LocalStore, StorageError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors produced while obtaining a key pair.
#[derive(Debug)]
pub enum KeyError {
    /// The candidate scalar is zero or not below the curve order.
    InvalidScalar,
    /// The backing store failed, or held a value that is not a valid key.
    Storage(StorageError),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScalar => write!(f, "scalar is zero or exceeds the curve order"),
            Self::Storage(e) => write!(f, "key storage: {e}"),
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::InvalidScalar => None,
        }
    }
}

impl From<StorageError> for KeyError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// KeyPair
// ---------------------------------------------------------------------------

/// A secp256k1 identity with its compressed public key precomputed.
///
/// `Debug` never prints the secret scalar.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Builds a key pair from a secret key, computing `scalar * G`.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Returns the secret key.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Returns the public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns the 33-byte compressed SEC1 public key as lowercase hex.
    pub fn public_key_hex(&self) -> String {
        bytes_to_hex(&self.public_key.serialize())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Derives a key pair from a human-readable seed phrase.
///
/// The secret scalar is `SHA-256(UTF-8(seed))` read as a big-endian integer.
///
/// # Errors
///
/// Returns [`KeyError::InvalidScalar`] if the hash is zero or not below the
/// curve order (probability ~2^-128).
pub fn derive_key_pair(seed: &str) -> Result<KeyPair, KeyError> {
    let hash = sha256::Hash::hash(seed.as_bytes());
    let secret_key =
        SecretKey::from_slice(hash.as_byte_array()).map_err(|_| KeyError::InvalidScalar)?;
    Ok(KeyPair::from_secret_key(secret_key))
}

// ---------------------------------------------------------------------------
// KeySource
// ---------------------------------------------------------------------------

/// Provides the identity used to sign login challenges.
///
/// Signing and callback construction never know which source produced the
/// key.
pub trait KeySource: Send + Sync {
    /// Returns the key pair for this identity.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the key cannot be derived or loaded.
    fn key_pair(&self) -> Result<KeyPair, KeyError>;
}

/// Reproducible identity derived from a seed phrase.
pub struct DeterministicSeedKeySource {
    seed: String,
}

impl DeterministicSeedKeySource {
    /// Creates a source for the given seed phrase.
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }
}

impl fmt::Debug for DeterministicSeedKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeterministicSeedKeySource")
            .finish_non_exhaustive()
    }
}

impl KeySource for DeterministicSeedKeySource {
    fn key_pair(&self) -> Result<KeyPair, KeyError> {
        derive_key_pair(&self.seed)
    }
}

/// Random identity generated once and kept in a [`LocalStore`].
///
/// The first call draws a scalar from the OS CSPRNG and persists its hex
/// encoding before returning. Later calls reload it. A stored value that does
/// not decode to a valid scalar is reported as
/// [`StorageError::Corrupt`], never overwritten.
pub struct PersistedSecureKeySource<S> {
    store: S,
    storage_key: &'static str,
    lock: Mutex<()>,
}

impl<S: LocalStore> PersistedSecureKeySource<S> {
    /// Creates a source persisting under [`config::constants::SECRET_KEY_KEY`].
    pub fn new(store: S) -> Self {
        Self::with_storage_key(store, config::constants::SECRET_KEY_KEY)
    }

    /// Creates a source persisting under a custom storage key.
    pub fn with_storage_key(store: S, storage_key: &'static str) -> Self {
        Self {
            store,
            storage_key,
            lock: Mutex::new(()),
        }
    }

    fn load(&self, stored: &str) -> Result<KeyPair, KeyError> {
        let corrupt = |reason: String| StorageError::Corrupt {
            key: self.storage_key.to_owned(),
            reason,
        };
        let bytes = hex_to_bytes(stored).map_err(|e| corrupt(e.to_string()))?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| corrupt("not a valid scalar".into()))?;
        Ok(KeyPair::from_secret_key(secret_key))
    }
}

impl<S: LocalStore> KeySource for PersistedSecureKeySource<S> {
    fn key_pair(&self) -> Result<KeyPair, KeyError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;

        if let Some(stored) = self.store.get(self.storage_key)? {
            if !stored.is_empty() {
                return self.load(&stored);
            }
        }

        let secret_key = SecretKey::new(&mut rand::rngs::OsRng);
        self.store
            .set(self.storage_key, &bytes_to_hex(&secret_key.secret_bytes()))?;

        let pair = KeyPair::from_secret_key(secret_key);
        tracing::info!(pubkey = %pair.public_key_hex(), "generated new login identity");
        Ok(pair)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storage::InMemoryStore;

    const SEED: &str = "lnurl+test+auth";
    const SEED_PUBKEY: &str = "02a0feac90c424a65e8eae9bef150fd4a3b42cca5b26dcb8a473d4ad1609946622";

    #[test]
    fn derive_matches_known_pubkey() {
        let pair = derive_key_pair(SEED).expect("valid seed");
        assert_eq!(pair.public_key_hex(), SEED_PUBKEY);
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive_key_pair("any phrase").unwrap();
        let b = derive_key_pair("any phrase").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, derive_key_pair("other phrase").unwrap());
    }

    #[test]
    fn public_key_hex_is_compressed() {
        let hex = derive_key_pair(SEED).unwrap().public_key_hex();
        assert_eq!(hex.len(), 66);
        assert!(hex.starts_with("02") || hex.starts_with("03"));
    }

    #[test]
    fn debug_hides_secret() {
        let pair = derive_key_pair(SEED).unwrap();
        let secret_hex = bytes_to_hex(&pair.secret_key().secret_bytes());
        let debug = format!("{pair:?}");
        assert!(debug.contains(SEED_PUBKEY));
        assert!(!debug.contains(&secret_hex));
    }

    #[test]
    fn seed_source_uses_seed() {
        let source = DeterministicSeedKeySource::new(SEED);
        assert_eq!(source.key_pair().unwrap().public_key_hex(), SEED_PUBKEY);
        assert!(!format!("{source:?}").contains(SEED));
    }

    #[test]
    fn persisted_source_generates_then_reuses() {
        let store = Arc::new(InMemoryStore::new());
        let source = PersistedSecureKeySource::new(Arc::clone(&store));

        let first = source.key_pair().expect("generate");
        let stored = store
            .get(config::constants::SECRET_KEY_KEY)
            .unwrap()
            .expect("persisted before return");
        assert_eq!(stored, bytes_to_hex(&first.secret_key().secret_bytes()));

        let second = source.key_pair().expect("reload");
        assert_eq!(first, second);

        let fresh_source = PersistedSecureKeySource::new(Arc::clone(&store));
        assert_eq!(fresh_source.key_pair().unwrap(), first);
    }

    #[test]
    fn persisted_source_replaces_empty_value() {
        let store = Arc::new(InMemoryStore::new());
        store.set(config::constants::SECRET_KEY_KEY, "").unwrap();

        let source = PersistedSecureKeySource::new(Arc::clone(&store));
        let pair = source.key_pair().unwrap();
        let stored = store.get(config::constants::SECRET_KEY_KEY).unwrap().unwrap();
        assert_eq!(stored, bytes_to_hex(&pair.secret_key().secret_bytes()));
    }

    #[test]
    fn persisted_source_rejects_corrupt_value() {
        let store = Arc::new(InMemoryStore::new());
        store.set("custom_key", "not-hex").unwrap();

        let source = PersistedSecureKeySource::with_storage_key(Arc::clone(&store), "custom_key");
        let err = source.key_pair().unwrap_err();
        assert!(matches!(
            err,
            KeyError::Storage(StorageError::Corrupt { ref key, .. }) if key == "custom_key"
        ));
        assert_eq!(
            store.get("custom_key").unwrap().as_deref(),
            Some("not-hex"),
            "corrupt value must not be overwritten"
        );
    }

    #[test]
    fn persisted_source_rejects_zero_scalar() {
        let store = InMemoryStore::new();
        store
            .set(config::constants::SECRET_KEY_KEY, &"00".repeat(32))
            .unwrap();
        let source = PersistedSecureKeySource::new(store);
        assert!(matches!(
            source.key_pair(),
            Err(KeyError::Storage(StorageError::Corrupt { .. }))
        ));
    }
}
