//! Protocol constants shared by the login pipeline.
//!
//! Wire-level names (query parameters, headers, storage keys) live here so
//! the parser, builder and clients can never drift apart.

/// Query parameter carrying the server nonce in a login challenge.
pub const NONCE_PARAM: &str = "k1";

/// Callback query parameter carrying the DER signature (hex).
pub const SIG_PARAM: &str = "sig";

/// Callback query parameter carrying the compressed public key (hex).
pub const KEY_PARAM: &str = "key";

/// Callback query parameter carrying the epoch-millisecond timestamp.
pub const TIMESTAMP_PARAM: &str = "t";

/// Header carrying the device admin token in the node-verification flow.
pub const USER_TOKEN_HEADER: &str = "x-user-token";

/// Fixed challenge string the signing device signs to prove liveness.
pub const SIGNER_CHALLENGE: &str = "U3BoaW54IFZlcmlmaWNhdGlvbg==";

/// Query parameter carrying the realtime client id.
pub const CLIENT_ID_PARAM: &str = "uniqueId";

/// Local storage key under which the realtime client id is persisted.
pub const CLIENT_ID_KEY: &str = "websocket_token";

/// Local storage key under which a generated identity key is persisted.
pub const SECRET_KEY_KEY: &str = "lnauth_secret_key";
