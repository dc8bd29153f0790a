//! Authenticated session handed back to the caller.

use std::fmt;

/// A verified login.
///
/// Built either from a realtime `lnauth_success` push (LNURL flow) or from
/// the device's step-one payload (node-verification flow). Held in memory by
/// the caller until logout; `Debug` prints only the token length.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token issued by the backend.
    pub token: String,

    /// Compressed public key (hex) that proved ownership.
    pub pubkey: String,

    /// Node alias, when the backend or device reports one.
    pub alias: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token_len", &self.token.len())
            .field("pubkey", &self.pubkey)
            .field("alias", &self.alias)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_token() {
        let session = Session {
            token: "secret-jwt".into(),
            pubkey: "02ab".into(),
            alias: Some("node".into()),
        };
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-jwt"));
        assert!(debug.contains("token_len: 10"));
        assert!(debug.contains("02ab"));
    }
}
