//! Callback URL construction.
//!
//! The final verification URL is the challenge's base URL with three
//! parameters appended, always in this order and always last:
//!
//! | Param | Value |
//! |-------|-------|
//! | `sig` | DER signature, lowercase hex |
//! | `key` | compressed public key, lowercase hex |
//! | `t` | epoch milliseconds (ordering hint only) |
//!
//! Any `sig`/`key`/`t` already present on the base URL is dropped first, so
//! the result never carries two of them.

use std::time::{SystemTime, UNIX_EPOCH};

use config::constants::{KEY_PARAM, SIG_PARAM, TIMESTAMP_PARAM};
use url::Url;

/// A signed answer to a login challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedResponse {
    /// The nonce that was signed (hex).
    pub nonce: String,

    /// DER signature over the nonce bytes (hex).
    pub signature: String,

    /// Compressed public key of the signer (hex).
    pub public_key: String,

    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl SignedResponse {
    /// Creates a response stamped with the current time.
    pub fn new(nonce: String, signature: String, public_key: String) -> Self {
        Self {
            nonce,
            signature,
            public_key,
            timestamp_ms: now_ms(),
        }
    }
}

/// Builds the callback URL for `response` on top of `base_url`.
pub fn build(base_url: &Url, response: &SignedResponse) -> Url {
    let mut url = base_url.clone();

    let kept: Vec<(String, String)> = base_url
        .query_pairs()
        .filter(|(k, _)| !matches!(&**k, SIG_PARAM | KEY_PARAM | TIMESTAMP_PARAM))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(SIG_PARAM, &response.signature)
        .append_pair(KEY_PARAM, &response.public_key)
        .append_pair(TIMESTAMP_PARAM, &response.timestamp_ms.to_string());

    url
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: &str = "3045022100d20fb87e31b4b793419e91dced9427dcba53115e88601b0093289378ab6524d70220059b4a25a3ccfaa4a43d8397bbf7f7a7ca50c4e7f488251f926e4787baa7d356";
    const KEY: &str = "02a0feac90c424a65e8eae9bef150fd4a3b42cca5b26dcb8a473d4ad1609946622";

    fn response() -> SignedResponse {
        SignedResponse {
            nonce: "abcd".into(),
            signature: SIG.into(),
            public_key: KEY.into(),
            timestamp_ms: 1_234_567_890,
        }
    }

    fn count(url: &Url, key: &str) -> usize {
        url.query_pairs().filter(|(k, _)| k == key).count()
    }

    #[test]
    fn appends_sig_key_t_in_order() {
        let base = Url::parse("https://host/auth?k1=abcd").unwrap();
        let url = build(&base, &response());
        assert_eq!(
            url.as_str(),
            format!("https://host/auth?k1=abcd&sig={SIG}&key={KEY}&t=1234567890")
        );
    }

    #[test]
    fn replaces_existing_params() {
        let base = Url::parse("https://host/auth?sig=old&k1=abcd&t=1&key=old&tag=login").unwrap();
        let url = build(&base, &response());
        assert_eq!(count(&url, "sig"), 1);
        assert_eq!(count(&url, "key"), 1);
        assert_eq!(count(&url, "t"), 1);
        assert_eq!(
            url.as_str(),
            format!("https://host/auth?k1=abcd&tag=login&sig={SIG}&key={KEY}&t=1234567890")
        );
    }

    #[test]
    fn collapses_repeated_params() {
        let base =
            Url::parse("https://host/auth?sig=a&sig=b&k1=abcd&t=1&t=2&key=x&key=y").unwrap();
        let url = build(&base, &response());
        assert_eq!(count(&url, "sig"), 1);
        assert_eq!(count(&url, "key"), 1);
        assert_eq!(count(&url, "t"), 1);
        assert_eq!(
            url.as_str(),
            format!("https://host/auth?k1=abcd&sig={SIG}&key={KEY}&t=1234567890")
        );
    }

    #[test]
    fn works_without_existing_query() {
        let base = Url::parse("https://host/auth").unwrap();
        let url = build(&base, &response());
        assert_eq!(
            url.as_str(),
            format!("https://host/auth?sig={SIG}&key={KEY}&t=1234567890")
        );
    }

    #[test]
    fn base_url_is_not_mutated() {
        let base = Url::parse("https://host/auth?k1=abcd").unwrap();
        let _ = build(&base, &response());
        assert_eq!(base.as_str(), "https://host/auth?k1=abcd");
    }

    #[test]
    fn new_stamps_current_time() {
        let r = SignedResponse::new("00".into(), SIG.into(), KEY.into());
        assert!(r.timestamp_ms > 1_600_000_000_000);
    }
}
