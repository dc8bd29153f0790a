//! Challenge parsing.
//!
//! Turns whatever the server handed out (a bech32 token, a `lightning:` URI,
//! a `keyauth://` link or a plain URL) into the callback base URL and the
//! nonce to sign.
//!
//! ```text
//! LNURL1DP68...  --decode-->  https://host/auth?tag=login&k1=<hex>&action=login
//!                 --remap-->  (sandbox hosts rewritten, path + query kept)
//!                 --extract-> base_url, nonce = k1, tag, action
//! ```

use codec::url_token;
use config::HostRemap;
use config::constants::NONCE_PARAM;
use url::Url;

use crate::ChallengeError;

const TAG_PARAM: &str = "tag";
const ACTION_PARAM: &str = "action";
const KEYAUTH_SCHEME: &str = "keyauth";

// ---------------------------------------------------------------------------
// ParsedChallenge
// ---------------------------------------------------------------------------

/// A decoded login challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChallenge {
    /// Callback URL after sandbox remapping, query intact.
    pub base_url: Url,

    /// Hex nonce from the `k1` parameter; empty if the server sent none.
    pub nonce: String,

    /// LNURL `tag` (normally `login`), if present.
    pub tag: Option<String>,

    /// LNURL-auth `action` (`register`, `login`, `link`, `auth`), if present.
    pub action: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a raw challenge, applying the first matching host remap.
///
/// A missing nonce is tolerated and yields an empty string; the server will
/// reject the resulting callback.
///
/// # Errors
///
/// - [`ChallengeError::Encoding`] if the bech32 token is invalid.
/// - [`ChallengeError::Malformed`] if the payload is not UTF-8, not a URL,
///   has no host, or uses a scheme other than HTTP(S).
pub fn parse(raw: &str, remaps: &[HostRemap]) -> Result<ParsedChallenge, ChallengeError> {
    let bytes = url_token::decode_bytes(raw)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| ChallengeError::Malformed("payload is not valid UTF-8".into()))?;

    let mut url = parse_target(&text)?;

    if let Some(remap) = url.host_str().and_then(|h| remaps.iter().find(|r| r.matches(h))) {
        apply_remap(&mut url, remap)?;
    }

    let mut nonce = None;
    let mut tag = None;
    let mut action = None;
    for (key, value) in url.query_pairs() {
        match &*key {
            NONCE_PARAM if nonce.is_none() => nonce = Some(value.into_owned()),
            TAG_PARAM if tag.is_none() => tag = Some(value.into_owned()),
            ACTION_PARAM if action.is_none() => action = Some(value.into_owned()),
            _ => {}
        }
    }

    if nonce.is_none() {
        tracing::warn!(host = url.host_str().unwrap_or_default(), "challenge carries no nonce");
    }

    tracing::debug!(
        host = url.host_str().unwrap_or_default(),
        path = url.path(),
        tag = tag.as_deref(),
        action = action.as_deref(),
        "parsed login challenge"
    );

    Ok(ParsedChallenge {
        base_url: url,
        nonce: nonce.unwrap_or_default(),
        tag,
        action,
    })
}

/// Parses the decoded text as an HTTP(S) URL.
///
/// `keyauth://` links are rewritten to `https://`, or `http://` for onion
/// hosts.
fn parse_target(text: &str) -> Result<Url, ChallengeError> {
    let url = Url::parse(text).map_err(|e| ChallengeError::Malformed(e.to_string()))?;

    let url = if url.scheme() == KEYAUTH_SCHEME {
        let scheme = match url.host_str() {
            Some(host) if host.ends_with(".onion") => "http",
            _ => "https",
        };
        let rest = &url.as_str()[KEYAUTH_SCHEME.len()..];
        Url::parse(&format!("{scheme}{rest}"))
            .map_err(|e| ChallengeError::Malformed(e.to_string()))?
    } else {
        url
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ChallengeError::Malformed(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ChallengeError::Malformed("URL has no host".into()));
    }
    Ok(url)
}

fn apply_remap(url: &mut Url, remap: &HostRemap) -> Result<(), ChallengeError> {
    let bad = || ChallengeError::Malformed(format!("bad remap target '{}'", remap.replacement));

    let (host, port) = split_host_port(remap.replacement).ok_or_else(bad)?;
    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| bad()))
        .transpose()?;

    let original = url.host_str().unwrap_or_default().to_owned();
    url.set_host(Some(host))
        .map_err(|e| ChallengeError::Malformed(e.to_string()))?;
    if port.is_some() {
        url.set_port(port)
            .map_err(|()| ChallengeError::Malformed("cannot set port".into()))?;
    }

    tracing::debug!(from = %original, to = remap.replacement, "remapped sandbox host");
    Ok(())
}

/// Splits `host`, `host:port`, `[v6]` or `[v6]:port`. `None` if a bracketed
/// host is unterminated or followed by anything but a port.
fn split_host_port(target: &str) -> Option<(&str, Option<&str>)> {
    if target.starts_with('[') {
        let end = target.find(']')?;
        let (host, rest) = target.split_at(end + 1);
        return match rest {
            "" => Some((host, None)),
            _ => rest.strip_prefix(':').map(|port| (host, Some(port))),
        };
    }
    Some(match target.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (target, None),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use codec::EncodingError;

    const REMAPS: [HostRemap; 2] = [
        HostRemap {
            pattern: "docker.internal",
            replacement: "localhost",
        },
        HostRemap {
            pattern: "backend",
            replacement: "127.0.0.1:5002",
        },
    ];

    const NONCE: &str = "e2af6254a8df433264fa23f67eb8188635d15ce883e8fc020989d5f82ae6f11e";

    #[test]
    fn parses_literal_url() {
        let raw = format!("https://host/auth?tag=login&k1={NONCE}&action=login");
        let parsed = parse(&raw, &[]).unwrap();
        assert_eq!(parsed.base_url.as_str(), raw);
        assert_eq!(parsed.nonce, NONCE);
        assert_eq!(parsed.tag.as_deref(), Some("login"));
        assert_eq!(parsed.action.as_deref(), Some("login"));
    }

    #[test]
    fn parses_bech32_token() {
        let token = codec::encode("https://host/auth?tag=login&k1=abcd&action=login").unwrap();
        let parsed = parse(&token, &[]).unwrap();
        assert_eq!(parsed.base_url.host_str(), Some("host"));
        assert_eq!(parsed.nonce, "abcd");
    }

    #[test]
    fn parses_lightning_uri() {
        let token = codec::encode("https://host/auth?k1=abcd").unwrap();
        let parsed = parse(&format!("lightning:{token}"), &[]).unwrap();
        assert_eq!(parsed.nonce, "abcd");
    }

    #[test]
    fn missing_nonce_is_empty() {
        let parsed = parse("https://host/auth?tag=login", &[]).unwrap();
        assert_eq!(parsed.nonce, "");
        assert_eq!(parsed.action, None);
    }

    #[test]
    fn remap_replaces_subdomain_host_keeping_path_and_query() {
        let raw = format!("http://host.docker.internal:8080/api/auth?k1={NONCE}&tag=login");
        let parsed = parse(&raw, &REMAPS).unwrap();
        assert_eq!(
            parsed.base_url.as_str(),
            format!("http://localhost:8080/api/auth?k1={NONCE}&tag=login")
        );
        assert_eq!(parsed.nonce, NONCE);
    }

    #[test]
    fn remap_with_port_overrides_port() {
        let parsed = parse("http://backend/auth?k1=00", &REMAPS).unwrap();
        assert_eq!(parsed.base_url.as_str(), "http://127.0.0.1:5002/auth?k1=00");
    }

    #[test]
    fn first_matching_remap_wins() {
        let remaps = [
            HostRemap {
                pattern: "internal",
                replacement: "first",
            },
            HostRemap {
                pattern: "docker.internal",
                replacement: "second",
            },
        ];
        let parsed = parse("http://host.docker.internal/auth", &remaps).unwrap();
        assert_eq!(parsed.base_url.host_str(), Some("first"));
    }

    #[test]
    fn unmatched_host_untouched() {
        let parsed = parse("https://example.com/auth?k1=00", &REMAPS).unwrap();
        assert_eq!(parsed.base_url.as_str(), "https://example.com/auth?k1=00");
    }

    #[test]
    fn keyauth_becomes_https() {
        let parsed = parse("keyauth://site.com/login?k1=00", &[]).unwrap();
        assert_eq!(parsed.base_url.as_str(), "https://site.com/login?k1=00");
    }

    #[test]
    fn keyauth_onion_becomes_http() {
        let parsed = parse("keyauth://abc.onion/login?k1=00", &[]).unwrap();
        assert_eq!(parsed.base_url.scheme(), "http");
    }

    #[test]
    fn keyauth_payload_with_surrounding_whitespace() {
        let token = codec::encode("\nkeyauth://host/?k1=00").unwrap();
        let parsed = parse(&token, &[]).unwrap();
        assert_eq!(parsed.base_url.as_str(), "https://host/?k1=00");
        assert_eq!(parsed.nonce, "00");
    }

    #[test]
    fn uppercase_keyauth_scheme() {
        let token = codec::encode("KEYAUTH://Site.com/login?k1=00").unwrap();
        let parsed = parse(&token, &[]).unwrap();
        assert_eq!(parsed.base_url.as_str(), "https://site.com/login?k1=00");
    }

    #[test]
    fn remap_to_ipv6_host() {
        let remaps = [
            HostRemap {
                pattern: "backend",
                replacement: "[::1]",
            },
            HostRemap {
                pattern: "api",
                replacement: "[::1]:5002",
            },
        ];
        let parsed = parse("http://backend:8080/auth?k1=00", &remaps).unwrap();
        assert_eq!(parsed.base_url.as_str(), "http://[::1]:8080/auth?k1=00");

        let parsed = parse("http://api/auth?k1=00", &remaps).unwrap();
        assert_eq!(parsed.base_url.as_str(), "http://[::1]:5002/auth?k1=00");
    }

    #[test]
    fn malformed_remap_target_is_rejected() {
        let remaps = [HostRemap {
            pattern: "backend",
            replacement: "[::1",
        }];
        assert!(matches!(
            parse("http://backend/auth?k1=00", &remaps),
            Err(ChallengeError::Malformed(_))
        ));
    }

    #[test]
    fn split_host_port_forms() {
        assert_eq!(split_host_port("localhost"), Some(("localhost", None)));
        assert_eq!(split_host_port("127.0.0.1:5002"), Some(("127.0.0.1", Some("5002"))));
        assert_eq!(split_host_port("[::1]"), Some(("[::1]", None)));
        assert_eq!(split_host_port("[::1]:80"), Some(("[::1]", Some("80"))));
        assert_eq!(split_host_port("[::1]x"), None);
    }

    #[test]
    fn invalid_token_is_encoding_error() {
        assert!(matches!(
            parse("LNURL1INVALID", &[]),
            Err(ChallengeError::Encoding(EncodingError::Bech32(_)))
        ));
    }

    #[test]
    fn non_utf8_payload_is_malformed() {
        let hrp = bech32::Hrp::parse("lnurl").unwrap();
        let token = bech32::encode::<bech32::Bech32>(hrp, &[0xff, 0xfe]).unwrap();
        assert!(matches!(parse(&token, &[]), Err(ChallengeError::Malformed(_))));
    }

    #[test]
    fn non_url_payload_is_malformed() {
        let token = codec::encode("just some text").unwrap();
        assert!(matches!(parse(&token, &[]), Err(ChallengeError::Malformed(_))));
    }

    #[test]
    fn unsupported_scheme_is_malformed() {
        let token = codec::encode("ftp://host/auth?k1=00").unwrap();
        assert_eq!(
            parse(&token, &[]),
            Err(ChallengeError::Malformed("unsupported scheme 'ftp'".into()))
        );
    }
}
