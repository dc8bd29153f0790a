//! Hex <-> byte conversion.
//!
//! Encoding always produces lowercase digits. Decoding accepts either case
//! but rejects odd-length input and non-hex characters outright -- a
//! corrupted nonce must never be signed as if it were valid.

use crate::EncodingError;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Decodes a hex string into bytes.
///
/// # Errors
///
/// - [`EncodingError::OddLength`] if `hex` has an odd number of characters.
/// - [`EncodingError::InvalidHexDigit`] on the first non-hex character.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, EncodingError> {
    let raw = hex.as_bytes();
    if raw.len() % 2 != 0 {
        return Err(EncodingError::OddLength);
    }

    let mut out = Vec::with_capacity(raw.len() / 2);
    for (i, pair) in raw.chunks_exact(2).enumerate() {
        let hi = nibble(pair[0]).ok_or(EncodingError::InvalidHexDigit { position: 2 * i })?;
        let lo = nibble(pair[1]).ok_or(EncodingError::InvalidHexDigit {
            position: 2 * i + 1,
        })?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

/// Encodes bytes as a lowercase hex string, two digits per byte.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0x0f) as usize] as char);
    }
    s
}

fn nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_even_length_lowercase_hex() {
        // Walk every byte value plus a few multi-byte strings.
        for b in 0u8..=255 {
            let h = format!("{b:02x}");
            assert_eq!(bytes_to_hex(&hex_to_bytes(&h).unwrap()), h);
        }
        for h in ["", "00", "abcd", "deadbeef00ff", "0123456789abcdef"] {
            assert_eq!(bytes_to_hex(&hex_to_bytes(h).unwrap()), h);
        }
    }

    #[test]
    fn odd_length_is_rejected() {
        for h in ["a", "abc", "00000", "0123456789abcdef0"] {
            assert_eq!(hex_to_bytes(h), Err(EncodingError::OddLength));
        }
    }

    #[test]
    fn odd_length_error_message() {
        let err = hex_to_bytes("abc").unwrap_err();
        assert_eq!(err.to_string(), "Hex string must have an even length");
    }

    #[test]
    fn invalid_digit_reports_position() {
        assert_eq!(
            hex_to_bytes("00zz"),
            Err(EncodingError::InvalidHexDigit { position: 2 })
        );
        assert_eq!(
            hex_to_bytes("0g"),
            Err(EncodingError::InvalidHexDigit { position: 1 })
        );
    }

    #[test]
    fn uppercase_input_decodes() {
        assert_eq!(hex_to_bytes("ABCD").unwrap(), vec![0xab, 0xcd]);
    }

    #[test]
    fn single_digit_bytes_are_zero_padded() {
        assert_eq!(bytes_to_hex(&[0x00, 0x01, 0x0a]), "00010a");
    }
}
