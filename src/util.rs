//! Small helpers shared by both handshake sides.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha1::{Digest, Sha1};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(SHA1(key + GUID))`, the RFC 6455 accept-key derivation.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(GUID.as_bytes());
    let digest = hasher.finalize();
    STANDARD.encode(digest)
}

/// 16 random bytes, Base64-encoded into the 24-char `Sec-WebSocket-Key`
/// nonce the dialer sends.
pub fn generate_client_key() -> String {
    let bytes: [u8; 16] = rand::random();
    STANDARD.encode(bytes)
}

/// Case-insensitive search for `word` in a comma/space-separated header
/// value, bounded by comma, space, or end-of-string on either side.
/// Mirrors NNG's `ws_contains_word`.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| c == ',' || c.is_whitespace())
        .any(|tok| !tok.is_empty() && tok.eq_ignore_ascii_case(word))
}

/// A `Sec-WebSocket-Key` is well-formed if, after trimming, it is exactly
/// 24 Base64 characters that decode to 16 bytes.
pub fn validate_client_key(key: &str) -> bool {
    let key = key.trim();
    if key.len() != 24 {
        return false;
    }
    matches!(STANDARD.decode(key), Ok(bytes) if bytes.len() == 16)
}
