//! Webhook signature verification
//!
//! The payment provider signs each delivery: `X-Signature` carries
//! lowercase-hex `HMAC-SHA256(secret, raw_request_body)`. The body must be
//! parsed as JSON only after verification succeeds. Comparison is constant
//! time over the decoded MAC bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the expected signature for a body. Used by tests and the webhook
/// replay helper.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify an `X-Signature` header value against the raw body.
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.ct_eq(provided.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] = br#"{"meta":{"event_name":"order_created"}}"#;

    #[test]
    fn test_valid_signature_passes() {
        let signature = sign(SECRET, BODY);
        assert!(verify(SECRET, BODY, &signature));
        // Surrounding whitespace in the header value is tolerated
        assert!(verify(SECRET, BODY, &format!(" {} ", signature)));
    }

    #[test]
    fn test_mutated_body_rejected() {
        let signature = sign(SECRET, BODY);
        let mut mutated = BODY.to_vec();
        mutated[0] ^= 0x01;
        assert!(!verify(SECRET, &mutated, &signature));
    }

    #[test]
    fn test_mutated_signature_rejected() {
        let signature = sign(SECRET, BODY);
        let mut bytes = signature.into_bytes();
        // Flip one hex digit
        bytes[0] = if bytes[0] == b'0' { b'1' } else { b'0' };
        let mutated = String::from_utf8(bytes).unwrap();
        assert!(!verify(SECRET, BODY, &mutated));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signature = sign(SECRET, BODY);
        assert!(!verify("whsec_other", BODY, &signature));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!verify(SECRET, BODY, "not hex at all"));
        assert!(!verify(SECRET, BODY, ""));
    }

    #[test]
    fn test_known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let signature = sign("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            signature,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }
}
