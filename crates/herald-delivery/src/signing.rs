//! HMAC-SHA256 webhook payload signing.
//!
//! Each webhook carries a hex-encoded signature over
//! `"{unix_timestamp}.{raw_body}"` so receivers can verify authenticity
//! and reject replays of stale timestamps. Verification helpers are
//! exported for receivers and tests.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex-encoded payload signature.
pub const SIGNATURE_HEADER: &str = "X-Herald-Signature";

/// Header carrying the unix timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Herald-Timestamp";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8]) -> HmacSha256 {
    // HMAC-SHA256 accepts keys of any length, so this cannot fail for
    // real input; the fallback keeps the signature deterministic anyway.
    HmacSha256::new_from_slice(secret)
        .unwrap_or_else(|_| HmacSha256::new_from_slice(b"herald").expect("hmac"))
}

/// Computes the hex signature for a payload at a timestamp.
pub fn sign(secret: &[u8], timestamp: u64, payload: &[u8]) -> String {
    let mut mac = mac_for(secret);
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a received hex signature in constant time.
pub fn verify(secret: &[u8], timestamp: u64, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = mac_for(secret);
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

/// Freshness check receivers apply before trusting a timestamp.
pub fn is_timestamp_fresh(timestamp_secs: u64, now_secs: u64, max_age_secs: u64) -> bool {
    now_secs >= timestamp_secs && now_secs - timestamp_secs <= max_age_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_round_trip() {
        let signature = sign(b"secret", 1_700_000_000, b"{\"a\":1}");
        assert!(verify(b"secret", 1_700_000_000, b"{\"a\":1}", &signature));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signature = sign(b"secret", 1_700_000_000, b"{\"a\":1}");
        assert!(!verify(b"secret", 1_700_000_000, b"{\"a\":2}", &signature));
    }

    #[test]
    fn shifted_timestamp_fails_verification() {
        let signature = sign(b"secret", 1_700_000_000, b"{\"a\":1}");
        assert!(!verify(b"secret", 1_700_000_001, b"{\"a\":1}", &signature));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signature = sign(b"secret", 1_700_000_000, b"{\"a\":1}");
        assert!(!verify(b"other", 1_700_000_000, b"{\"a\":1}", &signature));
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!(!verify(b"secret", 1_700_000_000, b"{}", "not-hex"));
    }

    #[test]
    fn timestamp_freshness_window() {
        assert!(is_timestamp_fresh(100, 100, 300));
        assert!(is_timestamp_fresh(100, 400, 300));
        assert!(!is_timestamp_fresh(100, 401, 300));
        assert!(!is_timestamp_fresh(200, 100, 300), "future timestamps are stale");
    }
}
