//! Object keys used by the benchmark.

use sha2::{Digest, Sha256};

/// Namespace for all objects written by the benchmark.
///
/// Download and clean rounds list this prefix to find their jobs.
pub const KEY_PREFIX: &str = "s3bench/";

/// Key written and deleted again by the default [`health_check`](crate::Backend::health_check).
pub const HEALTH_CHECK_KEY: &str = "s3bench/test";

/// Derives the content-addressed key of a payload.
///
/// The key is [`KEY_PREFIX`] followed by the hex-encoded SHA-256 digest of the payload, so
/// uploading identical payloads always targets the same object.
pub fn content_key(payload: &[u8]) -> String {
    format!("{KEY_PREFIX}{:x}", Sha256::digest(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_payload_same_key() {
        let first = content_key(b"From: someone\n\nhello");
        let second = content_key(b"From: someone\n\nhello");
        assert_eq!(first, second);
    }

    #[test]
    fn keys_are_namespaced_and_fixed_length() {
        let short = content_key(b"");
        let long = content_key(&[0xAB; 1 << 16]);

        assert!(short.starts_with(KEY_PREFIX));
        assert_eq!(short.len(), KEY_PREFIX.len() + 64);
        assert_eq!(long.len(), short.len());
        assert_ne!(short, long);
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            content_key(b"test"),
            "s3bench/9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }
}
