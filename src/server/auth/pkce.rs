use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure PKCE code verifier
///
/// The verifier is a random string of 43-128 characters using unreserved characters
/// defined in RFC 3986: [A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"
///
/// This implementation generates a 43-character verifier (32 random bytes base64url encoded),
/// which carries 256 bits of entropy - far beyond what could be brute-forced from the
/// challenge within the authorization code's usable lifetime.
pub fn generate_code_verifier() -> String {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    Base64UrlUnpadded::encode_string(&random_bytes)
}

/// Derive a PKCE code challenge from a code verifier using the S256 method
///
/// code_challenge = BASE64URL(SHA256(ASCII(code_verifier)))
pub fn derive_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let hash = hasher.finalize();
    Base64UrlUnpadded::encode_string(&hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_verifier_length() {
        let verifier = generate_code_verifier();
        // 32 bytes base64url encoded = 43 characters
        assert_eq!(verifier.len(), 43);
        // Verify it only contains valid base64url characters
        assert!(verifier
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_code_verifier_randomness() {
        let v1 = generate_code_verifier();
        let v2 = generate_code_verifier();
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_code_challenge_deterministic() {
        let verifier = "test_verifier_123";
        let challenge1 = derive_code_challenge(verifier);
        let challenge2 = derive_code_challenge(verifier);
        assert_eq!(challenge1, challenge2);
    }

    #[test]
    fn test_code_challenge_unique() {
        let challenge1 = derive_code_challenge("verifier1");
        let challenge2 = derive_code_challenge("verifier2");
        assert_ne!(challenge1, challenge2);
    }

    #[test]
    fn test_code_challenge_is_unpadded_sha256_digest() {
        // A SHA-256 digest is 32 bytes, which base64url-encodes to 43 characters
        // without padding. The verifier itself must not be recoverable, so the
        // only mechanical assertion is on the digest's shape.
        let challenge = derive_code_challenge(&generate_code_verifier());
        assert_eq!(challenge.len(), 43);
        assert!(!challenge.contains('='));
        assert!(challenge
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_'));
    }
}
