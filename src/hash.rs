use base64ct::{Base64Url, Encoding};
use hmac::Mac;
use sha2::Sha256;

type HmacSha256 = hmac::Hmac<Sha256>;

/// Keyed SHA-256 HMAC producing base64url digests.
///
/// Used to turn remember tokens, reset tokens and CSRF secrets into values
/// that are safe to store or compare without keeping the secret itself.
#[derive(Clone)]
pub struct Hmac {
    mac: HmacSha256,
}

impl Hmac {
    pub fn new(key: &str) -> Self {
        let mac = HmacSha256::new_from_slice(key.as_bytes())
            .expect("HMAC accepts keys of any length");
        Self { mac }
    }

    pub fn hash(&self, input: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(input.as_bytes());
        Base64Url::encode_string(&mac.finalize().into_bytes())
    }

    /// Constant-time check that `digest` is the HMAC of `input`.
    pub fn verify(&self, input: &str, digest: &str) -> bool {
        let Ok(expected) = Base64Url::decode_vec(digest) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(input.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_per_key() {
        let h = Hmac::new("secret-hmac-key");
        assert_eq!(h.hash("token"), h.hash("token"));
        assert_ne!(h.hash("token"), h.hash("other"));
        assert_ne!(h.hash("token"), Hmac::new("another-key").hash("token"));
    }

    #[test]
    fn hash_is_url_safe_and_not_the_input() {
        let h = Hmac::new("k");
        let digest = h.hash("plain");
        assert_ne!(digest, "plain");
        assert!(!digest.contains('+') && !digest.contains('/'));
        // 32 byte digest, padded base64
        assert_eq!(digest.len(), 44);
    }

    #[test]
    fn verify_matches_hash() {
        let h = Hmac::new("k");
        let digest = h.hash("abc");
        assert!(h.verify("abc", &digest));
        assert!(!h.verify("abd", &digest));
        assert!(!h.verify("abc", "not base64 at all!"));
    }
}
