use sha2::{Digest, Sha256};

/// Returns `true` if `value` already looks like a SHA-256 digest (64 lowercase
/// or uppercase hex characters), so the TypeSystem's `Password` coercion can
/// avoid re-hashing an already-hashed value.
pub fn looks_like_sha256_digest(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Hashes a password-kind value with SHA-256, hex-encoded, unless it already
/// looks like a 64-hex-char digest.
pub fn hash_password(value: &str) -> String {
    if looks_like_sha256_digest(value) {
        return value.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_plain_value() {
        let hashed = hash_password("hunter2");
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn leaves_existing_digest_alone() {
        let digest = "a".repeat(64);
        assert_eq!(hash_password(&digest), digest);
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(hash_password("same"), hash_password("same"));
        assert_ne!(hash_password("same"), hash_password("different"));
    }
}
