//! Salted PBKDF2-HMAC-SHA256 password hashes
//!
//! Encoded as `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

use crate::error::{Error, Result};

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Hash a plaintext password with a fresh random salt
pub fn hash_password(plain: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| Error::internal("Failed to generate password salt"))?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(ALGORITHM, ITERATIONS, &salt, plain.as_bytes(), &mut hash);

    Ok(format!(
        "{}${}${}${}",
        SCHEME,
        ITERATIONS,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// Constant-time check of a password against an encoded hash
///
/// Malformed encodings never verify.
pub fn verify_password(plain: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    if scheme != SCHEME {
        return false;
    }
    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash)) else {
        return false;
    };

    pbkdf2::verify(ALGORITHM, iterations, &salt, plain.as_bytes(), &hash).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let encoded = hash_password("correct horse battery").unwrap();
        assert!(encoded.starts_with("pbkdf2-sha256$100000$"));
        assert!(verify_password("correct horse battery", &encoded));
        assert!(!verify_password("wrong password", &encoded));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_never_verifies() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "bcrypt$12$abc$def"));
        assert!(!verify_password("x", "pbkdf2-sha256$0$AAAA$AAAA"));
        assert!(!verify_password("x", "pbkdf2-sha256$10$!!!$AAAA"));
        assert!(!verify_password("x", "pbkdf2-sha256$10$AAAA$AAAA$extra"));
    }
}
