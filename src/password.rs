//! Password hashing and verification.
//!
//! Hashes are argon2id with fixed parameters (t=1, m=64 MiB, p=4, 32-byte
//! key) over a 16-byte CSPRNG salt, stored as
//! `base64(salt)$base64(key)` without padding. Verification recomputes the
//! hash with the stored salt and compares in constant time; the super-user
//! check compares both halves of the credential pair in constant time as
//! well, so neither length nor content leaks through timing.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

const TIME_COST: u32 = 1;
const MEMORY_COST_KIB: u32 = 64 * 1024;
const PARALLELISM: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The stored value is not `salt$key`.
    #[error("invalid password hash")]
    InvalidHashFormat,

    #[error("read salt: {0}")]
    Rng(rand::Error),

    #[error("derive key: {0}")]
    Kdf(argon2::Error),
}

fn kdf() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(KEY_LEN))
        .map_err(PasswordError::Kdf)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_with_salt(password: &str, salt: &[u8]) -> Result<String, PasswordError> {
    let mut key = [0u8; KEY_LEN];
    kdf()?
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(PasswordError::Kdf)?;

    Ok(format!(
        "{}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(key)
    ))
}

/// Hash a password with a fresh salt. Fails only if the CSPRNG does.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt).map_err(PasswordError::Rng)?;

    hash_with_salt(password, &salt)
}

/// Check `candidate` against a stored `salt$key` hash.
pub fn verify_password(stored: &str, candidate: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(salt_b64), Some(_), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PasswordError::InvalidHashFormat);
    };

    let salt = STANDARD_NO_PAD
        .decode(salt_b64)
        .map_err(|_| PasswordError::InvalidHashFormat)?;

    let recomputed = hash_with_salt(candidate, &salt)?;
    Ok(recomputed.as_bytes().ct_eq(stored.as_bytes()).into())
}

/// Constant-time comparison of a credential pair against the configured
/// super-user. Empty configuration disables the super-user entirely.
pub fn is_super_user(login: &str, password: &str, expected_login: &str, expected_password: &str) -> bool {
    if expected_login.is_empty() || expected_password.is_empty() {
        return false;
    }

    let login_ok = login.as_bytes().ct_eq(expected_login.as_bytes());
    let password_ok = password.as_bytes().ct_eq(expected_password.as_bytes());
    (login_ok & password_ok).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret-Passw0rd").unwrap();
        assert!(verify_password(&hash, "s3cret-Passw0rd").unwrap());
        assert!(!verify_password(&hash, "s3cret-passw0rd").unwrap());
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_password("x").unwrap();
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(STANDARD_NO_PAD.decode(parts[0]).unwrap().len(), SALT_LEN);
        assert_eq!(STANDARD_NO_PAD.decode(parts[1]).unwrap().len(), KEY_LEN);
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_an_error_not_a_panic() {
        assert!(matches!(
            verify_password("nope", "x"),
            Err(PasswordError::InvalidHashFormat)
        ));
        assert!(matches!(
            verify_password("a$b$c", "x"),
            Err(PasswordError::InvalidHashFormat)
        ));
    }

    #[test]
    fn test_super_user_compare() {
        assert!(is_super_user("root", "toor", "root", "toor"));
        assert!(!is_super_user("root", "wrong", "root", "toor"));
        assert!(!is_super_user("wrong", "toor", "root", "toor"));
        // Unequal lengths must not panic.
        assert!(!is_super_user("r", "toor-very-long", "root", "toor"));
        // Empty configuration disables the check.
        assert!(!is_super_user("", "", "", ""));
    }
}
