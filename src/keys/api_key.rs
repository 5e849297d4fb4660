//! Self-describing API key token format.
//!
//! Layout (56 characters, upper-case RFC 4648 base32 without padding):
//!
//! ```text
//! BDNM_ || base32(11 bytes entropy) || base32(16 bytes uuid) || base32(crc32)
//!   5   ||         18 digits        ||        26 digits      ||   7 digits
//! ```
//!
//! The CRC32 (IEEE) covers every preceding character as text, so any
//! single-character corruption is caught before the embedded UUID is
//! decoded and trusted anywhere else. The UUID is the primary key of the
//! stored key row; the entropy digits make the token itself unguessable
//! even with a predictable UUIDv7.

use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

pub const PREFIX: &str = "BDNM_";

const ENTROPY_BYTES: usize = 11;
const ENTROPY_DIGITS: usize = 18;
const UUID_DIGITS: usize = 26;
const CHECKSUM_DIGITS: usize = 7;

/// Total token length: 5 + 18 + 26 + 7.
pub const KEY_LENGTH: usize = PREFIX.len() + ENTROPY_DIGITS + UUID_DIGITS + CHECKSUM_DIGITS;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum ApiKeyError {
    #[error("invalid API key length")]
    InvalidLength,

    #[error("invalid API key prefix")]
    InvalidPrefix,

    #[error("invalid API key checksum")]
    InvalidChecksum,

    #[error("invalid API key encoding")]
    InvalidEncoding,
}

/// Cheap shape test used by the request authenticator to route a bearer
/// token to API key resolution instead of JWT parsing.
pub fn looks_like_api_key(token: &str) -> bool {
    token.len() == KEY_LENGTH && token.starts_with(PREFIX)
}

/// Issue a new token embedding `id`, with fresh CSPRNG entropy.
pub fn new_api_key(id: Uuid) -> anyhow::Result<String> {
    let mut entropy = [0u8; ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|e| anyhow::anyhow!("read entropy: {e}"))?;

    let mut key = String::with_capacity(KEY_LENGTH);
    key.push_str(PREFIX);
    key.push_str(&BASE32_NOPAD.encode(&entropy));
    key.push_str(&BASE32_NOPAD.encode(id.as_bytes()));

    let checksum = crc32fast::hash(key.as_bytes());
    key.push_str(&BASE32_NOPAD.encode(&checksum.to_be_bytes()));

    debug_assert_eq!(key.len(), KEY_LENGTH);
    Ok(key)
}

/// Extract the embedded UUID after verifying length, prefix and checksum,
/// in that order.
pub fn parse_api_key(key: &str) -> Result<Uuid, ApiKeyError> {
    if key.len() != KEY_LENGTH {
        return Err(ApiKeyError::InvalidLength);
    }
    if !key.starts_with(PREFIX) {
        return Err(ApiKeyError::InvalidPrefix);
    }

    let (payload, checksum_digits) = key.split_at(KEY_LENGTH - CHECKSUM_DIGITS);

    let decoded = BASE32_NOPAD
        .decode(checksum_digits.as_bytes())
        .map_err(|_| ApiKeyError::InvalidChecksum)?;
    let checksum_bytes: [u8; 4] = decoded
        .as_slice()
        .try_into()
        .map_err(|_| ApiKeyError::InvalidChecksum)?;

    if crc32fast::hash(payload.as_bytes()) != u32::from_be_bytes(checksum_bytes) {
        return Err(ApiKeyError::InvalidChecksum);
    }

    let uuid_digits = &payload[PREFIX.len() + ENTROPY_DIGITS..];
    let uuid_bytes = BASE32_NOPAD
        .decode(uuid_digits.as_bytes())
        .map_err(|_| ApiKeyError::InvalidEncoding)?;

    Uuid::from_slice(&uuid_bytes).map_err(|_| ApiKeyError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let id = Uuid::now_v7();
        let key = new_api_key(id).unwrap();

        assert_eq!(key.len(), KEY_LENGTH);
        assert!(key.starts_with(PREFIX));
        assert_eq!(parse_api_key(&key).unwrap(), id);
    }

    #[test]
    fn test_known_key() {
        let key = "BDNM_B3BOWM3E622ME5W2BYAESOAUZVQB22NFZ6UVXHV6FZDMOZUM7VY";
        let id = parse_api_key(key).unwrap();
        assert_eq!(
            id,
            Uuid::parse_str("0124e053-3580-75a6-973e-a56e7af8b91b").unwrap()
        );
    }

    #[test]
    fn test_empty_key() {
        assert_eq!(parse_api_key(""), Err(ApiKeyError::InvalidLength));
    }

    #[test]
    fn test_wrong_prefix() {
        let key = new_api_key(Uuid::now_v7()).unwrap();
        let key = format!("XXXX_{}", &key[PREFIX.len()..]);
        assert_eq!(parse_api_key(&key), Err(ApiKeyError::InvalidPrefix));
    }

    #[test]
    fn test_any_single_char_flip_is_caught() {
        let id = Uuid::now_v7();
        let key = new_api_key(id).unwrap();

        for i in PREFIX.len()..key.len() {
            let mut corrupted: Vec<u8> = key.bytes().collect();
            corrupted[i] = if corrupted[i] == b'A' { b'B' } else { b'A' };
            let corrupted = String::from_utf8(corrupted).unwrap();
            if corrupted == key {
                continue;
            }

            let err = parse_api_key(&corrupted).unwrap_err();
            assert_ne!(
                err,
                ApiKeyError::InvalidLength,
                "flip at {} must fail checksum or encoding, not length",
                i
            );
        }
    }

    #[test]
    fn test_looks_like_api_key() {
        let key = new_api_key(Uuid::now_v7()).unwrap();
        assert!(looks_like_api_key(&key));
        assert!(!looks_like_api_key("Bearer-token"));
        assert!(!looks_like_api_key(""));
    }
}
