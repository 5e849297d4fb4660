//! End-to-end invariants of the API key token format.

use mediation_admin::keys::api_key::{
    ApiKeyError, KEY_LENGTH, PREFIX, looks_like_api_key, new_api_key, parse_api_key,
};
use uuid::Uuid;

#[test]
fn issued_keys_round_trip_for_many_uuids() {
    for _ in 0..100 {
        let id = Uuid::now_v7();
        let key = new_api_key(id).expect("issue key");

        assert_eq!(key.len(), KEY_LENGTH);
        assert!(key.starts_with(PREFIX));
        assert!(looks_like_api_key(&key));
        assert_eq!(parse_api_key(&key).expect("parse key"), id);
    }
}

#[test]
fn known_uuid_produces_expected_shape() {
    let id = Uuid::parse_str("0124e053-3580-75a6-973e-a56e7af8b91b").unwrap();
    let key = new_api_key(id).unwrap();

    assert_eq!(key.len(), 56);
    assert!(key.starts_with("BDNM_"));
    // Payload is upper-case unpadded base32 throughout.
    assert!(
        key[PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    );
    assert_eq!(parse_api_key(&key).unwrap(), id);
}

#[test]
fn corrupting_any_character_is_detected() {
    let id = Uuid::now_v7();
    let key = new_api_key(id).unwrap();

    // Substituting every position with every base32 character is the
    // exhaustive version of "any bit flip fails the checksum".
    for i in PREFIX.len()..key.len() {
        for replacement in "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".chars() {
            let mut corrupted = key.clone();
            corrupted.replace_range(i..i + 1, &replacement.to_string());
            if corrupted == key {
                continue;
            }

            match parse_api_key(&corrupted) {
                Err(ApiKeyError::InvalidChecksum) | Err(ApiKeyError::InvalidEncoding) => {}
                Err(other) => panic!("unexpected error at {}: {:?}", i, other),
                Ok(parsed) => panic!(
                    "corruption at {} went undetected, parsed {}",
                    i, parsed
                ),
            }
        }
    }
}

#[test]
fn truncation_and_extension_fail_on_length() {
    let key = new_api_key(Uuid::now_v7()).unwrap();

    assert_eq!(parse_api_key(""), Err(ApiKeyError::InvalidLength));
    assert_eq!(
        parse_api_key(&key[..key.len() - 1]),
        Err(ApiKeyError::InvalidLength)
    );
    assert_eq!(
        parse_api_key(&format!("{}A", key)),
        Err(ApiKeyError::InvalidLength)
    );
}

#[test]
fn foreign_prefix_is_rejected_before_decoding() {
    let key = new_api_key(Uuid::now_v7()).unwrap();
    let foreign = format!("ACME_{}", &key[5..]);
    assert_eq!(parse_api_key(&foreign), Err(ApiKeyError::InvalidPrefix));
}
