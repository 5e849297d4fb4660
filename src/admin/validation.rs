//! Attribute validation rules.
//!
//! The `data`/`extra` JSON maps of demand-side entities are validated
//! against the adapter identified by the referenced demand source: each
//! adapter declares a required-key set with value-type constraints. Extra
//! keys always pass through untouched. Failure messages are prefixed with
//! the failing field path.

use serde_json::{Map, Value};
use validator::ValidateEmail;

use crate::ad::{SEGMENT_OPERATORS, SegmentFilter};
use crate::adapters;
use crate::error::ValidationErrors;

// ============================================================================
// Adapter-keyed map rules
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    StrList,
    Map,
}

pub type MapRule = (&'static str, ValueKind);

/// Required keys of `DemandSourceAccount.extra` per adapter.
pub fn account_extra_rules(adapter: &str) -> &'static [MapRule] {
    use ValueKind::*;
    match adapter {
        adapters::AMAZON => &[("price_points_map", Map)],
        adapters::APPLOVIN => &[("sdk_key", Str)],
        adapters::BIDMACHINE => &[
            ("seller_id", Str),
            ("endpoint", Str),
            ("mediation_config", StrList),
        ],
        adapters::BIGOADS => &[("publisher_id", Str), ("endpoint", Str)],
        adapters::INMOBI => &[("account_id", Str)],
        adapters::MINTEGRAL => &[("app_key", Str), ("publisher_id", Str)],
        adapters::MOBILEFUSE => &[("publisher_id", Str)],
        adapters::VUNGLE => &[("account_id", Str)],
        _ => &[],
    }
}

/// Required keys of `AppDemandProfile.data` per adapter.
pub fn profile_data_rules(adapter: &str) -> &'static [MapRule] {
    use ValueKind::*;
    match adapter {
        adapters::ADMOB
        | adapters::BIGOADS
        | adapters::DTEXCHANGE
        | adapters::MINTEGRAL
        | adapters::VUNGLE => &[("app_id", Str)],
        adapters::META => &[("app_id", Str), ("app_secret", Str)],
        adapters::UNITYADS => &[("game_id", Str)],
        _ => &[],
    }
}

/// Required keys of `LineItem.extra` per adapter.
pub fn line_item_extra_rules(adapter: &str) -> &'static [MapRule] {
    use ValueKind::*;
    match adapter {
        adapters::ADMOB => &[("ad_unit_id", Str)],
        adapters::AMAZON => &[("slot_uuid", Str)],
        adapters::APPLOVIN => &[("zone_id", Str)],
        adapters::BIGOADS => &[("slot_id", Str)],
        adapters::CHARTBOOST => &[("ad_location", Str)],
        adapters::DTEXCHANGE
        | adapters::INMOBI
        | adapters::META
        | adapters::MOBILEFUSE
        | adapters::UNITYADS
        | adapters::VUNGLE => &[("placement_id", Str)],
        adapters::MINTEGRAL => &[("unit_id", Str), ("placement_id", Str)],
        _ => &[],
    }
}

fn kind_matches(kind: ValueKind, value: &Value) -> bool {
    match kind {
        ValueKind::Str => value.is_string(),
        ValueKind::StrList => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        ValueKind::Map => value.is_object(),
    }
}

fn kind_message(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Str => "must be a string",
        ValueKind::StrList => "must be a list of strings",
        ValueKind::Map => "must be a map",
    }
}

/// Validate a JSON map against an adapter rule set.
///
/// A `None` map passes when the adapter has no requirements and fails
/// otherwise; unknown keys are never rejected.
pub fn validate_adapter_map(
    errors: &mut ValidationErrors,
    field: &str,
    rules: &[MapRule],
    map: Option<&Map<String, Value>>,
) {
    if rules.is_empty() {
        return;
    }

    let Some(map) = map else {
        errors.add(field, "cannot be blank");
        return;
    };

    for (key, kind) in rules {
        let path = format!("{}.{}", field, key);
        match map.get(*key) {
            None | Some(Value::Null) => errors.add(path, "cannot be blank"),
            Some(value) if !kind_matches(*kind, value) => errors.add(path, kind_message(*kind)),
            Some(_) => {}
        }
    }
}

// ============================================================================
// Field rules
// ============================================================================

pub fn validate_email(errors: &mut ValidationErrors, field: &str, value: &str) {
    if !value.validate_email() {
        errors.add(field, "must be a valid email address");
    }
}

pub fn validate_length(errors: &mut ValidationErrors, field: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min || len > max {
        errors.add(field, format!("the length must be between {} and {}", min, max));
    }
}

pub fn validate_segment_filters(errors: &mut ValidationErrors, filters: &[SegmentFilter]) {
    for (i, filter) in filters.iter().enumerate() {
        if !SEGMENT_OPERATORS.contains(&filter.operator.as_str()) {
            errors.add(
                format!("filters.{}.operator", i),
                format!("must be one of {}", SEGMENT_OPERATORS.join(", ")),
            );
        }
        if filter.filter_type.is_empty() {
            errors.add(format!("filters.{}.type", i), "cannot be blank");
        }
    }
}

/// Password-change rules: every failure is reported against the field that
/// caused it so the response message starts with the field name.
pub fn validate_password_change(
    current_password: &str,
    new_password: &str,
    new_password_confirmation: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if current_password.is_empty() {
        errors.add("current_password", "cannot be blank");
    }

    if new_password.is_empty() {
        errors.add("new_password", "cannot be blank");
    } else {
        validate_length(&mut errors, "new_password", new_password, 8, 50);
        if !new_password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.add("new_password", "must include at least one uppercase letter");
        }
        if !new_password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.add("new_password", "must include at least one lowercase letter");
        }
        if !new_password.chars().any(|c| c.is_ascii_digit()) {
            errors.add("new_password", "must include at least one number");
        }
    }

    if new_password_confirmation.is_empty() {
        errors.add("new_password_confirmation", "cannot be blank");
    } else if new_password_confirmation != new_password {
        errors.add(
            "new_password_confirmation",
            "does not match the new password",
        );
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_adapter_without_rules_accepts_nil_map() {
        let mut errors = ValidationErrors::new();
        validate_adapter_map(
            &mut errors,
            "extra",
            account_extra_rules(adapters::CHARTBOOST),
            None,
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_adapter_with_rules_rejects_nil_map() {
        let mut errors = ValidationErrors::new();
        validate_adapter_map(
            &mut errors,
            "extra",
            account_extra_rules(adapters::APPLOVIN),
            None,
        );
        assert_eq!(errors.to_string(), "extra: cannot be blank");
    }

    #[test]
    fn test_required_key_and_type() {
        let mut errors = ValidationErrors::new();
        let extra = map(json!({"seller_id": 42, "endpoint": "https://x.test"}));
        validate_adapter_map(
            &mut errors,
            "extra",
            account_extra_rules(adapters::BIDMACHINE),
            Some(&extra),
        );

        let text = errors.to_string();
        assert!(text.contains("extra.seller_id: must be a string"));
        assert!(text.contains("extra.mediation_config: cannot be blank"));
    }

    #[test]
    fn test_string_list_rule() {
        let mut errors = ValidationErrors::new();
        let extra = map(json!({
            "seller_id": "1",
            "endpoint": "x.appbaqend.com",
            "mediation_config": ["banner", 7],
        }));
        validate_adapter_map(
            &mut errors,
            "extra",
            account_extra_rules(adapters::BIDMACHINE),
            Some(&extra),
        );
        assert_eq!(
            errors.to_string(),
            "extra.mediation_config: must be a list of strings"
        );
    }

    #[test]
    fn test_extra_keys_pass_through() {
        let mut errors = ValidationErrors::new();
        let data = map(json!({"app_id": "123", "anything_else": {"nested": true}}));
        validate_adapter_map(
            &mut errors,
            "data",
            profile_data_rules(adapters::ADMOB),
            Some(&data),
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_password_change_happy_path() {
        assert!(validate_password_change("old", "NewSecret1", "NewSecret1").is_ok());
    }

    #[test]
    fn test_password_change_weak_password_message() {
        let err = validate_password_change("ok", "short", "short").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("new_password: "), "got: {}", text);
        assert!(text.contains("length must be between 8 and 50"));
    }

    #[test]
    fn test_password_change_requires_character_classes() {
        let err = validate_password_change("ok", "alllowercase1", "alllowercase1").unwrap_err();
        assert!(err.to_string().contains("uppercase"));

        let err = validate_password_change("ok", "ALLUPPERCASE1", "ALLUPPERCASE1").unwrap_err();
        assert!(err.to_string().contains("lowercase"));

        let err = validate_password_change("ok", "NoDigitsHere", "NoDigitsHere").unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_password_change_confirmation_mismatch() {
        let err = validate_password_change("ok", "NewSecret1", "Different1").unwrap_err();
        assert!(
            err.to_string()
                .contains("new_password_confirmation: does not match")
        );
    }

    #[test]
    fn test_email_rule() {
        let mut errors = ValidationErrors::new();
        validate_email(&mut errors, "email", "user@apps.test");
        assert!(errors.is_empty());

        validate_email(&mut errors, "email", "not-an-email");
        assert_eq!(errors.to_string(), "email: must be a valid email address");
    }

    #[test]
    fn test_segment_filter_operator_rule() {
        let mut errors = ValidationErrors::new();
        let filters = vec![SegmentFilter {
            filter_type: "country".into(),
            name: String::new(),
            operator: "BETWEEN".into(),
            values: vec![],
        }];
        validate_segment_filters(&mut errors, &filters);
        assert!(errors.to_string().starts_with("filters.0.operator: "));
    }
}
