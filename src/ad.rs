//! Shared ad-domain vocabulary: ad types, platforms, line item formats and
//! segment filters.
//!
//! Enums are stored as SMALLINT columns; the `from_i16`/`as_i16` pairs are
//! the only place the numeric mapping lives.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    Banner,
    Interstitial,
    Rewarded,
}

impl AdType {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(Self::Banner),
            2 => Some(Self::Interstitial),
            3 => Some(Self::Rewarded),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Self::Banner => 1,
            Self::Interstitial => 2,
            Self::Rewarded => 3,
        }
    }

    /// Parse a query-parameter value. Unknown values count as "not provided".
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "banner" => Some(Self::Banner),
            "interstitial" => Some(Self::Interstitial),
            "rewarded" => Some(Self::Rewarded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Ios,
    Android,
}

impl Platform {
    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => Self::Ios,
            2 => Self::Android,
            _ => Self::Unknown,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Ios => 1,
            Self::Android => 2,
        }
    }
}

/// Creative format of a line item. Stored as upper-case text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineItemFormat {
    Banner,
    Leaderboard,
    Mrec,
    Adaptive,
}

impl LineItemFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Banner => "BANNER",
            Self::Leaderboard => "LEADERBOARD",
            Self::Mrec => "MREC",
            Self::Adaptive => "ADAPTIVE",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "BANNER" => Some(Self::Banner),
            "LEADERBOARD" => Some(Self::Leaderboard),
            "MREC" => Some(Self::Mrec),
            "ADAPTIVE" => Some(Self::Adaptive),
            _ => None,
        }
    }
}

/// One clause of a segment rule set. Clauses are ANDed in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentFilter {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub name: String,
    pub operator: String,
    pub values: Vec<String>,
}

/// Operators recognized by the segment matcher.
pub const SEGMENT_OPERATORS: &[&str] = &["IN", "NOT IN", "==", "!="];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ad_type_i16_round_trip() {
        for ad_type in [AdType::Banner, AdType::Interstitial, AdType::Rewarded] {
            assert_eq!(AdType::from_i16(ad_type.as_i16()), Some(ad_type));
        }
        assert_eq!(AdType::from_i16(99), None);
    }

    #[test]
    fn test_ad_type_from_param() {
        assert_eq!(AdType::from_param("banner"), Some(AdType::Banner));
        assert_eq!(AdType::from_param("BANNER"), None);
        assert_eq!(AdType::from_param(""), None);
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in [Platform::Unknown, Platform::Ios, Platform::Android] {
            assert_eq!(Platform::from_i16(platform.as_i16()), platform);
        }
        // Unrecognized values degrade to Unknown instead of failing reads.
        assert_eq!(Platform::from_i16(42), Platform::Unknown);
    }

    #[test]
    fn test_platform_serde_names() {
        assert_eq!(serde_json::to_string(&Platform::Ios).unwrap(), "\"ios\"");
        assert_eq!(serde_json::to_string(&Platform::Unknown).unwrap(), "\"\"");
        assert_eq!(
            serde_json::from_str::<Platform>("\"android\"").unwrap(),
            Platform::Android
        );
    }

    #[test]
    fn test_segment_filter_serde() {
        let json = r#"{"type":"country","name":"","operator":"IN","values":["US","CA"]}"#;
        let filter: SegmentFilter = serde_json::from_str(json).unwrap();
        assert_eq!(filter.filter_type, "country");
        assert_eq!(filter.values, vec!["US", "CA"]);
        assert!(SEGMENT_OPERATORS.contains(&filter.operator.as_str()));
    }
}
