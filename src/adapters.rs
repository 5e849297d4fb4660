//! Demand-source adapter registry.
//!
//! Adapters are identified by short stable string keys stored in the
//! `demand_sources.api_key` column. Attribute validators key their shape
//! rules off these values.

pub const ADMOB: &str = "admob";
pub const AMAZON: &str = "amazon";
pub const APPLOVIN: &str = "applovin";
pub const BIDMACHINE: &str = "bidmachine";
pub const BIGOADS: &str = "bigoads";
pub const CHARTBOOST: &str = "chartboost";
pub const DTEXCHANGE: &str = "dtexchange";
pub const INMOBI: &str = "inmobi";
pub const META: &str = "meta";
pub const MINTEGRAL: &str = "mintegral";
pub const MOBILEFUSE: &str = "mobilefuse";
pub const UNITYADS: &str = "unityads";
pub const VUNGLE: &str = "vungle";

// Sorted alphabetically
pub const ALL: &[&str] = &[
    ADMOB, AMAZON, APPLOVIN, BIDMACHINE, BIGOADS, CHARTBOOST, DTEXCHANGE, INMOBI, META, MINTEGRAL,
    MOBILEFUSE, UNITYADS, VUNGLE,
];

pub fn is_known(key: &str) -> bool {
    ALL.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_sorted_and_unique() {
        let mut sorted = ALL.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, ALL);
    }

    #[test]
    fn test_is_known() {
        assert!(is_known("applovin"));
        assert!(!is_known("acme_ads"));
    }
}
