//! Per-partner admission limits.

use std::collections::BTreeMap;
use std::time::Duration;

use super::{env_millis, env_or};

pub const DEFAULT_KEY: &str = "default";
pub const PARTNER_KEYS: [&str; 3] = ["mart", "convenience", "online"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerLimits {
    pub rate_per_second: u32,
    pub burst: u32,
    pub max_concurrent: usize,
    pub max_wait: Duration,
}

impl PartnerLimits {
    const fn new(rate_per_second: u32, max_concurrent: usize, max_wait_ms: u64) -> Self {
        Self {
            rate_per_second,
            burst: rate_per_second,
            max_concurrent,
            max_wait: Duration::from_millis(max_wait_ms),
        }
    }

    fn defaults_for(key: &str) -> Self {
        match key {
            "mart" => Self::new(100, 100, 500),
            "convenience" => Self::new(200, 200, 300),
            "online" => Self::new(50, 50, 1000),
            _ => Self::new(50, 50, 500),
        }
    }

    /// Overrides from `RATE_LIMIT_<KEY>_*` and `BULKHEAD_<KEY>_*`.
    fn from_env(key: &str) -> anyhow::Result<Self> {
        let defaults = Self::defaults_for(key);
        let upper = key.to_ascii_uppercase();
        Ok(Self {
            rate_per_second: env_or(&format!("RATE_LIMIT_{}_RATE", upper), defaults.rate_per_second)?,
            burst: env_or(&format!("RATE_LIMIT_{}_BURST", upper), defaults.burst)?,
            max_concurrent: env_or(&format!("BULKHEAD_{}_MAX_CONCURRENT", upper), defaults.max_concurrent)?,
            max_wait: env_millis(&format!("BULKHEAD_{}_MAX_WAIT_MS", upper), defaults.max_wait)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerTable {
    /// Limits for partner keys without their own entry.
    pub default: PartnerLimits,
    pub partners: BTreeMap<String, PartnerLimits>,
}

impl Default for PartnerTable {
    fn default() -> Self {
        Self {
            default: PartnerLimits::defaults_for(DEFAULT_KEY),
            partners: PARTNER_KEYS
                .iter()
                .map(|key| (key.to_string(), PartnerLimits::defaults_for(key)))
                .collect(),
        }
    }
}

impl PartnerTable {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut partners = BTreeMap::new();
        for key in PARTNER_KEYS {
            partners.insert(key.to_string(), PartnerLimits::from_env(key)?);
        }
        Ok(Self {
            default: PartnerLimits::from_env(DEFAULT_KEY)?,
            partners,
        })
    }

    pub fn limits_for(&self, key: &str) -> &PartnerLimits {
        self.partners.get(key).unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = PartnerTable::default();
        assert_eq!(table.limits_for("convenience").max_concurrent, 200);
        assert_eq!(table.limits_for("convenience").max_wait, Duration::from_millis(300));
        assert_eq!(table.limits_for("online").max_wait, Duration::from_millis(1000));
        assert_eq!(table.limits_for("grocery"), &table.default);
        assert_eq!(table.default.rate_per_second, 50);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("RATE_LIMIT_MART_BURST", "7");
        let limits = PartnerLimits::from_env("mart").unwrap();
        std::env::remove_var("RATE_LIMIT_MART_BURST");
        assert_eq!(limits.burst, 7);
        assert_eq!(limits.rate_per_second, 100);
    }
}
