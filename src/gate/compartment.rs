//! Per-partner admission compartments.

use std::collections::HashMap;

use crate::config::partners::{PartnerLimits, PartnerTable};
use crate::resilience::{Bulkhead, TokenBucket};

pub struct PartnerCompartment {
    pub(super) limiter: TokenBucket,
    pub(super) bulkhead: Bulkhead,
}

impl PartnerCompartment {
    pub fn new(limits: &PartnerLimits) -> Self {
        Self {
            limiter: TokenBucket::new(limits.rate_per_second, limits.burst),
            bulkhead: Bulkhead::new(limits.max_concurrent, limits.max_wait),
        }
    }
}

/// Immutable map from partner key to compartment, built once from config.
pub struct Compartments {
    by_key: HashMap<String, PartnerCompartment>,
    fallback: PartnerCompartment,
}

impl Compartments {
    pub fn from_table(table: &PartnerTable) -> Self {
        Self {
            by_key: table
                .partners
                .iter()
                .map(|(key, limits)| (key.clone(), PartnerCompartment::new(limits)))
                .collect(),
            fallback: PartnerCompartment::new(&table.default),
        }
    }

    /// Keys without their own compartment share the default one.
    pub fn get(&self, key: &str) -> &PartnerCompartment {
        self.by_key.get(key).unwrap_or(&self.fallback)
    }
}
