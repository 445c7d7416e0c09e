//! VIP tiers by lifetime spend.

use std::fmt;

use atelier_schemas::Cents;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipTier {
    pub name: String,
    /// Lifetime spend (sum of paid order totals) needed to reach this tier.
    pub min_spend: Cents,
    /// Discount on the merchandise subtotal, in basis points.
    pub discount_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VipTierError {
    Empty,
    /// The lowest tier must start at zero spend so every customer has one.
    NoBaseTier,
    DuplicateThreshold(Cents),
    DiscountTooLarge { tier: String, bps: u32 },
}

impl fmt::Display for VipTierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "at least one VIP tier is required"),
            Self::NoBaseTier => write!(f, "lowest VIP tier must have min_spend 0"),
            Self::DuplicateThreshold(c) => write!(f, "two VIP tiers share threshold {c}"),
            Self::DiscountTooLarge { tier, bps } => {
                write!(f, "VIP tier {tier}: discount {bps} bps exceeds 10000")
            }
        }
    }
}

impl std::error::Error for VipTierError {}

/// Tiers sorted ascending by threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VipTiers {
    tiers: Vec<VipTier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipProgress {
    pub lifetime_spend: Cents,
    pub current: VipTier,
    pub next: Option<VipTier>,
    /// Spend still needed to reach `next`.
    pub remaining: Option<Cents>,
}

impl VipTiers {
    pub fn new(mut tiers: Vec<VipTier>) -> Result<Self, VipTierError> {
        if tiers.is_empty() {
            return Err(VipTierError::Empty);
        }
        tiers.sort_by_key(|t| t.min_spend);
        if tiers[0].min_spend != Cents::ZERO {
            return Err(VipTierError::NoBaseTier);
        }
        for w in tiers.windows(2) {
            if w[0].min_spend == w[1].min_spend {
                return Err(VipTierError::DuplicateThreshold(w[1].min_spend));
            }
        }
        if let Some(t) = tiers.iter().find(|t| t.discount_bps > 10_000) {
            return Err(VipTierError::DiscountTooLarge {
                tier: t.name.clone(),
                bps: t.discount_bps,
            });
        }
        Ok(Self { tiers })
    }

    /// standard / silver / gold / platinum.
    pub fn standard() -> Self {
        let tier = |name: &str, min: i64, bps: u32| VipTier {
            name: name.to_string(),
            min_spend: Cents::new(min),
            discount_bps: bps,
        };
        Self {
            tiers: vec![
                tier("standard", 0, 0),
                tier("silver", 50_000, 300),
                tier("gold", 150_000, 500),
                tier("platinum", 500_000, 800),
            ],
        }
    }

    pub fn tiers(&self) -> &[VipTier] {
        &self.tiers
    }

    /// Highest tier whose threshold is at or below `lifetime_spend`.
    pub fn tier_for(&self, lifetime_spend: Cents) -> &VipTier {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.min_spend <= lifetime_spend)
            .unwrap_or(&self.tiers[0])
    }

    pub fn progress(&self, lifetime_spend: Cents) -> VipProgress {
        let current = self.tier_for(lifetime_spend).clone();
        let next = self
            .tiers
            .iter()
            .find(|t| t.min_spend > lifetime_spend)
            .cloned();
        let remaining = next.as_ref().map(|t| t.min_spend - lifetime_spend);
        VipProgress {
            lifetime_spend,
            current,
            next,
            remaining,
        }
    }
}

impl Default for VipTiers {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        let t = VipTiers::standard();
        assert_eq!(t.tier_for(Cents::ZERO).name, "standard");
        assert_eq!(t.tier_for(Cents::new(49_999)).name, "standard");
        assert_eq!(t.tier_for(Cents::new(50_000)).name, "silver");
        assert_eq!(t.tier_for(Cents::new(9_999_999)).name, "platinum");
    }

    #[test]
    fn progress_reports_next_tier() {
        let t = VipTiers::standard();
        let p = t.progress(Cents::new(120_000));
        assert_eq!(p.current.name, "silver");
        assert_eq!(p.next.as_ref().map(|n| n.name.as_str()), Some("gold"));
        assert_eq!(p.remaining, Some(Cents::new(30_000)));

        let top = t.progress(Cents::new(600_000));
        assert!(top.next.is_none());
        assert!(top.remaining.is_none());
    }

    #[test]
    fn validation() {
        assert_eq!(VipTiers::new(vec![]).unwrap_err(), VipTierError::Empty);
        let only_gold = vec![VipTier {
            name: "gold".into(),
            min_spend: Cents::new(100),
            discount_bps: 500,
        }];
        assert_eq!(VipTiers::new(only_gold).unwrap_err(), VipTierError::NoBaseTier);

        // Unsorted input is accepted and sorted.
        let t = VipTiers::new(vec![
            VipTier { name: "b".into(), min_spend: Cents::new(10), discount_bps: 100 },
            VipTier { name: "a".into(), min_spend: Cents::ZERO, discount_bps: 0 },
        ])
        .unwrap();
        assert_eq!(t.tiers()[0].name, "a");
    }
}
