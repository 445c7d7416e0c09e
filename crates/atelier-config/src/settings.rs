//! Typed view of the merged configuration.
//!
//! Every section has defaults, so an empty document yields a usable
//! development configuration. [`MarketSettings::validate`] rejects values
//! that would make pricing or pagination nonsensical.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub server: ServerSettings,
    pub market: MarketSection,
    pub catalog: CatalogSettings,
    pub cart: CartSettings,
    pub shipping: ShippingSettings,
    pub vip: VipSettings,
    pub verification: VerificationSettings,
    pub payment_proofs: PaymentProofSettings,
    pub mailer: MailerSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub environment: Environment,
    pub bind_addr: String,
    /// Origins the CORS layer accepts.
    pub allowed_origins: Vec<String>,
    /// Storefront URL used in email links.
    pub public_base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_addr: "127.0.0.1:8890".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSection {
    pub name: String,
    /// ISO 4217 code all prices are expressed in.
    pub currency: String,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            name: "Atelier".to_string(),
            currency: "EUR".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            default_page_size: 24,
            max_page_size: 96,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartSettings {
    pub max_quantity_per_line: i32,
}

impl Default for CartSettings {
    fn default() -> Self {
        Self {
            max_quantity_per_line: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingSettings {
    pub flat_fee_cents: i64,
    /// Discounted subtotal at or above which shipping is free. `None` disables.
    pub free_threshold_cents: Option<i64>,
}

impl Default for ShippingSettings {
    fn default() -> Self {
        Self {
            flat_fee_cents: 690,
            free_threshold_cents: Some(15_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipTierSetting {
    pub name: String,
    pub min_spend_cents: i64,
    pub discount_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VipSettings {
    pub tiers: Vec<VipTierSetting>,
}

impl Default for VipSettings {
    fn default() -> Self {
        let tier = |name: &str, min_spend_cents: i64, discount_bps: u32| VipTierSetting {
            name: name.to_string(),
            min_spend_cents,
            discount_bps,
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Clamped to 10..=15 by the lifecycle crate.
    pub ttl_minutes: i64,
    pub max_attempts: i32,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            ttl_minutes: 15,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentProofSettings {
    pub allowed_content_types: Vec<String>,
    pub max_bytes: i64,
}

impl Default for PaymentProofSettings {
    fn default() -> Self {
        Self {
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "application/pdf".to_string(),
            ],
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerSettings {
    /// When false, emails are only logged.
    pub enabled: bool,
    pub from: String,
    pub base_url: String,
}

impl Default for MailerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            from: "Atelier <hello@atelier.example>".to_string(),
            base_url: "https://api.resend.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// JSONL file for back-office actions. `None` disables the audit log.
    pub path: Option<String>,
    pub hash_chain: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            path: None,
            hash_chain: true,
        }
    }
}

impl MarketSettings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let settings: MarketSettings = serde_json::from_value(config_json.clone())
            .context("config does not match the settings schema")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.catalog.default_page_size == 0 || self.catalog.max_page_size == 0 {
            bail!("CONFIG_INVALID catalog page sizes must be > 0");
        }
        if self.catalog.default_page_size > self.catalog.max_page_size {
            bail!("CONFIG_INVALID catalog.default_page_size exceeds catalog.max_page_size");
        }
        if self.cart.max_quantity_per_line < 1 {
            bail!("CONFIG_INVALID cart.max_quantity_per_line must be >= 1");
        }
        if self.shipping.flat_fee_cents < 0 {
            bail!("CONFIG_INVALID shipping.flat_fee_cents must be >= 0");
        }
        if self.verification.max_attempts < 1 {
            bail!("CONFIG_INVALID verification.max_attempts must be >= 1");
        }
        if self.payment_proofs.max_bytes <= 0 {
            bail!("CONFIG_INVALID payment_proofs.max_bytes must be > 0");
        }

        let tiers = &self.vip.tiers;
        match tiers.first() {
            Some(t) if t.min_spend_cents == 0 => {}
            _ => bail!("CONFIG_INVALID vip.tiers must start with a tier at min_spend_cents 0"),
        }
        for w in tiers.windows(2) {
            if w[1].min_spend_cents <= w[0].min_spend_cents {
                bail!(
                    "CONFIG_INVALID vip.tiers must have strictly increasing min_spend_cents ({} then {})",
                    w[0].name,
                    w[1].name
                );
            }
        }
        if let Some(t) = tiers.iter().find(|t| t.discount_bps > 10_000) {
            bail!("CONFIG_INVALID vip tier {} discount_bps exceeds 10000", t.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let s = MarketSettings::from_config_json(&serde_json::json!({})).unwrap();
        assert_eq!(s, MarketSettings::default());
        assert_eq!(s.vip.tiers.len(), 4);
    }

    #[test]
    fn unordered_tiers_are_rejected() {
        let doc = serde_json::json!({
            "vip": {"tiers": [
                {"name": "standard", "min_spend_cents": 0, "discount_bps": 0},
                {"name": "gold", "min_spend_cents": 100, "discount_bps": 500},
                {"name": "silver", "min_spend_cents": 50, "discount_bps": 300}
            ]}
        });
        let err = MarketSettings::from_config_json(&doc).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"), "{err}");
    }

    #[test]
    fn page_sizes_are_checked() {
        let doc = serde_json::json!({"catalog": {"default_page_size": 200, "max_page_size": 50}});
        assert!(MarketSettings::from_config_json(&doc).is_err());
    }
}
