//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES under `/secrets_env`. Callers invoke
//! [`resolve_secrets`] once at startup and pass the result to constructors.
//! `Debug` redacts every value and errors name the variable, never its value.
//!
//! | environment  | required                                         |
//! |--------------|--------------------------------------------------|
//! | production   | database url, admin token, payment webhook secret, mail api key (when the mailer is enabled) |
//! | development  | nothing                                          |

use anyhow::{bail, Result};
use serde_json::Value;

use crate::settings::{Environment, MarketSettings};

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub database_url: Option<String>,
    pub mail_api_key: Option<String>,
    /// Bearer token for the back office.
    pub admin_token: Option<String>,
    /// HMAC key for payment provider callbacks.
    pub payment_webhook_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &redact(&self.database_url))
            .field("mail_api_key", &redact(&self.mail_api_key))
            .field("admin_token", &redact(&self.admin_token))
            .field("payment_webhook_secret", &redact(&self.payment_webhook_secret))
            .finish()
    }
}

struct SecretEnvNames {
    database_url_var: String,
    mail_api_key_var: String,
    admin_token_var: String,
    payment_webhook_secret_var: String,
}

/// Non-empty trimmed string at `pointer`.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    let name = |pointer: &str, fallback: &str| {
        read_str_at(config_json, pointer).unwrap_or_else(|| fallback.to_string())
    };
    SecretEnvNames {
        database_url_var: name("/secrets_env/database_url", "ATELIER_DATABASE_URL"),
        mail_api_key_var: name("/secrets_env/mail_api_key", "ATELIER_MAIL_API_KEY"),
        admin_token_var: name("/secrets_env/admin_token", "ATELIER_ADMIN_TOKEN"),
        payment_webhook_secret_var: name(
            "/secrets_env/payment_webhook_secret",
            "ATELIER_PAYMENT_WEBHOOK_SECRET",
        ),
    }
}

/// Resolve secrets from the process environment.
pub fn resolve_secrets(config_json: &Value, settings: &MarketSettings) -> Result<ResolvedSecrets> {
    resolve_secrets_with(config_json, settings, |name| std::env::var(name).ok())
}

/// Resolve secrets through `lookup` (the environment in production, a map in tests).
pub fn resolve_secrets_with<F>(
    config_json: &Value,
    settings: &MarketSettings,
    lookup: F,
) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let names = parse_env_names(config_json);
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    let resolved = ResolvedSecrets {
        database_url: get(&names.database_url_var),
        mail_api_key: get(&names.mail_api_key_var),
        admin_token: get(&names.admin_token_var),
        payment_webhook_secret: get(&names.payment_webhook_secret_var),
    };

    if settings.server.environment == Environment::Production {
        let required = [
            (&resolved.database_url, &names.database_url_var, "database url"),
            (&resolved.admin_token, &names.admin_token_var, "admin token"),
            (
                &resolved.payment_webhook_secret,
                &names.payment_webhook_secret_var,
                "payment webhook secret",
            ),
        ];
        for (value, var, what) in required {
            if value.is_none() {
                bail!(
                    "SECRETS_MISSING environment=production: required env var '{}' ({}) is not set or empty",
                    var,
                    what
                );
            }
        }
        if settings.mailer.enabled && resolved.mail_api_key.is_none() {
            bail!(
                "SECRETS_MISSING environment=production: required env var '{}' (mail api key) is not set or empty",
                names.mail_api_key_var
            );
        }
    }

    Ok(resolved)
}
