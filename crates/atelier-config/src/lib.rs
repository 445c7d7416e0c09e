//! Layered YAML configuration for the marketplace daemon and CLI.
//!
//! Layers are merged in order (base first, overlays last), converted to JSON,
//! canonicalised and hashed. The hash is logged at boot so two processes can
//! be compared by configuration without diffing files.
//!
//! Secrets never live in these files: the config names environment
//! variables and [`secrets::resolve_secrets`] reads them once at startup.

pub mod secrets;
pub mod settings;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub use secrets::{resolve_secrets, resolve_secrets_with, ResolvedSecrets};
pub use settings::MarketSettings;

/// If any leaf string value in the effective config starts with one of these,
/// loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "rk_live",    // Stripe restricted
    "whsec_",     // webhook signing secrets
    "re_",        // transactional mail API keys
    "SG.",        // SendGrid
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "postgres://",
    "postgresql://",
];

/// JSON-pointer prefixes read by [`MarketSettings`] and [`secrets`].
///
/// Anything outside these is a typo or a leftover and shows up in the
/// unused-key report.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/server",
    "/market",
    "/catalog",
    "/cart",
    "/shipping",
    "/vip",
    "/verification",
    "/payment_proofs",
    "/mailer",
    "/audit",
    "/secrets_env",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Lists leaf keys that no setting reads. `Fail` turns a non-empty report
/// into an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let unused: BTreeSet<String> = leaves(config_json)
        .into_iter()
        .map(|(pointer, _)| pointer)
        .filter(|pointer| !CONSUMED_POINTERS.iter().any(|c| covers(c, pointer)))
        .collect();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report.unused_leaf_pointers.iter().take(12).map(String::as_str).collect();
        bail!(
            "CONFIG_UNUSED_KEYS count={} first={}",
            report.unused_leaf_pointers.len(),
            shown.join(",")
        );
    }

    Ok(report)
}

/// `/vip` covers `/vip` and `/vip/tiers/0` but not `/vipx`.
fn covers(section: &str, pointer: &str) -> bool {
    match pointer.strip_prefix(section) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar in the document with its JSON pointer (RFC 6901 escaped).
fn leaves(root: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((pointer, v)) = stack.pop() {
        match v {
            Value::Object(map) => {
                for (k, child) in map {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{pointer}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{pointer}/{i}"), child));
                }
            }
            scalar => {
                let pointer = if pointer.is_empty() { "/".to_string() } else { pointer };
                out.push((pointer, scalar));
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn settings(&self) -> Result<MarketSettings> {
        MarketSettings::from_config_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: Value = serde_yaml::from_str(raw).with_context(|| format!("config layer {i} is not valid yaml"))?;
        merged = deep_merge(merged, layer);
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json's Map is key-ordered, so compact output is canonical.
    let canonical_json = serde_json::to_string(&merged).context("serialize merged config")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Later objects override earlier ones key by key; any non-object replaces.
fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let leaked = leaves(v)
        .into_iter()
        .find(|(_, leaf)| leaf.as_str().is_some_and(looks_like_secret));
    match leaked {
        Some((pointer, _)) => bail!("CONFIG_SECRET_DETECTED leaf={pointer} value=REDACTED"),
        None => Ok(()),
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
