//! The YAML files shipped under `config/` load, validate and resolve.

use std::collections::HashMap;
use std::path::PathBuf;

use atelier_config::settings::Environment;
use atelier_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets_with, UnusedKeyPolicy,
};

fn repo_config(rel: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join(rel)
        .to_string_lossy()
        .to_string()
}

#[test]
fn base_and_dev_overlay_are_clean() {
    let base = repo_config("defaults/base.yaml");
    let dev = repo_config("env/dev.yaml");
    let loaded = load_layered_yaml(&[base.as_str(), dev.as_str()]).unwrap();

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());

    let settings = loaded.settings().unwrap();
    assert_eq!(settings.server.environment, Environment::Development);
    assert_eq!(settings.verification.ttl_minutes, 10);
    assert_eq!(settings.server.allowed_origins.len(), 4);
    assert_eq!(settings.vip.tiers[1].name, "silver");
}

#[test]
fn production_overlay_requires_secrets() {
    let base = repo_config("defaults/base.yaml");
    let prod = repo_config("env/prod.yaml");
    let loaded = load_layered_yaml(&[base.as_str(), prod.as_str()]).unwrap();
    let settings = loaded.settings().unwrap();
    assert_eq!(settings.server.environment, Environment::Production);

    let empty: HashMap<&str, &str> = HashMap::new();
    let err = resolve_secrets_with(&loaded.config_json, &settings, |k| {
        empty.get(k).map(|v| v.to_string())
    })
    .unwrap_err()
    .to_string();
    assert!(err.contains("ATELIER_DATABASE_URL"), "{err}");

    let env: HashMap<&str, &str> = HashMap::from([
        ("ATELIER_DATABASE_URL", "postgres://localhost/atelier"),
        ("ATELIER_ADMIN_TOKEN", "admin-token-value"),
        ("ATELIER_PAYMENT_WEBHOOK_SECRET", "hook-secret"),
        ("ATELIER_MAIL_API_KEY", "mail-key"),
    ]);
    let secrets = resolve_secrets_with(&loaded.config_json, &settings, |k| {
        env.get(k).map(|v| v.to_string())
    })
    .unwrap();
    assert_eq!(secrets.admin_token.as_deref(), Some("admin-token-value"));

    let dbg = format!("{secrets:?}");
    assert!(!dbg.contains("admin-token-value"));
    assert!(dbg.contains("<REDACTED>"));
}

#[test]
fn unknown_section_is_reported() {
    let loaded = atelier_config::load_layered_yaml_from_strings(&[
        "shipping:\n  flat_fee_cents: 100\nshiping:\n  flat_fee_cents: 0\n",
    ])
    .unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(report.unused_leaf_pointers, vec!["/shiping/flat_fee_cents".to_string()]);
    assert!(report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).is_err());
}
