//! The config hash is a pure function of the merged content: key order in
//! the YAML does not matter, values and overlays do.

use atelier_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
market:
  name: "Atelier"
  currency: "EUR"
shipping:
  flat_fee_cents: 690
  free_threshold_cents: 15000
"#;

const BASE_YAML_REORDERED: &str = r#"
shipping:
  free_threshold_cents: 15000
  flat_fee_cents: 690
market:
  currency: "EUR"
  name: "Atelier"
"#;

const OVERLAY_YAML: &str = r#"
shipping:
  flat_fee_cents: 0
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_value_and_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);
    assert_eq!(merged.config_json["shipping"]["flat_fee_cents"], 0);
    // Untouched siblings survive the overlay.
    assert_eq!(merged.config_json["shipping"]["free_threshold_cents"], 15000);
    assert_eq!(merged.config_hash.len(), 64);
}
