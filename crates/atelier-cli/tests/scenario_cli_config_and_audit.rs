use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

fn atelier() -> Command {
    let mut cmd = Command::cargo_bin("atelier").expect("binary built");
    // Keep developer .env.local files and DB urls out of these runs.
    cmd.env_remove("ATELIER_DATABASE_URL");
    cmd
}

#[test]
fn config_hash_is_stable_for_the_shipped_layers() {
    let base = repo_root().join("config/defaults/base.yaml");
    let dev = repo_root().join("config/env/dev.yaml");

    let first = atelier()
        .arg("config-hash")
        .arg(&base)
        .arg(&dev)
        .arg("--strict")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("config_hash="))
        .get_output()
        .stdout
        .clone();

    let second = atelier()
        .arg("config-hash")
        .arg(&base)
        .arg(&dev)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(first, second);
}

#[test]
fn strict_config_hash_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let layer = dir.path().join("extra.yaml");
    std::fs::write(&layer, "market:\n  name: Atelier\nloyalty:\n  points: 3\n").unwrap();
    let base = repo_root().join("config/defaults/base.yaml");

    atelier()
        .arg("config-hash")
        .arg(&base)
        .arg(&layer)
        .assert()
        .success()
        .stderr(predicate::str::contains("unused_key=/loyalty/points"));

    atelier()
        .arg("config-hash")
        .arg(&base)
        .arg(&layer)
        .arg("--strict")
        .assert()
        .failure();
}

#[test]
fn audit_emit_then_verify_and_detect_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ops").join("audit.jsonl");
    let path_str = path.to_str().unwrap();

    for amount in [1200, 800] {
        atelier()
            .args([
                "audit",
                "emit",
                "--path",
                path_str,
                "--actor",
                "ops-maria",
                "--topic",
                "order",
                "--type",
                "refund_issued",
                "--payload",
            ])
            .arg(format!(r#"{{"amount_cents": {amount}}}"#))
            .assert()
            .success()
            .stdout(predicate::str::contains("audit_written=true"))
            .stdout(predicate::str::contains("hash_self="));
    }

    atelier()
        .args(["audit", "verify", path_str])
        .assert()
        .success()
        .stdout(predicate::str::contains("chain_valid=true lines=2"));

    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replacen(r#""amount_cents":1200"#, r#""amount_cents":9999"#, 1)).unwrap();

    atelier()
        .args(["audit", "verify", path_str])
        .assert()
        .failure()
        .stdout(predicate::str::contains("chain_valid=false line=1"));
}

#[test]
fn audit_emit_requires_json_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    atelier()
        .args(["audit", "emit", "--path"])
        .arg(&path)
        .args(["--topic", "order", "--type", "note", "--payload", "not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--payload must be valid JSON"));
}

#[test]
fn codes_purge_rejects_negative_window_before_touching_the_db() {
    atelier()
        .args(["codes", "purge", "--older-than-minutes=-5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not be negative"));
}

#[test]
fn db_commands_need_a_database_url() {
    atelier()
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ATELIER_DATABASE_URL"));
}
