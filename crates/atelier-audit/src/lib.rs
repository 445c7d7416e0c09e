//! Append-only audit trail for back-office actions.
//!
//! JSON Lines, one canonical (sorted-key) event per line. With the hash
//! chain enabled each event carries `hash_prev` (previous `hash_self`) and
//! `hash_self` (SHA-256 of the event without `hash_self`), so editing or
//! dropping a line is detectable by [`verify_hash_chain`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Namespace for `event_id` derivation. Fixed forever: changing it changes
/// every id.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6a, 0x1e, 0x4c, 0x2f, 0x93, 0x0b, 0x4d, 0x71, 0xa5, 0x38, 0x2e, 0x5c, 0x0f, 0x9d, 0x61, 0x17,
]);

pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of events in the log; the next event gets this value.
    seq: u64,
}

impl AuditWriter {
    /// Creates the writer for a fresh log and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Opens an existing log (or starts a new one) and continues its chain.
    ///
    /// Restores `seq` from the number of events and `last_hash` from the last
    /// event. Refuses to continue a log whose chain is already broken, and
    /// refuses unsealed appends to a sealed log.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, hash_chain)?;
        if !w.path.exists() {
            return Ok(w);
        }
        let content =
            fs::read_to_string(&w.path).with_context(|| format!("read audit log {:?}", w.path))?;

        if let VerifyResult::Broken { line, reason } = verify_hash_chain_str(&content)? {
            anyhow::bail!("AUDIT_CHAIN_BROKEN path={:?} line={} reason={}", w.path, line, reason);
        }

        let events = parse_events(&content)?;
        if !hash_chain && events.iter().any(|(_, ev)| ev.hash_self.is_some()) {
            anyhow::bail!("AUDIT_CHAIN_SEALED path={:?}: unsealed events cannot follow a hash chain", w.path);
        }
        w.seq = events.len() as u64;
        w.last_hash = events.into_iter().last().and_then(|(_, ev)| ev.hash_self);
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event. `actor` names who acted (`admin`, `provider`, ...).
    pub fn append(
        &mut self,
        actor: &str,
        topic: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEvent> {
        let event_id = derive_event_id(self.last_hash.as_deref(), self.seq, &payload)?;

        let mut ev = AuditEvent {
            event_id,
            seq: self.seq,
            actor: actor.to_string(),
            ts_utc: Utc::now(),
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub seq: u64,
    pub actor: String,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// UUID v5 over (previous hash, sequence, canonical payload). No RNG: the
/// same log replayed yields the same ids.
pub fn derive_event_id(prev_hash: Option<&str>, seq: u64, payload: &Value) -> Result<Uuid> {
    let canonical = serde_json::to_string(&sort_keys(payload)).context("serialize audit payload")?;
    let name = format!("{}|{}|{}", prev_hash.unwrap_or("GENESIS"), seq, canonical);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {}", path.display()))?;
    // Single write per line.
    file.write_all(format!("{line}\n").as_bytes())
        .with_context(|| format!("append to audit log {}", path.display()))
}

fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let value = serde_json::to_value(v).context("audit event is not representable as JSON")?;
    serde_json::to_string(&sort_keys(&value)).context("render audit line")
}

/// Recursively orders object keys so equal events render byte-identically.
fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(ordered.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// SHA-256 of the canonical event with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let unsealed = AuditEvent {
        hash_self: None,
        ..ev.clone()
    };
    let digest = Sha256::digest(canonical_json_line(&unsealed)?.as_bytes());
    Ok(hex::encode(digest))
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Checks linkage, self hashes and sequence numbers of JSONL content.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let events = parse_events(content)?;
    let mut expected_prev: Option<&str> = None;
    let mut sealed_seen = false;

    for (seq, (line, ev)) in events.iter().enumerate() {
        let broken = |reason: String| -> Result<VerifyResult> {
            Ok(VerifyResult::Broken {
                line: *line,
                reason,
            })
        };

        if ev.seq != seq as u64 {
            return broken(format!("seq {} where {} was due", ev.seq, seq));
        }
        if ev.hash_prev.as_deref() != expected_prev {
            return broken(format!(
                "hash_prev {:?} does not link to {:?}",
                ev.hash_prev, expected_prev
            ));
        }
        match &ev.hash_self {
            Some(sealed) => {
                let actual = compute_event_hash(ev)?;
                if *sealed != actual {
                    return broken(format!("hash_self {sealed} but content hashes to {actual}"));
                }
                sealed_seen = true;
            }
            // Once the chain starts, every later event must be sealed.
            None if sealed_seen => return broken("unsealed event after sealed chain".to_string()),
            None => {}
        }
        expected_prev = ev.hash_self.as_deref();
    }

    Ok(VerifyResult::Valid { lines: events.len() })
}

/// Non-blank lines parsed as events, paired with their 1-based line number.
fn parse_events(content: &str) -> Result<Vec<(usize, AuditEvent)>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(i, raw)| {
            serde_json::from_str(raw.trim())
                .map(|ev| (i + 1, ev))
                .with_context(|| format!("line {} is not an audit event", i + 1))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}
