use anyhow::{Context, Result};
use atelier_audit::{verify_hash_chain, AuditWriter, VerifyResult};
use atelier_config::{load_layered_yaml, report_unused_keys, UnusedKeyPolicy};
use atelier_store::Repository;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(about = "Atelier marketplace operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local overrides)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Fail when the merged config carries keys no setting consumes.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Verification code maintenance
    Codes {
        #[command(subcommand)]
        cmd: CodesCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Check the hash chain of an audit JSONL file. Exits non-zero when broken.
    Verify {
        path: String,
    },

    /// Append an operator event to an audit JSONL file.
    Emit {
        #[arg(long)]
        path: String,

        /// Who is acting (e.g. an operator handle)
        #[arg(long, default_value = "operator")]
        actor: String,

        /// Topic (e.g. order, artisan, trade_in)
        #[arg(long)]
        topic: String,

        /// Event type (e.g. refund_issued)
        #[arg(long = "type")]
        event_type: String,

        /// Payload JSON string
        #[arg(long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// Path to a payload JSON file
        #[arg(long = "payload-file", conflicts_with = "payload")]
        payload_file: Option<String>,

        /// Write without hash chaining
        #[arg(long = "no-hash-chain", default_value_t = false)]
        no_hash_chain: bool,
    },
}

#[derive(Subcommand)]
enum CodesCmd {
    /// Delete verification codes that expired more than N minutes ago.
    Purge {
        #[arg(long, default_value_t = 1440)]
        older_than_minutes: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = atelier_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = atelier_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_schema={} applied_migrations={}",
                        s.ok, s.has_schema, s.applied_migrations
                    );
                }
                DbCmd::Migrate => {
                    atelier_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths, strict } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            // Typed settings must deserialize before a hash is worth printing.
            loaded.settings().context("config does not match the settings schema")?;

            let policy = if strict {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let report = report_unused_keys(&loaded.config_json, policy)?;
            for key in &report.unused_leaf_pointers {
                eprintln!("unused_key={key}");
            }

            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("chain_valid=true lines={lines} path={path}");
                }
                VerifyResult::Broken { line, reason } => {
                    println!("chain_valid=false line={line} path={path}");
                    anyhow::bail!("audit chain broken at line {line}: {reason}");
                }
            },

            AuditCmd::Emit {
                path,
                actor,
                topic,
                event_type,
                payload,
                payload_file,
                no_hash_chain,
            } => {
                let payload_json = load_payload(payload, payload_file)?;
                let mut writer = AuditWriter::resume(&path, !no_hash_chain)?;
                let ev = writer.append(&actor, &topic, &event_type, payload_json)?;

                println!("audit_written=true path={path} seq={}", ev.seq);
                println!("event_id={}", ev.event_id);
                if let Some(h) = ev.hash_self {
                    println!("hash_self={h}");
                }
            }
        },

        Commands::Codes { cmd } => match cmd {
            CodesCmd::Purge { older_than_minutes } => {
                if older_than_minutes < 0 {
                    anyhow::bail!("--older-than-minutes must not be negative");
                }
                let pool = atelier_db::connect_from_env().await?;
                let store = atelier_db::PgStore::new(pool);
                let before = Utc::now() - Duration::minutes(older_than_minutes);
                let n = store
                    .purge_expired_codes(before)
                    .await
                    .context("purge verification codes")?;
                println!("codes_purged={n} expired_before={}", before.to_rfc3339());
            }
        },
    }

    Ok(())
}

fn load_payload(payload: Option<String>, payload_file: Option<String>) -> Result<Value> {
    if let Some(p) = payload_file {
        let bytes = fs::read(&p).with_context(|| format!("read payload-file failed: {p}"))?;

        // Strip UTF-8 BOM if present.
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);

        let raw = String::from_utf8(bytes.to_vec()).context("payload-file must be UTF-8 text")?;
        return serde_json::from_str(raw.trim()).context("payload-file must contain valid JSON");
    }

    let raw = payload.context("must provide --payload or --payload-file")?;
    serde_json::from_str(raw.trim()).context("--payload must be valid JSON")
}
