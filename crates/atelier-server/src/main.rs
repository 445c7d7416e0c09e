//! atelier-server entry point.
//!
//! Thin on purpose: load config and secrets, pick the store and mailer,
//! build the shared state, wire middleware and serve. Route handlers live
//! in `routes/`; shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use atelier_audit::AuditWriter;
use atelier_config::{load_layered_yaml, report_unused_keys, resolve_secrets, UnusedKeyPolicy};
use atelier_db::PgStore;
use atelier_notify::{HttpMailer, LogMailer, Mailer};
use atelier_server::{routes, state};
use atelier_store::{MemStore, Repository};
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const DEFAULT_CONFIG_PATHS: &[&str] = &["config/defaults/base.yaml", "config/env/dev.yaml"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = config_paths_from_env();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&path_refs).context("load config")?;
    let settings = loaded.settings()?;
    info!(config_hash = %loaded.config_hash, layers = ?paths, "config loaded");

    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &unused.unused_leaf_pointers {
        warn!(pointer = %key, "config key not consumed by any setting");
    }

    let secrets = resolve_secrets(&loaded.config_json, &settings)?;
    if secrets.admin_token.is_none() {
        warn!("no admin token configured; back office refuses every request");
    }
    if secrets.payment_webhook_secret.is_none() {
        warn!("no payment webhook secret configured; payment callbacks are refused");
    }

    let store: Arc<dyn Repository> = match secrets.database_url.as_deref() {
        Some(url) => {
            let pool = atelier_db::connect(url).await?;
            atelier_db::migrate(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("no database url; using the in-memory store (data is lost on exit)");
            Arc::new(MemStore::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match (settings.mailer.enabled, secrets.mail_api_key.clone()) {
        (true, Some(key)) => Arc::new(HttpMailer::new(
            key,
            settings.mailer.from.clone(),
            settings.mailer.base_url.clone(),
        )),
        (true, None) => {
            warn!("mailer enabled without an api key; emails are only logged");
            Arc::new(LogMailer)
        }
        (false, _) => Arc::new(LogMailer),
    };
    info!(store = store.backend(), mailer = mailer.name(), "backends selected");

    let bind_addr = bind_addr_from_env().unwrap_or_else(|| settings.server.bind_addr.clone());
    let origins = settings.server.allowed_origins.clone();
    let audit_cfg = settings.audit.clone();

    let mut app_state = state::AppState::new(Arc::clone(&store), mailer, settings, secrets)?;
    if let Some(path) = audit_cfg.path.as_deref() {
        let writer = AuditWriter::resume(path, audit_cfg.hash_chain)?;
        info!(path, seq = writer.seq(), "audit log opened");
        app_state = app_state.with_audit(writer);
    }
    let shared = Arc::new(app_state);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_code_purge(store, Duration::from_secs(600), chrono::Duration::hours(24));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_from(&origins));

    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {bind_addr}"))?;
    info!("atelier-server listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `ATELIER_CONFIG` holds a comma-separated list of YAML layers.
fn config_paths_from_env() -> Vec<String> {
    match std::env::var("ATELIER_CONFIG") {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => DEFAULT_CONFIG_PATHS.iter().map(|s| s.to_string()).collect(),
    }
}

fn bind_addr_from_env() -> Option<String> {
    std::env::var("ATELIER_SERVER_ADDR").ok()
}

/// CORS: allow only the configured storefront origins.
fn cors_from(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
}
