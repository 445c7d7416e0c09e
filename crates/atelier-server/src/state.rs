//! Shared runtime state for atelier-server.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The state owns the
//! storage and mail boundaries as trait objects so tests can swap in
//! `MemStore` and `RecordingMailer`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use atelier_audit::AuditWriter;
use atelier_commerce::{tag_strings, tags_for, CatalogChange, PageLimits, ShippingPolicy, VipTier, VipTiers};
use atelier_config::{MarketSettings, ResolvedSecrets};
use atelier_notify::{Branding, EmailMessage, Mailer};
use atelier_schemas::Cents;
use atelier_store::Repository;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    /// Storefront caches holding any of `tags` are stale.
    Revalidate { tags: Vec<String> },
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub store: Arc<dyn Repository>,
    pub mailer: Arc<dyn Mailer>,
    pub settings: MarketSettings,
    pub secrets: ResolvedSecrets,
    pub branding: Branding,
    pub vip: VipTiers,
    pub shipping: ShippingPolicy,
    pub page_limits: PageLimits,
    /// Back-office audit trail; `None` when no audit path is configured.
    pub audit: Arc<Mutex<Option<AuditWriter>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Repository>,
        mailer: Arc<dyn Mailer>,
        settings: MarketSettings,
        secrets: ResolvedSecrets,
    ) -> anyhow::Result<Self> {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let vip = VipTiers::new(
            settings
                .vip
                .tiers
                .iter()
                .map(|t| VipTier {
                    name: t.name.clone(),
                    min_spend: Cents::new(t.min_spend_cents),
                    discount_bps: t.discount_bps,
                })
                .collect(),
        )
        .context("vip tiers")?;

        let shipping = ShippingPolicy {
            flat_fee: Cents::new(settings.shipping.flat_fee_cents),
            free_threshold: settings.shipping.free_threshold_cents.map(Cents::new),
        };
        let page_limits = PageLimits {
            default_per_page: settings.catalog.default_page_size,
            max_per_page: settings.catalog.max_page_size,
        };
        let branding = Branding {
            market_name: settings.market.name.clone(),
            currency: settings.market.currency.clone(),
            public_base_url: settings.server.public_base_url.clone(),
        };

        Ok(Self {
            bus,
            build: BuildInfo {
                service: "atelier-server",
                version: env!("CARGO_PKG_VERSION"),
            },
            store,
            mailer,
            settings,
            secrets,
            branding,
            vip,
            shipping,
            page_limits,
            audit: Arc::new(Mutex::new(None)),
        })
    }

    pub fn with_audit(self, writer: AuditWriter) -> Self {
        Self {
            audit: Arc::new(Mutex::new(Some(writer))),
            ..self
        }
    }

    /// Tells storefront caches which entries a catalog mutation touched.
    pub fn revalidate(&self, change: &CatalogChange) {
        let tags = tag_strings(&tags_for(change));
        info!(tags = ?tags, "revalidate");
        let _ = self.bus.send(BusMsg::Revalidate { tags });
    }

    pub fn log_line(&self, level: &str, msg: impl Into<String>) {
        let _ = self.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.into(),
        });
    }

    /// Best effort: a failed send is logged and surfaced on the bus, never
    /// returned to the caller.
    pub async fn send_email(&self, msg: EmailMessage) {
        match self.mailer.send(&msg).await {
            Ok(()) => info!(mailer = self.mailer.name(), to = %msg.to, subject = %msg.subject, "email sent"),
            Err(e) => {
                warn!(mailer = self.mailer.name(), to = %msg.to, subject = %msg.subject, error = %e, "email failed");
                self.log_line("WARN", format!("email to {} failed: {e}", msg.to));
            }
        }
    }

    /// Appends a back-office event to the audit trail, if one is open.
    pub async fn audit(&self, actor: &str, topic: &str, event_type: &str, payload: Value) {
        let mut guard = self.audit.lock().await;
        let Some(writer) = guard.as_mut() else {
            return;
        };
        if let Err(e) = writer.append(actor, topic, event_type, payload) {
            error!(topic, event_type, error = %e, "audit append failed");
            self.log_line("ERROR", format!("audit append failed: {topic}/{event_type}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn a background task that deletes expired verification codes.
pub fn spawn_code_purge(store: Arc<dyn Repository>, interval: Duration, grace: chrono::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired_codes(chrono::Utc::now() - grace).await {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "expired verification codes purged"),
                Err(e) => warn!(error = %e, "verification code purge failed"),
            }
        }
    });
}
