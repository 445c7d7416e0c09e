//! Axum router and HTTP handlers for atelier-server.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Each surface lives in its own module and contributes a
//! nested router.

pub mod admin;
pub mod artisan;
pub mod payments;
pub mod storefront;

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    api_types::{HealthResponse, StatusFilter},
    error::ApiError,
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/payments/callback", post(payments::callback))
        .nest("/v1/store", storefront::router())
        .nest("/v1/artisan", artisan::router())
        .nest("/v1/admin", admin::router())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            uptime_secs: uptime_secs(),
            store: st.store.backend(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(rx: broadcast::Receiver<BusMsg>) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Revalidate { .. } => "revalidate",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Parses `?status=` with the given status parser; absent means "all".
pub(crate) fn parse_status_filter<S, E>(
    filter: &StatusFilter,
    parse: impl Fn(&str) -> Result<S, E>,
) -> Result<Option<S>, ApiError>
where
    E: std::fmt::Display,
{
    match filter.status.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .map_err(|e| ApiError::bad_request("invalid_status", e.to_string())),
    }
}

/// Trimmed, non-empty text field.
pub(crate) fn required_text(field: &'static str, raw: &str) -> Result<String, ApiError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ApiError::bad_request("missing_field", format!("{field} must not be empty")));
    }
    Ok(s.to_string())
}

/// Minimal shape check; delivery is the real test.
pub(crate) fn valid_email(raw: &str) -> Result<String, ApiError> {
    let email = atelier_schemas::normalize_email(raw);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace) => {
            Ok(email)
        }
        _ => Err(ApiError::bad_request("invalid_email", format!("{raw:?} is not an email address"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_schemas::OrderStatus;

    #[test]
    fn status_filter_parses_or_rejects() {
        let none = StatusFilter::default();
        assert_eq!(parse_status_filter(&none, OrderStatus::parse).unwrap(), None);

        let paid = StatusFilter {
            status: Some("paid".into()),
        };
        assert_eq!(
            parse_status_filter(&paid, OrderStatus::parse).unwrap(),
            Some(OrderStatus::Paid)
        );

        let bogus = StatusFilter {
            status: Some("shipped".into()),
        };
        let err = parse_status_filter(&bogus, OrderStatus::parse).unwrap_err();
        assert_eq!(err.code, "invalid_status");
    }

    #[test]
    fn emails_are_normalised_and_shape_checked() {
        assert_eq!(valid_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(valid_email("ada").is_err());
        assert!(valid_email("@example.com").is_err());
        assert!(valid_email("ada@localhost").is_err());
    }
}
