//! `POST /v1/payments/callback`: signed payment provider notifications.
//!
//! The provider signs the raw request body with HMAC-SHA256 under the shared
//! webhook secret and sends the hex digest in `x-signature`. The body is
//! verified before it is parsed. Replays of an already applied outcome
//! return 200 with `replay: true`.

use std::sync::Arc;

use atelier_lifecycle::Actor;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

use crate::{
    api_types::{PaymentCallback, PaymentCallbackResponse, PaymentOutcome},
    error::ApiError,
    flows,
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "x-signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // new_from_slice accepts keys of any length for HMAC.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature.
pub fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(presented) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&presented).is_ok()
}

pub(crate) async fn callback(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PaymentCallbackResponse>, ApiError> {
    let Some(secret) = st.secrets.payment_webhook_secret.as_deref() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "callbacks_disabled",
            "payment callbacks are disabled: no webhook secret configured",
        ));
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing x-signature header"))?;
    if !verify_signature(secret.as_bytes(), &body, signature) {
        warn!(bytes = body.len(), "payment callback with bad signature");
        return Err(ApiError::unauthorized("invalid signature"));
    }

    let cb: PaymentCallback = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("invalid_payload", format!("callback body: {e}")))?;
    let reference = cb.reference.trim().to_string();
    if reference.is_empty() {
        return Err(ApiError::bad_request("missing_field", "reference must not be empty"));
    }
    info!(order_id = %cb.order_id, outcome = ?cb.outcome, reference = %reference, "payment callback");

    let step = match cb.outcome {
        PaymentOutcome::Succeeded => {
            flows::confirm_payment(&st, cb.order_id, Some(reference.clone()), Actor::Provider).await?
        }
        PaymentOutcome::Failed => flows::fail_payment(&st, cb.order_id, Some(reference.clone()), Actor::Provider).await?,
    };

    if !step.replay {
        st.audit(
            Actor::Provider.as_str(),
            "order",
            match cb.outcome {
                PaymentOutcome::Succeeded => "payment_succeeded",
                PaymentOutcome::Failed => "payment_failed",
            },
            json!({ "order_id": cb.order_id, "reference": reference }),
        )
        .await;
    }

    Ok(Json(PaymentCallbackResponse {
        order_id: cb.order_id,
        status: step.order.status,
        replay: step.replay,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip_and_tamper() {
        let body = br#"{"order_id":"00000000-0000-0000-0000-000000000000"}"#;
        let sig = sign(b"whsec-test", body);
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(b"whsec-test", body, &sig));
        assert!(!verify_signature(b"other-secret", body, &sig));
        assert!(!verify_signature(b"whsec-test", b"{}", &sig));
        assert!(!verify_signature(b"whsec-test", body, "not-hex"));
    }
}
