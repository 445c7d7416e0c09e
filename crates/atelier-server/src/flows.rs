//! Multi-step operations shared by more than one surface.
//!
//! Each flow computes the transition with the pure lifecycle function,
//! persists it with a compare-and-set, then performs side effects (email,
//! SSE, audit) that never undo the committed change.

use atelier_commerce::CatalogChange;
use atelier_lifecycle::{
    custom_order::{self, CustomOrderEvent},
    order::{self, OrderEvent},
    trade_in::{self, TradeInEvent},
    verification::{self, VerifyError},
    Actor,
};
use atelier_notify::templates;
use atelier_schemas::{normalize_email, CodePurpose, CustomOrder, Order, OrderStatus, TradeIn};
use atelier_store::StoreError;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

// ---------------------------------------------------------------------------
// Verification codes
// ---------------------------------------------------------------------------

/// Issues a fresh code for `email` and mails it. Earlier unused codes for the
/// same address and purpose stop working.
pub async fn send_code(st: &AppState, email: &str, purpose: CodePurpose) -> Result<(), ApiError> {
    let ttl = verification::clamp_ttl_minutes(st.settings.verification.ttl_minutes);
    let record = verification::issue(email, purpose, ttl, Utc::now());
    st.store.insert_code(&record).await?;
    info!(purpose = purpose.as_str(), code_id = %record.id, "verification code issued");
    st.send_email(templates::verification_code(
        &st.branding,
        &record.subject,
        purpose,
        &record.code,
        ttl,
    ))
    .await;
    Ok(())
}

/// Checks `presented` against the latest code for `email` and consumes it.
pub async fn redeem_code(st: &AppState, email: &str, purpose: CodePurpose, presented: &str) -> Result<(), ApiError> {
    let subject = normalize_email(email);
    let record = st
        .store
        .latest_code(&subject, purpose)
        .await?
        .ok_or_else(|| ApiError::bad_request("code_not_found", "no verification code was issued for this address"))?;

    let max_attempts = st.settings.verification.max_attempts;
    match verification::check(&record, presented, Utc::now(), max_attempts) {
        Ok(()) => {}
        Err(VerifyError::Mismatch) => {
            let attempts = st.store.record_code_attempt(record.id).await?;
            warn!(code_id = %record.id, attempts, "verification code mismatch");
            return Err(VerifyError::Mismatch.into());
        }
        Err(e) => return Err(e.into()),
    }

    match st.store.consume_code(record.id).await {
        Ok(()) => Ok(()),
        // Another request redeemed it first.
        Err(StoreError::Conflict(_)) => Err(VerifyError::AlreadyUsed.into()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Order payment
// ---------------------------------------------------------------------------

/// Outcome of a payment transition request.
#[derive(Debug, Clone)]
pub struct PaymentStep {
    pub order: Order,
    /// The order was already in the requested state.
    pub replay: bool,
}

/// Moves a pending order to `paid`. Confirming an already paid order is a
/// replay and returns it unchanged.
pub async fn confirm_payment(
    st: &AppState,
    order_id: Uuid,
    reference: Option<String>,
    actor: Actor,
) -> Result<PaymentStep, ApiError> {
    let event = OrderEvent::PaymentConfirmed;
    let Some(order) = apply_order_event(st, order_id, &event, reference, actor).await? else {
        let order = st.store.get_order(order_id).await?;
        return Ok(PaymentStep { order, replay: true });
    };

    if let Ok(customer) = st.store.get_customer(order.customer_id).await {
        st.send_email(templates::payment_confirmed(&st.branding, &customer.email, &order))
            .await;
    }
    Ok(PaymentStep { order, replay: false })
}

/// Moves a pending order to `failed` and returns its stock and store credit.
pub async fn fail_payment(
    st: &AppState,
    order_id: Uuid,
    reference: Option<String>,
    actor: Actor,
) -> Result<PaymentStep, ApiError> {
    let event = OrderEvent::PaymentFailed;
    let moved = apply_order_event(st, order_id, &event, reference, actor).await?;

    // Runs on replays too so a crash between the two writes heals itself.
    if st.store.restock_order(order_id).await? {
        let order = st.store.get_order(order_id).await?;
        info!(order_id = %order_id, lines = order.lines.len(), "failed order restocked");
        for line in &order.lines {
            st.revalidate(&CatalogChange::StockChanged {
                product_id: line.product_id,
                artisan_id: line.artisan_id,
            });
        }
    }

    let Some(order) = moved else {
        let order = st.store.get_order(order_id).await?;
        return Ok(PaymentStep { order, replay: true });
    };
    if let Ok(customer) = st.store.get_customer(order.customer_id).await {
        st.send_email(templates::order_failed(&st.branding, &customer.email, &order))
            .await;
    }
    Ok(PaymentStep { order, replay: false })
}

/// `Ok(None)` means the event was a replay.
async fn apply_order_event(
    st: &AppState,
    order_id: Uuid,
    event: &OrderEvent,
    reference: Option<String>,
    actor: Actor,
) -> Result<Option<Order>, ApiError> {
    let current = st.store.get_order(order_id).await?;
    let step = order::next(current.status, event)?;
    if !step.is_move() {
        info!(order_id = %order_id, status = %current.status, actor = actor.as_str(), "order event replayed");
        return Ok(None);
    }

    let to: OrderStatus = step.status();
    match st
        .store
        .transition_order(order_id, current.status, to, reference, Utc::now())
        .await
    {
        Ok(order) => {
            info!(order_id = %order_id, from = %current.status, to = %to, actor = actor.as_str(), "order transition");
            st.log_line("INFO", format!("order {order_id} {to}"));
            Ok(Some(order))
        }
        Err(StoreError::Conflict(_)) => after_lost_transition(st, order_id, event).await,
        Err(e) => Err(e.into()),
    }
}

/// Another writer moved the order first. Its result counts as ours when it
/// reached the same state (`Ok(None)`); anything else is a conflict.
async fn after_lost_transition(
    st: &AppState,
    order_id: Uuid,
    event: &OrderEvent,
) -> Result<Option<Order>, ApiError> {
    let latest = st.store.get_order(order_id).await?;
    match order::next(latest.status, event)? {
        s if s.is_move() => Err(ApiError::conflict("conflict", format!("order {order_id} changed concurrently"))),
        _ => {
            info!(order_id = %order_id, status = %latest.status, "lost order transition to an identical one");
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Custom orders
// ---------------------------------------------------------------------------

/// Applies `event` and notifies the other party. Callers check ownership.
pub async fn advance_custom_order(
    st: &AppState,
    mut co: CustomOrder,
    event: CustomOrderEvent,
    actor: Actor,
) -> Result<CustomOrder, ApiError> {
    let expected = co.status;
    custom_order::apply(&mut co, &event, actor, Utc::now())?;
    st.store.save_custom_order(&co, expected).await?;
    info!(
        custom_order_id = %co.id,
        from = %expected,
        to = %co.status,
        actor = actor.as_str(),
        "custom order transition"
    );

    let notify_customer = matches!(actor, Actor::Artisan | Actor::Admin);
    let notify_artisan = matches!(actor, Actor::Customer | Actor::Admin);
    if notify_customer {
        if let Ok(customer) = st.store.get_customer(co.customer_id).await {
            let msg = match event {
                CustomOrderEvent::Quote { .. } => templates::custom_order_quoted(&st.branding, &customer.email, &co),
                _ => templates::custom_order_status(&st.branding, &customer.email, &co),
            };
            st.send_email(msg).await;
        }
    }
    if notify_artisan {
        if let Ok(artisan) = st.store.get_artisan(co.artisan_id).await {
            st.send_email(templates::custom_order_status(&st.branding, &artisan.email, &co))
                .await;
        }
    }
    Ok(co)
}

// ---------------------------------------------------------------------------
// Trade-ins
// ---------------------------------------------------------------------------

pub async fn advance_trade_in(st: &AppState, mut t: TradeIn, event: TradeInEvent) -> Result<TradeIn, ApiError> {
    let expected = t.status;
    trade_in::apply(&mut t, &event, Utc::now())?;
    st.store.save_trade_in(&t, expected).await?;
    info!(trade_in_id = %t.id, from = %expected, to = %t.status, "trade-in transition");
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_config::{MarketSettings, ResolvedSecrets};
    use atelier_notify::RecordingMailer;
    use atelier_schemas::{Cents, Customer, ShippingAddress};
    use atelier_store::{MemStore, NewOrder, Repository};
    use axum::http::StatusCode;
    use std::sync::Arc;

    async fn state_with_order() -> (AppState, Uuid) {
        let store = Arc::new(MemStore::new());
        let customer = Customer {
            id: Uuid::new_v4(),
            email: "race@shopper.test".into(),
            name: "Rae".into(),
            email_verified: true,
            store_credit: Cents::ZERO,
            created_at_utc: Utc::now(),
        };
        store.insert_customer(&customer).await.unwrap();
        let order = store
            .place_order(NewOrder {
                id: Uuid::new_v4(),
                customer_id: customer.id,
                lines: Vec::new(),
                subtotal: Cents::new(1_000),
                discount: Cents::ZERO,
                shipping: Cents::ZERO,
                store_credit_applied: Cents::ZERO,
                total: Cents::new(1_000),
                vip_tier: "standard".into(),
                shipping_address: ShippingAddress {
                    recipient: "Rae".into(),
                    line1: "3 Quay".into(),
                    line2: None,
                    city: "Cork".into(),
                    region: None,
                    postal_code: "T12".into(),
                    country: "IE".into(),
                },
                created_at_utc: Utc::now(),
                cart_updated_at_utc: chrono::DateTime::<Utc>::UNIX_EPOCH,
            })
            .await
            .unwrap();
        let st = AppState::new(
            store,
            Arc::new(RecordingMailer::new()),
            MarketSettings::default(),
            ResolvedSecrets::default(),
        )
        .unwrap();
        (st, order.id)
    }

    #[tokio::test]
    async fn losing_to_an_identical_transition_is_a_replay() {
        let (st, id) = state_with_order().await;
        st.store
            .transition_order(id, OrderStatus::Pending, OrderStatus::Paid, Some("psp_1".into()), Utc::now())
            .await
            .unwrap();

        // The CAS this caller attempted would have failed against the winner.
        let lost = st
            .store
            .transition_order(id, OrderStatus::Pending, OrderStatus::Paid, Some("psp_1".into()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(lost, StoreError::Conflict(_)));

        let outcome = after_lost_transition(&st, id, &OrderEvent::PaymentConfirmed).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn losing_to_a_different_transition_is_refused() {
        let (st, id) = state_with_order().await;
        st.store
            .transition_order(id, OrderStatus::Pending, OrderStatus::Failed, None, Utc::now())
            .await
            .unwrap();

        let err = after_lost_transition(&st, id, &OrderEvent::PaymentConfirmed).await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "illegal_transition");
    }
}
