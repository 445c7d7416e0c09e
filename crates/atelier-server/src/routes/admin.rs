//! Back office: `/v1/admin/*`.
//!
//! Every handler takes the [`Admin`] extractor, so a missing or wrong bearer
//! token (or no token configured at all) refuses the request before any
//! work is done. Every mutation appends an audit event.

use std::sync::Arc;

use atelier_commerce::{slugify, CatalogChange, Taxonomy};
use atelier_lifecycle::{
    artisan::{self, ArtisanEvent},
    custom_order::CustomOrderEvent,
    payment_proof::{self, ProofEvent},
    trade_in::TradeInEvent,
    Actor,
};
use atelier_notify::templates;
use atelier_schemas::{
    Artisan, ArtisanStatus, Author, Category, Cents, ConciergeMessage, ConciergeThread, CustomOrder, Order,
    OrderStatus, PaymentProof, ProofStatus, TradeIn, TradeInStatus,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        ConciergeMessageRequest, CreateCategoryRequest, NoteRequest, OfferRequest, OrderView, ProofReviewResponse,
        StatusFilter, TradeInCompletedResponse,
    },
    auth::Admin,
    error::ApiError,
    flows,
    routes::{parse_status_filter, required_text},
    state::AppState,
};

const ACTOR: &str = "admin";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/fail", post(fail_order))
        .route("/payment-proofs", get(list_proofs))
        .route("/payment-proofs/:id/approve", post(approve_proof))
        .route("/payment-proofs/:id/reject", post(reject_proof))
        .route("/artisans", get(list_artisans))
        .route("/artisans/:id/approve", post(approve_artisan))
        .route("/artisans/:id/suspend", post(suspend_artisan))
        .route("/artisans/:id/reinstate", post(reinstate_artisan))
        .route("/categories", post(create_category))
        .route("/trade-ins", get(list_trade_ins))
        .route("/trade-ins/:id/offer", post(offer_trade_in))
        .route("/trade-ins/:id/reject", post(reject_trade_in))
        .route("/trade-ins/:id/complete", post(complete_trade_in))
        .route("/custom-orders/:id/cancel", post(cancel_custom_order))
        .route("/custom-orders/:id/deliver", post(deliver_custom_order))
        .route("/concierge/threads", get(list_threads))
        .route("/concierge/threads/:customer_id", get(thread_messages))
        .route("/concierge/threads/:customer_id/reply", post(reply_to_thread))
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

async fn list_orders(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let status = parse_status_filter(&filter, OrderStatus::parse)?;
    Ok(Json(st.store.list_orders(status).await?))
}

async fn get_order(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, ApiError> {
    let order = st.store.get_order(id).await?;
    let proofs = st.store.list_proofs_for_order(id).await?;
    Ok(Json(OrderView { order, proofs }))
}

async fn fail_order(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<Order>, ApiError> {
    let step = flows::fail_payment(&st, id, None, Actor::Admin).await?;
    st.audit(
        ACTOR,
        "order",
        "order_failed",
        json!({ "order_id": id, "note": clean_note(req.note), "replay": step.replay }),
    )
    .await;
    Ok(Json(step.order))
}

// ---------------------------------------------------------------------------
// Payment proofs
// ---------------------------------------------------------------------------

async fn list_proofs(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<PaymentProof>>, ApiError> {
    let status = parse_status_filter(&filter, ProofStatus::parse)?;
    Ok(Json(st.store.list_proofs(status).await?))
}

async fn approve_proof(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProofReviewResponse>, ApiError> {
    let proof = st.store.get_proof(id).await?;
    let step = payment_proof::next(proof.status, &ProofEvent::Approve)?;

    // Order first: if it can no longer be paid the proof stays submitted.
    let paid = flows::confirm_payment(&st, proof.order_id, Some(format!("proof:{id}")), Actor::Admin).await?;

    let proof = match st
        .store
        .review_proof(id, proof.status, step.status(), None, Utc::now())
        .await
    {
        Ok(proof) => proof,
        Err(e) => {
            warn!(proof_id = %id, order_id = %proof.order_id, error = %e, "order paid but proof review lost");
            return Err(e.into());
        }
    };
    info!(proof_id = %id, order_id = %proof.order_id, "payment proof approved");

    st.audit(
        ACTOR,
        "payment_proof",
        "proof_approved",
        json!({ "proof_id": id, "order_id": proof.order_id, "order_replay": paid.replay }),
    )
    .await;
    Ok(Json(ProofReviewResponse {
        proof,
        order: paid.order,
    }))
}

async fn reject_proof(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<PaymentProof>, ApiError> {
    let note = clean_note(req.note);
    let proof = st.store.get_proof(id).await?;
    let step = payment_proof::next(proof.status, &ProofEvent::Reject)?;
    let proof = st
        .store
        .review_proof(id, proof.status, step.status(), note.clone(), Utc::now())
        .await?;
    info!(proof_id = %id, order_id = %proof.order_id, "payment proof rejected");

    if let Ok(customer) = st.store.get_customer(proof.customer_id).await {
        st.send_email(templates::payment_proof_rejected(
            &st.branding,
            &customer.email,
            proof.order_id,
            note.as_deref(),
        ))
        .await;
    }
    st.audit(
        ACTOR,
        "payment_proof",
        "proof_rejected",
        json!({ "proof_id": id, "order_id": proof.order_id, "note": note }),
    )
    .await;
    Ok(Json(proof))
}

// ---------------------------------------------------------------------------
// Artisans
// ---------------------------------------------------------------------------

async fn list_artisans(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Artisan>>, ApiError> {
    let status = parse_status_filter(&filter, ArtisanStatus::parse)?;
    Ok(Json(st.store.list_artisans(status).await?))
}

async fn artisan_transition(st: &AppState, id: Uuid, event: ArtisanEvent) -> Result<Json<Artisan>, ApiError> {
    let current = st.store.get_artisan(id).await?;
    let step = artisan::next(current.status, &event, current.email_verified)?;
    let updated = st
        .store
        .set_artisan_status(id, current.status, step.status(), Utc::now())
        .await?;
    info!(artisan_id = %id, from = %current.status, to = %updated.status, "artisan transition");

    st.revalidate(&CatalogChange::ArtisanStatusChanged { artisan_id: id });
    let (msg, event_type) = match event {
        ArtisanEvent::Approve => (templates::artisan_approved(&st.branding, &updated), "artisan_approved"),
        ArtisanEvent::Reinstate => (templates::artisan_approved(&st.branding, &updated), "artisan_reinstated"),
        ArtisanEvent::Suspend => (templates::artisan_suspended(&st.branding, &updated), "artisan_suspended"),
    };
    st.send_email(msg).await;
    st.audit(
        ACTOR,
        "artisan",
        event_type,
        json!({ "artisan_id": id, "from": current.status.as_str(), "to": updated.status.as_str() }),
    )
    .await;
    Ok(Json(updated))
}

async fn approve_artisan(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Artisan>, ApiError> {
    artisan_transition(&st, id, ArtisanEvent::Approve).await
}

async fn suspend_artisan(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Artisan>, ApiError> {
    artisan_transition(&st, id, ArtisanEvent::Suspend).await
}

async fn reinstate_artisan(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Artisan>, ApiError> {
    artisan_transition(&st, id, ArtisanEvent::Reinstate).await
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

async fn create_category(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let name = required_text("name", &req.name)?;
    let slug = slugify(req.slug.as_deref().unwrap_or(&name));
    let mut all = st.store.list_categories().await?;
    if let Some(parent) = req.parent_id {
        if !all.iter().any(|c| c.id == parent) {
            return Err(ApiError::bad_request("unknown_category", format!("parent {parent} does not exist")));
        }
    }

    let category = Category {
        id: Uuid::new_v4(),
        parent_id: req.parent_id,
        name,
        slug,
        position: req.position,
    };
    // Validate the taxonomy as it would be after the insert.
    all.push(category.clone());
    let next = Taxonomy::build(all)?;

    st.store.insert_category(&category).await?;
    info!(category_id = %category.id, slug = %category.slug, "category created");

    let ancestor_slugs = next
        .breadcrumb(category.id)
        .into_iter()
        .filter(|c| c.id != category.id)
        .map(|c| c.slug.clone())
        .collect();
    st.revalidate(&CatalogChange::CategoryCreated {
        slug: category.slug.clone(),
        ancestor_slugs,
    });
    st.audit(
        ACTOR,
        "category",
        "category_created",
        json!({ "category_id": category.id, "slug": category.slug, "parent_id": category.parent_id }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(category)))
}

// ---------------------------------------------------------------------------
// Trade-ins
// ---------------------------------------------------------------------------

async fn list_trade_ins(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<TradeIn>>, ApiError> {
    let status = parse_status_filter(&filter, TradeInStatus::parse)?;
    Ok(Json(st.store.list_trade_ins(status).await?))
}

async fn offer_trade_in(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<OfferRequest>,
) -> Result<Json<TradeIn>, ApiError> {
    let mut t = st.store.get_trade_in(id).await?;
    if let Some(note) = clean_note(req.note) {
        t.admin_note = Some(note);
    }
    let t = flows::advance_trade_in(&st, t, TradeInEvent::Offer { credit: req.credit }).await?;

    if let Ok(customer) = st.store.get_customer(t.customer_id).await {
        st.send_email(templates::trade_in_offer(&st.branding, &customer.email, &t))
            .await;
    }
    st.audit(
        ACTOR,
        "trade_in",
        "trade_in_offered",
        json!({ "trade_in_id": id, "credit_cents": req.credit.raw() }),
    )
    .await;
    Ok(Json(t))
}

async fn reject_trade_in(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<NoteRequest>,
) -> Result<Json<TradeIn>, ApiError> {
    let note = clean_note(req.note);
    let t = st.store.get_trade_in(id).await?;
    let t = flows::advance_trade_in(&st, t, TradeInEvent::Reject { note: note.clone() }).await?;
    st.audit(
        ACTOR,
        "trade_in",
        "trade_in_rejected",
        json!({ "trade_in_id": id, "note": note }),
    )
    .await;
    Ok(Json(t))
}

async fn complete_trade_in(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TradeInCompletedResponse>, ApiError> {
    let t = st.store.get_trade_in(id).await?;
    let t = flows::advance_trade_in(&st, t, TradeInEvent::Complete).await?;

    // Granted only after this request won the CAS to `completed`.
    let credit = t.offered_credit.unwrap_or(Cents::ZERO);
    let balance = st.store.grant_store_credit(t.customer_id, credit).await?;
    info!(trade_in_id = %id, customer_id = %t.customer_id, credit = %credit, "store credit granted");
    st.audit(
        ACTOR,
        "trade_in",
        "trade_in_completed",
        json!({ "trade_in_id": id, "customer_id": t.customer_id, "credit_cents": credit.raw() }),
    )
    .await;
    Ok(Json(TradeInCompletedResponse {
        trade_in: t,
        store_credit: balance,
    }))
}

// ---------------------------------------------------------------------------
// Custom orders
// ---------------------------------------------------------------------------

async fn admin_custom_order_event(
    st: &AppState,
    id: Uuid,
    event: CustomOrderEvent,
    event_type: &str,
) -> Result<Json<CustomOrder>, ApiError> {
    let co = st.store.get_custom_order(id).await?;
    let from = co.status;
    let co = flows::advance_custom_order(st, co, event, Actor::Admin).await?;
    st.audit(
        ACTOR,
        "custom_order",
        event_type,
        json!({ "custom_order_id": id, "from": from.as_str(), "to": co.status.as_str() }),
    )
    .await;
    Ok(Json(co))
}

async fn cancel_custom_order(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    admin_custom_order_event(&st, id, CustomOrderEvent::Cancel, "custom_order_cancelled").await
}

async fn deliver_custom_order(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    admin_custom_order_event(&st, id, CustomOrderEvent::Deliver, "custom_order_delivered").await
}

// ---------------------------------------------------------------------------
// Concierge
// ---------------------------------------------------------------------------

async fn list_threads(_: Admin, State(st): State<Arc<AppState>>) -> Result<Json<Vec<ConciergeThread>>, ApiError> {
    Ok(Json(st.store.list_threads().await?))
}

async fn thread_messages(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Vec<ConciergeMessage>>, ApiError> {
    st.store.get_customer(customer_id).await?;
    Ok(Json(st.store.list_messages(customer_id).await?))
}

async fn reply_to_thread(
    _: Admin,
    State(st): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<ConciergeMessageRequest>,
) -> Result<(StatusCode, Json<ConciergeMessage>), ApiError> {
    let customer = st.store.get_customer(customer_id).await?;
    let body = required_text("body", &req.body)?;
    let msg = ConciergeMessage {
        id: Uuid::new_v4(),
        customer_id,
        author: Author::Concierge,
        body,
        created_at_utc: Utc::now(),
    };
    st.store.append_message(&msg).await?;
    info!(customer_id = %customer_id, message_id = %msg.id, "concierge replied");

    st.send_email(templates::concierge_reply(&st.branding, &customer.email, &msg.body))
        .await;
    st.audit(
        ACTOR,
        "concierge",
        "concierge_replied",
        json!({ "customer_id": customer_id, "message_id": msg.id }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(msg)))
}
