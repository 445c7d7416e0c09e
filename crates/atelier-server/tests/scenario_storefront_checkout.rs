//! In-process scenario tests for the storefront.
//!
//! The router runs on `MemStore` and `RecordingMailer` without binding a
//! socket; requests go through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use atelier_config::{MarketSettings, ResolvedSecrets};
use atelier_notify::RecordingMailer;
use atelier_schemas::{
    Artisan, ArtisanStatus, Category, Cents, CodePurpose, Customer, OrderStatus, Product, ProductStatus,
};
use atelier_server::{routes, state::AppState};
use atelier_store::{MemStore, Repository};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ADMIN_TOKEN: &str = "test-admin-token";

struct Harness {
    state: Arc<AppState>,
    mailer: Arc<RecordingMailer>,
    router: axum::Router,
}

fn harness() -> Harness {
    let mailer = Arc::new(RecordingMailer::new());
    let secrets = ResolvedSecrets {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        ..ResolvedSecrets::default()
    };
    let st = Arc::new(
        AppState::new(Arc::new(MemStore::new()), mailer.clone(), MarketSettings::default(), secrets)
            .expect("state"),
    );
    let router = routes::build_router(Arc::clone(&st));
    Harness {
        state: st,
        mailer,
        router,
    }
}

/// Drive the router with a single request and return (status, json body).
async fn call(
    h: &Harness,
    method: &str,
    uri: &str,
    headers: &[(&str, String)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        req = req.header(*k, v);
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = h.router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, json)
}

fn as_customer(id: Uuid) -> Vec<(&'static str, String)> {
    vec![("x-customer-id", id.to_string())]
}

fn as_admin() -> Vec<(&'static str, String)> {
    vec![("authorization", format!("Bearer {ADMIN_TOKEN}"))]
}

/// One active artisan selling one active product in one category.
async fn seed_catalog(store: &dyn Repository, price: i64, stock: i32) -> (Artisan, Category, Product) {
    let now = Utc::now();
    let artisan = Artisan {
        id: Uuid::new_v4(),
        email: "potter@atelier.test".into(),
        display_name: "Mira Potter".into(),
        bio: None,
        status: ArtisanStatus::Active,
        email_verified: true,
        created_at_utc: now,
        approved_at_utc: Some(now),
    };
    store.insert_artisan(&artisan).await.unwrap();

    let category = Category {
        id: Uuid::new_v4(),
        parent_id: None,
        name: "Ceramics".into(),
        slug: "ceramics".into(),
        position: 0,
    };
    store.insert_category(&category).await.unwrap();

    let product = Product {
        id: Uuid::new_v4(),
        artisan_id: artisan.id,
        category_id: category.id,
        name: "Ash glaze bowl".into(),
        slug: "ash-glaze-bowl".into(),
        description: "Wood-fired stoneware".into(),
        price: Cents::new(price),
        stock,
        status: ProductStatus::Active,
        created_at_utc: now,
        updated_at_utc: now,
    };
    store.insert_product(&product).await.unwrap();
    (artisan, category, product)
}

async fn seed_customer(store: &dyn Repository, verified: bool) -> Customer {
    let c = Customer {
        id: Uuid::new_v4(),
        email: format!("{}@shopper.test", Uuid::new_v4().simple()),
        name: "Ada".into(),
        email_verified: verified,
        store_credit: Cents::ZERO,
        created_at_utc: Utc::now(),
    };
    store.insert_customer(&c).await.unwrap();
    c
}

fn address() -> Value {
    json!({
        "recipient": "Ada Lovelace",
        "line1": "12 Kiln Street",
        "line2": null,
        "city": "Lisbon",
        "region": null,
        "postal_code": "1100-001",
        "country": "pt"
    })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_with_store_backend() {
    let h = harness();
    let (status, json) = call(&h, "GET", "/v1/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "atelier-server");
    assert_eq!(json["store"], "memory");
}

// ---------------------------------------------------------------------------
// Registration & verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registration_sends_code_and_verification_consumes_it() {
    let h = harness();
    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/customers",
        &[],
        Some(json!({ "email": "  Ada@Example.com ", "name": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["email"], "ada@example.com");
    assert_eq!(json["email_verified"], false);

    let mails = h.mailer.sent_to("ada@example.com");
    assert_eq!(mails.len(), 1);
    assert!(mails[0].subject.contains("verification code"));

    let code = h
        .state
        .store
        .latest_code("ada@example.com", CodePurpose::CustomerEmail)
        .await
        .unwrap()
        .expect("code issued")
        .code;
    assert!(mails[0].text.contains(&code));

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/customers/verify",
        &[],
        Some(json!({ "email": "ada@example.com", "code": wrong })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "code_mismatch");

    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/customers/verify",
        &[],
        Some(json!({ "email": "ada@example.com", "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);

    let customer = h
        .state
        .store
        .customer_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(customer.email_verified);

    // Same address again.
    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/customers",
        &[],
        Some(json!({ "email": "ADA@example.com", "name": "Ada again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "email_taken");
}

#[tokio::test]
async fn identity_header_is_required() {
    let h = harness();
    let (status, json) = call(&h, "GET", "/v1/store/cart", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "unauthorized");

    let (status, _) = call(&h, "GET", "/v1/store/cart", &as_customer(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Browsing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn catalog_browse_hides_products_of_suspended_artisans() {
    let h = harness();
    let (artisan, _, product) = seed_catalog(h.state.store.as_ref(), 4_000, 3).await;

    let (status, json) = call(&h, "GET", "/v1/store/products?category=ceramics&sort=price_asc", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["items"][0]["slug"], "ash-glaze-bowl");

    let (status, json) = call(&h, "GET", "/v1/store/products/ash-glaze-bowl", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["artisan"]["display_name"], "Mira Potter");
    assert_eq!(json["breadcrumb"][0]["slug"], "ceramics");
    assert_eq!(json["passport"], Value::Null);

    h.state
        .store
        .set_artisan_status(artisan.id, ArtisanStatus::Active, ArtisanStatus::Suspended, Utc::now())
        .await
        .unwrap();

    let (_, json) = call(&h, "GET", "/v1/store/products", &[], None).await;
    assert_eq!(json["total"], 0);
    let (status, _) = call(&h, "GET", &format!("/v1/store/passports/{}", product.id), &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&h, "GET", "/v1/store/products/ash-glaze-bowl", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn category_page_has_breadcrumb_and_children() {
    let h = harness();
    let root = Category {
        id: Uuid::new_v4(),
        parent_id: None,
        name: "Home".into(),
        slug: "home".into(),
        position: 0,
    };
    let child = Category {
        id: Uuid::new_v4(),
        parent_id: Some(root.id),
        name: "Textiles".into(),
        slug: "textiles".into(),
        position: 0,
    };
    h.state.store.insert_category(&root).await.unwrap();
    h.state.store.insert_category(&child).await.unwrap();

    let (status, json) = call(&h, "GET", "/v1/store/categories/home", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["children"][0]["slug"], "textiles");

    let (_, json) = call(&h, "GET", "/v1/store/categories/textiles", &[], None).await;
    let crumbs: Vec<&str> = json["breadcrumb"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["slug"].as_str().unwrap())
        .collect();
    assert_eq!(crumbs, vec!["home", "textiles"]);

    let (status, _) = call(&h, "GET", "/v1/store/categories/nope", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Cart & checkout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cart_refuses_more_than_stock() {
    let h = harness();
    let (_, _, product) = seed_catalog(h.state.store.as_ref(), 4_000, 2).await;
    let customer = seed_customer(h.state.store.as_ref(), true).await;

    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/cart/lines",
        &as_customer(customer.id),
        Some(json!({ "product_id": product.id, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "insufficient_stock");

    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/cart/lines",
        &as_customer(customer.id),
        Some(json!({ "product_id": product.id, "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_quantity");
}

#[tokio::test]
async fn checkout_requires_a_verified_email() {
    let h = harness();
    let (_, _, product) = seed_catalog(h.state.store.as_ref(), 4_000, 2).await;
    let customer = seed_customer(h.state.store.as_ref(), false).await;

    let (status, _) = call(
        &h,
        "POST",
        "/v1/store/cart/lines",
        &as_customer(customer.id),
        Some(json!({ "product_id": product.id, "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/checkout",
        &as_customer(customer.id),
        Some(json!({ "shipping_address": address() })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "email_not_verified");
}

#[tokio::test]
async fn checkout_then_proof_approval_marks_order_paid() {
    let h = harness();
    let (_, _, product) = seed_catalog(h.state.store.as_ref(), 4_000, 3).await;
    let customer = seed_customer(h.state.store.as_ref(), true).await;
    let me = as_customer(customer.id);

    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/cart/lines",
        &me,
        Some(json!({ "product_id": product.id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lines"][0]["quantity"], 2);

    let (status, quote) = call(&h, "GET", "/v1/store/checkout/quote", &me, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["subtotal"], 8_000);
    assert_eq!(quote["discount"], 0);
    assert_eq!(quote["shipping"], 690);
    assert_eq!(quote["total"], 8_690);
    assert_eq!(quote["vip_tier"], "standard");

    let (status, order) = call(
        &h,
        "POST",
        "/v1/store/checkout",
        &me,
        Some(json!({ "shipping_address": address() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total"], 8_690);
    assert_eq!(order["shipping_address"]["country"], "PT");
    let order_id = order["id"].as_str().unwrap().to_string();

    assert_eq!(h.state.store.get_product(product.id).await.unwrap().stock, 1);
    let (_, cart) = call(&h, "GET", "/v1/store/cart", &me, None).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 0);
    assert!(h
        .mailer
        .sent_to(&customer.email)
        .iter()
        .any(|m| m.subject.contains("received")));

    // Upload policy.
    let (status, json) = call(
        &h,
        "POST",
        &format!("/v1/store/orders/{order_id}/payment-proofs"),
        &me,
        Some(json!({ "url": "https://files.test/p.gif", "content_type": "image/gif", "size_bytes": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "unsupported_content_type");

    let (status, proof) = call(
        &h,
        "POST",
        &format!("/v1/store/orders/{order_id}/payment-proofs"),
        &me,
        Some(json!({ "url": "https://files.test/p.png", "content_type": "image/png", "size_bytes": 200_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(proof["status"], "submitted");

    let (status, _) = call(
        &h,
        "POST",
        &format!("/v1/store/orders/{order_id}/payment-proofs"),
        &me,
        Some(json!({ "url": "https://files.test/q.png", "content_type": "image/png", "size_bytes": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "one proof awaiting review per order");

    let proof_id = proof["id"].as_str().unwrap();
    let (status, review) = call(
        &h,
        "POST",
        &format!("/v1/admin/payment-proofs/{proof_id}/approve"),
        &as_admin(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(review["proof"]["status"], "approved");
    assert_eq!(review["order"]["status"], "paid");
    assert_eq!(review["order"]["payment_reference"], format!("proof:{proof_id}"));

    let (_, view) = call(&h, "GET", &format!("/v1/store/orders/{order_id}"), &me, None).await;
    assert_eq!(view["order"]["status"], "paid");
    assert_eq!(view["proofs"].as_array().unwrap().len(), 1);
    assert!(h
        .mailer
        .sent_to(&customer.email)
        .iter()
        .any(|m| m.subject.contains("payment confirmed")));

    let (_, vip) = call(&h, "GET", "/v1/store/vip", &me, None).await;
    assert_eq!(vip["lifetime_spend"], 8_690);
    assert_eq!(vip["current"]["name"], "standard");
    assert_eq!(vip["next"]["name"], "silver");

    // Another customer cannot see the order.
    let other = seed_customer(h.state.store.as_ref(), true).await;
    let (status, _) = call(&h, "GET", &format!("/v1/store/orders/{order_id}"), &as_customer(other.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_proof_keeps_order_pending_and_allows_a_new_one() {
    let h = harness();
    let (_, _, product) = seed_catalog(h.state.store.as_ref(), 2_500, 5).await;
    let customer = seed_customer(h.state.store.as_ref(), true).await;
    let me = as_customer(customer.id);

    call(&h, "POST", "/v1/store/cart/lines", &me, Some(json!({ "product_id": product.id, "quantity": 1 }))).await;
    let (_, order) = call(&h, "POST", "/v1/store/checkout", &me, Some(json!({ "shipping_address": address() }))).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let proof_uri = format!("/v1/store/orders/{order_id}/payment-proofs");
    let body = json!({ "url": "https://files.test/r.pdf", "content_type": "application/pdf", "size_bytes": 5_000 });
    let (_, proof) = call(&h, "POST", &proof_uri, &me, Some(body.clone())).await;
    let proof_id = proof["id"].as_str().unwrap();

    let (status, rejected) = call(
        &h,
        "POST",
        &format!("/v1/admin/payment-proofs/{proof_id}/reject"),
        &as_admin(),
        Some(json!({ "note": "amount does not match" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["review_note"], "amount does not match");

    let mail = h
        .mailer
        .sent_to(&customer.email)
        .into_iter()
        .find(|m| m.subject.contains("rejected"))
        .expect("rejection email");
    assert!(mail.text.contains("amount does not match"));

    let (_, view) = call(&h, "GET", &format!("/v1/store/orders/{order_id}"), &me, None).await;
    assert_eq!(view["order"]["status"], "pending");

    let (status, _) = call(&h, "POST", &proof_uri, &me, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    // A rejected proof cannot be approved afterwards.
    let (status, json) = call(
        &h,
        "POST",
        &format!("/v1/admin/payment-proofs/{proof_id}/approve"),
        &as_admin(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "illegal_transition");
}

// ---------------------------------------------------------------------------
// Concierge
// ---------------------------------------------------------------------------

/// Adds `quantity` of `product_id` and checks out; returns the order JSON.
async fn buy(h: &Harness, me: &[(&str, String)], product_id: Uuid, quantity: i32) -> Value {
    let (status, json) = call(
        h,
        "POST",
        "/v1/store/cart/lines",
        me,
        Some(json!({ "product_id": product_id, "quantity": quantity })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let (status, order) = call(
        h,
        "POST",
        "/v1/store/checkout",
        me,
        Some(json!({ "shipping_address": address() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

/// Runs a trade-in through offer, acceptance and completion.
async fn earn_credit(h: &Harness, me: &[(&str, String)], credit: i64) {
    let (status, t) = call(
        h,
        "POST",
        "/v1/store/trade-ins",
        me,
        Some(json!({
            "title": "Studio kiln shelf",
            "description": "Lightly used",
            "photo_urls": ["https://files.test/shelf.jpg"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{t}");
    let id = t["id"].as_str().unwrap().to_string();
    let (status, _) = call(
        h,
        "POST",
        &format!("/v1/admin/trade-ins/{id}/offer"),
        &as_admin(),
        Some(json!({ "credit": credit })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(h, "POST", &format!("/v1/store/trade-ins/{id}/accept"), me, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(h, "POST", &format!("/v1/admin/trade-ins/{id}/complete"), &as_admin(), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn silver_customer_checks_out_with_trade_in_credit() {
    let h = harness();
    let store = h.state.store.as_ref();
    let (_, _, product) = seed_catalog(store, 30_000, 10).await;
    let customer = seed_customer(store, true).await;
    let me = as_customer(customer.id);

    // Two settled orders lift lifetime spend to 60 000, past the silver threshold.
    for _ in 0..2 {
        let order = buy(&h, &me, product.id, 1).await;
        assert_eq!(order["vip_tier"], "standard");
        let id: Uuid = order["id"].as_str().unwrap().parse().unwrap();
        store
            .transition_order(id, OrderStatus::Pending, OrderStatus::Paid, Some("bank".into()), Utc::now())
            .await
            .unwrap();
    }
    let (_, vip) = call(&h, "GET", "/v1/store/vip", &me, None).await;
    assert_eq!(vip["current"]["name"], "silver");

    earn_credit(&h, &me, 5_000).await;

    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/cart/lines",
        &me,
        Some(json!({ "product_id": product.id, "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    let (status, quote) = call(&h, "GET", "/v1/store/checkout/quote", &me, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["vip_tier"], "silver");
    assert_eq!(quote["subtotal"], 30_000);
    assert_eq!(quote["discount"], 900); // 3% silver discount
    assert_eq!(quote["shipping"], 0); // discounted subtotal is over the free threshold
    assert_eq!(quote["store_credit_applied"], 5_000);
    assert_eq!(quote["total"], 24_100);

    let (status, order) = call(
        &h,
        "POST",
        "/v1/store/checkout",
        &me,
        Some(json!({ "shipping_address": address() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["discount"], 900);
    assert_eq!(order["store_credit_applied"], 5_000);
    assert_eq!(order["total"], 24_100);
    assert_eq!(store.get_customer(customer.id).await.unwrap().store_credit, Cents::ZERO);

    // Credit larger than the total settles the order at checkout, no proof needed.
    earn_credit(&h, &me, 40_000).await;
    let order = buy(&h, &me, product.id, 1).await;
    assert_eq!(order["store_credit_applied"], 29_100);
    assert_eq!(order["total"], 0);
    assert_eq!(order["status"], "paid");
    assert_eq!(order["payment_reference"], "store_credit");
    assert_eq!(
        store.get_customer(customer.id).await.unwrap().store_credit,
        Cents::new(10_900)
    );
    assert_eq!(store.get_product(product.id).await.unwrap().stock, 6);
}

#[tokio::test]
async fn stale_cart_edits_and_checkouts_are_refused() {
    let h = harness();
    let store = h.state.store.as_ref();
    let (_, _, product) = seed_catalog(store, 2_000, 10).await;
    let customer = seed_customer(store, true).await;
    let me = as_customer(customer.id);

    let (status, _) = call(
        &h,
        "POST",
        "/v1/store/cart/lines",
        &me,
        Some(json!({ "product_id": product.id, "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A second request writes between our read and our write.
    let stale = store.get_cart(customer.id).await.unwrap();
    let mut newer = stale.clone();
    newer.lines[0].quantity = 2;
    newer.updated_at_utc = Utc::now();
    store.save_cart(&newer, stale.updated_at_utc).await.unwrap();

    let mut ours = stale.clone();
    ours.lines[0].quantity = 3;
    ours.updated_at_utc = Utc::now();
    let err = store.save_cart(&ours, stale.updated_at_utc).await.unwrap_err();
    assert_eq!(err.code(), "conflict");
    assert_eq!(store.get_cart(customer.id).await.unwrap().lines[0].quantity, 2);

    // The API path reads the latest version and succeeds.
    let (status, cart) = call(
        &h,
        "PUT",
        &format!("/v1/store/cart/lines/{}", product.id),
        &me,
        Some(json!({ "quantity": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["lines"][0]["quantity"], 4);
}

#[tokio::test]
async fn concierge_thread_round_trip() {
    let h = harness();
    let customer = seed_customer(h.state.store.as_ref(), true).await;
    let me = as_customer(customer.id);

    let (status, _) = call(
        &h,
        "POST",
        "/v1/store/concierge/messages",
        &me,
        Some(json!({ "body": "Can this bowl hold soup?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, threads) = call(&h, "GET", "/v1/admin/concierge/threads", &as_admin(), None).await;
    assert_eq!(threads.as_array().unwrap().len(), 1);
    assert_eq!(threads[0]["last_author"], "customer");

    let (status, _) = call(
        &h,
        "POST",
        &format!("/v1/admin/concierge/threads/{}/reply", customer.id),
        &as_admin(),
        Some(json!({ "body": "Yes, it is food safe." })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, msgs) = call(&h, "GET", "/v1/store/concierge/messages", &me, None).await;
    let authors: Vec<&str> = msgs
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["author"].as_str().unwrap())
        .collect();
    assert_eq!(authors, vec!["customer", "concierge"]);
    assert!(h
        .mailer
        .sent_to(&customer.email)
        .iter()
        .any(|m| m.text.contains("food safe")));

    let (status, json) = call(
        &h,
        "POST",
        "/v1/store/concierge/messages",
        &me,
        Some(json!({ "body": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "missing_field");
}
