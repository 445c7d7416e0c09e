//! Customer-facing storefront: `/v1/store/*`.
//!
//! Browsing is anonymous. Everything under cart, checkout, orders, custom
//! orders, trade-ins, VIP and concierge needs the `x-customer-id` header.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use atelier_commerce::{
    add_line, price_lines, query, quote_checkout, remove_line, set_quantity, CartError, CatalogChange,
    CategoryNode, CheckoutQuote, Page, PricedLine, ProductQuery, Taxonomy, VipProgress,
};
use atelier_lifecycle::{custom_order::CustomOrderEvent, trade_in::TradeInEvent, Actor};
use atelier_notify::templates;
use atelier_schemas::{
    ArtisanStatus, Author, Cart, Category, CodePurpose, ConciergeMessage, CustomOrder, CustomOrderStatus,
    Customer, Order, OrderLine, OrderStatus, PaymentProof, Product, ProductStatus, ProofStatus, ShippingAddress,
    TradeIn, TradeInStatus,
};
use atelier_store::{NewOrder, StoreError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    api_types::{
        AddCartLineRequest, ArtisanSummary, CartResponse, CategoryView, CheckoutRequest, CodeSentResponse,
        ConciergeMessageRequest, CreateCustomOrderRequest, OrderView, PassportView, ProductView,
        RegisterCustomerRequest, ResendCodeRequest, SetQuantityRequest, SubmitProofRequest, SubmitTradeInRequest,
        VerifiedResponse, VerifyEmailRequest,
    },
    auth::CurrentCustomer,
    error::ApiError,
    flows,
    routes::{required_text, valid_email},
    state::AppState,
};

/// Longest concierge message a customer may post.
pub const MAX_MESSAGE_CHARS: usize = 4000;
/// Photos attached to one trade-in submission.
pub const MAX_TRADE_IN_PHOTOS: usize = 12;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/categories", get(categories_tree))
        .route("/categories/:slug", get(category_by_slug))
        .route("/products", get(search_products))
        .route("/products/:slug", get(product_by_slug))
        .route("/passports/:product_id", get(passport_page))
        .route("/customers", post(register_customer))
        .route("/customers/verify", post(verify_customer))
        .route("/customers/resend-code", post(resend_customer_code))
        .route("/me", get(me))
        .route("/cart", get(get_cart))
        .route("/cart/lines", post(add_cart_line))
        .route("/cart/lines/:product_id", put(set_cart_line).delete(remove_cart_line))
        .route("/checkout/quote", get(checkout_quote))
        .route("/checkout", post(checkout))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/payment-proofs", post(submit_payment_proof))
        .route("/custom-orders", get(list_custom_orders).post(create_custom_order))
        .route("/custom-orders/:id/submit", post(submit_custom_order))
        .route("/custom-orders/:id/accept", post(accept_custom_order))
        .route("/custom-orders/:id/cancel", post(cancel_custom_order))
        .route("/trade-ins", get(list_trade_ins).post(submit_trade_in))
        .route("/trade-ins/:id/accept", post(accept_trade_in))
        .route("/trade-ins/:id/decline", post(decline_trade_in))
        .route("/vip", get(vip_status))
        .route("/concierge/messages", get(list_concierge_messages).post(post_concierge_message))
}

// ---------------------------------------------------------------------------
// Catalog helpers
// ---------------------------------------------------------------------------

pub(crate) async fn load_taxonomy(st: &AppState) -> Result<Taxonomy, ApiError> {
    let categories = st.store.list_categories().await?;
    Taxonomy::build(categories).map_err(|e| {
        error!(error = %e, "stored taxonomy is inconsistent");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "catalog_unavailable", "catalog is unavailable")
    })
}

async fn active_artisan_ids(st: &AppState) -> Result<HashSet<Uuid>, ApiError> {
    Ok(st
        .store
        .list_artisans(Some(ArtisanStatus::Active))
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect())
}

/// Active product of an active artisan, or 404.
async fn visible_product(st: &AppState, product: Product) -> Result<(Product, ArtisanSummary), ApiError> {
    if product.status != ProductStatus::Active {
        return Err(ApiError::not_found(format!("product {}", product.slug)));
    }
    let artisan = st.store.get_artisan(product.artisan_id).await?;
    if artisan.status != ArtisanStatus::Active {
        return Err(ApiError::not_found(format!("product {}", product.slug)));
    }
    Ok((
        product,
        ArtisanSummary {
            id: artisan.id,
            display_name: artisan.display_name,
        },
    ))
}

fn owned_copy(cats: Vec<&Category>) -> Vec<Category> {
    cats.into_iter().cloned().collect()
}

// ---------------------------------------------------------------------------
// Browsing
// ---------------------------------------------------------------------------

async fn categories_tree(State(st): State<Arc<AppState>>) -> Result<Json<Vec<CategoryNode>>, ApiError> {
    Ok(Json(load_taxonomy(&st).await?.tree()))
}

async fn category_by_slug(
    State(st): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<CategoryView>, ApiError> {
    let taxonomy = load_taxonomy(&st).await?;
    let category = taxonomy
        .by_slug(&slug)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("category {slug}")))?;
    Ok(Json(CategoryView {
        breadcrumb: owned_copy(taxonomy.breadcrumb(category.id)),
        children: owned_copy(taxonomy.children(Some(category.id))),
        category,
    }))
}

async fn search_products(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ProductQuery>,
) -> Result<Json<Page<Product>>, ApiError> {
    if let (Some(lo), Some(hi)) = (q.min_price, q.max_price) {
        if lo > hi {
            return Err(ApiError::bad_request("invalid_price_range", "min_price exceeds max_price"));
        }
    }
    let taxonomy = load_taxonomy(&st).await?;
    if let Some(slug) = q.category.as_deref() {
        if taxonomy.by_slug(slug).is_none() {
            return Err(ApiError::not_found(format!("category {slug}")));
        }
    }
    let active = active_artisan_ids(&st).await?;
    let products: Vec<Product> = st
        .store
        .list_products(q.artisan_id)
        .await?
        .into_iter()
        .filter(|p| active.contains(&p.artisan_id))
        .collect();
    Ok(Json(query(&products, &taxonomy, &q, st.page_limits)))
}

async fn product_by_slug(
    State(st): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ProductView>, ApiError> {
    let product = st
        .store
        .product_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("product {slug}")))?;
    let (product, artisan) = visible_product(&st, product).await?;
    let taxonomy = load_taxonomy(&st).await?;
    let passport = st.store.get_passport(product.id).await?;
    Ok(Json(ProductView {
        breadcrumb: owned_copy(taxonomy.breadcrumb(product.category_id)),
        product,
        artisan,
        passport,
    }))
}

async fn passport_page(
    State(st): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<PassportView>, ApiError> {
    let product = st.store.get_product(product_id).await?;
    let (product, artisan) = visible_product(&st, product).await?;
    let passport = st
        .store
        .get_passport(product.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("passport for product {product_id}")))?;
    Ok(Json(PassportView {
        product_id: product.id,
        product_name: product.name,
        artisan,
        passport,
    }))
}

// ---------------------------------------------------------------------------
// Customer accounts
// ---------------------------------------------------------------------------

async fn register_customer(
    State(st): State<Arc<AppState>>,
    Json(req): Json<RegisterCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let email = valid_email(&req.email)?;
    let name = required_text("name", &req.name)?;
    if st.store.customer_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("email_taken", "an account with this email already exists"));
    }

    let customer = Customer {
        id: Uuid::new_v4(),
        email: email.clone(),
        name,
        email_verified: false,
        store_credit: atelier_schemas::Cents::ZERO,
        created_at_utc: Utc::now(),
    };
    st.store.insert_customer(&customer).await?;
    info!(customer_id = %customer.id, "customer registered");

    flows::send_code(&st, &email, CodePurpose::CustomerEmail).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn verify_customer(
    State(st): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let customer = st
        .store
        .customer_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::not_found("customer"))?;
    if customer.email_verified {
        return Ok(Json(VerifiedResponse { verified: true }));
    }
    flows::redeem_code(&st, &customer.email, CodePurpose::CustomerEmail, &req.code).await?;
    st.store.mark_customer_verified(customer.id).await?;
    info!(customer_id = %customer.id, "customer email verified");
    Ok(Json(VerifiedResponse { verified: true }))
}

async fn resend_customer_code(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ResendCodeRequest>,
) -> Result<Json<CodeSentResponse>, ApiError> {
    if let Some(c) = st.store.customer_by_email(&req.email).await? {
        if !c.email_verified {
            flows::send_code(&st, &c.email, CodePurpose::CustomerEmail).await?;
        }
    }
    Ok(Json(CodeSentResponse { sent: true }))
}

async fn me(CurrentCustomer(customer): CurrentCustomer) -> Json<Customer> {
    Json(customer)
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

/// A product the customer may put in a cart right now.
async fn orderable_product(st: &AppState, product_id: Uuid) -> Result<Product, ApiError> {
    let product = match st.store.get_product(product_id).await {
        Ok(p) => p,
        Err(StoreError::NotFound { .. }) => return Err(CartError::ProductUnavailable(product_id).into()),
        Err(e) => return Err(e.into()),
    };
    let artisan = st.store.get_artisan(product.artisan_id).await?;
    if artisan.status != ArtisanStatus::Active {
        return Err(CartError::ProductUnavailable(product_id).into());
    }
    Ok(product)
}

async fn get_cart(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Result<Json<CartResponse>, ApiError> {
    Ok(Json(st.store.get_cart(customer.id).await?))
}

async fn add_cart_line(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Json(req): Json<AddCartLineRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product = orderable_product(&st, req.product_id).await?;
    let mut cart = st.store.get_cart(customer.id).await?;
    add_line(&mut cart, &product, req.quantity, st.settings.cart.max_quantity_per_line)?;
    Ok(Json(save_cart(&st, cart).await?))
}

async fn set_cart_line(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(product_id): Path<Uuid>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let mut cart = st.store.get_cart(customer.id).await?;
    if req.quantity == 0 {
        remove_line(&mut cart, product_id)?;
    } else {
        let product = orderable_product(&st, product_id).await?;
        set_quantity(&mut cart, &product, req.quantity, st.settings.cart.max_quantity_per_line)?;
    }
    Ok(Json(save_cart(&st, cart).await?))
}

async fn remove_cart_line(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartResponse>, ApiError> {
    let mut cart = st.store.get_cart(customer.id).await?;
    remove_line(&mut cart, product_id)?;
    Ok(Json(save_cart(&st, cart).await?))
}

/// Stamps and stores an edited cart, refusing if another request saved first.
async fn save_cart(st: &AppState, mut cart: Cart) -> Result<Cart, ApiError> {
    let expected = cart.updated_at_utc;
    cart.updated_at_utc = Utc::now();
    match st.store.save_cart(&cart, expected).await {
        Ok(()) => Ok(cart),
        Err(StoreError::Conflict(_)) => Err(ApiError::conflict(
            "cart_changed",
            "the cart was changed by another request; reload it and retry",
        )),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Re-reads every product in the cart and prices it for `customer`.
async fn price_cart(st: &AppState, customer: &Customer) -> Result<(Cart, Vec<PricedLine>, CheckoutQuote), ApiError> {
    let cart = st.store.get_cart(customer.id).await?;
    if cart.is_empty() {
        return Err(CartError::EmptyCart.into());
    }

    let active = active_artisan_ids(st).await?;
    let mut products = HashMap::new();
    for line in &cart.lines {
        match st.store.get_product(line.product_id).await {
            Ok(p) if active.contains(&p.artisan_id) => {
                products.insert(p.id, p);
            }
            // Left out; price_lines reports the line as unavailable.
            Ok(_) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let lines = price_lines(&cart, &products, st.settings.cart.max_quantity_per_line)?;
    let spend = st.store.lifetime_spend(customer.id).await?;
    let tier = st.vip.tier_for(spend);
    let quote = quote_checkout(&lines, tier, &st.shipping, customer.store_credit)?;
    Ok((cart, lines, quote))
}

async fn checkout_quote(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Result<Json<CheckoutQuote>, ApiError> {
    let (_, _, quote) = price_cart(&st, &customer).await?;
    Ok(Json(quote))
}

fn validate_address(addr: ShippingAddress) -> Result<ShippingAddress, ApiError> {
    let country = addr.country.trim().to_ascii_uppercase();
    if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ApiError::bad_request(
            "invalid_address",
            "country must be an ISO 3166-1 alpha-2 code",
        ));
    }
    let opt = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Ok(ShippingAddress {
        recipient: required_text("recipient", &addr.recipient)?,
        line1: required_text("line1", &addr.line1)?,
        line2: opt(addr.line2),
        city: required_text("city", &addr.city)?,
        region: opt(addr.region),
        postal_code: required_text("postal_code", &addr.postal_code)?,
        country,
    })
}

async fn checkout(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    if !customer.email_verified {
        return Err(ApiError::forbidden("email_not_verified", "verify your email address before checking out"));
    }
    let shipping_address = validate_address(req.shipping_address)?;
    let (cart, lines, quote) = price_cart(&st, &customer).await?;

    let new = NewOrder {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        lines: lines
            .iter()
            .map(|l| OrderLine {
                product_id: l.product_id,
                artisan_id: l.artisan_id,
                name: l.name.clone(),
                unit_price: l.unit_price,
                quantity: l.quantity,
            })
            .collect(),
        subtotal: quote.subtotal,
        discount: quote.discount,
        shipping: quote.shipping,
        store_credit_applied: quote.store_credit_applied,
        total: quote.total,
        vip_tier: quote.vip_tier.clone(),
        shipping_address,
        created_at_utc: Utc::now(),
        cart_updated_at_utc: cart.updated_at_utc,
    };
    let order = match st.store.place_order(new).await {
        Ok(order) => order,
        // The cart or the store credit moved since it was priced.
        Err(StoreError::Conflict(_)) => {
            return Err(ApiError::conflict(
                "checkout_changed",
                "the cart or store credit changed during checkout; review it and retry",
            ))
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        order_id = %order.id,
        customer_id = %customer.id,
        total = %order.total,
        lines = order.lines.len(),
        "order placed"
    );
    st.log_line("INFO", format!("order {} placed", order.id));

    for line in &order.lines {
        st.revalidate(&CatalogChange::StockChanged {
            product_id: line.product_id,
            artisan_id: line.artisan_id,
        });
    }
    st.send_email(templates::order_placed(&st.branding, &customer.email, &order))
        .await;

    // Nothing left to collect once store credit covers the whole total.
    if order.total == atelier_schemas::Cents::ZERO {
        let paid = flows::confirm_payment(
            &st,
            order.id,
            Some(STORE_CREDIT_REFERENCE.to_string()),
            Actor::Customer,
        )
        .await?;
        return Ok((StatusCode::CREATED, Json(paid.order)));
    }
    Ok((StatusCode::CREATED, Json(order)))
}

/// `payment_reference` of orders settled entirely with store credit.
pub const STORE_CREDIT_REFERENCE: &str = "store_credit";

// ---------------------------------------------------------------------------
// Orders & payment proofs
// ---------------------------------------------------------------------------

async fn own_order(st: &AppState, customer: &Customer, id: Uuid) -> Result<Order, ApiError> {
    let order = st.store.get_order(id).await?;
    if order.customer_id != customer.id {
        return Err(ApiError::not_found(format!("order {id}")));
    }
    Ok(order)
}

async fn list_orders(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(st.store.list_orders_for_customer(customer.id).await?))
}

async fn get_order(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, ApiError> {
    let order = own_order(&st, &customer, id).await?;
    let proofs = st.store.list_proofs_for_order(order.id).await?;
    Ok(Json(OrderView { order, proofs }))
}

async fn submit_payment_proof(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitProofRequest>,
) -> Result<(StatusCode, Json<PaymentProof>), ApiError> {
    let order = own_order(&st, &customer, id).await?;
    if order.status != OrderStatus::Pending {
        return Err(ApiError::conflict(
            "order_not_pending",
            format!("order {id} is {}", order.status),
        ));
    }

    let url = req.url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ApiError::bad_request("invalid_url", "proof url must be http(s)"));
    }
    let policy = &st.settings.payment_proofs;
    let content_type = req.content_type.trim().to_ascii_lowercase();
    if !policy
        .allowed_content_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&content_type))
    {
        return Err(ApiError::bad_request(
            "unsupported_content_type",
            format!("{content_type} is not an accepted proof format"),
        ));
    }
    if req.size_bytes <= 0 || req.size_bytes > policy.max_bytes {
        return Err(ApiError::bad_request(
            "invalid_size",
            format!("proof must be between 1 and {} bytes", policy.max_bytes),
        ));
    }

    let proof = PaymentProof {
        id: Uuid::new_v4(),
        order_id: order.id,
        customer_id: customer.id,
        url: url.to_string(),
        content_type,
        size_bytes: req.size_bytes,
        status: ProofStatus::Submitted,
        review_note: None,
        submitted_at_utc: Utc::now(),
        reviewed_at_utc: None,
    };
    st.store.insert_proof(&proof).await?;
    info!(proof_id = %proof.id, order_id = %order.id, "payment proof submitted");
    st.log_line("INFO", format!("payment proof for order {} awaiting review", order.id));
    Ok((StatusCode::CREATED, Json(proof)))
}

// ---------------------------------------------------------------------------
// Custom orders
// ---------------------------------------------------------------------------

async fn own_custom_order(st: &AppState, customer: &Customer, id: Uuid) -> Result<CustomOrder, ApiError> {
    let co = st.store.get_custom_order(id).await?;
    if co.customer_id != customer.id {
        return Err(ApiError::not_found(format!("custom order {id}")));
    }
    Ok(co)
}

async fn list_custom_orders(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Result<Json<Vec<CustomOrder>>, ApiError> {
    Ok(Json(st.store.list_custom_orders_for_customer(customer.id).await?))
}

async fn create_custom_order(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Json(req): Json<CreateCustomOrderRequest>,
) -> Result<(StatusCode, Json<CustomOrder>), ApiError> {
    let description = required_text("description", &req.description)?;
    if req.budget.is_some_and(|b| !b.is_positive()) {
        return Err(ApiError::bad_request("invalid_budget", "budget must be positive"));
    }
    let artisan = match st.store.get_artisan(req.artisan_id).await {
        Ok(a) if a.status == ArtisanStatus::Active => a,
        Ok(_) | Err(StoreError::NotFound { .. }) => {
            return Err(ApiError::bad_request(
                "artisan_unavailable",
                "artisan is not accepting commissions",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let now = Utc::now();
    let co = CustomOrder {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        artisan_id: artisan.id,
        description,
        budget: req.budget,
        quote: None,
        lead_time_days: None,
        artisan_note: None,
        status: CustomOrderStatus::Draft,
        created_at_utc: now,
        updated_at_utc: now,
    };
    st.store.insert_custom_order(&co).await?;
    info!(custom_order_id = %co.id, artisan_id = %artisan.id, "custom order drafted");

    let co = if req.submit {
        flows::advance_custom_order(&st, co, CustomOrderEvent::Submit, Actor::Customer).await?
    } else {
        co
    };
    Ok((StatusCode::CREATED, Json(co)))
}

async fn customer_custom_order_event(
    st: &AppState,
    customer: &Customer,
    id: Uuid,
    event: CustomOrderEvent,
) -> Result<Json<CustomOrder>, ApiError> {
    let co = own_custom_order(st, customer, id).await?;
    Ok(Json(flows::advance_custom_order(st, co, event, Actor::Customer).await?))
}

async fn submit_custom_order(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    customer_custom_order_event(&st, &customer, id, CustomOrderEvent::Submit).await
}

async fn accept_custom_order(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    customer_custom_order_event(&st, &customer, id, CustomOrderEvent::Accept).await
}

async fn cancel_custom_order(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    customer_custom_order_event(&st, &customer, id, CustomOrderEvent::Cancel).await
}

// ---------------------------------------------------------------------------
// Trade-ins
// ---------------------------------------------------------------------------

async fn list_trade_ins(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Result<Json<Vec<TradeIn>>, ApiError> {
    Ok(Json(st.store.list_trade_ins_for_customer(customer.id).await?))
}

async fn submit_trade_in(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Json(req): Json<SubmitTradeInRequest>,
) -> Result<(StatusCode, Json<TradeIn>), ApiError> {
    let title = required_text("title", &req.title)?;
    let description = required_text("description", &req.description)?;
    let photo_urls: Vec<String> = req
        .photo_urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if photo_urls.len() > MAX_TRADE_IN_PHOTOS {
        return Err(ApiError::bad_request(
            "too_many_photos",
            format!("at most {MAX_TRADE_IN_PHOTOS} photos per trade-in"),
        ));
    }

    let now = Utc::now();
    let t = TradeIn {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        title,
        description,
        photo_urls,
        offered_credit: None,
        status: TradeInStatus::Submitted,
        admin_note: None,
        created_at_utc: now,
        updated_at_utc: now,
    };
    st.store.insert_trade_in(&t).await?;
    info!(trade_in_id = %t.id, customer_id = %customer.id, "trade-in submitted");
    st.log_line("INFO", format!("trade-in {} submitted", t.id));
    Ok((StatusCode::CREATED, Json(t)))
}

async fn own_trade_in(st: &AppState, customer: &Customer, id: Uuid) -> Result<TradeIn, ApiError> {
    let t = st.store.get_trade_in(id).await?;
    if t.customer_id != customer.id {
        return Err(ApiError::not_found(format!("trade-in {id}")));
    }
    Ok(t)
}

async fn accept_trade_in(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<TradeIn>, ApiError> {
    let t = own_trade_in(&st, &customer, id).await?;
    Ok(Json(flows::advance_trade_in(&st, t, TradeInEvent::Accept).await?))
}

async fn decline_trade_in(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<TradeIn>, ApiError> {
    let t = own_trade_in(&st, &customer, id).await?;
    Ok(Json(flows::advance_trade_in(&st, t, TradeInEvent::Decline).await?))
}

// ---------------------------------------------------------------------------
// VIP & concierge
// ---------------------------------------------------------------------------

async fn vip_status(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Result<Json<VipProgress>, ApiError> {
    let spend = st.store.lifetime_spend(customer.id).await?;
    Ok(Json(st.vip.progress(spend)))
}

async fn list_concierge_messages(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Result<Json<Vec<ConciergeMessage>>, ApiError> {
    Ok(Json(st.store.list_messages(customer.id).await?))
}

async fn post_concierge_message(
    State(st): State<Arc<AppState>>,
    CurrentCustomer(customer): CurrentCustomer,
    Json(req): Json<ConciergeMessageRequest>,
) -> Result<(StatusCode, Json<ConciergeMessage>), ApiError> {
    let body = required_text("body", &req.body)?;
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::bad_request(
            "message_too_long",
            format!("messages are limited to {MAX_MESSAGE_CHARS} characters"),
        ));
    }
    let msg = ConciergeMessage {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        author: Author::Customer,
        body,
        created_at_utc: Utc::now(),
    };
    st.store.append_message(&msg).await?;
    info!(customer_id = %customer.id, message_id = %msg.id, "concierge message received");
    st.log_line("INFO", format!("concierge message from customer {}", customer.id));
    Ok((StatusCode::CREATED, Json(msg)))
}
