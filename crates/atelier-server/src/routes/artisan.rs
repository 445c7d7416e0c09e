//! Artisan seller portal: `/v1/artisan/*`.
//!
//! Signup and verification are open. Catalog and custom-order endpoints
//! need an `active` artisan in `x-artisan-id`.

use std::sync::Arc;

use atelier_commerce::{slugify, CatalogChange, Taxonomy};
use atelier_lifecycle::{custom_order::CustomOrderEvent, Actor};
use atelier_schemas::{
    Artisan, ArtisanStatus, Cents, CodePurpose, CustomOrder, CustomOrderStatus, Passport, Product, ProductStatus,
};
use atelier_store::StoreError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{
        ArtisanSignupRequest, CodeSentResponse, CreateProductRequest, PassportRequest, QuoteRequest,
        ResendCodeRequest, StockAdjustRequest, UpdateProductRequest, VerifiedResponse, VerifyEmailRequest,
    },
    auth::{ActiveArtisan, CurrentArtisan},
    error::ApiError,
    flows,
    routes::{required_text, storefront::load_taxonomy, valid_email},
    state::AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/verify", post(verify))
        .route("/resend-code", post(resend_code))
        .route("/me", get(me))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product))
        .route("/products/:id/stock", post(adjust_stock))
        .route("/products/:id/passport", put(upsert_passport))
        .route("/custom-orders", get(list_custom_orders))
        .route("/custom-orders/:id/quote", post(quote_custom_order))
        .route("/custom-orders/:id/start", post(start_custom_order))
        .route("/custom-orders/:id/complete", post(complete_custom_order))
        .route("/custom-orders/:id/deliver", post(deliver_custom_order))
        .route("/custom-orders/:id/cancel", post(cancel_custom_order))
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

async fn signup(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ArtisanSignupRequest>,
) -> Result<(StatusCode, Json<Artisan>), ApiError> {
    let email = valid_email(&req.email)?;
    let display_name = required_text("display_name", &req.display_name)?;
    if st.store.artisan_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("email_taken", "an artisan with this email already exists"));
    }

    let artisan = Artisan {
        id: Uuid::new_v4(),
        email: email.clone(),
        display_name,
        bio: req.bio.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()),
        status: ArtisanStatus::Pending,
        email_verified: false,
        created_at_utc: Utc::now(),
        approved_at_utc: None,
    };
    st.store.insert_artisan(&artisan).await?;
    info!(artisan_id = %artisan.id, "artisan signed up");
    st.log_line("INFO", format!("artisan {} awaiting approval", artisan.id));

    flows::send_code(&st, &email, CodePurpose::ArtisanEmail).await?;
    Ok((StatusCode::CREATED, Json(artisan)))
}

async fn verify(
    State(st): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let artisan = st
        .store
        .artisan_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::not_found("artisan"))?;
    if artisan.email_verified {
        return Ok(Json(VerifiedResponse { verified: true }));
    }
    flows::redeem_code(&st, &artisan.email, CodePurpose::ArtisanEmail, &req.code).await?;
    st.store.mark_artisan_verified(artisan.id).await?;
    info!(artisan_id = %artisan.id, "artisan email verified");
    Ok(Json(VerifiedResponse { verified: true }))
}

async fn resend_code(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ResendCodeRequest>,
) -> Result<Json<CodeSentResponse>, ApiError> {
    if let Some(a) = st.store.artisan_by_email(&req.email).await? {
        if !a.email_verified {
            flows::send_code(&st, &a.email, CodePurpose::ArtisanEmail).await?;
        }
    }
    Ok(Json(CodeSentResponse { sent: true }))
}

async fn me(CurrentArtisan(artisan): CurrentArtisan) -> Json<Artisan> {
    Json(artisan)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

async fn own_product(st: &AppState, artisan: &Artisan, id: Uuid) -> Result<Product, ApiError> {
    let p = st.store.get_product(id).await?;
    if p.artisan_id != artisan.id {
        return Err(ApiError::not_found(format!("product {id}")));
    }
    Ok(p)
}

fn category_slug(taxonomy: &Taxonomy, id: Uuid) -> Result<String, ApiError> {
    taxonomy
        .get(id)
        .map(|c| c.slug.clone())
        .ok_or_else(|| ApiError::bad_request("unknown_category", format!("category {id} does not exist")))
}

/// `base`, or `base-2`, `base-3`, ... until no other product holds it.
async fn unique_product_slug(st: &AppState, base: &str, own_id: Uuid) -> Result<String, ApiError> {
    let mut candidate = base.to_string();
    let mut n = 1;
    while let Some(existing) = st.store.product_by_slug(&candidate).await? {
        if existing.id == own_id {
            break;
        }
        n += 1;
        candidate = format!("{base}-{n}");
    }
    Ok(candidate)
}

fn check_price(price: Cents) -> Result<(), ApiError> {
    if !price.is_positive() {
        return Err(ApiError::bad_request("invalid_price", "price must be positive"));
    }
    Ok(())
}

async fn list_products(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(st.store.list_products(Some(artisan.id)).await?))
}

async fn get_product(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(own_product(&st, &artisan, id).await?))
}

async fn create_product(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let name = required_text("name", &req.name)?;
    check_price(req.price)?;
    if req.stock < 0 {
        return Err(ApiError::bad_request("invalid_stock", "stock must not be negative"));
    }
    let taxonomy = load_taxonomy(&st).await?;
    let category_slug = category_slug(&taxonomy, req.category_id)?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let product = Product {
        id,
        artisan_id: artisan.id,
        category_id: req.category_id,
        slug: unique_product_slug(&st, &slugify(&name), id).await?,
        name,
        description: req.description.trim().to_string(),
        price: req.price,
        stock: req.stock,
        status: req.status.unwrap_or(ProductStatus::Draft),
        created_at_utc: now,
        updated_at_utc: now,
    };
    st.store.insert_product(&product).await?;
    info!(product_id = %product.id, artisan_id = %artisan.id, slug = %product.slug, "product created");

    st.revalidate(&CatalogChange::ProductCreated {
        product_id: product.id,
        artisan_id: artisan.id,
        category_slug,
    });
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let mut product = own_product(&st, &artisan, id).await?;
    let taxonomy = load_taxonomy(&st).await?;
    let previous_slug = category_slug(&taxonomy, product.category_id)?;

    if let Some(name) = &req.name {
        let name = required_text("name", name)?;
        if name != product.name {
            product.slug = unique_product_slug(&st, &slugify(&name), product.id).await?;
            product.name = name;
        }
    }
    if let Some(description) = &req.description {
        product.description = description.trim().to_string();
    }
    if let Some(price) = req.price {
        check_price(price)?;
        product.price = price;
    }
    if let Some(status) = req.status {
        product.status = status;
    }
    if let Some(category_id) = req.category_id {
        category_slug(&taxonomy, category_id)?;
        product.category_id = category_id;
    }
    product.updated_at_utc = Utc::now();

    st.store.update_product(&product).await?;
    info!(product_id = %product.id, status = %product.status, "product updated");

    let category_slug = category_slug(&taxonomy, product.category_id)?;
    st.revalidate(&CatalogChange::ProductUpdated {
        product_id: product.id,
        artisan_id: artisan.id,
        previous_category_slug: (previous_slug != category_slug).then_some(previous_slug),
        category_slug,
    });
    // update_product keeps the stored stock; return what is stored.
    Ok(Json(st.store.get_product(product.id).await?))
}

async fn adjust_stock(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
    Json(req): Json<StockAdjustRequest>,
) -> Result<Json<Product>, ApiError> {
    own_product(&st, &artisan, id).await?;
    if req.delta == 0 {
        return Err(ApiError::bad_request("invalid_delta", "delta must not be zero"));
    }
    let product = match st.store.adjust_stock(id, req.delta).await {
        Ok(p) => p,
        Err(StoreError::InsufficientStock { available, .. }) => {
            return Err(ApiError::conflict(
                "insufficient_stock",
                format!("cannot remove {} units; {available} in stock", -req.delta),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    info!(product_id = %id, delta = req.delta, stock = product.stock, "stock adjusted");
    st.revalidate(&CatalogChange::StockChanged {
        product_id: id,
        artisan_id: artisan.id,
    });
    Ok(Json(product))
}

async fn upsert_passport(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
    Json(req): Json<PassportRequest>,
) -> Result<Json<Passport>, ApiError> {
    own_product(&st, &artisan, id).await?;
    let origin = required_text("origin", &req.origin)?;
    if let Some(day) = req.crafted_on {
        if day > Utc::now().date_naive() {
            return Err(ApiError::bad_request("invalid_date", "crafted_on is in the future"));
        }
    }
    let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let passport = Passport {
        product_id: id,
        origin,
        materials: req
            .materials
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect(),
        technique: trimmed(req.technique),
        artisan_notes: trimmed(req.artisan_notes),
        crafted_on: req.crafted_on,
        updated_at_utc: Utc::now(),
    };
    st.store.upsert_passport(&passport).await?;
    info!(product_id = %id, "passport updated");
    st.revalidate(&CatalogChange::PassportUpdated { product_id: id });
    Ok(Json(passport))
}

// ---------------------------------------------------------------------------
// Custom orders
// ---------------------------------------------------------------------------

async fn list_custom_orders(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
) -> Result<Json<Vec<CustomOrder>>, ApiError> {
    Ok(Json(st.store.list_custom_orders_for_artisan(artisan.id).await?))
}

async fn artisan_event(
    st: &AppState,
    artisan: &Artisan,
    id: Uuid,
    event: CustomOrderEvent,
) -> Result<Json<CustomOrder>, ApiError> {
    let co = st.store.get_custom_order(id).await?;
    // Drafts are private to the customer.
    if co.artisan_id != artisan.id || co.status == CustomOrderStatus::Draft {
        return Err(ApiError::not_found(format!("custom order {id}")));
    }
    Ok(Json(flows::advance_custom_order(st, co, event, Actor::Artisan).await?))
}

async fn quote_custom_order(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<CustomOrder>, ApiError> {
    let event = CustomOrderEvent::Quote {
        amount: req.amount,
        lead_time_days: req.lead_time_days,
        note: req.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    };
    artisan_event(&st, &artisan, id, event).await
}

async fn start_custom_order(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    artisan_event(&st, &artisan, id, CustomOrderEvent::StartProduction).await
}

async fn complete_custom_order(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    artisan_event(&st, &artisan, id, CustomOrderEvent::Complete).await
}

async fn deliver_custom_order(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    artisan_event(&st, &artisan, id, CustomOrderEvent::Deliver).await
}

async fn cancel_custom_order(
    State(st): State<Arc<AppState>>,
    ActiveArtisan(artisan): ActiveArtisan,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomOrder>, ApiError> {
    artisan_event(&st, &artisan, id, CustomOrderEvent::Cancel).await
}
