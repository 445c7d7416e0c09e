//! Row decoding and sqlx error mapping.

use atelier_schemas::{
    Artisan, ArtisanStatus, Author, Cart, CartLine, Category, Cents, CodePurpose,
    ConciergeMessage, Customer, CustomOrder, CustomOrderStatus, Order, OrderLine, OrderStatus,
    Passport, PaymentProof, Product, ProductStatus, ProofStatus, ShippingAddress, TradeIn,
    TradeInStatus, UnknownStatus, VerificationCode,
};
use atelier_store::StoreError;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;

pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        let constraint = db.constraint().unwrap_or("unknown").to_string();
        match db.code().as_deref() {
            // unique_violation
            Some("23505") => return StoreError::Conflict(format!("unique constraint {constraint}")),
            // foreign_key_violation
            Some("23503") => {
                return StoreError::NotFound {
                    entity: "referenced row",
                    id: constraint,
                }
            }
            _ => {}
        }
    }
    StoreError::Backend(e.to_string())
}

fn bad_status(e: UnknownStatus) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn cents(row: &PgRow, col: &str) -> Result<Cents, StoreError> {
    row.try_get::<i64, _>(col).map(Cents::new).map_err(db_err)
}

fn opt_cents(row: &PgRow, col: &str) -> Result<Option<Cents>, StoreError> {
    Ok(row.try_get::<Option<i64>, _>(col).map_err(db_err)?.map(Cents::new))
}

fn text(row: &PgRow, col: &str) -> Result<String, StoreError> {
    row.try_get(col).map_err(db_err)
}

pub(crate) fn customer(row: &PgRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: row.try_get("id").map_err(db_err)?,
        email: text(row, "email")?,
        name: text(row, "name")?,
        email_verified: row.try_get("email_verified").map_err(db_err)?,
        store_credit: cents(row, "store_credit_cents")?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn artisan(row: &PgRow) -> Result<Artisan, StoreError> {
    Ok(Artisan {
        id: row.try_get("id").map_err(db_err)?,
        email: text(row, "email")?,
        display_name: text(row, "display_name")?,
        bio: row.try_get("bio").map_err(db_err)?,
        status: ArtisanStatus::parse(&text(row, "status")?).map_err(bad_status)?,
        email_verified: row.try_get("email_verified").map_err(db_err)?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
        approved_at_utc: row.try_get("approved_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn category(row: &PgRow) -> Result<Category, StoreError> {
    Ok(Category {
        id: row.try_get("id").map_err(db_err)?,
        parent_id: row.try_get("parent_id").map_err(db_err)?,
        name: text(row, "name")?,
        slug: text(row, "slug")?,
        position: row.try_get("position").map_err(db_err)?,
    })
}

pub(crate) fn product(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id").map_err(db_err)?,
        artisan_id: row.try_get("artisan_id").map_err(db_err)?,
        category_id: row.try_get("category_id").map_err(db_err)?,
        name: text(row, "name")?,
        slug: text(row, "slug")?,
        description: text(row, "description")?,
        price: cents(row, "price_cents")?,
        stock: row.try_get("stock").map_err(db_err)?,
        status: ProductStatus::parse(&text(row, "status")?).map_err(bad_status)?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
        updated_at_utc: row.try_get("updated_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn passport(row: &PgRow) -> Result<Passport, StoreError> {
    let Json(materials): Json<Vec<String>> = row.try_get("materials").map_err(db_err)?;
    Ok(Passport {
        product_id: row.try_get("product_id").map_err(db_err)?,
        origin: text(row, "origin")?,
        materials,
        technique: row.try_get("technique").map_err(db_err)?,
        artisan_notes: row.try_get("artisan_notes").map_err(db_err)?,
        crafted_on: row.try_get("crafted_on").map_err(db_err)?,
        updated_at_utc: row.try_get("updated_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn cart(row: &PgRow) -> Result<Cart, StoreError> {
    let Json(lines): Json<Vec<CartLine>> = row.try_get("lines").map_err(db_err)?;
    Ok(Cart {
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        lines,
        updated_at_utc: row.try_get("updated_at_utc").map_err(db_err)?,
    })
}

/// Order header; lines are attached by the caller.
pub(crate) fn order(row: &PgRow) -> Result<Order, StoreError> {
    let Json(shipping_address): Json<ShippingAddress> =
        row.try_get("shipping_address").map_err(db_err)?;
    Ok(Order {
        id: row.try_get("id").map_err(db_err)?,
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        status: OrderStatus::parse(&text(row, "status")?).map_err(bad_status)?,
        lines: Vec::new(),
        subtotal: cents(row, "subtotal_cents")?,
        discount: cents(row, "discount_cents")?,
        shipping: cents(row, "shipping_cents")?,
        store_credit_applied: cents(row, "store_credit_applied_cents")?,
        total: cents(row, "total_cents")?,
        vip_tier: text(row, "vip_tier")?,
        shipping_address,
        payment_reference: row.try_get("payment_reference").map_err(db_err)?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
        paid_at_utc: row.try_get("paid_at_utc").map_err(db_err)?,
        failed_at_utc: row.try_get("failed_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn order_line(row: &PgRow) -> Result<OrderLine, StoreError> {
    Ok(OrderLine {
        product_id: row.try_get("product_id").map_err(db_err)?,
        artisan_id: row.try_get("artisan_id").map_err(db_err)?,
        name: text(row, "name")?,
        unit_price: cents(row, "unit_price_cents")?,
        quantity: row.try_get("quantity").map_err(db_err)?,
    })
}

pub(crate) fn proof(row: &PgRow) -> Result<PaymentProof, StoreError> {
    Ok(PaymentProof {
        id: row.try_get("id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        url: text(row, "url")?,
        content_type: text(row, "content_type")?,
        size_bytes: row.try_get("size_bytes").map_err(db_err)?,
        status: ProofStatus::parse(&text(row, "status")?).map_err(bad_status)?,
        review_note: row.try_get("review_note").map_err(db_err)?,
        submitted_at_utc: row.try_get("submitted_at_utc").map_err(db_err)?,
        reviewed_at_utc: row.try_get("reviewed_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn custom_order(row: &PgRow) -> Result<CustomOrder, StoreError> {
    Ok(CustomOrder {
        id: row.try_get("id").map_err(db_err)?,
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        artisan_id: row.try_get("artisan_id").map_err(db_err)?,
        description: text(row, "description")?,
        budget: opt_cents(row, "budget_cents")?,
        quote: opt_cents(row, "quote_cents")?,
        lead_time_days: row.try_get("lead_time_days").map_err(db_err)?,
        artisan_note: row.try_get("artisan_note").map_err(db_err)?,
        status: CustomOrderStatus::parse(&text(row, "status")?).map_err(bad_status)?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
        updated_at_utc: row.try_get("updated_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn trade_in(row: &PgRow) -> Result<TradeIn, StoreError> {
    let Json(photo_urls): Json<Vec<String>> = row.try_get("photo_urls").map_err(db_err)?;
    Ok(TradeIn {
        id: row.try_get("id").map_err(db_err)?,
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        title: text(row, "title")?,
        description: text(row, "description")?,
        photo_urls,
        offered_credit: opt_cents(row, "offered_credit_cents")?,
        status: TradeInStatus::parse(&text(row, "status")?).map_err(bad_status)?,
        admin_note: row.try_get("admin_note").map_err(db_err)?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
        updated_at_utc: row.try_get("updated_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn code(row: &PgRow) -> Result<VerificationCode, StoreError> {
    Ok(VerificationCode {
        id: row.try_get("id").map_err(db_err)?,
        subject: text(row, "subject")?,
        purpose: CodePurpose::parse(&text(row, "purpose")?).map_err(bad_status)?,
        code: text(row, "code")?,
        expires_at_utc: row.try_get("expires_at_utc").map_err(db_err)?,
        used: row.try_get("used").map_err(db_err)?,
        attempts: row.try_get("attempts").map_err(db_err)?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
    })
}

pub(crate) fn message(row: &PgRow) -> Result<ConciergeMessage, StoreError> {
    Ok(ConciergeMessage {
        id: row.try_get("id").map_err(db_err)?,
        customer_id: row.try_get("customer_id").map_err(db_err)?,
        author: Author::parse(&text(row, "author")?).map_err(bad_status)?,
        body: text(row, "body")?,
        created_at_utc: row.try_get("created_at_utc").map_err(db_err)?,
    })
}
