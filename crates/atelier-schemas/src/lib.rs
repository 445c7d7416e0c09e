//! Shared records for the Atelier marketplace.
//!
//! Plain data only: storage, lifecycle rules and pricing live in their own
//! crates and operate on these types.

pub mod money;
pub mod status;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use money::Cents;
pub use status::{
    ArtisanStatus, Author, CodePurpose, CustomOrderStatus, OrderStatus, ProductStatus,
    ProofStatus, TradeInStatus, UnknownStatus,
};

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    /// Balance earned from completed trade-ins, spendable at checkout.
    pub store_credit: Cents,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artisan {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub status: ArtisanStatus,
    pub email_verified: bool,
    pub created_at_utc: DateTime<Utc>,
    pub approved_at_utc: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    /// Sort key among siblings.
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub artisan_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Cents,
    pub stock: i32,
    pub status: ProductStatus,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

/// Provenance record shown on a product's public passport page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passport {
    pub product_id: Uuid,
    /// Workshop or region the piece comes from.
    pub origin: String,
    pub materials: Vec<String>,
    pub technique: Option<String>,
    pub artisan_notes: Option<String>,
    pub crafted_on: Option<NaiveDate>,
    pub updated_at_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cart & orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: Uuid,
    pub lines: Vec<CartLine>,
    pub updated_at_utc: DateTime<Utc>,
}

impl Cart {
    /// A cart that was never saved. Its `updated_at_utc` is the epoch, which
    /// is also the version `save_cart` expects for a first write.
    pub fn empty(customer_id: Uuid) -> Self {
        Self {
            customer_id,
            lines: Vec::new(),
            updated_at_utc: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
}

/// Snapshot of a product at the moment it was ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub artisan_id: Uuid,
    pub name: String,
    pub unit_price: Cents,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub subtotal: Cents,
    pub discount: Cents,
    pub shipping: Cents,
    pub store_credit_applied: Cents,
    pub total: Cents,
    /// VIP tier name the discount was computed from.
    pub vip_tier: String,
    pub shipping_address: ShippingAddress,
    /// Provider reference of the confirming payment, if any.
    pub payment_reference: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub paid_at_utc: Option<DateTime<Utc>>,
    pub failed_at_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    /// Location of the already-uploaded image or document.
    pub url: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: ProofStatus,
    pub review_note: Option<String>,
    pub submitted_at_utc: DateTime<Utc>,
    pub reviewed_at_utc: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Custom orders & trade-ins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomOrder {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub artisan_id: Uuid,
    pub description: String,
    pub budget: Option<Cents>,
    pub quote: Option<Cents>,
    pub lead_time_days: Option<i32>,
    pub artisan_note: Option<String>,
    pub status: CustomOrderStatus,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIn {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub description: String,
    pub photo_urls: Vec<String>,
    pub offered_credit: Option<Cents>,
    pub status: TradeInStatus,
    pub admin_note: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Verification & concierge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: Uuid,
    /// Normalised email address the code was sent to.
    pub subject: String,
    pub purpose: CodePurpose,
    pub code: String,
    pub expires_at_utc: DateTime<Utc>,
    pub used: bool,
    pub attempts: i32,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConciergeMessage {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub author: Author,
    pub body: String,
    pub created_at_utc: DateTime<Utc>,
}

/// One customer's concierge conversation, summarised for the back office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConciergeThread {
    pub customer_id: Uuid,
    pub message_count: i64,
    pub last_author: Author,
    pub last_message_at_utc: DateTime<Utc>,
}

impl ConciergeThread {
    /// The customer spoke last and nobody has replied yet.
    pub fn awaiting_reply(&self) -> bool {
        self.last_author == Author::Customer
    }
}

/// Lower-cases and trims an email address so lookups are stable.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
