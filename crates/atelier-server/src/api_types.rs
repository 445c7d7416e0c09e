//! Request and response types for all atelier-server HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use atelier_schemas::{
    Cart, Category, Cents, Order, OrderStatus, Passport, PaymentProof, Product,
    ProductStatus, ShippingAddress, TradeIn,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub store: &'static str,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable snake_case code clients branch on.
    pub code: String,
}

/// `?status=` filter on back-office list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

/// Optional free-text note on rejections and failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteRequest {
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Email verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendCodeRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedResponse {
    pub verified: bool,
}

/// Always `{"sent": true}` so the endpoint does not reveal which addresses
/// are registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSentResponse {
    pub sent: bool,
}

// ---------------------------------------------------------------------------
// Storefront
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCustomerRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryView {
    pub category: Category,
    /// Root first, ending with `category`.
    pub breadcrumb: Vec<Category>,
    pub children: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtisanSummary {
    pub id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductView {
    pub product: Product,
    pub artisan: ArtisanSummary,
    pub breadcrumb: Vec<Category>,
    pub passport: Option<Passport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassportView {
    pub product_id: Uuid,
    pub product_name: String,
    pub artisan: ArtisanSummary,
    pub passport: Passport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCartLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

pub type CartResponse = Cart;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub order: Order,
    pub proofs: Vec<PaymentProof>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitProofRequest {
    pub url: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomOrderRequest {
    pub artisan_id: Uuid,
    pub description: String,
    #[serde(default)]
    pub budget: Option<Cents>,
    /// Submit straight away instead of keeping a draft.
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTradeInRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeMessageRequest {
    pub body: String,
}

// ---------------------------------------------------------------------------
// Artisan portal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtisanSignupRequest {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub category_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Cents,
    pub stock: i32,
    /// Defaults to `draft`.
    #[serde(default)]
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateProductRequest {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Cents>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustRequest {
    pub delta: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassportRequest {
    pub origin: String,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub technique: Option<String>,
    #[serde(default)]
    pub artisan_notes: Option<String>,
    #[serde(default)]
    pub crafted_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub amount: Cents,
    pub lead_time_days: i32,
    #[serde(default)]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Back office
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Derived from `name` when absent.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    pub credit: Cents,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeInCompletedResponse {
    pub trade_in: TradeIn,
    /// Customer balance after the credit was granted.
    pub store_credit: Cents,
}

// ---------------------------------------------------------------------------
// /v1/payments/callback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub order_id: Uuid,
    pub reference: String,
    pub outcome: PaymentOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallbackResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    /// The order was already in the reported state.
    pub replay: bool,
}

// ---------------------------------------------------------------------------
// Back office: proof review
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofReviewResponse {
    pub proof: PaymentProof,
    pub order: Order,
}
