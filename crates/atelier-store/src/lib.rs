//! Persistence boundary.
//!
//! [`Repository`] is everything the daemon needs from storage. Status
//! updates are compare-and-set: the caller passes the status it computed
//! the transition from, and a concurrent change surfaces as
//! [`StoreError::Conflict`] instead of a lost update.
//!
//! [`MemStore`] backs development runs and tests; `atelier-db` provides the
//! Postgres implementation.

pub mod error;
pub mod mem;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use atelier_schemas::{
    Artisan, ArtisanStatus, Cart, Category, Cents, CodePurpose, ConciergeMessage, ConciergeThread,
    Customer, CustomOrder, CustomOrderStatus, Order, OrderLine, OrderStatus, Passport,
    PaymentProof, Product, ProofStatus, ShippingAddress, TradeIn, TradeInStatus, VerificationCode,
};

pub use error::{StoreError, StoreResult};
pub use mem::MemStore;

/// A priced checkout ready to be written.
///
/// `place_order` decrements stock for every line, debits
/// `store_credit_applied` from the customer and clears the cart, all or
/// nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub subtotal: Cents,
    pub discount: Cents,
    pub shipping: Cents,
    pub store_credit_applied: Cents,
    pub total: Cents,
    pub vip_tier: String,
    pub shipping_address: ShippingAddress,
    pub created_at_utc: DateTime<Utc>,
    /// Version of the cart the lines were priced from. Checkout fails with
    /// `Conflict` if the cart changed since.
    pub cart_updated_at_utc: DateTime<Utc>,
}

impl NewOrder {
    /// The `pending` order this checkout becomes.
    pub fn into_order(self) -> Order {
        Order {
            id: self.id,
            customer_id: self.customer_id,
            status: OrderStatus::Pending,
            lines: self.lines,
            subtotal: self.subtotal,
            discount: self.discount,
            shipping: self.shipping,
            store_credit_applied: self.store_credit_applied,
            total: self.total,
            vip_tier: self.vip_tier,
            shipping_address: self.shipping_address,
            payment_reference: None,
            created_at_utc: self.created_at_utc,
            paid_at_utc: None,
            failed_at_utc: None,
        }
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Short backend name for health output (`memory`, `postgres`).
    fn backend(&self) -> &'static str;

    // --- customers -------------------------------------------------------

    /// Conflict when the email is taken.
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()>;
    async fn get_customer(&self, id: Uuid) -> StoreResult<Customer>;
    async fn customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>>;
    async fn mark_customer_verified(&self, id: Uuid) -> StoreResult<()>;
    /// Sum of totals of paid orders.
    async fn lifetime_spend(&self, customer_id: Uuid) -> StoreResult<Cents>;

    // --- artisans --------------------------------------------------------

    async fn insert_artisan(&self, artisan: &Artisan) -> StoreResult<()>;
    async fn get_artisan(&self, id: Uuid) -> StoreResult<Artisan>;
    async fn artisan_by_email(&self, email: &str) -> StoreResult<Option<Artisan>>;
    async fn list_artisans(&self, status: Option<ArtisanStatus>) -> StoreResult<Vec<Artisan>>;
    /// CAS on status. Moving to `active` stamps `approved_at_utc` the first time.
    async fn set_artisan_status(
        &self,
        id: Uuid,
        from: ArtisanStatus,
        to: ArtisanStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Artisan>;
    async fn mark_artisan_verified(&self, id: Uuid) -> StoreResult<()>;

    // --- catalog ---------------------------------------------------------

    /// Conflict when the slug is taken.
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;

    /// Conflict when the slug is taken.
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    /// Replaces every editable field. Stock is only changed through
    /// `adjust_stock` and `place_order`.
    async fn update_product(&self, product: &Product) -> StoreResult<()>;
    async fn get_product(&self, id: Uuid) -> StoreResult<Product>;
    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>>;
    async fn list_products(&self, artisan_id: Option<Uuid>) -> StoreResult<Vec<Product>>;
    /// Adds `delta` to stock; `InsufficientStock` when it would go negative.
    async fn adjust_stock(&self, id: Uuid, delta: i32) -> StoreResult<Product>;

    async fn upsert_passport(&self, passport: &Passport) -> StoreResult<()>;
    async fn get_passport(&self, product_id: Uuid) -> StoreResult<Option<Passport>>;

    // --- carts & orders --------------------------------------------------

    /// Empty cart when the customer never saved one.
    async fn get_cart(&self, customer_id: Uuid) -> StoreResult<Cart>;
    /// Compare-and-set on the cart version: `Conflict` unless the stored
    /// `updated_at_utc` (epoch when absent) equals `expected_updated_at`.
    async fn save_cart(&self, cart: &Cart, expected_updated_at: DateTime<Utc>) -> StoreResult<()>;

    async fn place_order(&self, order: NewOrder) -> StoreResult<Order>;
    async fn get_order(&self, id: Uuid) -> StoreResult<Order>;
    async fn list_orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>>;
    /// CAS on status. Stamps `paid_at_utc` / `failed_at_utc` and stores the
    /// payment reference when given.
    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        payment_reference: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Order>;
    /// Returns the stock and store credit of a failed order. Runs at most
    /// once per order; `Ok(false)` when there was nothing left to return.
    async fn restock_order(&self, id: Uuid) -> StoreResult<bool>;

    // --- payment proofs --------------------------------------------------

    /// Conflict when the order already has a submitted proof.
    async fn insert_proof(&self, proof: &PaymentProof) -> StoreResult<()>;
    async fn get_proof(&self, id: Uuid) -> StoreResult<PaymentProof>;
    async fn list_proofs(&self, status: Option<ProofStatus>) -> StoreResult<Vec<PaymentProof>>;
    async fn list_proofs_for_order(&self, order_id: Uuid) -> StoreResult<Vec<PaymentProof>>;
    async fn review_proof(
        &self,
        id: Uuid,
        from: ProofStatus,
        to: ProofStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<PaymentProof>;

    // --- custom orders ---------------------------------------------------

    async fn insert_custom_order(&self, order: &CustomOrder) -> StoreResult<()>;
    async fn get_custom_order(&self, id: Uuid) -> StoreResult<CustomOrder>;
    async fn list_custom_orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<CustomOrder>>;
    async fn list_custom_orders_for_artisan(&self, artisan_id: Uuid) -> StoreResult<Vec<CustomOrder>>;
    /// Writes the whole record if the stored status is still `expected`.
    async fn save_custom_order(&self, order: &CustomOrder, expected: CustomOrderStatus) -> StoreResult<()>;

    // --- trade-ins -------------------------------------------------------

    async fn insert_trade_in(&self, trade_in: &TradeIn) -> StoreResult<()>;
    async fn get_trade_in(&self, id: Uuid) -> StoreResult<TradeIn>;
    async fn list_trade_ins(&self, status: Option<TradeInStatus>) -> StoreResult<Vec<TradeIn>>;
    async fn list_trade_ins_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<TradeIn>>;
    async fn save_trade_in(&self, trade_in: &TradeIn, expected: TradeInStatus) -> StoreResult<()>;
    /// Adds credit and returns the new balance.
    async fn grant_store_credit(&self, customer_id: Uuid, amount: Cents) -> StoreResult<Cents>;

    // --- verification codes ----------------------------------------------

    /// Marks earlier unused codes for the same subject and purpose as used.
    async fn insert_code(&self, code: &VerificationCode) -> StoreResult<()>;
    async fn latest_code(&self, subject: &str, purpose: CodePurpose) -> StoreResult<Option<VerificationCode>>;
    /// Returns the attempt count after incrementing.
    async fn record_code_attempt(&self, id: Uuid) -> StoreResult<i32>;
    /// CAS on `used = false`; Conflict when someone else consumed it first.
    async fn consume_code(&self, id: Uuid) -> StoreResult<()>;
    /// Deletes codes that expired before `before`. Returns the count.
    async fn purge_expired_codes(&self, before: DateTime<Utc>) -> StoreResult<u64>;

    // --- concierge -------------------------------------------------------

    async fn append_message(&self, message: &ConciergeMessage) -> StoreResult<()>;
    /// Oldest first.
    async fn list_messages(&self, customer_id: Uuid) -> StoreResult<Vec<ConciergeMessage>>;
    /// Most recently active first.
    async fn list_threads(&self) -> StoreResult<Vec<ConciergeThread>>;
}
