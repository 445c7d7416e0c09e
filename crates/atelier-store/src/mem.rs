//! In-memory [`Repository`].
//!
//! One `RwLock` over all tables: every operation, including checkout, sees
//! and writes a consistent snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use atelier_schemas::{
    normalize_email, Artisan, ArtisanStatus, Author, Cart, Category, Cents, CodePurpose,
    ConciergeMessage, ConciergeThread, Customer, CustomOrder, CustomOrderStatus, Order,
    OrderStatus, Passport, PaymentProof, Product, ProofStatus, TradeIn, TradeInStatus,
    VerificationCode,
};

use crate::{NewOrder, Repository, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    customers: HashMap<Uuid, Customer>,
    artisans: HashMap<Uuid, Artisan>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    passports: HashMap<Uuid, Passport>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    restocked: HashSet<Uuid>,
    proofs: HashMap<Uuid, PaymentProof>,
    custom_orders: HashMap<Uuid, CustomOrder>,
    trade_ins: HashMap<Uuid, TradeIn>,
    codes: HashMap<Uuid, VerificationCode>,
    messages: Vec<ConciergeMessage>,
}

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F: Fn(&T) -> DateTime<Utc>>(mut v: Vec<T>, key: F) -> Vec<T> {
    v.sort_by_key(|x| std::cmp::Reverse(key(x)));
    v
}

fn cart_version(carts: &HashMap<Uuid, Cart>, customer_id: Uuid) -> DateTime<Utc> {
    carts
        .get(&customer_id)
        .map(|c| c.updated_at_utc)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[async_trait]
impl Repository for MemStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let email = normalize_email(&customer.email);
        if t.customers.values().any(|c| normalize_email(&c.email) == email) {
            return Err(StoreError::Conflict(format!("customer email {email} already registered")));
        }
        if t.customers.contains_key(&customer.id) {
            return Err(StoreError::Conflict(format!("customer {} exists", customer.id)));
        }
        t.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn get_customer(&self, id: Uuid) -> StoreResult<Customer> {
        let t = self.inner.read().await;
        t.customers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("customer", id))
    }

    async fn customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        let t = self.inner.read().await;
        let email = normalize_email(email);
        Ok(t.customers
            .values()
            .find(|c| normalize_email(&c.email) == email)
            .cloned())
    }

    async fn mark_customer_verified(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let c = t
            .customers
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("customer", id))?;
        c.email_verified = true;
        Ok(())
    }

    async fn lifetime_spend(&self, customer_id: Uuid) -> StoreResult<Cents> {
        let t = self.inner.read().await;
        Ok(t.orders
            .values()
            .filter(|o| o.customer_id == customer_id && o.status == OrderStatus::Paid)
            .map(|o| o.total)
            .sum())
    }

    async fn insert_artisan(&self, artisan: &Artisan) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let email = normalize_email(&artisan.email);
        if t.artisans.values().any(|a| normalize_email(&a.email) == email) {
            return Err(StoreError::Conflict(format!("artisan email {email} already registered")));
        }
        t.artisans.insert(artisan.id, artisan.clone());
        Ok(())
    }

    async fn get_artisan(&self, id: Uuid) -> StoreResult<Artisan> {
        let t = self.inner.read().await;
        t.artisans
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("artisan", id))
    }

    async fn artisan_by_email(&self, email: &str) -> StoreResult<Option<Artisan>> {
        let t = self.inner.read().await;
        let email = normalize_email(email);
        Ok(t.artisans
            .values()
            .find(|a| normalize_email(&a.email) == email)
            .cloned())
    }

    async fn list_artisans(&self, status: Option<ArtisanStatus>) -> StoreResult<Vec<Artisan>> {
        let t = self.inner.read().await;
        let v: Vec<Artisan> = t
            .artisans
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        Ok(newest_first(v, |a| a.created_at_utc))
    }

    async fn set_artisan_status(
        &self,
        id: Uuid,
        from: ArtisanStatus,
        to: ArtisanStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Artisan> {
        let mut t = self.inner.write().await;
        let a = t
            .artisans
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("artisan", id))?;
        if a.status != from {
            return Err(StoreError::stale("artisan", id, from));
        }
        a.status = to;
        if to == ArtisanStatus::Active && a.approved_at_utc.is_none() {
            a.approved_at_utc = Some(at);
        }
        Ok(a.clone())
    }

    async fn mark_artisan_verified(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let a = t
            .artisans
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("artisan", id))?;
        a.email_verified = true;
        Ok(())
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if t.categories.values().any(|c| c.slug == category.slug) {
            return Err(StoreError::Conflict(format!("category slug {} taken", category.slug)));
        }
        if let Some(parent) = category.parent_id {
            if !t.categories.contains_key(&parent) {
                return Err(StoreError::not_found("category", parent));
            }
        }
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let t = self.inner.read().await;
        let mut v: Vec<Category> = t.categories.values().cloned().collect();
        v.sort_by(|a, b| (a.position, &a.name).cmp(&(b.position, &b.name)));
        Ok(v)
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if t.products.values().any(|p| p.slug == product.slug) {
            return Err(StoreError::Conflict(format!("product slug {} taken", product.slug)));
        }
        if !t.categories.contains_key(&product.category_id) {
            return Err(StoreError::not_found("category", product.category_id));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if t
            .products
            .values()
            .any(|p| p.slug == product.slug && p.id != product.id)
        {
            return Err(StoreError::Conflict(format!("product slug {} taken", product.slug)));
        }
        if !t.categories.contains_key(&product.category_id) {
            return Err(StoreError::not_found("category", product.category_id));
        }
        let stored = t
            .products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::not_found("product", product.id))?;
        let stock = stored.stock;
        *stored = product.clone();
        stored.stock = stock;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        let t = self.inner.read().await;
        t.products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        let t = self.inner.read().await;
        Ok(t.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn list_products(&self, artisan_id: Option<Uuid>) -> StoreResult<Vec<Product>> {
        let t = self.inner.read().await;
        let v: Vec<Product> = t
            .products
            .values()
            .filter(|p| artisan_id.map_or(true, |a| p.artisan_id == a))
            .cloned()
            .collect();
        Ok(newest_first(v, |p| p.created_at_utc))
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32) -> StoreResult<Product> {
        let mut t = self.inner.write().await;
        let p = t
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        let next = p.stock.checked_add(delta).filter(|s| *s >= 0).ok_or(
            StoreError::InsufficientStock {
                product_id: id,
                requested: delta.saturating_neg(),
                available: p.stock,
            },
        )?;
        p.stock = next;
        p.updated_at_utc = Utc::now();
        Ok(p.clone())
    }

    async fn upsert_passport(&self, passport: &Passport) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if !t.products.contains_key(&passport.product_id) {
            return Err(StoreError::not_found("product", passport.product_id));
        }
        t.passports.insert(passport.product_id, passport.clone());
        Ok(())
    }

    async fn get_passport(&self, product_id: Uuid) -> StoreResult<Option<Passport>> {
        let t = self.inner.read().await;
        Ok(t.passports.get(&product_id).cloned())
    }

    async fn get_cart(&self, customer_id: Uuid) -> StoreResult<Cart> {
        let t = self.inner.read().await;
        Ok(t.carts
            .get(&customer_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(customer_id)))
    }

    async fn save_cart(&self, cart: &Cart, expected_updated_at: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let stored = cart_version(&t.carts, cart.customer_id);
        if stored != expected_updated_at {
            return Err(StoreError::Conflict(format!(
                "cart of customer {} changed concurrently",
                cart.customer_id
            )));
        }
        t.carts.insert(cart.customer_id, cart.clone());
        Ok(())
    }

    async fn place_order(&self, order: NewOrder) -> StoreResult<Order> {
        let mut t = self.inner.write().await;

        if t.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} exists", order.id)));
        }
        let customer = t
            .customers
            .get(&order.customer_id)
            .ok_or_else(|| StoreError::not_found("customer", order.customer_id))?;
        if cart_version(&t.carts, order.customer_id) != order.cart_updated_at_utc {
            return Err(StoreError::Conflict(format!(
                "cart of customer {} changed during checkout",
                order.customer_id
            )));
        }
        if customer.store_credit < order.store_credit_applied {
            return Err(StoreError::Conflict(format!(
                "customer {} store credit changed during checkout",
                order.customer_id
            )));
        }

        // Validate every line before touching anything.
        let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in &order.lines {
            *wanted.entry(line.product_id).or_default() += line.quantity;
        }
        for (pid, qty) in &wanted {
            let p = t
                .products
                .get(pid)
                .ok_or_else(|| StoreError::not_found("product", *pid))?;
            if p.stock < *qty {
                return Err(StoreError::InsufficientStock {
                    product_id: *pid,
                    requested: *qty,
                    available: p.stock,
                });
            }
        }

        let now = order.created_at_utc;
        for (pid, qty) in &wanted {
            if let Some(p) = t.products.get_mut(pid) {
                p.stock -= qty;
                p.updated_at_utc = now;
            }
        }
        if let Some(c) = t.customers.get_mut(&order.customer_id) {
            c.store_credit -= order.store_credit_applied;
        }
        t.carts.insert(order.customer_id, Cart {
            customer_id: order.customer_id,
            lines: Vec::new(),
            updated_at_utc: now,
        });

        let order = order.into_order();
        t.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Order> {
        let t = self.inner.read().await;
        t.orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn list_orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Order>> {
        let t = self.inner.read().await;
        let v = t
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(newest_first(v, |o| o.created_at_utc))
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>> {
        let t = self.inner.read().await;
        let v = t
            .orders
            .values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        Ok(newest_first(v, |o| o.created_at_utc))
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        payment_reference: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        let mut t = self.inner.write().await;
        let o = t
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        if o.status != from {
            return Err(StoreError::stale("order", id, from));
        }
        o.status = to;
        match to {
            OrderStatus::Paid => o.paid_at_utc = Some(at),
            OrderStatus::Failed => o.failed_at_utc = Some(at),
            OrderStatus::Pending => {}
        }
        if payment_reference.is_some() {
            o.payment_reference = payment_reference;
        }
        Ok(o.clone())
    }

    async fn restock_order(&self, id: Uuid) -> StoreResult<bool> {
        let mut t = self.inner.write().await;
        let order = t
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", id))?;
        if order.status != OrderStatus::Failed || t.restocked.contains(&id) {
            return Ok(false);
        }
        for line in &order.lines {
            if let Some(p) = t.products.get_mut(&line.product_id) {
                p.stock += line.quantity;
            }
        }
        if let Some(c) = t.customers.get_mut(&order.customer_id) {
            c.store_credit += order.store_credit_applied;
        }
        t.restocked.insert(id);
        Ok(true)
    }

    async fn insert_proof(&self, proof: &PaymentProof) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if !t.orders.contains_key(&proof.order_id) {
            return Err(StoreError::not_found("order", proof.order_id));
        }
        if t
            .proofs
            .values()
            .any(|p| p.order_id == proof.order_id && p.status == ProofStatus::Submitted)
        {
            return Err(StoreError::Conflict(format!(
                "order {} already has a proof awaiting review",
                proof.order_id
            )));
        }
        t.proofs.insert(proof.id, proof.clone());
        Ok(())
    }

    async fn get_proof(&self, id: Uuid) -> StoreResult<PaymentProof> {
        let t = self.inner.read().await;
        t.proofs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("payment proof", id))
    }

    async fn list_proofs(&self, status: Option<ProofStatus>) -> StoreResult<Vec<PaymentProof>> {
        let t = self.inner.read().await;
        let mut v: Vec<PaymentProof> = t
            .proofs
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        // Review queue: oldest first.
        v.sort_by_key(|p| p.submitted_at_utc);
        Ok(v)
    }

    async fn list_proofs_for_order(&self, order_id: Uuid) -> StoreResult<Vec<PaymentProof>> {
        let t = self.inner.read().await;
        let mut v: Vec<PaymentProof> = t
            .proofs
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        v.sort_by_key(|p| p.submitted_at_utc);
        Ok(v)
    }

    async fn review_proof(
        &self,
        id: Uuid,
        from: ProofStatus,
        to: ProofStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<PaymentProof> {
        let mut t = self.inner.write().await;
        let p = t
            .proofs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("payment proof", id))?;
        if p.status != from {
            return Err(StoreError::stale("payment proof", id, from));
        }
        p.status = to;
        p.review_note = note;
        p.reviewed_at_utc = Some(at);
        Ok(p.clone())
    }

    async fn insert_custom_order(&self, order: &CustomOrder) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if !t.artisans.contains_key(&order.artisan_id) {
            return Err(StoreError::not_found("artisan", order.artisan_id));
        }
        t.custom_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_custom_order(&self, id: Uuid) -> StoreResult<CustomOrder> {
        let t = self.inner.read().await;
        t.custom_orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("custom order", id))
    }

    async fn list_custom_orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<CustomOrder>> {
        let t = self.inner.read().await;
        let v = t
            .custom_orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(newest_first(v, |o| o.created_at_utc))
    }

    async fn list_custom_orders_for_artisan(&self, artisan_id: Uuid) -> StoreResult<Vec<CustomOrder>> {
        let t = self.inner.read().await;
        let v = t
            .custom_orders
            .values()
            .filter(|o| o.artisan_id == artisan_id && o.status != CustomOrderStatus::Draft)
            .cloned()
            .collect();
        Ok(newest_first(v, |o| o.created_at_utc))
    }

    async fn save_custom_order(&self, order: &CustomOrder, expected: CustomOrderStatus) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let stored = t
            .custom_orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::not_found("custom order", order.id))?;
        if stored.status != expected {
            return Err(StoreError::stale("custom order", order.id, expected));
        }
        *stored = order.clone();
        Ok(())
    }

    async fn insert_trade_in(&self, trade_in: &TradeIn) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        t.trade_ins.insert(trade_in.id, trade_in.clone());
        Ok(())
    }

    async fn get_trade_in(&self, id: Uuid) -> StoreResult<TradeIn> {
        let t = self.inner.read().await;
        t.trade_ins
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("trade-in", id))
    }

    async fn list_trade_ins(&self, status: Option<TradeInStatus>) -> StoreResult<Vec<TradeIn>> {
        let t = self.inner.read().await;
        let v = t
            .trade_ins
            .values()
            .filter(|x| status.map_or(true, |s| x.status == s))
            .cloned()
            .collect();
        Ok(newest_first(v, |x| x.created_at_utc))
    }

    async fn list_trade_ins_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<TradeIn>> {
        let t = self.inner.read().await;
        let v = t
            .trade_ins
            .values()
            .filter(|x| x.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(newest_first(v, |x| x.created_at_utc))
    }

    async fn save_trade_in(&self, trade_in: &TradeIn, expected: TradeInStatus) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let stored = t
            .trade_ins
            .get_mut(&trade_in.id)
            .ok_or_else(|| StoreError::not_found("trade-in", trade_in.id))?;
        if stored.status != expected {
            return Err(StoreError::stale("trade-in", trade_in.id, expected));
        }
        *stored = trade_in.clone();
        Ok(())
    }

    async fn grant_store_credit(&self, customer_id: Uuid, amount: Cents) -> StoreResult<Cents> {
        let mut t = self.inner.write().await;
        let c = t
            .customers
            .get_mut(&customer_id)
            .ok_or_else(|| StoreError::not_found("customer", customer_id))?;
        c.store_credit = c.store_credit.saturating_add(amount);
        Ok(c.store_credit)
    }

    async fn insert_code(&self, code: &VerificationCode) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        for old in t.codes.values_mut() {
            if old.subject == code.subject && old.purpose == code.purpose && !old.used {
                old.used = true;
            }
        }
        t.codes.insert(code.id, code.clone());
        Ok(())
    }

    async fn latest_code(&self, subject: &str, purpose: CodePurpose) -> StoreResult<Option<VerificationCode>> {
        let t = self.inner.read().await;
        let subject = normalize_email(subject);
        Ok(t.codes
            .values()
            .filter(|c| c.subject == subject && c.purpose == purpose)
            .max_by_key(|c| c.created_at_utc)
            .cloned())
    }

    async fn record_code_attempt(&self, id: Uuid) -> StoreResult<i32> {
        let mut t = self.inner.write().await;
        let c = t
            .codes
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("verification code", id))?;
        c.attempts += 1;
        Ok(c.attempts)
    }

    async fn consume_code(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let c = t
            .codes
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("verification code", id))?;
        if c.used {
            return Err(StoreError::Conflict(format!("verification code {id} already used")));
        }
        c.used = true;
        Ok(())
    }

    async fn purge_expired_codes(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.inner.write().await;
        let n = t.codes.len();
        t.codes.retain(|_, c| c.expires_at_utc >= before);
        Ok((n - t.codes.len()) as u64)
    }

    async fn append_message(&self, message: &ConciergeMessage) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if !t.customers.contains_key(&message.customer_id) {
            return Err(StoreError::not_found("customer", message.customer_id));
        }
        t.messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, customer_id: Uuid) -> StoreResult<Vec<ConciergeMessage>> {
        let t = self.inner.read().await;
        let mut v: Vec<ConciergeMessage> = t
            .messages
            .iter()
            .filter(|m| m.customer_id == customer_id)
            .cloned()
            .collect();
        v.sort_by_key(|m| m.created_at_utc);
        Ok(v)
    }

    async fn list_threads(&self) -> StoreResult<Vec<ConciergeThread>> {
        let t = self.inner.read().await;
        let mut by_customer: HashMap<Uuid, ConciergeThread> = HashMap::new();
        for m in &t.messages {
            let entry = by_customer.entry(m.customer_id).or_insert(ConciergeThread {
                customer_id: m.customer_id,
                message_count: 0,
                last_author: Author::Customer,
                last_message_at_utc: m.created_at_utc,
            });
            entry.message_count += 1;
            if m.created_at_utc >= entry.last_message_at_utc {
                entry.last_message_at_utc = m.created_at_utc;
                entry.last_author = m.author;
            }
        }
        let v: Vec<ConciergeThread> = by_customer.into_values().collect();
        Ok(newest_first(v, |th| th.last_message_at_utc))
    }
}
