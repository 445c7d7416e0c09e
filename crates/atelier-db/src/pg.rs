use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use atelier_schemas::{
    normalize_email, Artisan, ArtisanStatus, Author, Cart, Category, Cents, CodePurpose,
    ConciergeMessage, ConciergeThread, Customer, CustomOrder, CustomOrderStatus, Order,
    OrderStatus, Passport, PaymentProof, Product, ProofStatus, TradeIn, TradeInStatus,
    VerificationCode,
};
use atelier_store::{NewOrder, Repository, StoreError, StoreResult};

use crate::rows::{self, db_err};

/// Postgres-backed [`Repository`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// After a CAS matched zero rows: NotFound if the row is gone, Conflict otherwise.
    async fn lost_cas(&self, table: &'static str, entity: &'static str, id: Uuid, expected: &str) -> StoreError {
        let sql = format!("select exists (select 1 from {table} where id = $1)");
        match sqlx::query_as::<_, (bool,)>(&sql).bind(id).fetch_one(&self.pool).await {
            Ok((true,)) => StoreError::stale(entity, id, expected),
            Ok((false,)) => StoreError::not_found(entity, id),
            Err(e) => db_err(e),
        }
    }

    async fn attach_lines(&self, mut orders: Vec<Order>) -> StoreResult<Vec<Order>> {
        if orders.is_empty() {
            return Ok(orders);
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let rows = sqlx::query(
            r#"
            select order_id, product_id, artisan_id, name, unit_price_cents, quantity
            from order_items
            where order_id = any($1)
            order by order_id, line_no
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut by_order: HashMap<Uuid, Vec<_>> = HashMap::new();
        for r in &rows {
            let order_id: Uuid = r.try_get("order_id").map_err(db_err)?;
            by_order.entry(order_id).or_default().push(rows::order_line(r)?);
        }
        for o in &mut orders {
            o.lines = by_order.remove(&o.id).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn orders_where(&self, clause: &str, bind: OrderFilter) -> StoreResult<Vec<Order>> {
        let sql = format!("select * from orders {clause} order by created_at_utc desc");
        let q = sqlx::query(&sql);
        let q = match bind {
            OrderFilter::None => q,
            OrderFilter::Id(id) => q.bind(id),
            OrderFilter::Status(s) => q.bind(s.as_str()),
        };
        let rows = q.fetch_all(&self.pool).await.map_err(db_err)?;
        let orders = rows.iter().map(rows::order).collect::<StoreResult<Vec<_>>>()?;
        self.attach_lines(orders).await
    }
}

enum OrderFilter {
    None,
    Id(Uuid),
    Status(OrderStatus),
}

fn collect<T>(rows: &[PgRow], f: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(f).collect()
}

#[async_trait]
impl Repository for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn insert_customer(&self, c: &Customer) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into customers (id, email, name, email_verified, store_credit_cents, created_at_utc)
            values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(c.id)
        .bind(normalize_email(&c.email))
        .bind(&c.name)
        .bind(c.email_verified)
        .bind(c.store_credit.raw())
        .bind(c.created_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_customer(&self, id: Uuid) -> StoreResult<Customer> {
        let row = sqlx::query("select * from customers where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("customer", id))?;
        rows::customer(&row)
    }

    async fn customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        let row = sqlx::query("select * from customers where lower(email) = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(rows::customer).transpose()
    }

    async fn mark_customer_verified(&self, id: Uuid) -> StoreResult<()> {
        let r = sqlx::query("update customers set email_verified = true where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if r.rows_affected() == 0 {
            return Err(StoreError::not_found("customer", id));
        }
        Ok(())
    }

    async fn lifetime_spend(&self, customer_id: Uuid) -> StoreResult<Cents> {
        let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
            "select coalesce(sum(total_cents), 0)::bigint from orders where customer_id = $1 and status = 'paid'",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(Cents::new(n))
    }

    async fn insert_artisan(&self, a: &Artisan) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into artisans (id, email, display_name, bio, status, email_verified, created_at_utc, approved_at_utc)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(a.id)
        .bind(normalize_email(&a.email))
        .bind(&a.display_name)
        .bind(&a.bio)
        .bind(a.status.as_str())
        .bind(a.email_verified)
        .bind(a.created_at_utc)
        .bind(a.approved_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_artisan(&self, id: Uuid) -> StoreResult<Artisan> {
        let row = sqlx::query("select * from artisans where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("artisan", id))?;
        rows::artisan(&row)
    }

    async fn artisan_by_email(&self, email: &str) -> StoreResult<Option<Artisan>> {
        let row = sqlx::query("select * from artisans where lower(email) = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(rows::artisan).transpose()
    }

    async fn list_artisans(&self, status: Option<ArtisanStatus>) -> StoreResult<Vec<Artisan>> {
        let rows = sqlx::query(
            r#"
            select * from artisans
            where ($1::text is null or status = $1)
            order by created_at_utc desc
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(&rows, rows::artisan)
    }

    async fn set_artisan_status(
        &self,
        id: Uuid,
        from: ArtisanStatus,
        to: ArtisanStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Artisan> {
        let row = sqlx::query(
            r#"
            update artisans
               set status = $3,
                   approved_at_utc = case when $3 = 'active' then coalesce(approved_at_utc, $4)
                                          else approved_at_utc end
             where id = $1 and status = $2
            returning *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(r) => rows::artisan(&r),
            None => Err(self.lost_cas("artisans", "artisan", id, from.as_str()).await),
        }
    }

    async fn mark_artisan_verified(&self, id: Uuid) -> StoreResult<()> {
        let r = sqlx::query("update artisans set email_verified = true where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if r.rows_affected() == 0 {
            return Err(StoreError::not_found("artisan", id));
        }
        Ok(())
    }

    async fn insert_category(&self, c: &Category) -> StoreResult<()> {
        sqlx::query("insert into categories (id, parent_id, name, slug, position) values ($1, $2, $3, $4, $5)")
            .bind(c.id)
            .bind(c.parent_id)
            .bind(&c.name)
            .bind(&c.slug)
            .bind(c.position)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query("select * from categories order by position, name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(&rows, rows::category)
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into products (
              id, artisan_id, category_id, name, slug, description,
              price_cents, stock, status, created_at_utc, updated_at_utc
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(p.id)
        .bind(p.artisan_id)
        .bind(p.category_id)
        .bind(&p.name)
        .bind(&p.slug)
        .bind(&p.description)
        .bind(p.price.raw())
        .bind(p.stock)
        .bind(p.status.as_str())
        .bind(p.created_at_utc)
        .bind(p.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> StoreResult<()> {
        let r = sqlx::query(
            r#"
            update products
               set category_id = $2, name = $3, slug = $4, description = $5,
                   price_cents = $6, status = $7, updated_at_utc = $8
             where id = $1
            "#,
        )
        .bind(p.id)
        .bind(p.category_id)
        .bind(&p.name)
        .bind(&p.slug)
        .bind(&p.description)
        .bind(p.price.raw())
        .bind(p.status.as_str())
        .bind(p.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if r.rows_affected() == 0 {
            return Err(StoreError::not_found("product", p.id));
        }
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
        let row = sqlx::query("select * from products where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("product", id))?;
        rows::product(&row)
    }

    async fn product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        let row = sqlx::query("select * from products where slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(rows::product).transpose()
    }

    async fn list_products(&self, artisan_id: Option<Uuid>) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            select * from products
            where ($1::uuid is null or artisan_id = $1)
            order by created_at_utc desc
            "#,
        )
        .bind(artisan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(&rows, rows::product)
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32) -> StoreResult<Product> {
        let row = sqlx::query(
            r#"
            update products
               set stock = stock + $2, updated_at_utc = now()
             where id = $1 and stock + $2 >= 0
            returning *
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        if let Some(r) = row {
            return rows::product(&r);
        }
        let current = self.get_product(id).await?;
        Err(StoreError::InsufficientStock {
            product_id: id,
            requested: delta.saturating_neg(),
            available: current.stock,
        })
    }

    async fn upsert_passport(&self, p: &Passport) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into passports (product_id, origin, materials, technique, artisan_notes, crafted_on, updated_at_utc)
            values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (product_id) do update
               set origin = excluded.origin,
                   materials = excluded.materials,
                   technique = excluded.technique,
                   artisan_notes = excluded.artisan_notes,
                   crafted_on = excluded.crafted_on,
                   updated_at_utc = excluded.updated_at_utc
            "#,
        )
        .bind(p.product_id)
        .bind(&p.origin)
        .bind(Json(&p.materials))
        .bind(&p.technique)
        .bind(&p.artisan_notes)
        .bind(p.crafted_on)
        .bind(p.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_passport(&self, product_id: Uuid) -> StoreResult<Option<Passport>> {
        let row = sqlx::query("select * from passports where product_id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(rows::passport).transpose()
    }

    async fn get_cart(&self, customer_id: Uuid) -> StoreResult<Cart> {
        let row = sqlx::query("select * from carts where customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(r) => rows::cart(&r),
            None => Ok(Cart::empty(customer_id)),
        }
    }

    async fn save_cart(&self, cart: &Cart, expected_updated_at: DateTime<Utc>) -> StoreResult<()> {
        // A missing row is the epoch version, so the first write is an insert.
        let first_write = expected_updated_at == DateTime::<Utc>::UNIX_EPOCH;
        let sql = if first_write {
            "insert into carts (customer_id, lines, updated_at_utc) values ($1, $2, $3) on conflict (customer_id) do nothing"
        } else {
            "update carts set lines = $2, updated_at_utc = $3 where customer_id = $1 and updated_at_utc = $4"
        };
        let mut query = sqlx::query(sql)
            .bind(cart.customer_id)
            .bind(Json(&cart.lines))
            .bind(cart.updated_at_utc);
        if !first_write {
            query = query.bind(expected_updated_at);
        }
        let done = query.execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "cart of customer {} changed concurrently",
                cart.customer_id
            )));
        }
        Ok(())
    }

    async fn place_order(&self, new: NewOrder) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let credit: Option<(i64,)> =
            sqlx::query_as("select store_credit_cents from customers where id = $1 for update")
                .bind(new.customer_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let (credit,) = credit.ok_or_else(|| StoreError::not_found("customer", new.customer_id))?;

        let cart: Option<(DateTime<Utc>,)> =
            sqlx::query_as("select updated_at_utc from carts where customer_id = $1 for update")
                .bind(new.customer_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let cart_version = cart.map(|(v,)| v).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        if cart_version != new.cart_updated_at_utc {
            return Err(StoreError::Conflict(format!(
                "cart of customer {} changed during checkout",
                new.customer_id
            )));
        }
        if credit < new.store_credit_applied.raw() {
            return Err(StoreError::Conflict(format!(
                "customer {} store credit changed during checkout",
                new.customer_id
            )));
        }

        // Lock products in id order so concurrent checkouts cannot deadlock.
        let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in &new.lines {
            *wanted.entry(line.product_id).or_default() += line.quantity;
        }
        for (pid, qty) in &wanted {
            let updated = sqlx::query(
                "update products set stock = stock - $2, updated_at_utc = $3 where id = $1 and stock >= $2",
            )
            .bind(pid)
            .bind(qty)
            .bind(new.created_at_utc)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if updated.rows_affected() == 0 {
                let available: Option<(i32,)> = sqlx::query_as("select stock from products where id = $1")
                    .bind(pid)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;
                return Err(match available {
                    Some((available,)) => StoreError::InsufficientStock {
                        product_id: *pid,
                        requested: *qty,
                        available,
                    },
                    None => StoreError::not_found("product", *pid),
                });
            }
        }

        sqlx::query("update customers set store_credit_cents = store_credit_cents - $2 where id = $1")
            .bind(new.customer_id)
            .bind(new.store_credit_applied.raw())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let order = new.into_order();
        sqlx::query(
            r#"
            insert into orders (
              id, customer_id, status, subtotal_cents, discount_cents, shipping_cents,
              store_credit_applied_cents, total_cents, vip_tier, shipping_address, created_at_utc
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.subtotal.raw())
        .bind(order.discount.raw())
        .bind(order.shipping.raw())
        .bind(order.store_credit_applied.raw())
        .bind(order.total.raw())
        .bind(&order.vip_tier)
        .bind(Json(&order.shipping_address))
        .bind(order.created_at_utc)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for (i, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                insert into order_items (order_id, line_no, product_id, artisan_id, name, unit_price_cents, quantity)
                values ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id)
            .bind(i as i32)
            .bind(line.product_id)
            .bind(line.artisan_id)
            .bind(&line.name)
            .bind(line.unit_price.raw())
            .bind(line.quantity)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(
            r#"
            insert into carts (customer_id, lines, updated_at_utc) values ($1, '[]'::jsonb, $2)
            on conflict (customer_id) do update set lines = '[]'::jsonb, updated_at_utc = excluded.updated_at_utc
            "#,
        )
        .bind(order.customer_id)
        .bind(order.created_at_utc)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Order> {
        self.orders_where("where id = $1", OrderFilter::Id(id))
            .await?
            .pop()
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    async fn list_orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Order>> {
        self.orders_where("where customer_id = $1", OrderFilter::Id(customer_id))
            .await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> StoreResult<Vec<Order>> {
        match status {
            Some(s) => self.orders_where("where status = $1", OrderFilter::Status(s)).await,
            None => self.orders_where("", OrderFilter::None).await,
        }
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        payment_reference: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        let r = sqlx::query(
            r#"
            update orders
               set status = $3,
                   paid_at_utc = case when $3 = 'paid' then $5 else paid_at_utc end,
                   failed_at_utc = case when $3 = 'failed' then $5 else failed_at_utc end,
                   payment_reference = coalesce($4, payment_reference)
             where id = $1 and status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(payment_reference)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if r.rows_affected() == 0 {
            return Err(self.lost_cas("orders", "order", id, from.as_str()).await);
        }
        self.get_order(id).await
    }

    async fn restock_order(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let claimed: Option<(Uuid, i64)> = sqlx::query_as(
            r#"
            update orders set restocked = true
             where id = $1 and status = 'failed' and not restocked
            returning customer_id, store_credit_applied_cents
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some((customer_id, credit)) = claimed else {
            drop(tx);
            // Distinguish "nothing to do" from "no such order".
            self.get_order(id).await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            update products p
               set stock = p.stock + i.qty
              from (select product_id, sum(quantity)::int as qty
                      from order_items where order_id = $1 group by product_id) i
             where p.id = i.product_id
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("update customers set store_credit_cents = store_credit_cents + $2 where id = $1")
            .bind(customer_id)
            .bind(credit)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn insert_proof(&self, p: &PaymentProof) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into payment_proofs (
              id, order_id, customer_id, url, content_type, size_bytes, status,
              review_note, submitted_at_utc, reviewed_at_utc
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(p.id)
        .bind(p.order_id)
        .bind(p.customer_id)
        .bind(&p.url)
        .bind(&p.content_type)
        .bind(p.size_bytes)
        .bind(p.status.as_str())
        .bind(&p.review_note)
        .bind(p.submitted_at_utc)
        .bind(p.reviewed_at_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            StoreError::Conflict(_) => StoreError::Conflict(format!(
                "order {} already has a proof awaiting review",
                p.order_id
            )),
            other => other,
        })?;
        Ok(())
    }

    async fn get_proof(&self, id: Uuid) -> StoreResult<PaymentProof> {
        let row = sqlx::query("select * from payment_proofs where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("payment proof", id))?;
        rows::proof(&row)
    }

    async fn list_proofs(&self, status: Option<ProofStatus>) -> StoreResult<Vec<PaymentProof>> {
        let rows = sqlx::query(
            r#"
            select * from payment_proofs
            where ($1::text is null or status = $1)
            order by submitted_at_utc
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(&rows, rows::proof)
    }

    async fn list_proofs_for_order(&self, order_id: Uuid) -> StoreResult<Vec<PaymentProof>> {
        let rows = sqlx::query("select * from payment_proofs where order_id = $1 order by submitted_at_utc")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(&rows, rows::proof)
    }

    async fn review_proof(
        &self,
        id: Uuid,
        from: ProofStatus,
        to: ProofStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<PaymentProof> {
        let row = sqlx::query(
            r#"
            update payment_proofs
               set status = $3, review_note = $4, reviewed_at_utc = $5
             where id = $1 and status = $2
            returning *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(note)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(r) => rows::proof(&r),
            None => Err(self.lost_cas("payment_proofs", "payment proof", id, from.as_str()).await),
        }
    }

    async fn insert_custom_order(&self, o: &CustomOrder) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into custom_orders (
              id, customer_id, artisan_id, description, budget_cents, quote_cents,
              lead_time_days, artisan_note, status, created_at_utc, updated_at_utc
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(o.id)
        .bind(o.customer_id)
        .bind(o.artisan_id)
        .bind(&o.description)
        .bind(o.budget.map(Cents::raw))
        .bind(o.quote.map(Cents::raw))
        .bind(o.lead_time_days)
        .bind(&o.artisan_note)
        .bind(o.status.as_str())
        .bind(o.created_at_utc)
        .bind(o.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_custom_order(&self, id: Uuid) -> StoreResult<CustomOrder> {
        let row = sqlx::query("select * from custom_orders where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("custom order", id))?;
        rows::custom_order(&row)
    }

    async fn list_custom_orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<CustomOrder>> {
        let rows = sqlx::query("select * from custom_orders where customer_id = $1 order by created_at_utc desc")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(&rows, rows::custom_order)
    }

    async fn list_custom_orders_for_artisan(&self, artisan_id: Uuid) -> StoreResult<Vec<CustomOrder>> {
        let rows = sqlx::query(
            "select * from custom_orders where artisan_id = $1 and status <> 'draft' order by created_at_utc desc",
        )
        .bind(artisan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(&rows, rows::custom_order)
    }

    async fn save_custom_order(&self, o: &CustomOrder, expected: CustomOrderStatus) -> StoreResult<()> {
        let r = sqlx::query(
            r#"
            update custom_orders
               set description = $3, budget_cents = $4, quote_cents = $5, lead_time_days = $6,
                   artisan_note = $7, status = $8, updated_at_utc = $9
             where id = $1 and status = $2
            "#,
        )
        .bind(o.id)
        .bind(expected.as_str())
        .bind(&o.description)
        .bind(o.budget.map(Cents::raw))
        .bind(o.quote.map(Cents::raw))
        .bind(o.lead_time_days)
        .bind(&o.artisan_note)
        .bind(o.status.as_str())
        .bind(o.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if r.rows_affected() == 0 {
            return Err(self.lost_cas("custom_orders", "custom order", o.id, expected.as_str()).await);
        }
        Ok(())
    }

    async fn insert_trade_in(&self, t: &TradeIn) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into trade_ins (
              id, customer_id, title, description, photo_urls, offered_credit_cents,
              status, admin_note, created_at_utc, updated_at_utc
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(t.id)
        .bind(t.customer_id)
        .bind(&t.title)
        .bind(&t.description)
        .bind(Json(&t.photo_urls))
        .bind(t.offered_credit.map(Cents::raw))
        .bind(t.status.as_str())
        .bind(&t.admin_note)
        .bind(t.created_at_utc)
        .bind(t.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_trade_in(&self, id: Uuid) -> StoreResult<TradeIn> {
        let row = sqlx::query("select * from trade_ins where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("trade-in", id))?;
        rows::trade_in(&row)
    }

    async fn list_trade_ins(&self, status: Option<TradeInStatus>) -> StoreResult<Vec<TradeIn>> {
        let rows = sqlx::query(
            r#"
            select * from trade_ins
            where ($1::text is null or status = $1)
            order by created_at_utc desc
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(&rows, rows::trade_in)
    }

    async fn list_trade_ins_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<TradeIn>> {
        let rows = sqlx::query("select * from trade_ins where customer_id = $1 order by created_at_utc desc")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(&rows, rows::trade_in)
    }

    async fn save_trade_in(&self, t: &TradeIn, expected: TradeInStatus) -> StoreResult<()> {
        let r = sqlx::query(
            r#"
            update trade_ins
               set offered_credit_cents = $3, status = $4, admin_note = $5, updated_at_utc = $6
             where id = $1 and status = $2
            "#,
        )
        .bind(t.id)
        .bind(expected.as_str())
        .bind(t.offered_credit.map(Cents::raw))
        .bind(t.status.as_str())
        .bind(&t.admin_note)
        .bind(t.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if r.rows_affected() == 0 {
            return Err(self.lost_cas("trade_ins", "trade-in", t.id, expected.as_str()).await);
        }
        Ok(())
    }

    async fn grant_store_credit(&self, customer_id: Uuid, amount: Cents) -> StoreResult<Cents> {
        let row: Option<(i64,)> = sqlx::query_as(
            "update customers set store_credit_cents = store_credit_cents + $2 where id = $1 returning store_credit_cents",
        )
        .bind(customer_id)
        .bind(amount.raw())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|(c,)| Cents::new(c))
            .ok_or_else(|| StoreError::not_found("customer", customer_id))
    }

    async fn insert_code(&self, c: &VerificationCode) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("update verification_codes set used = true where subject = $1 and purpose = $2 and not used")
            .bind(&c.subject)
            .bind(c.purpose.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query(
            r#"
            insert into verification_codes (id, subject, purpose, code, expires_at_utc, used, attempts, created_at_utc)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(c.id)
        .bind(&c.subject)
        .bind(c.purpose.as_str())
        .bind(&c.code)
        .bind(c.expires_at_utc)
        .bind(c.used)
        .bind(c.attempts)
        .bind(c.created_at_utc)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn latest_code(&self, subject: &str, purpose: CodePurpose) -> StoreResult<Option<VerificationCode>> {
        let row = sqlx::query(
            r#"
            select * from verification_codes
            where subject = $1 and purpose = $2
            order by created_at_utc desc
            limit 1
            "#,
        )
        .bind(normalize_email(subject))
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(rows::code).transpose()
    }

    async fn record_code_attempt(&self, id: Uuid) -> StoreResult<i32> {
        let row: Option<(i32,)> =
            sqlx::query_as("update verification_codes set attempts = attempts + 1 where id = $1 returning attempts")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(|(n,)| n)
            .ok_or_else(|| StoreError::not_found("verification code", id))
    }

    async fn consume_code(&self, id: Uuid) -> StoreResult<()> {
        let r = sqlx::query("update verification_codes set used = true where id = $1 and not used")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if r.rows_affected() == 0 {
            return Err(match self.lost_cas("verification_codes", "verification code", id, "unused").await {
                StoreError::Conflict(_) => StoreError::Conflict(format!("verification code {id} already used")),
                other => other,
            });
        }
        Ok(())
    }

    async fn purge_expired_codes(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let r = sqlx::query("delete from verification_codes where expires_at_utc < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(r.rows_affected())
    }

    async fn append_message(&self, m: &ConciergeMessage) -> StoreResult<()> {
        sqlx::query(
            "insert into concierge_messages (id, customer_id, author, body, created_at_utc) values ($1, $2, $3, $4, $5)",
        )
        .bind(m.id)
        .bind(m.customer_id)
        .bind(m.author.as_str())
        .bind(&m.body)
        .bind(m.created_at_utc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_messages(&self, customer_id: Uuid) -> StoreResult<Vec<ConciergeMessage>> {
        let rows = sqlx::query("select * from concierge_messages where customer_id = $1 order by created_at_utc")
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(&rows, rows::message)
    }

    async fn list_threads(&self) -> StoreResult<Vec<ConciergeThread>> {
        let rows = sqlx::query(
            r#"
            select * from (
              select distinct on (customer_id)
                     customer_id,
                     author,
                     created_at_utc,
                     count(*) over (partition by customer_id) as message_count
                from concierge_messages
               order by customer_id, created_at_utc desc
            ) t
            order by created_at_utc desc
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|r| {
                let author: String = r.try_get("author").map_err(db_err)?;
                Ok(ConciergeThread {
                    customer_id: r.try_get("customer_id").map_err(db_err)?,
                    message_count: r.try_get("message_count").map_err(db_err)?,
                    last_author: Author::parse(&author).map_err(|e| StoreError::Backend(e.to_string()))?,
                    last_message_at_utc: r.try_get("created_at_utc").map_err(db_err)?,
                })
            })
            .collect()
    }
}
