//! MemStore: checkout atomicity, compare-and-set transitions, proofs and codes.

use atelier_schemas::{
    Author, Cart, CartLine, Category, Cents, CodePurpose, ConciergeMessage, Customer, OrderLine,
    OrderStatus, PaymentProof, Product, ProductStatus, ProofStatus, ShippingAddress,
    VerificationCode,
};
use atelier_store::{MemStore, NewOrder, Repository, StoreError};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

async fn seed(store: &MemStore, stock: i32, credit: i64) -> (Customer, Product) {
    let now = Utc::now();
    let customer = Customer {
        id: Uuid::new_v4(),
        email: "Buyer@Atelier.test".into(),
        name: "Buyer".into(),
        email_verified: true,
        store_credit: Cents::new(credit),
        created_at_utc: now,
    };
    store.insert_customer(&customer).await.unwrap();

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
        artisan_id: Uuid::new_v4(),
        category_id: category.id,
        name: "Bowl".into(),
        slug: "bowl".into(),
        description: String::new(),
        price: Cents::new(3_000),
        stock,
        status: ProductStatus::Active,
        created_at_utc: now,
        updated_at_utc: now,
    };
    store.insert_product(&product).await.unwrap();
    (customer, product)
}

fn new_order(customer: &Customer, product: &Product, qty: i32, credit: i64) -> NewOrder {
    let subtotal = Cents::new(3_000 * qty as i64);
    NewOrder {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        lines: vec![OrderLine {
            product_id: product.id,
            artisan_id: product.artisan_id,
            name: product.name.clone(),
            unit_price: product.price,
            quantity: qty,
        }],
        subtotal,
        discount: Cents::ZERO,
        shipping: Cents::ZERO,
        store_credit_applied: Cents::new(credit),
        total: subtotal - Cents::new(credit),
        vip_tier: "standard".into(),
        shipping_address: ShippingAddress {
            recipient: "Buyer".into(),
            line1: "1 Rue".into(),
            line2: None,
            city: "Lyon".into(),
            region: None,
            postal_code: "69001".into(),
            country: "FR".into(),
        },
        created_at_utc: Utc::now(),
        cart_updated_at_utc: DateTime::<Utc>::UNIX_EPOCH,
    }
}

#[tokio::test]
async fn checkout_is_all_or_nothing() {
    let store = MemStore::new();
    let (customer, product) = seed(&store, 2, 1_000).await;
    let saved_at = Utc::now();
    store
        .save_cart(
            &Cart {
                customer_id: customer.id,
                lines: vec![CartLine { product_id: product.id, quantity: 3 }],
                updated_at_utc: saved_at,
            },
            DateTime::<Utc>::UNIX_EPOCH,
        )
        .await
        .unwrap();
    let priced = |qty| NewOrder {
        cart_updated_at_utc: saved_at,
        ..new_order(&customer, &product, qty, 1_000)
    };

    let err = store.place_order(priced(3)).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { requested: 3, available: 2, .. }));
    assert_eq!(store.get_product(product.id).await.unwrap().stock, 2);
    assert_eq!(store.get_customer(customer.id).await.unwrap().store_credit, Cents::new(1_000));
    assert_eq!(store.get_cart(customer.id).await.unwrap().lines.len(), 1);

    let order = store.place_order(priced(2)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(store.get_product(product.id).await.unwrap().stock, 0);
    assert_eq!(store.get_customer(customer.id).await.unwrap().store_credit, Cents::ZERO);
    assert!(store.get_cart(customer.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn cart_writes_and_checkout_are_guarded_by_the_cart_version() {
    let store = MemStore::new();
    let (customer, product) = seed(&store, 5, 0).await;
    let line = |quantity| CartLine { product_id: product.id, quantity };

    let v1 = Utc::now();
    let first = Cart { customer_id: customer.id, lines: vec![line(1)], updated_at_utc: v1 };
    store.save_cart(&first, DateTime::<Utc>::UNIX_EPOCH).await.unwrap();
    // A second first-write loses.
    let err = store.save_cart(&first, DateTime::<Utc>::UNIX_EPOCH).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let v2 = v1 + Duration::seconds(1);
    let second = Cart { customer_id: customer.id, lines: vec![line(2)], updated_at_utc: v2 };
    store.save_cart(&second, v1).await.unwrap();
    let stale = Cart { customer_id: customer.id, lines: vec![line(4)], updated_at_utc: v2 + Duration::seconds(1) };
    assert!(matches!(store.save_cart(&stale, v1).await.unwrap_err(), StoreError::Conflict(_)));
    assert_eq!(store.get_cart(customer.id).await.unwrap().lines, vec![line(2)]);

    // Checkout priced from v1 must not clear lines written at v2.
    let err = store
        .place_order(NewOrder { cart_updated_at_utc: v1, ..new_order(&customer, &product, 1, 0) })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(store.get_product(product.id).await.unwrap().stock, 5);
    assert_eq!(store.get_cart(customer.id).await.unwrap().lines.len(), 1);

    store
        .place_order(NewOrder { cart_updated_at_utc: v2, ..new_order(&customer, &product, 2, 0) })
        .await
        .unwrap();
    assert!(store.get_cart(customer.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn order_cas_and_single_restock() {
    let store = MemStore::new();
    let (customer, product) = seed(&store, 5, 500).await;
    let order = store.place_order(new_order(&customer, &product, 2, 500)).await.unwrap();
    let now = Utc::now();

    store
        .transition_order(order.id, OrderStatus::Pending, OrderStatus::Failed, None, now)
        .await
        .unwrap();
    let lost = store
        .transition_order(order.id, OrderStatus::Pending, OrderStatus::Paid, Some("ref".into()), now)
        .await
        .unwrap_err();
    assert_eq!(lost.code(), "conflict");

    assert!(store.restock_order(order.id).await.unwrap());
    assert!(!store.restock_order(order.id).await.unwrap());
    assert_eq!(store.get_product(product.id).await.unwrap().stock, 5);
    assert_eq!(store.get_customer(customer.id).await.unwrap().store_credit, Cents::new(500));
    assert_eq!(store.lifetime_spend(customer.id).await.unwrap(), Cents::ZERO);
}

#[tokio::test]
async fn one_submitted_proof_per_order() {
    let store = MemStore::new();
    let (customer, product) = seed(&store, 5, 0).await;
    let order = store.place_order(new_order(&customer, &product, 1, 0)).await.unwrap();

    let proof = |id: Uuid| PaymentProof {
        id,
        order_id: order.id,
        customer_id: customer.id,
        url: "https://files.atelier.test/p.png".into(),
        content_type: "image/png".into(),
        size_bytes: 1024,
        status: ProofStatus::Submitted,
        review_note: None,
        submitted_at_utc: Utc::now(),
        reviewed_at_utc: None,
    };
    let first = proof(Uuid::new_v4());
    store.insert_proof(&first).await.unwrap();
    assert!(matches!(
        store.insert_proof(&proof(Uuid::new_v4())).await,
        Err(StoreError::Conflict(_))
    ));

    store
        .review_proof(first.id, ProofStatus::Submitted, ProofStatus::Rejected, Some("blurry".into()), Utc::now())
        .await
        .unwrap();
    store.insert_proof(&proof(Uuid::new_v4())).await.unwrap();
}

#[tokio::test]
async fn new_code_supersedes_old_and_purge_drops_expired() {
    let store = MemStore::new();
    let now = Utc::now();
    let code = |c: &str, created: DateTime<Utc>| VerificationCode {
        id: Uuid::new_v4(),
        subject: "maker@atelier.test".into(),
        purpose: CodePurpose::ArtisanEmail,
        code: c.into(),
        expires_at_utc: created + Duration::minutes(15),
        used: false,
        attempts: 0,
        created_at_utc: created,
    };
    let old = code("111111", now - Duration::hours(1));
    let fresh = code("222222", now);
    store.insert_code(&old).await.unwrap();
    store.insert_code(&fresh).await.unwrap();

    let latest = store
        .latest_code("MAKER@atelier.test", CodePurpose::ArtisanEmail)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, fresh.id);

    assert_eq!(store.record_code_attempt(fresh.id).await.unwrap(), 1);
    store.consume_code(fresh.id).await.unwrap();
    assert!(matches!(store.consume_code(fresh.id).await, Err(StoreError::Conflict(_))));

    assert_eq!(store.purge_expired_codes(now).await.unwrap(), 1);
    assert!(store.latest_code("maker@atelier.test", CodePurpose::ArtisanEmail).await.unwrap().is_some());
}

#[tokio::test]
async fn concierge_threads_flag_unanswered() {
    let store = MemStore::new();
    let (customer, _) = seed(&store, 1, 0).await;
    let t0 = Utc::now();
    for (i, author) in [Author::Customer, Author::Concierge, Author::Customer].into_iter().enumerate() {
        store
            .append_message(&ConciergeMessage {
                id: Uuid::new_v4(),
                customer_id: customer.id,
                author,
                body: format!("message {i}"),
                created_at_utc: t0 + Duration::seconds(i as i64),
            })
            .await
            .unwrap();
    }
    let threads = store.list_threads().await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].message_count, 3);
    assert!(threads[0].awaiting_reply());
    assert_eq!(store.list_messages(customer.id).await.unwrap()[0].body, "message 0");
}
