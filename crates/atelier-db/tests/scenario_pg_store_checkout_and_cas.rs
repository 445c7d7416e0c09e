//! PgStore against a real database.
//!
//! DB-backed test. Prints SKIP and passes if `ATELIER_DATABASE_URL` is not set.

use atelier_db::{PgStore, ENV_DB_URL};
use atelier_schemas::{
    Artisan, ArtisanStatus, Cart, CartLine, Category, Cents, Customer, OrderLine, OrderStatus,
    PaymentProof, Product, ProductStatus, ProofStatus, ShippingAddress,
};
use atelier_store::{NewOrder, Repository, StoreError};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

struct Fixture {
    store: PgStore,
    customer: Customer,
    product: Product,
}

async fn fixture(stock: i32, credit: i64) -> anyhow::Result<Option<Fixture>> {
    let Some(pool) = atelier_db::testkit_db_pool().await? else {
        eprintln!("SKIP: {ENV_DB_URL} not set");
        return Ok(None);
    };
    let store = PgStore::new(pool);
    let now = Utc::now();
    let tag = Uuid::new_v4().simple().to_string();

    let customer = Customer {
        id: Uuid::new_v4(),
        email: format!("buyer-{tag}@atelier.test"),
        name: "Buyer".into(),
        email_verified: true,
        store_credit: Cents::new(credit),
        created_at_utc: now,
    };
    store.insert_customer(&customer).await?;

    let artisan = Artisan {
        id: Uuid::new_v4(),
        email: format!("maker-{tag}@atelier.test"),
        display_name: "Maker".into(),
        bio: None,
        status: ArtisanStatus::Pending,
        email_verified: false,
        created_at_utc: now,
        approved_at_utc: None,
    };
    store.insert_artisan(&artisan).await?;

    let category = Category {
        id: Uuid::new_v4(),
        parent_id: None,
        name: "Ceramics".into(),
        slug: format!("ceramics-{tag}"),
        position: 0,
    };
    store.insert_category(&category).await?;

    let product = Product {
        id: Uuid::new_v4(),
        artisan_id: artisan.id,
        category_id: category.id,
        name: "Bowl".into(),
        slug: format!("bowl-{tag}"),
        description: String::new(),
        price: Cents::new(3_000),
        stock,
        status: ProductStatus::Active,
        created_at_utc: now,
        updated_at_utc: now,
    };
    store.insert_product(&product).await?;

    Ok(Some(Fixture {
        store,
        customer,
        product,
    }))
}

fn new_order(f: &Fixture, qty: i32, credit: i64) -> NewOrder {
    let subtotal = Cents::new(3_000 * qty as i64);
    NewOrder {
        id: Uuid::new_v4(),
        customer_id: f.customer.id,
        lines: vec![OrderLine {
            product_id: f.product.id,
            artisan_id: f.product.artisan_id,
            name: f.product.name.clone(),
            unit_price: f.product.price,
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
        cart_updated_at_utc: DateTime::<Utc>::UNIX_EPOCH,
        created_at_utc: Utc::now(),
    }
}

#[tokio::test]
async fn checkout_rolls_back_on_insufficient_stock() -> anyhow::Result<()> {
    let Some(f) = fixture(2, 1_000).await? else {
        return Ok(());
    };

    let err = f.store.place_order(new_order(&f, 3, 1_000)).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { available: 2, .. }), "{err}");
    assert_eq!(f.store.get_product(f.product.id).await?.stock, 2);
    assert_eq!(f.store.get_customer(f.customer.id).await?.store_credit, Cents::new(1_000));

    let order = f.store.place_order(new_order(&f, 2, 1_000)).await?;
    let stored = f.store.get_order(order.id).await?;
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.lines.len(), 1);
    assert_eq!(f.store.get_product(f.product.id).await?.stock, 0);
    assert_eq!(f.store.get_customer(f.customer.id).await?.store_credit, Cents::ZERO);
    Ok(())
}

#[tokio::test]
async fn order_cas_restock_and_proof_index() -> anyhow::Result<()> {
    let Some(f) = fixture(5, 0).await? else {
        return Ok(());
    };
    let order = f.store.place_order(new_order(&f, 2, 0)).await?;

    let proof = |id: Uuid| PaymentProof {
        id,
        order_id: order.id,
        customer_id: f.customer.id,
        url: "https://files.atelier.test/p.png".into(),
        content_type: "image/png".into(),
        size_bytes: 2048,
        status: ProofStatus::Submitted,
        review_note: None,
        submitted_at_utc: Utc::now(),
        reviewed_at_utc: None,
    };
    f.store.insert_proof(&proof(Uuid::new_v4())).await?;
    assert!(matches!(
        f.store.insert_proof(&proof(Uuid::new_v4())).await,
        Err(StoreError::Conflict(_))
    ));

    let now = Utc::now();
    f.store
        .transition_order(order.id, OrderStatus::Pending, OrderStatus::Failed, None, now)
        .await?;
    let lost = f
        .store
        .transition_order(order.id, OrderStatus::Pending, OrderStatus::Paid, None, now)
        .await
        .unwrap_err();
    assert_eq!(lost.code(), "conflict");

    assert!(f.store.restock_order(order.id).await?);
    assert!(!f.store.restock_order(order.id).await?);
    assert_eq!(f.store.get_product(f.product.id).await?.stock, 5);

    let missing = f
        .store
        .transition_order(Uuid::new_v4(), OrderStatus::Pending, OrderStatus::Paid, None, now)
        .await
        .unwrap_err();
    assert_eq!(missing.code(), "not_found");
    Ok(())
}

#[tokio::test]
async fn artisan_status_cas_stamps_approval_once() -> anyhow::Result<()> {
    let Some(f) = fixture(1, 0).await? else {
        return Ok(());
    };
    let artisan_id = f.product.artisan_id;
    let t1 = Utc::now();
    let a = f
        .store
        .set_artisan_status(artisan_id, ArtisanStatus::Pending, ArtisanStatus::Active, t1)
        .await?;
    assert!(a.approved_at_utc.is_some());

    f.store
        .set_artisan_status(artisan_id, ArtisanStatus::Active, ArtisanStatus::Suspended, t1)
        .await?;
    let again = f
        .store
        .set_artisan_status(artisan_id, ArtisanStatus::Suspended, ArtisanStatus::Active, t1 + Duration::days(1))
        .await?;
    assert_eq!(again.approved_at_utc, a.approved_at_utc);

    let stale = f
        .store
        .set_artisan_status(artisan_id, ArtisanStatus::Pending, ArtisanStatus::Active, t1)
        .await
        .unwrap_err();
    assert_eq!(stale.code(), "conflict");
    Ok(())
}

#[tokio::test]
async fn cart_version_guards_writes_and_checkout() -> anyhow::Result<()> {
    let Some(f) = fixture(5, 0).await? else {
        return Ok(());
    };
    // Whole seconds survive the timestamptz round trip unchanged.
    let v1 = Utc::now().trunc_subsecs(0);
    let v2 = v1 + Duration::seconds(1);
    let cart = |qty: i32, at: DateTime<Utc>| Cart {
        customer_id: f.customer.id,
        lines: vec![CartLine {
            product_id: f.product.id,
            quantity: qty,
        }],
        updated_at_utc: at,
    };

    f.store.save_cart(&cart(1, v1), DateTime::<Utc>::UNIX_EPOCH).await?;
    let dup = f
        .store
        .save_cart(&cart(1, v1), DateTime::<Utc>::UNIX_EPOCH)
        .await
        .unwrap_err();
    assert_eq!(dup.code(), "conflict");

    f.store.save_cart(&cart(2, v2), v1).await?;
    let stale = f.store.save_cart(&cart(3, v2 + Duration::seconds(1)), v1).await.unwrap_err();
    assert_eq!(stale.code(), "conflict");
    assert_eq!(f.store.get_cart(f.customer.id).await?.updated_at_utc, v2);

    let lost = f
        .store
        .place_order(NewOrder {
            cart_updated_at_utc: v1,
            ..new_order(&f, 1, 0)
        })
        .await
        .unwrap_err();
    assert_eq!(lost.code(), "conflict");
    assert_eq!(f.store.get_product(f.product.id).await?.stock, 5);

    f.store
        .place_order(NewOrder {
            cart_updated_at_utc: v2,
            ..new_order(&f, 2, 0)
        })
        .await?;
    assert!(f.store.get_cart(f.customer.id).await?.lines.is_empty());
    assert_eq!(f.store.get_product(f.product.id).await?.stock, 3);
    Ok(())
}
