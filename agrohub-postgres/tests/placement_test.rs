mod common;

use std::sync::Arc;

use agrohub::order::OrderStatus;
use agrohub::store::{MarketStore, OrderStore, ProductStore, UserStore};
use agrohub::{MarketError, OrderDesk};
use agrohub_testing::fixtures::{buyer_registration, farmer_registration, new_product, order_request};
use common::PostgresTestFixture;
use futures::future::join_all;
use rust_decimal_macros::dec;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn twenty_buyers_racing_for_ten_kilograms_never_oversell() {
    // Given: a product with 10 kg and twenty buyers who each want 1 kg
    let fixture = PostgresTestFixture::new().await;
    let store: Arc<dyn MarketStore> = Arc::new(fixture.store.clone());
    let farmer = store
        .create_user(farmer_registration("race farmer"))
        .await
        .expect("farmer should be stored");
    let product = store
        .create_product(new_product(&farmer, 10, dec!(42.50)))
        .await
        .expect("product should be stored");
    let mut buyers = Vec::new();
    for _ in 0..20 {
        buyers.push(
            store
                .create_user(buyer_registration("race buyer"))
                .await
                .expect("buyer should be stored"),
        );
    }
    let desk = OrderDesk::new(store.clone());

    // When: all of them order at once
    let outcomes = join_all(buyers.iter().map(|buyer| {
        let desk = desk.clone();
        let buyer_id = buyer.id;
        let product_id = product.id;
        tokio::spawn(async move {
            desk.place_order(buyer_id, product_id, order_request(1))
                .await
        })
    }))
    .await;

    // Then: exactly ten succeed, the rest see insufficient stock, and stock is zero
    let mut placed = 0;
    let mut refused = 0;
    for outcome in outcomes {
        match outcome.expect("placement task should not panic") {
            Ok(order) => {
                assert_eq!(order.total_price.amount(), dec!(42.50));
                placed += 1;
            }
            Err(MarketError::InsufficientStock { requested: 1, .. }) => refused += 1,
            Err(other) => panic!("unexpected placement error: {other:?}"),
        }
    }
    assert_eq!(placed, 10);
    assert_eq!(refused, 10);

    let listing = store
        .product(product.id)
        .await
        .expect("product should be readable")
        .expect("product should exist");
    assert_eq!(listing.product.quantity_kg.into_inner(), 0);
    let sold = store
        .farmer_orders(farmer.id)
        .await
        .expect("farmer orders should be readable");
    assert_eq!(sold.len(), 10);
    assert!(sold.iter().all(|view| view.order.status == OrderStatus::Pending));
}

#[tokio::test]
async fn orders_are_priced_at_the_stored_rate() {
    // Given: a product whose rate was changed directly in the database
    let fixture = PostgresTestFixture::new().await;
    let store: Arc<dyn MarketStore> = Arc::new(fixture.store.clone());
    let farmer = store
        .create_user(farmer_registration("rate farmer"))
        .await
        .expect("farmer should be stored");
    let buyer = store
        .create_user(buyer_registration("rate buyer"))
        .await
        .expect("buyer should be stored");
    let product = store
        .create_product(new_product(&farmer, 10, dec!(30)))
        .await
        .expect("product should be stored");

    let pool = sqlx::PgPool::connect(&fixture.connection_string)
        .await
        .expect("should open a direct connection");
    sqlx::query("UPDATE products SET rate_per_kg = 35 WHERE id = $1")
        .bind(product.id.into_inner())
        .execute(&pool)
        .await
        .expect("rate update should succeed");

    // When: the buyer orders 2 kg
    let placed = OrderDesk::new(store.clone())
        .place_order(buyer.id, product.id, order_request(2))
        .await
        .expect("order should be placed at the current rate");

    // Then: the total uses the rate stored at placement time
    assert_eq!(placed.total_price.amount(), dec!(70));
}

#[tokio::test]
async fn migrations_can_run_twice() {
    let fixture = PostgresTestFixture::new().await;

    fixture
        .store
        .migrate()
        .await
        .expect("second migration run should be a no-op");
    fixture.store.ping().await.expect("store should answer pings");
}

#[tokio::test]
async fn shared_pool_serves_sessions_and_codes() {
    use agrohub::store::ExpiringStore;
    use std::time::Duration;

    let fixture = PostgresTestFixture::new().await;
    let entries = fixture.store.expiring_store();

    entries
        .put("session:abc", "{\"kind\":\"admin\"}".to_string(), Duration::from_secs(60))
        .await
        .expect("put should succeed");

    assert_eq!(
        entries.get("session:abc").await.expect("get should succeed").as_deref(),
        Some("{\"kind\":\"admin\"}")
    );
}
