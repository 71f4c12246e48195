//! Order placement retries a lost race by re-reading the product.
//!
//! The store below reports a version conflict for the first placements, the
//! way a backend does when the rate changed between the read and the
//! conditional write. The desk must re-read and re-price on every attempt,
//! give up after its policy runs out, and never retry business outcomes.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agrohub::errors::{MarketError, StoreError, StoreResult};
use agrohub::order::{Order, OrderDraft, OrderStatus, OrderView, PlacedOrder};
use agrohub::product::{NewProduct, Product, ProductListing};
use agrohub::store::{AdminStore, MarketStore, OrderStore, ProductStore, UserStore};
use agrohub::types::{
    AadharNumber, AdminUsername, Email, OrderId, PhoneNumber, ProductId, ProductKind, UserId,
};
use agrohub::user::{AdminAccount, Registration, User};
use agrohub::{OrderDesk, RetryPolicy};
use agrohub_memory::InMemoryMarketStore;
use agrohub_testing::fixtures::order_request;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{seeded, stock_of};
use rust_decimal_macros::dec;

/// Delegates to the in-memory store but loses the first `conflicts` races.
struct ContestedStore {
    inner: InMemoryMarketStore,
    conflicts: AtomicU32,
    placements: AtomicU32,
    product_reads: AtomicU32,
}

impl ContestedStore {
    fn new(inner: InMemoryMarketStore, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
            placements: AtomicU32::new(0),
            product_reads: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl UserStore for ContestedStore {
    async fn create_user(&self, registration: Registration) -> StoreResult<User> {
        self.inner.create_user(registration).await
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.inner.user(id).await
    }

    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        self.inner.user_by_email(email).await
    }

    async fn identity_taken(&self, email: &Email, aadhar: &AadharNumber) -> StoreResult<bool> {
        self.inner.identity_taken(email, aadhar).await
    }

    async fn update_phone_number(&self, id: UserId, phone: PhoneNumber) -> StoreResult<User> {
        self.inner.update_phone_number(id, phone).await
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.record_login(id, at).await
    }

    async fn unapproved_farmers(&self) -> StoreResult<Vec<User>> {
        self.inner.unapproved_farmers().await
    }

    async fn approve_farmer(&self, id: UserId) -> StoreResult<()> {
        self.inner.approve_farmer(id).await
    }
}

#[async_trait]
impl AdminStore for ContestedStore {
    async fn upsert_admin(
        &self,
        username: AdminUsername,
        password_digest: String,
    ) -> StoreResult<AdminAccount> {
        self.inner.upsert_admin(username, password_digest).await
    }

    async fn admin_by_username(
        &self,
        username: &AdminUsername,
    ) -> StoreResult<Option<AdminAccount>> {
        self.inner.admin_by_username(username).await
    }
}

#[async_trait]
impl ProductStore for ContestedStore {
    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        self.inner.create_product(product).await
    }

    async fn product(&self, id: ProductId) -> StoreResult<Option<ProductListing>> {
        self.product_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.product(id).await
    }

    async fn verified_listings(
        &self,
        kind: Option<ProductKind>,
    ) -> StoreResult<Vec<ProductListing>> {
        self.inner.verified_listings(kind).await
    }

    async fn farmer_products(&self, farmer_id: UserId) -> StoreResult<Vec<ProductListing>> {
        self.inner.farmer_products(farmer_id).await
    }

    async fn set_available(&self, id: ProductId, available: bool) -> StoreResult<()> {
        self.inner.set_available(id, available).await
    }

    async fn approve_product(&self, id: ProductId) -> StoreResult<()> {
        self.inner.approve_product(id).await
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        self.inner.delete_product(id).await
    }
}

#[async_trait]
impl OrderStore for ContestedStore {
    async fn place_order(&self, draft: OrderDraft) -> StoreResult<PlacedOrder> {
        self.placements.fetch_add(1, Ordering::SeqCst);
        let lost_race = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if lost_race {
            return Err(StoreError::VersionConflict);
        }
        self.inner.place_order(draft).await
    }

    async fn order(&self, id: OrderId) -> StoreResult<Option<OrderView>> {
        self.inner.order(id).await
    }

    async fn buyer_orders(&self, buyer_id: UserId) -> StoreResult<Vec<OrderView>> {
        self.inner.buyer_orders(buyer_id).await
    }

    async fn farmer_orders(&self, farmer_id: UserId) -> StoreResult<Vec<OrderView>> {
        self.inner.farmer_orders(farmer_id).await
    }

    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> StoreResult<Order> {
        self.inner.update_order_status(id, status).await
    }
}

#[async_trait]
impl MarketStore for ContestedStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

fn quick_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        use_jitter: false,
    }
}

#[tokio::test]
async fn a_lost_race_is_retried_with_a_fresh_read() {
    // Given a product of 20 kg and a store that loses the first race
    let seed = seeded(20, dec!(15)).await;
    let store = Arc::new(ContestedStore::new(seed.store.clone(), 1));
    let desk = OrderDesk::new(store.clone()).with_retry_policy(quick_retries(3));

    // When a buyer orders 5 kg
    let placed = desk
        .place_order(seed.buyer.id, seed.product.id, order_request(5))
        .await
        .expect("second attempt should place the order");

    // Then the product was read and placed once per attempt, and stock moved once
    assert_eq!(store.placements.load(Ordering::SeqCst), 2);
    assert_eq!(store.product_reads.load(Ordering::SeqCst), 2);
    assert_eq!(placed.total_price.amount(), dec!(75));
    assert_eq!(stock_of(&seed.store, seed.product.id).await, 15);
}

#[tokio::test]
async fn persistent_conflicts_surface_as_conflict_retry() {
    let seed = seeded(20, dec!(15)).await;
    let store = Arc::new(ContestedStore::new(seed.store.clone(), u32::MAX));
    let desk = OrderDesk::new(store.clone()).with_retry_policy(quick_retries(3));

    let result = desk
        .place_order(seed.buyer.id, seed.product.id, order_request(5))
        .await;

    assert_eq!(result, Err(MarketError::ConflictRetry));
    assert_eq!(store.placements.load(Ordering::SeqCst), 3);
    assert_eq!(stock_of(&seed.store, seed.product.id).await, 20);
}

#[tokio::test]
async fn without_retries_the_first_conflict_is_returned() {
    let seed = seeded(20, dec!(15)).await;
    let store = Arc::new(ContestedStore::new(seed.store.clone(), 1));
    let desk = OrderDesk::new(store.clone()).with_retry_policy(RetryPolicy::no_retry());

    let result = desk
        .place_order(seed.buyer.id, seed.product.id, order_request(5))
        .await;

    assert_eq!(result, Err(MarketError::ConflictRetry));
    assert_eq!(store.placements.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn business_outcomes_are_not_retried() {
    let seed = seeded(4, dec!(15)).await;
    let store = Arc::new(ContestedStore::new(seed.store.clone(), 0));
    let desk = OrderDesk::new(store.clone()).with_retry_policy(quick_retries(5));

    let result = desk
        .place_order(seed.buyer.id, seed.product.id, order_request(5))
        .await;

    assert_eq!(
        result,
        Err(MarketError::InsufficientStock {
            requested: 5,
            available: 4,
        })
    );
    // Short stock is caught on the read, before any placement.
    assert_eq!(store.placements.load(Ordering::SeqCst), 0);
    assert_eq!(store.product_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_quantities_touch_nothing() {
    let seed = seeded(4, dec!(15)).await;
    let store = Arc::new(ContestedStore::new(seed.store.clone(), 0));
    let desk = OrderDesk::new(store.clone());

    for quantity in [0, -3] {
        let result = desk
            .place_order(seed.buyer.id, seed.product.id, order_request(quantity))
            .await;
        assert!(matches!(result, Err(MarketError::InvalidInput(_))));
    }
    assert_eq!(store.product_reads.load(Ordering::SeqCst), 0);
    assert_eq!(stock_of(&seed.store, seed.product.id).await, 4);
}
