//! Behavior every storage backend must show.
//!
//! Each scenario takes a `make_store` factory and returns a
//! [`ContractTestResult`]. Backends run the whole suite through
//! [`market_store_contract_tests!`](crate::market_store_contract_tests) and
//! [`expiring_store_contract_tests!`](crate::expiring_store_contract_tests).
//! Scenarios create their own users with unique identifiers, so they can
//! share one database.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agrohub::errors::{Resource, StoreError, StoreResult};
use agrohub::order::OrderStatus;
use agrohub::product::Product;
use agrohub::store::{ExpiringStore, MarketStore};
use agrohub::types::{OrderId, ProductKind};
use agrohub::user::User;
use futures::future::join_all;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::fixtures::{
    buyer_registration, draft, farmer_registration, new_product, new_product_of_kind,
};

#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn store_error(scenario: &'static str, operation: &'static str, error: &StoreError) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

pub type ContractTestResult = Result<(), ContractTestFailure>;

fn step<T>(
    scenario: &'static str,
    operation: &'static str,
    result: StoreResult<T>,
) -> Result<T, ContractTestFailure> {
    result.map_err(|error| ContractTestFailure::store_error(scenario, operation, &error))
}

fn ensure(scenario: &'static str, holds: bool, detail: impl FnOnce() -> String) -> ContractTestResult {
    if holds {
        Ok(())
    } else {
        Err(ContractTestFailure::new(scenario, detail()))
    }
}

fn rupees(amount: i64) -> Decimal {
    Decimal::from(amount)
}

struct Market<S> {
    store: S,
    farmer: User,
    buyer: User,
}

async fn market<S: MarketStore>(
    scenario: &'static str,
    store: S,
) -> Result<Market<S>, ContractTestFailure> {
    let farmer = step(
        scenario,
        "create_user",
        store.create_user(farmer_registration(scenario)).await,
    )?;
    let buyer = step(
        scenario,
        "create_user",
        store.create_user(buyer_registration(scenario)).await,
    )?;
    Ok(Market {
        store,
        farmer,
        buyer,
    })
}

async fn stock_of<S: MarketStore>(
    scenario: &'static str,
    store: &S,
    product: &Product,
) -> Result<i64, ContractTestFailure> {
    let listing = step(scenario, "product", store.product(product.id).await)?
        .ok_or_else(|| ContractTestFailure::new(scenario, "product disappeared"))?;
    Ok(listing.product.quantity_kg.into_inner())
}

pub async fn test_place_order_decrements_stock<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "place_order_decrements_stock";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 100, rupees(50))).await,
    )?;

    let placed = step(
        SCENARIO,
        "place_order",
        store.place_order(draft(&buyer, &product, 30)).await,
    )?;

    ensure(SCENARIO, placed.total_price.amount() == rupees(1500), || {
        format!("expected total 1500, got {}", placed.total_price)
    })?;
    let remaining = stock_of(SCENARIO, &store, &product).await?;
    ensure(SCENARIO, remaining == 70, || {
        format!("expected 70 kg left, got {remaining}")
    })?;

    let view = step(SCENARIO, "order", store.order(placed.order_id).await)?
        .ok_or_else(|| ContractTestFailure::new(SCENARIO, "placed order not found"))?;
    ensure(SCENARIO, view.order.status == OrderStatus::Pending, || {
        format!("new order should be pending, got {}", view.order.status)
    })?;
    ensure(SCENARIO, view.order.quantity_kg.into_inner() == 30, || {
        format!("expected 30 kg ordered, got {}", view.order.quantity_kg)
    })?;
    ensure(
        SCENARIO,
        view.buyer.user_id == buyer.id && view.farmer.user_id == farmer.id,
        || "order view names the wrong parties".to_string(),
    )
}

pub async fn test_concurrent_orders_never_oversell<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "concurrent_orders_never_oversell";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let store = Arc::new(store);
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 10, rupees(20))).await,
    )?;

    let racers = (0..2).map(|_| {
        let store = Arc::clone(&store);
        let order = draft(&buyer, &product, 8);
        tokio::spawn(async move { store.place_order(order).await })
    });
    let outcomes = join_all(racers).await;

    let mut placed = 0;
    let mut refused = 0;
    for outcome in outcomes {
        match outcome {
            Ok(Ok(_)) => placed += 1,
            Ok(Err(StoreError::InsufficientStock { .. } | StoreError::VersionConflict)) => {
                refused += 1;
            }
            Ok(Err(error)) => {
                return Err(ContractTestFailure::store_error(SCENARIO, "place_order", &error))
            }
            Err(error) => {
                return Err(ContractTestFailure::new(
                    SCENARIO,
                    format!("placement task failed: {error}"),
                ))
            }
        }
    }

    ensure(SCENARIO, placed == 1 && refused == 1, || {
        format!("expected one winner and one loser, got {placed} placed and {refused} refused")
    })?;
    let remaining = stock_of(SCENARIO, store.as_ref(), &product).await?;
    ensure(SCENARIO, remaining == 2, || {
        format!("expected 2 kg left, got {remaining}")
    })
}

pub async fn test_many_buyers_share_stock_exactly<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "many_buyers_share_stock_exactly";
    const CONTENDERS: usize = 8;

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let store = Arc::new(store);
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 10, rupees(35))).await,
    )?;

    let tasks = (0..CONTENDERS).map(|_| {
        let store = Arc::clone(&store);
        let order = draft(&buyer, &product, 3);
        tokio::spawn(async move {
            loop {
                match store.place_order(order.clone()).await {
                    Err(StoreError::VersionConflict) => tokio::task::yield_now().await,
                    other => break other,
                }
            }
        })
    });

    let mut placed = 0;
    for outcome in join_all(tasks).await {
        match outcome {
            Ok(Ok(_)) => placed += 1,
            Ok(Err(StoreError::InsufficientStock { .. })) => {}
            Ok(Err(error)) => {
                return Err(ContractTestFailure::store_error(SCENARIO, "place_order", &error))
            }
            Err(error) => {
                return Err(ContractTestFailure::new(
                    SCENARIO,
                    format!("placement task failed: {error}"),
                ))
            }
        }
    }

    ensure(SCENARIO, placed == 3, || {
        format!("10 kg covers three 3 kg orders, but {placed} were placed")
    })?;
    let remaining = stock_of(SCENARIO, store.as_ref(), &product).await?;
    ensure(SCENARIO, remaining == 1, || {
        format!("expected 1 kg left, got {remaining}")
    })?;
    let orders = step(SCENARIO, "buyer_orders", store.buyer_orders(buyer.id).await)?;
    ensure(SCENARIO, orders.len() == 3, || {
        format!("expected 3 stored orders, found {}", orders.len())
    })
}

pub async fn test_insufficient_stock_writes_nothing<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "insufficient_stock_writes_nothing";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 5, rupees(40))).await,
    )?;

    match store.place_order(draft(&buyer, &product, 6)).await {
        Err(StoreError::InsufficientStock {
            requested: 6,
            available: 5,
        }) => {}
        Err(error) => {
            return Err(ContractTestFailure::store_error(SCENARIO, "place_order", &error))
        }
        Ok(placed) => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                format!("order {} was placed beyond stock", placed.order_id),
            ))
        }
    }

    let remaining = stock_of(SCENARIO, &store, &product).await?;
    ensure(SCENARIO, remaining == 5, || {
        format!("stock changed to {remaining} after a refused order")
    })?;
    let orders = step(SCENARIO, "buyer_orders", store.buyer_orders(buyer.id).await)?;
    ensure(SCENARIO, orders.is_empty(), || {
        format!("refused placement left {} orders behind", orders.len())
    })
}

pub async fn test_stale_rate_is_a_conflict<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "stale_rate_is_a_conflict";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 50, rupees(60))).await,
    )?;
    let mut stale = draft(&buyer, &product, 2);
    stale.rate_per_kg = agrohub::Money::new(rupees(55))
        .map_err(|error| ContractTestFailure::new(SCENARIO, error.to_string()))?;

    match store.place_order(stale).await {
        Err(StoreError::VersionConflict) => {}
        Err(error) => {
            return Err(ContractTestFailure::store_error(SCENARIO, "place_order", &error))
        }
        Ok(_) => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                "order priced at a stale rate was accepted",
            ))
        }
    }
    let remaining = stock_of(SCENARIO, &store, &product).await?;
    ensure(SCENARIO, remaining == 50, || {
        format!("stock changed to {remaining} after a conflict")
    })
}

pub async fn test_missing_records_are_not_found<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "missing_records_are_not_found";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 5, rupees(10))).await,
    )?;
    step(SCENARIO, "delete_product", store.delete_product(product.id).await)?;

    let result = store.place_order(draft(&buyer, &product, 1)).await;
    ensure(
        SCENARIO,
        result == Err(StoreError::NotFound(Resource::Product(product.id))),
        || format!("ordering a deleted product returned {result:?}"),
    )?;

    let missing_order = OrderId::try_new(i64::MAX)
        .map_err(|error| ContractTestFailure::new(SCENARIO, error.to_string()))?;
    let found = step(SCENARIO, "order", store.order(missing_order).await)?;
    ensure(SCENARIO, found.is_none(), || "found a nonexistent order".to_string())?;

    let update = store
        .update_order_status(missing_order, OrderStatus::Shipped)
        .await;
    ensure(
        SCENARIO,
        update == Err(StoreError::NotFound(Resource::Order(missing_order))),
        || format!("updating a nonexistent order returned {update:?}"),
    )
}

pub async fn test_status_updates_are_persisted<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "status_updates_are_persisted";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 20, rupees(25))).await,
    )?;
    let placed = step(
        SCENARIO,
        "place_order",
        store.place_order(draft(&buyer, &product, 4)).await,
    )?;

    for status in [OrderStatus::Shipped, OrderStatus::Pending, OrderStatus::Refunded] {
        let order = step(
            SCENARIO,
            "update_order_status",
            store.update_order_status(placed.order_id, status).await,
        )?;
        ensure(SCENARIO, order.status == status, || {
            format!("update returned status {} instead of {status}", order.status)
        })?;
    }

    let view = step(SCENARIO, "order", store.order(placed.order_id).await)?
        .ok_or_else(|| ContractTestFailure::new(SCENARIO, "order vanished"))?;
    ensure(SCENARIO, view.order.status == OrderStatus::Refunded, || {
        format!("stored status is {}", view.order.status)
    })?;
    ensure(SCENARIO, view.order.total_price == placed.total_price, || {
        "status update changed the order total".to_string()
    })
}

pub async fn test_listings_show_only_verified_available<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "listings_show_only_verified_available";

    let Market { store, farmer, .. } = market(SCENARIO, make_store()).await?;
    let pending = step(
        SCENARIO,
        "create_product",
        store
            .create_product(new_product_of_kind(&farmer, "Jari", 10, rupees(30)))
            .await,
    )?;
    let verified = step(
        SCENARIO,
        "create_product",
        store
            .create_product(new_product_of_kind(&farmer, "Jari", 10, rupees(30)))
            .await,
    )?;
    let withdrawn = step(
        SCENARIO,
        "create_product",
        store
            .create_product(new_product_of_kind(&farmer, "Mushroom", 10, rupees(30)))
            .await,
    )?;
    step(SCENARIO, "approve_product", store.approve_product(verified.id).await)?;
    step(SCENARIO, "approve_product", store.approve_product(withdrawn.id).await)?;
    step(
        SCENARIO,
        "set_available",
        store.set_available(withdrawn.id, false).await,
    )?;

    let listed: Vec<_> = step(SCENARIO, "verified_listings", store.verified_listings(None).await)?
        .into_iter()
        .filter(|listing| listing.product.farmer_id == farmer.id)
        .map(|listing| listing.product.id)
        .collect();
    ensure(SCENARIO, listed == vec![verified.id], || {
        format!(
            "expected only product {} listed, got {listed:?} (pending {}, withdrawn {})",
            verified.id, pending.id, withdrawn.id
        )
    })?;

    let jari = ProductKind::try_new("jari".to_string())
        .map_err(|error| ContractTestFailure::new(SCENARIO, error.to_string()))?;
    let jari_listed = step(
        SCENARIO,
        "verified_listings",
        store.verified_listings(Some(jari)).await,
    )?;
    ensure(
        SCENARIO,
        jari_listed
            .iter()
            .any(|listing| listing.product.id == verified.id)
            && jari_listed
                .iter()
                .all(|listing| listing.product.kind.matches("Jari")),
        || "kind filter should match case-insensitively and only that kind".to_string(),
    )?;

    let own = step(SCENARIO, "farmer_products", store.farmer_products(farmer.id).await)?;
    let own_ids: Vec<_> = own.iter().map(|listing| listing.product.id).collect();
    ensure(
        SCENARIO,
        own_ids == vec![withdrawn.id, verified.id, pending.id],
        || format!("farmer products should list all three newest first, got {own_ids:?}"),
    )
}

pub async fn test_ordered_products_cannot_be_deleted<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "ordered_products_cannot_be_deleted";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 10, rupees(15))).await,
    )?;
    step(
        SCENARIO,
        "place_order",
        store.place_order(draft(&buyer, &product, 1)).await,
    )?;

    let result = store.delete_product(product.id).await;
    ensure(
        SCENARIO,
        result == Err(StoreError::StillReferenced(Resource::Product(product.id))),
        || format!("deleting an ordered product returned {result:?}"),
    )?;
    let still_there = step(SCENARIO, "product", store.product(product.id).await)?;
    ensure(SCENARIO, still_there.is_some(), || {
        "refused delete removed the product".to_string()
    })
}

pub async fn test_duplicate_identity_is_rejected<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "duplicate_identity_is_rejected";

    let Market { store, farmer, .. } = market(SCENARIO, make_store()).await?;

    let mut same_email = buyer_registration(SCENARIO);
    same_email.email = farmer.email.clone();
    let result = store.create_user(same_email).await;
    ensure(SCENARIO, matches!(result, Err(StoreError::Duplicate(_))), || {
        format!("reused email returned {result:?}")
    })?;

    let mut same_aadhar = buyer_registration(SCENARIO);
    same_aadhar.aadhar_number = farmer.aadhar_number.clone();
    let result = store.create_user(same_aadhar).await;
    ensure(SCENARIO, matches!(result, Err(StoreError::Duplicate(_))), || {
        format!("reused aadhar number returned {result:?}")
    })?;

    let fresh = buyer_registration(SCENARIO);
    let taken = step(
        SCENARIO,
        "identity_taken",
        store
            .identity_taken(&farmer.email, &fresh.aadhar_number)
            .await,
    )?;
    ensure(SCENARIO, taken, || "registered email reported free".to_string())?;
    let taken = step(
        SCENARIO,
        "identity_taken",
        store
            .identity_taken(&fresh.email, &fresh.aadhar_number)
            .await,
    )?;
    ensure(SCENARIO, !taken, || "unused identity reported taken".to_string())
}

pub async fn test_order_queries_follow_parties<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "order_queries_follow_parties";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;
    let other_buyer = step(
        SCENARIO,
        "create_user",
        store.create_user(buyer_registration(SCENARIO)).await,
    )?;
    let product = step(
        SCENARIO,
        "create_product",
        store.create_product(new_product(&farmer, 30, rupees(45))).await,
    )?;

    let first = step(
        SCENARIO,
        "place_order",
        store.place_order(draft(&buyer, &product, 2)).await,
    )?;
    let second = step(
        SCENARIO,
        "place_order",
        store.place_order(draft(&buyer, &product, 3)).await,
    )?;
    let third = step(
        SCENARIO,
        "place_order",
        store.place_order(draft(&other_buyer, &product, 4)).await,
    )?;

    let bought: Vec<_> = step(SCENARIO, "buyer_orders", store.buyer_orders(buyer.id).await)?
        .into_iter()
        .map(|view| view.order.id)
        .collect();
    ensure(SCENARIO, bought == vec![second.order_id, first.order_id], || {
        format!("buyer orders should be newest first, got {bought:?}")
    })?;

    let sold: Vec<_> = step(SCENARIO, "farmer_orders", store.farmer_orders(farmer.id).await)?
        .into_iter()
        .map(|view| view.order.id)
        .collect();
    ensure(
        SCENARIO,
        sold == vec![third.order_id, second.order_id, first.order_id],
        || format!("farmer orders should hold every sale newest first, got {sold:?}"),
    )
}

pub async fn test_farmer_approval<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: MarketStore + 'static,
{
    const SCENARIO: &str = "farmer_approval";

    let Market {
        store,
        farmer,
        buyer,
    } = market(SCENARIO, make_store()).await?;

    let waiting = step(SCENARIO, "unapproved_farmers", store.unapproved_farmers().await)?;
    ensure(SCENARIO, waiting.iter().any(|user| user.id == farmer.id), || {
        "new farmer missing from the approval queue".to_string()
    })?;

    let refused = store.approve_farmer(buyer.id).await;
    ensure(
        SCENARIO,
        refused == Err(StoreError::NotFound(Resource::Farmer(buyer.id))),
        || format!("approving a buyer returned {refused:?}"),
    )?;

    step(SCENARIO, "approve_farmer", store.approve_farmer(farmer.id).await)?;
    let waiting = step(SCENARIO, "unapproved_farmers", store.unapproved_farmers().await)?;
    ensure(SCENARIO, waiting.iter().all(|user| user.id != farmer.id), || {
        "approved farmer still waiting for approval".to_string()
    })
}

fn entry_key(scenario: &str) -> String {
    format!("contract:{scenario}:{}", Uuid::now_v7())
}

pub async fn test_expiring_entries_round_trip<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: ExpiringStore + 'static,
{
    const SCENARIO: &str = "expiring_entries_round_trip";
    const TTL: Duration = Duration::from_secs(60);

    let store = make_store();
    let key = entry_key(SCENARIO);

    step(SCENARIO, "put", store.put(&key, "first".to_string(), TTL).await)?;
    step(SCENARIO, "put", store.put(&key, "second".to_string(), TTL).await)?;
    let value = step(SCENARIO, "get", store.get(&key).await)?;
    ensure(SCENARIO, value.as_deref() == Some("second"), || {
        format!("put should replace the value, got {value:?}")
    })?;

    let taken = step(SCENARIO, "take", store.take(&key).await)?;
    ensure(SCENARIO, taken.as_deref() == Some("second"), || {
        format!("take returned {taken:?}")
    })?;
    let again = step(SCENARIO, "take", store.take(&key).await)?;
    ensure(SCENARIO, again.is_none(), || {
        "an entry was taken twice".to_string()
    })?;

    step(SCENARIO, "put", store.put(&key, "third".to_string(), TTL).await)?;
    step(SCENARIO, "remove", store.remove(&key).await)?;
    step(SCENARIO, "remove", store.remove(&key).await)?;
    let value = step(SCENARIO, "get", store.get(&key).await)?;
    ensure(SCENARIO, value.is_none(), || {
        format!("removed entry still readable: {value:?}")
    })
}

pub async fn test_put_if_absent_keeps_live_entries<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: ExpiringStore + 'static,
{
    const SCENARIO: &str = "put_if_absent_keeps_live_entries";
    const TTL: Duration = Duration::from_secs(60);

    let store = make_store();
    let key = entry_key(SCENARIO);

    let written = step(
        SCENARIO,
        "put_if_absent",
        store.put_if_absent(&key, "newer".to_string(), TTL).await,
    )?;
    ensure(SCENARIO, written, || "an empty key was not written".to_string())?;

    let written = step(
        SCENARIO,
        "put_if_absent",
        store.put_if_absent(&key, "stale".to_string(), TTL).await,
    )?;
    ensure(SCENARIO, !written, || "a live entry was overwritten".to_string())?;
    let value = step(SCENARIO, "get", store.get(&key).await)?;
    ensure(SCENARIO, value.as_deref() == Some("newer"), || {
        format!("live entry changed to {value:?}")
    })?;

    let expiring = entry_key(SCENARIO);
    step(
        SCENARIO,
        "put",
        store
            .put(&expiring, "brief".to_string(), Duration::from_millis(200))
            .await,
    )?;
    tokio::time::sleep(Duration::from_millis(600)).await;
    let written = step(
        SCENARIO,
        "put_if_absent",
        store.put_if_absent(&expiring, "after".to_string(), TTL).await,
    )?;
    ensure(SCENARIO, written, || "an expired entry blocked the write".to_string())?;
    let value = step(SCENARIO, "get", store.get(&expiring).await)?;
    ensure(SCENARIO, value.as_deref() == Some("after"), || {
        format!("expected the replacement, got {value:?}")
    })
}

pub async fn test_expired_entries_are_gone<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: ExpiringStore + 'static,
{
    const SCENARIO: &str = "expired_entries_are_gone";

    let store = make_store();
    let short = entry_key(SCENARIO);
    let long = entry_key(SCENARIO);

    step(
        SCENARIO,
        "put",
        store
            .put(&short, "brief".to_string(), Duration::from_millis(200))
            .await,
    )?;
    step(
        SCENARIO,
        "put",
        store
            .put(&long, "lasting".to_string(), Duration::from_secs(60))
            .await,
    )?;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let value = step(SCENARIO, "get", store.get(&short).await)?;
    ensure(SCENARIO, value.is_none(), || {
        format!("expired entry still readable: {value:?}")
    })?;
    let taken = step(SCENARIO, "take", store.take(&short).await)?;
    ensure(SCENARIO, taken.is_none(), || {
        format!("expired entry could be taken: {taken:?}")
    })?;
    let value = step(SCENARIO, "get", store.get(&long).await)?;
    ensure(SCENARIO, value.as_deref() == Some("lasting"), || {
        format!("unexpired entry lost: {value:?}")
    })
}

pub async fn test_take_hands_out_an_entry_once<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: ExpiringStore + 'static,
{
    const SCENARIO: &str = "take_hands_out_an_entry_once";

    let store = Arc::new(make_store());
    let key = entry_key(SCENARIO);
    step(
        SCENARIO,
        "put",
        store
            .put(&key, "code".to_string(), Duration::from_secs(60))
            .await,
    )?;

    let takers = (0..6).map(|_| {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.take(&key).await })
    });
    let mut winners = 0;
    for outcome in join_all(takers).await {
        match outcome {
            Ok(Ok(Some(_))) => winners += 1,
            Ok(Ok(None)) => {}
            Ok(Err(error)) => return Err(ContractTestFailure::store_error(SCENARIO, "take", &error)),
            Err(error) => {
                return Err(ContractTestFailure::new(
                    SCENARIO,
                    format!("take task failed: {error}"),
                ))
            }
        }
    }
    ensure(SCENARIO, winners == 1, || {
        format!("expected exactly one taker, got {winners}")
    })
}

#[macro_export]
macro_rules! market_store_contract_tests {
    (suite = $suite:ident, make_store = $make_store:expr $(,)?) => {
        #[allow(non_snake_case)]
        mod $suite {
            use $crate::contract::{
                test_concurrent_orders_never_oversell, test_duplicate_identity_is_rejected,
                test_farmer_approval, test_insufficient_stock_writes_nothing,
                test_listings_show_only_verified_available, test_many_buyers_share_stock_exactly,
                test_missing_records_are_not_found, test_order_queries_follow_parties,
                test_ordered_products_cannot_be_deleted, test_place_order_decrements_stock,
                test_stale_rate_is_a_conflict, test_status_updates_are_persisted,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn place_order_decrements_stock_contract() {
                test_place_order_decrements_stock($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_orders_never_oversell_contract() {
                test_concurrent_orders_never_oversell($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn many_buyers_share_stock_exactly_contract() {
                test_many_buyers_share_stock_exactly($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn insufficient_stock_writes_nothing_contract() {
                test_insufficient_stock_writes_nothing($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn stale_rate_is_a_conflict_contract() {
                test_stale_rate_is_a_conflict($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn missing_records_are_not_found_contract() {
                test_missing_records_are_not_found($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn status_updates_are_persisted_contract() {
                test_status_updates_are_persisted($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn listings_show_only_verified_available_contract() {
                test_listings_show_only_verified_available($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn ordered_products_cannot_be_deleted_contract() {
                test_ordered_products_cannot_be_deleted($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn duplicate_identity_is_rejected_contract() {
                test_duplicate_identity_is_rejected($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn order_queries_follow_parties_contract() {
                test_order_queries_follow_parties($make_store)
                    .await
                    .expect("market store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn farmer_approval_contract() {
                test_farmer_approval($make_store)
                    .await
                    .expect("market store contract failed");
            }
        }
    };
}

pub use market_store_contract_tests;

#[macro_export]
macro_rules! expiring_store_contract_tests {
    (suite = $suite:ident, make_store = $make_store:expr $(,)?) => {
        #[allow(non_snake_case)]
        mod $suite {
            use $crate::contract::{
                test_expired_entries_are_gone, test_expiring_entries_round_trip,
                test_put_if_absent_keeps_live_entries, test_take_hands_out_an_entry_once,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn put_if_absent_keeps_live_entries_contract() {
                test_put_if_absent_keeps_live_entries($make_store)
                    .await
                    .expect("expiring store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn expiring_entries_round_trip_contract() {
                test_expiring_entries_round_trip($make_store)
                    .await
                    .expect("expiring store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn expired_entries_are_gone_contract() {
                test_expired_entries_are_gone($make_store)
                    .await
                    .expect("expiring store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn take_hands_out_an_entry_once_contract() {
                test_take_hands_out_an_entry_once($make_store)
                    .await
                    .expect("expiring store contract failed");
            }
        }
    };
}

pub use expiring_store_contract_tests;
