//! Property tests for concurrent order placement.
//!
//! However many buyers race for one product, the kilograms sold plus the
//! kilograms left always equal the starting stock, and stock never goes
//! negative.

use std::sync::Arc;

use agrohub::errors::MarketError;
use agrohub::{OrderDesk, RetryPolicy};
use agrohub_testing::fixtures::order_request;
use futures::future::join_all;
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::common::{seeded, stock_of};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn concurrent_orders_never_oversell(
        stock in 0i64..60,
        quantities in prop::collection::vec(1i64..20, 1..16),
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .expect("runtime should build");

        rt.block_on(async {
            let seed = seeded(stock, Decimal::new(3_000, 2)).await;
            let desk = OrderDesk::new(Arc::new(seed.store.clone()))
                .with_retry_policy(RetryPolicy::default());

            let tasks = quantities.iter().map(|&quantity| {
                let desk = desk.clone();
                let buyer = seed.buyer.id;
                let product = seed.product.id;
                tokio::spawn(async move {
                    let result = desk.place_order(buyer, product, order_request(quantity)).await;
                    (quantity, result)
                })
            });

            let mut sold = 0;
            for joined in join_all(tasks).await {
                let (quantity, result) = joined.expect("order task should not panic");
                match result {
                    Ok(placed) => {
                        prop_assert_eq!(
                            placed.total_price.amount(),
                            Decimal::new(3_000, 2) * Decimal::from(quantity)
                        );
                        sold += quantity;
                    }
                    Err(MarketError::InsufficientStock { .. } | MarketError::ConflictRetry) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }

            let left = stock_of(&seed.store, seed.product.id).await;
            prop_assert!(left >= 0);
            prop_assert_eq!(sold + left, stock);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn sequential_orders_drain_exactly(quantities in prop::collection::vec(1i64..10, 1..20)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        rt.block_on(async {
            let stock: i64 = quantities.iter().sum();
            let seed = seeded(stock, Decimal::new(1_999, 2)).await;
            let desk = OrderDesk::new(Arc::new(seed.store.clone()));

            for &quantity in &quantities {
                desk.place_order(seed.buyer.id, seed.product.id, order_request(quantity))
                    .await
                    .expect("stock covers every order");
            }

            prop_assert_eq!(stock_of(&seed.store, seed.product.id).await, 0);
            let refused = desk
                .place_order(seed.buyer.id, seed.product.id, order_request(1))
                .await;
            prop_assert_eq!(
                refused,
                Err(MarketError::InsufficientStock {
                    requested: 1,
                    available: 0,
                })
            );
            Ok::<(), TestCaseError>(())
        })?;
    }
}
