//! Property tests for order pricing.
//!
//! An order is always priced at the stored rate times the ordered
//! kilograms, and exactly that many kilograms leave the stock.

use agrohub::errors::MarketError;
use agrohub::OrderDesk;
use agrohub_testing::fixtures::order_request;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::common::{seeded, stock_of};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn total_is_rate_times_quantity(
        stock in 1i64..500,
        rate_paise in 1i64..1_000_000,
        fraction in 0.0f64..1.0,
    ) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let quantity = ((stock as f64 * fraction) as i64).clamp(1, stock);
        let rate = Decimal::new(rate_paise, 2);

        runtime().block_on(async {
            let seed = seeded(stock, rate).await;
            let desk = OrderDesk::new(Arc::new(seed.store.clone()));

            let placed = desk
                .place_order(seed.buyer.id, seed.product.id, order_request(quantity))
                .await
                .expect("an order within stock should be placed");

            prop_assert_eq!(placed.total_price.amount(), rate * Decimal::from(quantity));
            prop_assert_eq!(stock_of(&seed.store, seed.product.id).await, stock - quantity);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn orders_beyond_stock_change_nothing(
        stock in 0i64..200,
        excess in 1i64..200,
    ) {
        runtime().block_on(async {
            let seed = seeded(stock, Decimal::new(4_250, 2)).await;
            let desk = OrderDesk::new(Arc::new(seed.store.clone()));

            let result = desk
                .place_order(seed.buyer.id, seed.product.id, order_request(stock + excess))
                .await;

            prop_assert_eq!(
                result,
                Err(MarketError::InsufficientStock {
                    requested: stock + excess,
                    available: stock,
                })
            );
            prop_assert_eq!(stock_of(&seed.store, seed.product.id).await, stock);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn non_positive_quantities_are_invalid(quantity in -1_000i64..=0) {
        runtime().block_on(async {
            let seed = seeded(50, Decimal::new(1_000, 2)).await;
            let desk = OrderDesk::new(Arc::new(seed.store.clone()));

            let result = desk
                .place_order(seed.buyer.id, seed.product.id, order_request(quantity))
                .await;

            prop_assert!(matches!(result, Err(MarketError::InvalidInput(_))));
            prop_assert_eq!(stock_of(&seed.store, seed.product.id).await, 50);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
