//! Shared setup: a farmer, a buyer and one product in a fresh in-memory store.

#![allow(dead_code)]

use agrohub::product::Product;
use agrohub::store::{ProductStore, UserStore};
use agrohub::types::ProductId;
use agrohub::user::User;
use agrohub_memory::InMemoryMarketStore;
use agrohub_testing::fixtures::{buyer_registration, farmer_registration, new_product};
use rust_decimal::Decimal;

pub struct Seeded {
    pub store: InMemoryMarketStore,
    pub farmer: User,
    pub buyer: User,
    pub product: Product,
}

pub async fn seeded(stock_kg: i64, rate_per_kg: Decimal) -> Seeded {
    let store = InMemoryMarketStore::new();
    let farmer = store
        .create_user(farmer_registration("seed farmer"))
        .await
        .expect("farmer should be created");
    let buyer = store
        .create_user(buyer_registration("seed buyer"))
        .await
        .expect("buyer should be created");
    let product = store
        .create_product(new_product(&farmer, stock_kg, rate_per_kg))
        .await
        .expect("product should be created");
    Seeded {
        store,
        farmer,
        buyer,
        product,
    }
}

pub async fn stock_of<S: ProductStore>(store: &S, product_id: ProductId) -> i64 {
    store
        .product(product_id)
        .await
        .expect("product read should succeed")
        .expect("product should exist")
        .product
        .quantity_kg
        .into_inner()
}
