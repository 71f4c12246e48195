//! Property tests for order placement over the in-memory store.

#[path = "../common/mod.rs"]
mod common;

mod pricing;
mod stock_conservation;
