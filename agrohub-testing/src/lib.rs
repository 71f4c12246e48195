//! Test support for Agrohub backends and services.
//!
//! - [`contract`]: behavior every `MarketStore` and `ExpiringStore` must
//!   show, packaged as test-generating macros
//! - [`fixtures`]: builders for users, listings and orders, plus a code
//!   sender that records codes instead of mailing them
//!
//! ```ignore
//! use agrohub_testing::market_store_contract_tests;
//!
//! market_store_contract_tests! {
//!     suite = in_memory,
//!     make_store = agrohub_memory::InMemoryMarketStore::new,
//! }
//! ```

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod contract;
pub mod fixtures;

pub use fixtures::CapturingCodeSender;
