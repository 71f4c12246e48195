#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Agrohub
//!
//! Marketplace backend where farmers list produce by the kilogram and
//! buyers order it.
//!
//! The crate holds the domain model and the services; storage backends and
//! the HTTP server live in sibling crates. The pieces:
//!
//! - [`types`]: validated values (identifiers, [`Money`], [`QuantityKg`], ...)
//! - [`errors`]: [`MarketError`] for callers, [`StoreError`] for backends
//! - [`store`]: the traits every storage backend implements
//! - [`OrderDesk`]: order placement with an atomic, conditional stock
//!   decrement, plus order lookup and status updates
//! - [`Catalog`]: product listings
//! - [`Accounts`]: one-time-code signup and login, sessions, admin approval
//!
//! ## Placing an order
//!
//! ```ignore
//! let placed = marketplace
//!     .orders
//!     .place_order(buyer_id, product_id, request)
//!     .await?;
//! println!("order {} costs {}", placed.order_id, placed.total_price);
//! ```
//!
//! Two buyers racing for the last kilograms can never both win: the store
//! only decrements stock that is still there, and the loser gets
//! [`MarketError::InsufficientStock`].

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod errors;
pub mod order;
pub mod orders;
pub mod product;
pub mod retry;
pub mod store;
pub mod types;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

pub use accounts::{Accounts, SignedIn};
pub use auth::{
    CodeIssuer, CodeSender, PasswordDigester, SessionToken, Sessions, TracingCodeSender,
};
pub use catalog::Catalog;
pub use errors::{
    AuthFailure, MarketError, MarketResult, Operation, Resource, StoreError, StoreResult,
};
pub use order::{DeliveryDetails, Order, OrderRequest, OrderStatus, OrderView, PlacedOrder};
pub use orders::OrderDesk;
pub use product::{NewProduct, Product, ProductListing, ProductRequest};
pub use retry::RetryPolicy;
pub use store::{ExpiringStore, MarketStore};
pub use types::{Money, OrderId, ProductId, QuantityKg, StockKg, UserId};
pub use user::{Principal, Registration, Role, User};

/// Tunables for [`Marketplace::new`].
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Lifetime of a bearer session.
    pub session_ttl: Duration,
    /// Lifetime of a one-time verification code.
    pub code_ttl: Duration,
    /// Server-side secret mixed into admin password digests.
    pub admin_pepper: String,
    /// Retry policy for order placements that lose a race.
    pub retry: RetryPolicy,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            session_ttl: auth::SESSION_TTL,
            code_ttl: auth::CODE_TTL,
            admin_pepper: String::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// All services wired to one store.
#[derive(Clone)]
pub struct Marketplace {
    /// Signup, login, sessions and admin approval.
    pub accounts: Accounts,
    /// Product listings.
    pub catalog: Catalog,
    /// Order placement, lookup and status.
    pub orders: OrderDesk,
    store: Arc<dyn MarketStore>,
}

impl Marketplace {
    /// Wires every service to `store`, keeping codes and sessions in
    /// `entries` and delivering codes through `sender`.
    pub fn new(
        store: Arc<dyn MarketStore>,
        entries: Arc<dyn ExpiringStore>,
        sender: Arc<dyn CodeSender>,
        config: MarketplaceConfig,
    ) -> Self {
        let codes = CodeIssuer::new(entries.clone(), sender).with_ttl(config.code_ttl);
        let sessions = Sessions::new(entries, config.session_ttl);
        let digester = PasswordDigester::new(&config.admin_pepper);
        Self {
            accounts: Accounts::new(store.clone(), codes, sessions, digester),
            catalog: Catalog::new(store.clone()),
            orders: OrderDesk::new(store.clone()).with_retry_policy(config.retry),
            store,
        }
    }

    /// Checks that storage is reachable.
    pub async fn ping(&self) -> MarketResult<()> {
        Ok(self.store.ping().await?)
    }
}
