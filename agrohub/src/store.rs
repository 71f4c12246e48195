//! Storage seams.
//!
//! Services depend on these traits only. Backends live in their own crates
//! (`agrohub-memory`, `agrohub-postgres`) and every backend must pass the
//! shared contract suite in `agrohub-testing`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StoreResult;
use crate::order::{Order, OrderDraft, OrderStatus, OrderView, PlacedOrder};
use crate::product::{NewProduct, Product, ProductListing};
use crate::types::{
    AadharNumber, AdminUsername, Email, OrderId, PhoneNumber, ProductId, ProductKind, UserId,
};
use crate::user::{AdminAccount, Registration, User};

/// Farmer and buyer accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the user and its role record together.
    ///
    /// Fails with [`StoreError::Duplicate`](crate::StoreError::Duplicate)
    /// when the email or Aadhar number is already registered.
    async fn create_user(&self, registration: Registration) -> StoreResult<User>;

    /// Looks a user up by id.
    async fn user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Looks a user up by email.
    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>>;

    /// True when either identifier already belongs to some user.
    async fn identity_taken(&self, email: &Email, aadhar: &AadharNumber) -> StoreResult<bool>;

    /// Replaces the phone number and returns the updated user.
    async fn update_phone_number(&self, id: UserId, phone: PhoneNumber) -> StoreResult<User>;

    /// Stamps `last_login_at`.
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Farmers still waiting for admin approval, oldest first.
    async fn unapproved_farmers(&self) -> StoreResult<Vec<User>>;

    /// Marks a farmer approved; `NotFound` unless `id` is a farmer.
    async fn approve_farmer(&self, id: UserId) -> StoreResult<()>;
}

/// Administrator accounts.
#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Creates the admin or replaces its password digest.
    async fn upsert_admin(
        &self,
        username: AdminUsername,
        password_digest: String,
    ) -> StoreResult<AdminAccount>;

    /// Looks an admin up by username.
    async fn admin_by_username(&self, username: &AdminUsername)
        -> StoreResult<Option<AdminAccount>>;
}

/// Product listings.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts a new, unverified and available product.
    async fn create_product(&self, product: NewProduct) -> StoreResult<Product>;

    /// One product with its farmer's name.
    async fn product(&self, id: ProductId) -> StoreResult<Option<ProductListing>>;

    /// Admin-verified listings, newest first, optionally of one kind.
    async fn verified_listings(&self, kind: Option<ProductKind>)
        -> StoreResult<Vec<ProductListing>>;

    /// Every listing of one farmer, newest first, verified or not.
    async fn farmer_products(&self, farmer_id: UserId) -> StoreResult<Vec<ProductListing>>;

    /// Shows or hides the product in listings.
    async fn set_available(&self, id: ProductId, available: bool) -> StoreResult<()>;

    /// Marks the product admin-verified.
    async fn approve_product(&self, id: ProductId) -> StoreResult<()>;

    /// Fails with `StillReferenced` when orders point at the product.
    async fn delete_product(&self, id: ProductId) -> StoreResult<()>;
}

/// Orders and the stock they consume.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Decrements stock and inserts the order as one atomic unit.
    ///
    /// The decrement is conditional on the product still holding at least
    /// `draft.quantity_kg` and still being priced at `draft.rate_per_kg`.
    /// When it matches nothing the store reports `NotFound`,
    /// `InsufficientStock`, or `VersionConflict` (price changed) and writes
    /// nothing.
    async fn place_order(&self, draft: OrderDraft) -> StoreResult<PlacedOrder>;

    /// One order with its product and parties.
    async fn order(&self, id: OrderId) -> StoreResult<Option<OrderView>>;

    /// Orders placed by a buyer, newest first.
    async fn buyer_orders(&self, buyer_id: UserId) -> StoreResult<Vec<OrderView>>;

    /// Orders on any of a farmer's products, newest first.
    async fn farmer_orders(&self, farmer_id: UserId) -> StoreResult<Vec<OrderView>>;

    /// Sets the status and bumps `updated_at`.
    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> StoreResult<Order>;
}

/// Everything the marketplace services need from storage.
#[async_trait]
pub trait MarketStore: UserStore + AdminStore + ProductStore + OrderStore {
    /// Checks that the backend answers.
    async fn ping(&self) -> StoreResult<()>;
}

/// Key-value store whose entries disappear after a time to live.
///
/// Holds verification codes and sessions. Expired entries behave exactly
/// like missing ones.
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    /// Inserts or replaces `key`, visible for `ttl` from now.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Writes `key` only when no live entry holds it. Returns whether it wrote.
    async fn put_if_absent(&self, key: &str, value: String, ttl: Duration) -> StoreResult<bool>;

    /// The live value under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Removes and returns the entry. At most one concurrent caller gets it.
    async fn take(&self, key: &str) -> StoreResult<Option<String>>;

    /// Deletes `key`; missing keys are fine.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}
