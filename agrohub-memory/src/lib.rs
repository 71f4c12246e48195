//! In-memory storage for the Agrohub marketplace
//!
//! This crate provides in-memory implementations of the `MarketStore` and
//! `ExpiringStore` traits from the agrohub crate, useful for tests and local
//! development where persistence is not required.
//!
//! All marketplace tables sit behind one lock, so every store operation is
//! atomic with respect to every other. In particular order placement checks
//! and decrements stock under a single write guard.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

mod expiring;

use std::collections::BTreeMap;
use std::sync::Arc;

use agrohub::errors::{Resource, StoreError, StoreResult};
use agrohub::order::{Order, OrderDraft, OrderStatus, OrderView, Party, PlacedOrder, ProductBrief};
use agrohub::product::{NewProduct, Product, ProductListing};
use agrohub::store::{AdminStore, MarketStore, OrderStore, ProductStore, UserStore};
use agrohub::types::{
    AadharNumber, AdminId, AdminUsername, Email, OrderId, PhoneNumber, ProductId, ProductKind,
    UserId,
};
use agrohub::user::{AdminAccount, Registration, Role, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

pub use expiring::InMemoryExpiringStore;

#[derive(Default)]
struct Tables {
    last_user_id: i64,
    last_admin_id: i64,
    last_product_id: i64,
    last_order_id: i64,
    users: BTreeMap<UserId, User>,
    admins: Vec<AdminAccount>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
}

fn next_id<T, E: std::fmt::Display>(
    counter: &mut i64,
    entity: &'static str,
    make: impl FnOnce(i64) -> Result<T, E>,
) -> StoreResult<T> {
    *counter += 1;
    make(*counter).map_err(|error| StoreError::Corrupt {
        entity,
        detail: error.to_string(),
    })
}

impl Tables {
    fn listing(&self, product: &Product) -> StoreResult<ProductListing> {
        let farmer = self.related_user(product.farmer_id, "product")?;
        Ok(ProductListing {
            product: product.clone(),
            farmer_first_name: farmer.first_name.clone(),
            farmer_last_name: farmer.last_name.clone(),
        })
    }

    fn view(&self, order: &Order) -> StoreResult<OrderView> {
        let product = self
            .products
            .get(&order.product_id)
            .ok_or_else(|| dangling("order", Resource::Product(order.product_id)))?;
        let buyer = self.related_user(order.buyer_id, "order")?;
        let farmer = self.related_user(product.farmer_id, "order")?;
        Ok(OrderView {
            order: order.clone(),
            product: ProductBrief {
                id: product.id,
                name: product.name.clone(),
                image: product.image.clone(),
            },
            buyer: party(buyer),
            farmer: party(farmer),
        })
    }

    fn related_user(&self, id: UserId, entity: &'static str) -> StoreResult<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| dangling(entity, Resource::User(id)))
    }

    fn views<'a>(&self, orders: impl Iterator<Item = &'a Order>) -> StoreResult<Vec<OrderView>> {
        let mut orders: Vec<&Order> = orders.collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        orders.into_iter().map(|order| self.view(order)).collect()
    }

    fn listings<'a>(
        &self,
        products: impl Iterator<Item = &'a Product>,
    ) -> StoreResult<Vec<ProductListing>> {
        let mut products: Vec<&Product> = products.collect();
        products.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        products
            .into_iter()
            .map(|product| self.listing(product))
            .collect()
    }

    fn product_mut(&mut self, id: ProductId) -> StoreResult<&mut Product> {
        self.products
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Resource::Product(id)))
    }
}

fn dangling(entity: &'static str, missing: Resource) -> StoreError {
    StoreError::Corrupt {
        entity,
        detail: format!("references missing {missing}"),
    }
}

fn party(user: &User) -> Party {
    Party {
        user_id: user.id,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        phone_number: user.phone_number.clone(),
    }
}

/// Thread-safe in-memory marketplace store
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryMarketStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryMarketStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryMarketStore {
    async fn create_user(&self, registration: Registration) -> StoreResult<User> {
        let mut tables = self.tables.write();
        let taken = tables.users.values().any(|user| {
            user.email == registration.email || user.aadhar_number == registration.aadhar_number
        });
        if taken {
            return Err(StoreError::Duplicate("email or aadhar number"));
        }

        let id = next_id(&mut tables.last_user_id, "user", UserId::try_new)?;
        let now = Utc::now();
        let user = User {
            id,
            first_name: registration.first_name,
            last_name: registration.last_name,
            email: registration.email,
            phone_number: registration.phone_number,
            aadhar_number: registration.aadhar_number,
            image: registration.image,
            role: registration.role,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        tables.users.insert(id, user.clone());
        debug!(user = %id, "[memory.create_user] user stored");
        Ok(user)
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &Email) -> StoreResult<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .find(|user| &user.email == email)
            .cloned())
    }

    async fn identity_taken(&self, email: &Email, aadhar: &AadharNumber) -> StoreResult<bool> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .any(|user| &user.email == email || &user.aadhar_number == aadhar))
    }

    async fn update_phone_number(&self, id: UserId, phone: PhoneNumber) -> StoreResult<User> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Resource::User(id)))?;
        user.phone_number = phone;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Resource::User(id)))?;
        user.last_login_at = Some(at);
        Ok(())
    }

    async fn unapproved_farmers(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.read();
        let mut farmers: Vec<User> = tables
            .users
            .values()
            .filter(|user| matches!(&user.role, Role::Farmer(profile) if !profile.approved))
            .cloned()
            .collect();
        farmers.sort_by_key(|user| (user.created_at, user.id));
        Ok(farmers)
    }

    async fn approve_farmer(&self, id: UserId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        match tables.users.get_mut(&id) {
            Some(User {
                role: Role::Farmer(profile),
                updated_at,
                ..
            }) => {
                profile.approved = true;
                *updated_at = Utc::now();
                Ok(())
            }
            _ => Err(StoreError::NotFound(Resource::Farmer(id))),
        }
    }
}

#[async_trait]
impl AdminStore for InMemoryMarketStore {
    async fn upsert_admin(
        &self,
        username: AdminUsername,
        password_digest: String,
    ) -> StoreResult<AdminAccount> {
        let mut tables = self.tables.write();
        if let Some(admin) = tables
            .admins
            .iter_mut()
            .find(|admin| admin.username == username)
        {
            admin.password_digest = password_digest;
            return Ok(admin.clone());
        }

        let id = next_id(&mut tables.last_admin_id, "admin", AdminId::try_new)?;
        let admin = AdminAccount {
            id,
            username,
            password_digest,
        };
        tables.admins.push(admin.clone());
        Ok(admin)
    }

    async fn admin_by_username(
        &self,
        username: &AdminUsername,
    ) -> StoreResult<Option<AdminAccount>> {
        let tables = self.tables.read();
        Ok(tables
            .admins
            .iter()
            .find(|admin| &admin.username == username)
            .cloned())
    }
}

#[async_trait]
impl ProductStore for InMemoryMarketStore {
    async fn create_product(&self, product: NewProduct) -> StoreResult<Product> {
        let mut tables = self.tables.write();
        let is_farmer = matches!(
            tables.users.get(&product.farmer_id),
            Some(User {
                role: Role::Farmer(_),
                ..
            })
        );
        if !is_farmer {
            return Err(StoreError::NotFound(Resource::Farmer(product.farmer_id)));
        }

        let id = next_id(&mut tables.last_product_id, "product", ProductId::try_new)?;
        let now = Utc::now();
        let product = Product {
            id,
            farmer_id: product.farmer_id,
            name: product.name,
            kind: product.kind,
            image: product.image,
            quantity_kg: product.quantity_kg,
            rate_per_kg: product.rate_per_kg,
            jari_size: product.jari_size,
            expected_delivery: product.expected_delivery,
            farmer_phone_number: product.farmer_phone_number,
            available: true,
            verified_by_admin: false,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn product(&self, id: ProductId) -> StoreResult<Option<ProductListing>> {
        let tables = self.tables.read();
        tables
            .products
            .get(&id)
            .map(|product| tables.listing(product))
            .transpose()
    }

    async fn verified_listings(
        &self,
        kind: Option<ProductKind>,
    ) -> StoreResult<Vec<ProductListing>> {
        let tables = self.tables.read();
        tables.listings(tables.products.values().filter(|product| {
            product.verified_by_admin
                && product.available
                && kind
                    .as_ref()
                    .map_or(true, |kind| kind.matches(product.kind.as_ref()))
        }))
    }

    async fn farmer_products(&self, farmer_id: UserId) -> StoreResult<Vec<ProductListing>> {
        let tables = self.tables.read();
        tables.listings(
            tables
                .products
                .values()
                .filter(|product| product.farmer_id == farmer_id),
        )
    }

    async fn set_available(&self, id: ProductId, available: bool) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let product = tables.product_mut(id)?;
        product.available = available;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn approve_product(&self, id: ProductId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let product = tables.product_mut(id)?;
        product.verified_by_admin = true;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if !tables.products.contains_key(&id) {
            return Err(StoreError::NotFound(Resource::Product(id)));
        }
        if tables.orders.values().any(|order| order.product_id == id) {
            return Err(StoreError::StillReferenced(Resource::Product(id)));
        }
        tables.products.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryMarketStore {
    async fn place_order(&self, draft: OrderDraft) -> StoreResult<PlacedOrder> {
        let mut tables = self.tables.write();
        let is_buyer = matches!(
            tables.users.get(&draft.buyer_id),
            Some(User {
                role: Role::Buyer(_),
                ..
            })
        );
        if !is_buyer {
            return Err(StoreError::NotFound(Resource::User(draft.buyer_id)));
        }

        let product = tables.product_mut(draft.product_id)?;
        let Some(remaining) = product.quantity_kg.after_sale(draft.quantity_kg) else {
            return Err(StoreError::InsufficientStock {
                requested: draft.quantity_kg.into_inner(),
                available: product.quantity_kg.into_inner(),
            });
        };
        if product.rate_per_kg != draft.rate_per_kg {
            return Err(StoreError::VersionConflict);
        }

        let now = Utc::now();
        product.quantity_kg = remaining;
        product.updated_at = now;

        let id = next_id(&mut tables.last_order_id, "order", OrderId::try_new)?;
        tables.orders.insert(
            id,
            Order {
                id,
                buyer_id: draft.buyer_id,
                product_id: draft.product_id,
                quantity_kg: draft.quantity_kg,
                total_price: draft.total_price,
                status: OrderStatus::Pending,
                delivery: draft.delivery,
                created_at: now,
                updated_at: now,
            },
        );
        debug!(
            order = %id,
            remaining_kg = %remaining,
            "[memory.place_order] stock decremented"
        );
        Ok(PlacedOrder {
            order_id: id,
            total_price: draft.total_price,
            created_at: now,
            updated_at: now,
        })
    }

    async fn order(&self, id: OrderId) -> StoreResult<Option<OrderView>> {
        let tables = self.tables.read();
        tables
            .orders
            .get(&id)
            .map(|order| tables.view(order))
            .transpose()
    }

    async fn buyer_orders(&self, buyer_id: UserId) -> StoreResult<Vec<OrderView>> {
        let tables = self.tables.read();
        tables.views(
            tables
                .orders
                .values()
                .filter(|order| order.buyer_id == buyer_id),
        )
    }

    async fn farmer_orders(&self, farmer_id: UserId) -> StoreResult<Vec<OrderView>> {
        let tables = self.tables.read();
        tables.views(tables.orders.values().filter(|order| {
            tables
                .products
                .get(&order.product_id)
                .is_some_and(|product| product.farmer_id == farmer_id)
        }))
    }

    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> StoreResult<Order> {
        let mut tables = self.tables.write();
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Resource::Order(id)))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrohub::order::DeliveryDetails;
    use agrohub::types::{
        AddressLine, CityName, FarmSize, ImageUrl, Money, PersonName, PinCode, ProductName,
        QuantityKg, StateName, StockKg,
    };
    use agrohub::user::{BuyerProfile, FarmerProfile, Location};
    use rust_decimal_macros::dec;

    fn location() -> Location {
        Location {
            address: AddressLine::try_new("Survey 41, Hadapsar".to_string()).unwrap(),
            city: CityName::try_new("Pune".to_string()).unwrap(),
            state: StateName::try_new("Maharashtra".to_string()).unwrap(),
            pin_code: PinCode::try_new("411028".to_string()).unwrap(),
        }
    }

    fn registration(email: &str, aadhar: &str, role: Role) -> Registration {
        Registration {
            first_name: PersonName::try_new("Asha".to_string()).unwrap(),
            last_name: PersonName::try_new("Patil".to_string()).unwrap(),
            email: Email::try_new(email.to_string()).unwrap(),
            phone_number: PhoneNumber::try_new("9822012345".to_string()).unwrap(),
            aadhar_number: AadharNumber::try_new(aadhar.to_string()).unwrap(),
            image: None,
            role,
        }
    }

    fn farmer_role() -> Role {
        Role::Farmer(FarmerProfile {
            farm_size: FarmSize::try_new(dec!(3)).unwrap(),
            location: location(),
            approved: false,
        })
    }

    fn buyer_role() -> Role {
        Role::Buyer(BuyerProfile {
            location: location(),
        })
    }

    fn new_product(farmer: &User, stock: i64) -> NewProduct {
        NewProduct {
            farmer_id: farmer.id,
            name: ProductName::try_new("Oyster mushrooms".to_string()).unwrap(),
            kind: ProductKind::try_new("Mushroom".to_string()).unwrap(),
            image: ImageUrl::try_new("https://img.agrohub.test/oyster.jpg".to_string()).unwrap(),
            quantity_kg: StockKg::try_new(stock).unwrap(),
            rate_per_kg: Money::new(dec!(50)).unwrap(),
            jari_size: None,
            expected_delivery: None,
            farmer_phone_number: farmer.phone_number.clone(),
        }
    }

    fn draft(buyer: &User, product: &Product, kilograms: i64) -> OrderDraft {
        let quantity = QuantityKg::try_new(kilograms).unwrap();
        OrderDraft {
            buyer_id: buyer.id,
            product_id: product.id,
            quantity_kg: quantity,
            rate_per_kg: product.rate_per_kg,
            total_price: product.rate_per_kg.times(quantity).unwrap(),
            delivery: DeliveryDetails {
                address: AddressLine::try_new("Flat 2, Kothrud".to_string()).unwrap(),
                city: CityName::try_new("Pune".to_string()).unwrap(),
                pin_code: PinCode::try_new("411038".to_string()).unwrap(),
                contact_phone: None,
                mode: None,
                expected_date: None,
            },
        }
    }

    async fn seeded(stock: i64) -> (InMemoryMarketStore, User, User, Product) {
        let store = InMemoryMarketStore::new();
        let farmer = store
            .create_user(registration("asha@farm.in", "111122223333", farmer_role()))
            .await
            .unwrap();
        let buyer = store
            .create_user(registration("ravi@shop.in", "444455556666", buyer_role()))
            .await
            .unwrap();
        let product = store
            .create_product(new_product(&farmer, stock))
            .await
            .unwrap();
        (store, farmer, buyer, product)
    }

    #[tokio::test]
    async fn test_clone_shares_tables() {
        let store = InMemoryMarketStore::new();
        #[allow(clippy::redundant_clone)]
        let other = store.clone();
        assert!(Arc::ptr_eq(&store.tables, &other.tables));
    }

    #[tokio::test]
    async fn test_place_order_decrements_stock() {
        let (store, _farmer, buyer, product) = seeded(100).await;

        let placed = store.place_order(draft(&buyer, &product, 30)).await.unwrap();

        assert_eq!(placed.total_price.amount(), dec!(1500));
        let listing = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(listing.product.quantity_kg.into_inner(), 70);
        let view = store.order(placed.order_id).await.unwrap().unwrap();
        assert_eq!(view.order.status, OrderStatus::Pending);
        assert_eq!(view.farmer.user_id, product.farmer_id);
    }

    #[tokio::test]
    async fn test_short_stock_writes_nothing() {
        let (store, _farmer, buyer, product) = seeded(5).await;

        let result = store.place_order(draft(&buyer, &product, 6)).await;

        assert_eq!(
            result,
            Err(StoreError::InsufficientStock {
                requested: 6,
                available: 5
            })
        );
        assert!(store.buyer_orders(buyer.id).await.unwrap().is_empty());
        let listing = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(listing.product.quantity_kg.into_inner(), 5);
    }

    #[tokio::test]
    async fn test_stale_rate_is_a_version_conflict() {
        let (store, _farmer, buyer, product) = seeded(10).await;
        let mut stale = draft(&buyer, &product, 1);
        stale.rate_per_kg = Money::new(dec!(45)).unwrap();

        assert_eq!(
            store.place_order(stale).await,
            Err(StoreError::VersionConflict)
        );
    }

    #[tokio::test]
    async fn test_delete_product_with_orders_is_refused() {
        let (store, _farmer, buyer, product) = seeded(10).await;
        store.place_order(draft(&buyer, &product, 1)).await.unwrap();

        assert_eq!(
            store.delete_product(product.id).await,
            Err(StoreError::StillReferenced(Resource::Product(product.id)))
        );
    }

    #[tokio::test]
    async fn test_duplicate_aadhar_is_rejected() {
        let (store, _farmer, _buyer, _product) = seeded(10).await;

        let result = store
            .create_user(registration("other@farm.in", "111122223333", buyer_role()))
            .await;

        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_buyers_cannot_list_products() {
        let (store, _farmer, buyer, _product) = seeded(10).await;

        let result = store.create_product(new_product(&buyer, 10)).await;

        assert_eq!(result, Err(StoreError::NotFound(Resource::Farmer(buyer.id))));
    }

    #[tokio::test]
    async fn test_approving_a_buyer_reports_missing_farmer() {
        let (store, farmer, buyer, _product) = seeded(10).await;

        assert_eq!(
            store.approve_farmer(buyer.id).await,
            Err(StoreError::NotFound(Resource::Farmer(buyer.id)))
        );
        assert_eq!(store.unapproved_farmers().await.unwrap().len(), 1);
        store.approve_farmer(farmer.id).await.unwrap();
        assert!(store.unapproved_farmers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_admin_replaces_digest() {
        let store = InMemoryMarketStore::new();
        let username = AdminUsername::try_new("root".to_string()).unwrap();

        let first = store
            .upsert_admin(username.clone(), "aa".to_string())
            .await
            .unwrap();
        let second = store
            .upsert_admin(username.clone(), "bb".to_string())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let stored = store.admin_by_username(&username).await.unwrap().unwrap();
        assert_eq!(stored.password_digest, "bb");
    }
}
