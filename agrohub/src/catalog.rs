//! Product listings: creation by farmers, browsing, and admin verification.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::errors::{MarketError, MarketResult, Resource};
use crate::product::{Product, ProductListing, ProductRequest};
use crate::store::MarketStore;
use crate::types::{ProductId, ProductKind, UserId};
use crate::user::Principal;

/// Products offered by farmers.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn MarketStore>,
}

impl Catalog {
    /// Catalog over `store`.
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Lists a new product for `farmer_id`, who must be the caller.
    ///
    /// New products start available and unverified; they appear in public
    /// listings once an admin approves them.
    #[instrument(name = "catalog.create_product", skip(self, request))]
    pub async fn create_product(
        &self,
        principal: &Principal,
        farmer_id: UserId,
        request: ProductRequest,
    ) -> MarketResult<Product> {
        if principal.require_farmer()? != farmer_id {
            return Err(MarketError::Forbidden("cannot list products for another farmer"));
        }
        let farmer = self
            .store
            .user(farmer_id)
            .await?
            .ok_or(MarketError::NotFound(Resource::User(farmer_id)))?;

        let new_product = request.validate(farmer_id, farmer.phone_number)?;
        let product = self.store.create_product(new_product).await?;
        info!(
            product = %product.id,
            farmer = %farmer_id,
            "[catalog.create_product] product listed"
        );
        Ok(product)
    }

    /// Verified, available listings, newest first.
    ///
    /// A blank `kind` means every kind.
    pub async fn listings(&self, kind: Option<&str>) -> MarketResult<Vec<ProductListing>> {
        let kind = kind
            .filter(|kind| !kind.trim().is_empty())
            .map(|kind| ProductKind::try_new(kind.to_string()))
            .transpose()?;
        Ok(self.store.verified_listings(kind).await?)
    }

    /// Every product of one farmer, verified or not.
    pub async fn farmer_products(&self, farmer_id: UserId) -> MarketResult<Vec<ProductListing>> {
        Ok(self.store.farmer_products(farmer_id).await?)
    }

    /// One listing with its farmer's name.
    pub async fn product(&self, product_id: ProductId) -> MarketResult<ProductListing> {
        self.store
            .product(product_id)
            .await?
            .ok_or(MarketError::NotFound(Resource::Product(product_id)))
    }

    /// Hides the caller's product from listings.
    #[instrument(name = "catalog.mark_unavailable", skip(self))]
    pub async fn mark_unavailable(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> MarketResult<()> {
        self.require_owner(principal, product_id).await?;
        self.store.set_available(product_id, false).await?;
        info!(product = %product_id, "[catalog.mark_unavailable] product withdrawn");
        Ok(())
    }

    /// Deletes a listing. Listings with orders stay, as a `Conflict`.
    #[instrument(name = "catalog.delete_product", skip(self))]
    pub async fn delete_product(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> MarketResult<()> {
        self.require_owner(principal, product_id).await?;
        self.store.delete_product(product_id).await?;
        info!(product = %product_id, "[catalog.delete_product] product deleted");
        Ok(())
    }

    /// Admin verification; verified products show up in listings.
    #[instrument(name = "catalog.approve_product", skip(self))]
    pub async fn approve_product(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> MarketResult<()> {
        principal.require_admin()?;
        self.store.approve_product(product_id).await?;
        info!(product = %product_id, "[catalog.approve_product] product verified");
        Ok(())
    }

    async fn require_owner(&self, principal: &Principal, product_id: ProductId) -> MarketResult<()> {
        let farmer_id = principal.require_farmer()?;
        let listing = self.product(product_id).await?;
        if listing.product.farmer_id == farmer_id {
            Ok(())
        } else {
            Err(MarketError::Forbidden("product belongs to another farmer"))
        }
    }
}
