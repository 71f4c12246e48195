//! Order placement and order lifecycle.
//!
//! Placement is the one operation with an inventory invariant. The service
//! reads the product, validates the request against it, prices the order,
//! and hands the store an [`OrderDraft`] that the store commits with a
//! conditional stock decrement. A product that changed in between makes the
//! store report a conflict; the whole read-price-commit cycle is then
//! retried under the configured [`RetryPolicy`].

use std::sync::Arc;

use tracing::{info, instrument};

use crate::errors::{MarketError, MarketResult, Resource};
use crate::order::{
    DeliveryDetails, Order, OrderDraft, OrderRequest, OrderStatus, OrderView, PlacedOrder,
};
use crate::retry::RetryPolicy;
use crate::store::MarketStore;
use crate::types::{OrderId, ProductId, QuantityKg, UserId};
use crate::user::{Principal, Role};

/// Places orders and tracks them afterwards.
#[derive(Clone)]
pub struct OrderDesk {
    store: Arc<dyn MarketStore>,
    retry: RetryPolicy,
}

impl OrderDesk {
    /// Desk over `store` with the default [`RetryPolicy`].
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy used when a placement loses a race.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates `request` and places it for `buyer_id`.
    ///
    /// Nothing is read or written when validation fails.
    #[instrument(
        name = "orders.place_order",
        skip(self, request),
        fields(buyer = %buyer_id, product = %product_id)
    )]
    pub async fn place_order(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        request: OrderRequest,
    ) -> MarketResult<PlacedOrder> {
        let (quantity, delivery) = request.validate()?;
        self.place_validated(buyer_id, product_id, quantity, delivery)
            .await
    }

    /// Places an order whose fields were already validated.
    pub async fn place_validated(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        quantity: QuantityKg,
        delivery: DeliveryDetails,
    ) -> MarketResult<PlacedOrder> {
        let delivery = &delivery;
        let placed = self
            .retry
            .run("place_order", move || {
                let delivery = delivery.clone();
                async move {
                    self.attempt_placement(buyer_id, product_id, quantity, delivery)
                        .await
                }
            })
            .await?;

        info!(
            order = %placed.order_id,
            quantity_kg = %quantity,
            total_price = %placed.total_price,
            "[orders.place_order] order placed"
        );
        Ok(placed)
    }

    async fn attempt_placement(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        quantity: QuantityKg,
        delivery: DeliveryDetails,
    ) -> MarketResult<PlacedOrder> {
        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or(MarketError::NotFound(Resource::Product(product_id)))?
            .product;

        if !product.quantity_kg.covers(quantity) {
            return Err(MarketError::InsufficientStock {
                requested: quantity.into_inner(),
                available: product.quantity_kg.into_inner(),
            });
        }

        let total_price = product.rate_per_kg.times(quantity)?;
        let draft = OrderDraft {
            buyer_id,
            product_id,
            quantity_kg: quantity,
            rate_per_kg: product.rate_per_kg,
            total_price,
            delivery,
        };
        Ok(self.store.place_order(draft).await?)
    }

    /// Sets the status of an order.
    ///
    /// The status text is checked before storage is touched, so an unknown
    /// status leaves the order unchanged.
    #[instrument(name = "orders.update_status", skip(self))]
    pub async fn update_status(&self, order_id: OrderId, status: &str) -> MarketResult<Order> {
        let status: OrderStatus = status.parse()?;
        let order = self.store.update_order_status(order_id, status).await?;
        info!(
            order = %order_id,
            status = %status,
            "[orders.update_status] order status changed"
        );
        Ok(order)
    }

    /// Like [`Self::update_status`], allowed for admins and both parties.
    pub async fn update_status_as(
        &self,
        principal: &Principal,
        order_id: OrderId,
        status: &str,
    ) -> MarketResult<Order> {
        let _: OrderStatus = status.parse()?;
        if !principal.is_admin() {
            self.order_as(principal, order_id).await?;
        }
        self.update_status(order_id, status).await
    }

    /// Any order, without access checks.
    pub async fn order(&self, order_id: OrderId) -> MarketResult<OrderView> {
        self.store
            .order(order_id)
            .await?
            .ok_or(MarketError::NotFound(Resource::Order(order_id)))
    }

    /// Fetches an order visible to `principal`: admins see all, users only
    /// orders they bought or sold.
    pub async fn order_as(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> MarketResult<OrderView> {
        let view = self.order(order_id).await?;
        match principal.user_id() {
            None => Ok(view),
            Some(user) if view.involves(user) => Ok(view),
            Some(_) => Err(MarketError::Forbidden("not a party to this order")),
        }
    }

    /// Orders of a user: sales for farmers, purchases for buyers.
    #[instrument(name = "orders.orders_of_user", skip(self))]
    pub async fn orders_of_user(
        &self,
        principal: &Principal,
        user_id: UserId,
    ) -> MarketResult<Vec<OrderView>> {
        if !principal.may_access_user(user_id) {
            return Err(MarketError::Forbidden("cannot list another user's orders"));
        }
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or(MarketError::NotFound(Resource::User(user_id)))?;

        let orders = match user.role {
            Role::Farmer(_) => self.store.farmer_orders(user_id).await?,
            Role::Buyer(_) => self.store.buyer_orders(user_id).await?,
        };
        Ok(orders)
    }
}
