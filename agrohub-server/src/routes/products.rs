use agrohub::order::{OrderRequest, PlacedOrder};
use agrohub::product::ProductListing;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{product_id, user_id, Caller, ValidJson, ValidPath};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/products", get(listings))
        .route("/v1/products/jari", get(jari_listings))
        .route("/v1/products/mushroom", get(mushroom_listings))
        .route("/v1/products/farmer/{id}", get(farmer_products))
        .route("/v1/products/{id}", get(product).delete(delete_product))
        .route("/v1/products/{id}/mark-unavailable", put(mark_unavailable))
        .route("/v1/products/{id}/order", post(place_order))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub kind: Option<String>,
}

async fn listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Vec<ProductListing>>, ApiError> {
    let listings = state
        .marketplace
        .catalog
        .listings(query.kind.as_deref())
        .await?;
    Ok(Json(listings))
}

async fn jari_listings(State(state): State<AppState>) -> Result<Json<Vec<ProductListing>>, ApiError> {
    Ok(Json(state.marketplace.catalog.listings(Some("jari")).await?))
}

async fn mushroom_listings(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductListing>>, ApiError> {
    Ok(Json(state.marketplace.catalog.listings(Some("mushroom")).await?))
}

async fn farmer_products(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Vec<ProductListing>>, ApiError> {
    let products = state
        .marketplace
        .catalog
        .farmer_products(user_id(id)?)
        .await?;
    Ok(Json(products))
}

async fn product(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<ProductListing>, ApiError> {
    Ok(Json(state.marketplace.catalog.product(product_id(id)?).await?))
}

async fn mark_unavailable(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .marketplace
        .catalog
        .mark_unavailable(&caller.principal, product_id(id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_product(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .marketplace
        .catalog
        .delete_product(&caller.principal, product_id(id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Buyers only. The price is computed from the stored rate.
async fn place_order(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
    ValidJson(request): ValidJson<OrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let buyer_id = caller.principal.require_buyer()?;
    let placed = state
        .marketplace
        .orders
        .place_order(buyer_id, product_id(id)?, request)
        .await?;
    Ok((StatusCode::CREATED, Json(placed)))
}
