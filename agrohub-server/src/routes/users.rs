use agrohub::order::OrderView;
use agrohub::product::{Product, ProductRequest};
use agrohub::user::User;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{user_id, Caller, ValidJson, ValidPath};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users/{id}", get(profile))
        .route("/v1/users/{id}/profile", put(update_profile))
        .route("/v1/users/{id}/products", post(create_product))
        .route("/v1/users/{id}/orders", get(orders))
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub phone_number: String,
}

async fn profile(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .marketplace
        .accounts
        .profile(&caller.principal, user_id(id)?)
        .await?;
    Ok(Json(user))
}

async fn update_profile(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
    ValidJson(update): ValidJson<ProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .marketplace
        .accounts
        .update_phone_number(&caller.principal, user_id(id)?, update.phone_number)
        .await?;
    Ok(Json(user))
}

async fn create_product(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
    ValidJson(request): ValidJson<ProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state
        .marketplace
        .catalog
        .create_product(&caller.principal, user_id(id)?, request)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn orders(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let orders = state
        .marketplace
        .orders
        .orders_of_user(&caller.principal, user_id(id)?)
        .await?;
    Ok(Json(orders))
}
