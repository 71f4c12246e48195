use agrohub::order::{Order, OrderView};
use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{order_id, Caller, ValidJson, ValidPath};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{id}", get(order))
        .route("/v1/orders/{id}/status", put(update_status))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

async fn order(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<OrderView>, ApiError> {
    let view = state
        .marketplace
        .orders
        .order_as(&caller.principal, order_id(id)?)
        .await?;
    Ok(Json(view))
}

async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
    ValidJson(update): ValidJson<StatusUpdate>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .marketplace
        .orders
        .update_status_as(&caller.principal, order_id(id)?, &update.status)
        .await?;
    Ok(Json(order))
}
