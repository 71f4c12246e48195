//! Route table. Everything except `/health` is nested under `/api`.

mod admin;
mod auth;
mod orders;
mod products;
mod users;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn api() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(admin::routes())
        .merge(users::routes())
        .merge(products::routes())
        .merge(orders::routes())
}

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.marketplace.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(error) => {
            tracing::error!(error = %error, "[http.health] storage is unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
