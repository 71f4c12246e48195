use agrohub::accounts::{AdminLoginRequest, SignedIn};
use agrohub::user::User;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::error::ApiError;
use crate::extract::{product_id, user_id, Caller, ValidJson, ValidPath};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/login", post(login))
        .route("/admin/v1/dashboard", get(dashboard))
        .route("/admin/v1/users/{id}", get(user))
        .route("/admin/v1/users/{id}/approve", put(approve_farmer))
        .route("/admin/v1/products/{id}/approve", put(approve_product))
}

async fn login(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<AdminLoginRequest>,
) -> Result<Json<SignedIn>, ApiError> {
    Ok(Json(state.marketplace.accounts.admin_login(request).await?))
}

/// Farmers waiting for approval.
async fn dashboard(State(state): State<AppState>, caller: Caller) -> Result<Json<Vec<User>>, ApiError> {
    let farmers = state
        .marketplace
        .accounts
        .unapproved_farmers(&caller.principal)
        .await?;
    Ok(Json(farmers))
}

async fn user(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<User>, ApiError> {
    caller.principal.require_admin()?;
    let user = state
        .marketplace
        .accounts
        .profile(&caller.principal, user_id(id)?)
        .await?;
    Ok(Json(user))
}

async fn approve_farmer(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .marketplace
        .accounts
        .approve_farmer(&caller.principal, user_id(id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve_product(
    State(state): State<AppState>,
    caller: Caller,
    ValidPath(id): ValidPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .marketplace
        .catalog
        .approve_product(&caller.principal, product_id(id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
