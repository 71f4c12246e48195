use agrohub::accounts::{CompleteLoginRequest, CompleteSignupRequest, LoginRequest, SignupRequest};
use agrohub::auth::SessionToken;
use agrohub::user::{Principal, User};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ApiError;
use crate::extract::{Caller, ValidJson};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(start_signup))
        .route("/auth/complete-signup", post(complete_signup))
        .route("/auth/login", post(start_login))
        .route("/auth/complete-login", post(complete_login))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Serialize)]
pub struct CodeSent {
    pub message: &'static str,
}

const CODE_SENT: CodeSent = CodeSent {
    message: "verification code sent",
};

#[derive(Debug, Serialize)]
pub struct Session {
    pub user: User,
    pub token: SessionToken,
    pub principal: Principal,
}

async fn start_signup(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<SignupRequest>,
) -> Result<(StatusCode, Json<CodeSent>), ApiError> {
    state.marketplace.accounts.start_signup(request).await?;
    Ok((StatusCode::ACCEPTED, Json(CODE_SENT)))
}

async fn complete_signup(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<CompleteSignupRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let (user, signed_in) = state.marketplace.accounts.complete_signup(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(Session {
            user,
            token: signed_in.token,
            principal: signed_in.principal,
        }),
    ))
}

async fn start_login(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<(StatusCode, Json<CodeSent>), ApiError> {
    state.marketplace.accounts.start_login(request).await?;
    Ok((StatusCode::ACCEPTED, Json(CODE_SENT)))
}

async fn complete_login(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<CompleteLoginRequest>,
) -> Result<Json<Session>, ApiError> {
    let (user, signed_in) = state.marketplace.accounts.complete_login(request).await?;
    Ok(Json(Session {
        user,
        token: signed_in.token,
        principal: signed_in.principal,
    }))
}

async fn logout(State(state): State<AppState>, caller: Caller) -> Result<StatusCode, ApiError> {
    state.marketplace.accounts.logout(caller.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
