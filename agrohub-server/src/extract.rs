//! Request extractors that fail with [`ApiError`] bodies.

use agrohub::auth::SessionToken;
use agrohub::errors::{AuthFailure, MarketError};
use agrohub::types::{OrderId, ProductId, UserId};
use agrohub::user::Principal;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::AppState;

/// The authenticated caller of a request.
///
/// Reads `Authorization: Bearer <token>` and resolves the session.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub principal: Principal,
    pub token: SessionToken,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(MarketError::Unauthorized(AuthFailure::MissingCredentials))?;
        let token: SessionToken = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(MarketError::Unauthorized(AuthFailure::InvalidSession))?
            .parse()?;

        let principal = state.marketplace.accounts.authenticate(token).await?;
        Ok(Self { principal, token })
    }
}

/// `Json` whose rejections are reported as invalid input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| MarketError::InvalidInput(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Path` whose rejections are reported as invalid input.
#[derive(Debug, Clone, Copy)]
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| MarketError::InvalidInput(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub fn user_id(raw: i64) -> Result<UserId, ApiError> {
    Ok(UserId::try_new(raw).map_err(MarketError::from)?)
}

pub fn product_id(raw: i64) -> Result<ProductId, ApiError> {
    Ok(ProductId::try_new(raw).map_err(MarketError::from)?)
}

pub fn order_id(raw: i64) -> Result<OrderId, ApiError> {
    Ok(OrderId::try_new(raw).map_err(MarketError::from)?)
}
