use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{error::AppError, users::dto::PublicUser};

/// The account resolved by `require_auth` for the current request.
pub struct AuthUser(pub PublicUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PublicUser>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized("authentication required".into()))
    }
}
