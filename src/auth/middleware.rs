use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::{error::AppError, state::AppState, users::dto::PublicUser};

fn unauthorized() -> AppError {
    AppError::Unauthorized("invalid token".into())
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Gate for protected routes: verifies the bearer token, resolves its subject
/// to a live account and stores the sanitized `PublicUser` in request extensions.
/// Usage: `.route_layer(middleware::from_fn_with_state(state, require_auth))`.
#[instrument(skip_all, fields(uri = %req.uri()))]
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            warn!("missing Authorization header");
            unauthorized()
        })?;

    let token = bearer_token(header).ok_or_else(|| {
        warn!("malformed Authorization header (expected Bearer token)");
        unauthorized()
    })?;

    let claims = state.keys.verify(token).map_err(|e| {
        warn!("token verification failed");
        e
    })?;

    // A valid token whose account has since been deleted is still rejected.
    let user: PublicUser = state.users.find_one(claims.sub).await.map_err(|e| {
        warn!(user_id = claims.sub, error = %e, "token subject could not be resolved");
        unauthorized()
    })?;

    debug!(user_id = user.id, "request authenticated");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
