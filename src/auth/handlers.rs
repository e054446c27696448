use axum::{
    extract::State,
    routing::{get, post},
    Json,
};
use tracing::instrument;

use crate::{
    app::{Access, Route},
    auth::{
        dto::{LoginRequest, LoginResponse},
        extractors::AuthUser,
        services,
    },
    error::{AppError, JsonBody},
    state::AppState,
    users::dto::PublicUser,
};

pub fn auth_routes() -> Vec<Route> {
    vec![
        Route::new("/login", Access::Public, post(login)),
        Route::new("/me", Access::Protected, get(get_me)),
    ]
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let res = services::login(&state.users, &state.keys, payload).await?;
    Ok(Json(res))
}

pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user)
}
