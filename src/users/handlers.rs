use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json,
};
use tracing::instrument;

use crate::{
    app::{Access, Route},
    error::{AppError, JsonBody},
    state::AppState,
    users::dto::{
        CreateUserRequest, Credentials, UpdateUserRequest, UserListResponse, UserResponse,
        ValidateResponse,
    },
};

pub fn user_routes() -> Vec<Route> {
    vec![
        Route::new("/users", Access::Public, post(create_user)),
        Route::new("/users", Access::Protected, get(list_users)),
        Route::new("/users/validate", Access::Public, post(validate_credentials)),
        Route::new("/users/username/:username", Access::Protected, get(get_by_username)),
        Route::new("/users/email/:email", Access::Protected, get(get_by_email)),
        Route::new("/users/:id", Access::Protected, get(get_user)),
        Route::new("/users/:id", Access::Protected, put(update_user)),
        Route::new("/users/:id", Access::Protected, delete(delete_user)),
    ]
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest("invalid user id".into()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state.users.create(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully",
            user,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UserListResponse>, AppError> {
    let users = state.users.find_all().await?;
    Ok(Json(UserListResponse {
        message: "Users found",
        count: users.len(),
        users,
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.find_one(parse_id(&id)?).await?;
    Ok(Json(UserResponse {
        message: "User found",
        user,
    }))
}

#[instrument(skip(state))]
pub async fn get_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.find_by_username(&username).await?;
    Ok(Json(UserResponse {
        message: "User found",
        user,
    }))
}

#[instrument(skip(state))]
pub async fn get_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.find_by_email(&email).await?;
    Ok(Json(UserResponse {
        message: "User found",
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.update(parse_id(&id)?, payload).await?;
    Ok(Json(UserResponse {
        message: "User updated successfully",
        user,
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.users.remove(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bad credentials are a normal 200 answer here, with `user: null`.
#[instrument(skip(state, payload))]
pub async fn validate_credentials(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<Credentials>,
) -> Result<Json<ValidateResponse>, AppError> {
    let user = state
        .users
        .validate_credentials(&payload.username, &payload.password)
        .await?;
    let message = if user.is_some() {
        "Valid credentials"
    } else {
        "Invalid credentials"
    };
    Ok(Json(ValidateResponse { message, user }))
}
