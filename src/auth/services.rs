use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse},
        jwt::JwtKeys,
    },
    error::AppError,
    users::services::UserService,
};

/// Checks credentials and signs an access token. Every failure is a 401;
/// the caller never learns whether the username or the password was wrong.
#[instrument(skip(users, keys, req), fields(username = %req.username))]
pub async fn login(
    users: &UserService,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<LoginResponse, AppError> {
    let user = match users.validate_credentials(&req.username, &req.password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("login with invalid credentials");
            return Err(AppError::Unauthorized("invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "credential check failed");
            return Err(AppError::Unauthorized("login failed".into()));
        }
    };

    let issued = keys.issue(&user).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        AppError::Unauthorized("login failed".into())
    })?;

    info!(user_id = user.id, "user logged in");
    Ok(LoginResponse {
        access_token: issued.access_token,
        token_type: issued.token_type,
        expires_in: issued.expires_in,
        user: user.into(),
    })
}
