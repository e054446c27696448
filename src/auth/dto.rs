use serde::Serialize;

use crate::users::dto::PublicUser;

pub use crate::users::dto::Credentials as LoginRequest;

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: TokenUser,
}

/// Identity echoed back with a token.
#[derive(Debug, Serialize, PartialEq)]
pub struct TokenUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
}

impl From<PublicUser> for TokenUser {
    fn from(user: PublicUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
        }
    }
}
