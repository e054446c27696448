use crate::app::Route;

mod claims;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod services;

pub use claims::Claims;

pub fn routes() -> Vec<Route> {
    handlers::auth_routes()
}
