pub mod dto;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::app::Route;

pub fn routes() -> Vec<Route> {
    handlers::user_routes()
}
