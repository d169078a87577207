use crate::state::AppState;
use axum::Router;

pub(crate) mod claims;
pub mod cookie;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
mod password;
pub mod services;
mod tokens;

pub use jwt::JwtKeys;
pub use services::{AuthService, AuthSettings};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
