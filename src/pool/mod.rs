mod dto;
pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::PoolService;

pub fn router() -> Router<AppState> {
    handlers::pool_routes()
}
