pub mod assembler;
mod dto;
pub mod handlers;
pub mod render;
pub mod resolver;
mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
