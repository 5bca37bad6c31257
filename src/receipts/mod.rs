pub mod handlers;
pub mod pdf;
pub mod queue;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::job_routes())
        .merge(handlers::receipt_routes())
}
