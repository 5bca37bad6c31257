pub mod handlers;
pub mod importer;
pub mod sheet;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::write_routes()
}
