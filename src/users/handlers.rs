use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::Operator, error::AppError, models::User, state::AppState};

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub data: User,
    pub message: String,
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/user/:id", get(get_user))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Operator(operator): Operator,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(UserResponse {
        success: true,
        data: user,
        message: "User retrieved successfully".into(),
    }))
}
