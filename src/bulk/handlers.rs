use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::Operator, error::AppError, state::AppState};

use super::importer::{import_orders, RowFailure};

const UPLOAD_FIELD: &str = "file";

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/bulk-orders/:event_id", post(upload_bulk_orders))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
}

#[derive(Debug, Serialize)]
pub struct BulkImportResponse {
    pub success: bool,
    pub message: String,
    pub total_rows: usize,
    pub processed: usize,
    pub processed_percentage: f64,
    pub failures: Vec<RowFailure>,
}

/// POST /bulk-orders/:event_id (multipart)
/// Field `file`: CSV sheet with one order per row.
#[instrument(skip(state, mp))]
pub async fn upload_bulk_orders(
    State(state): State<AppState>,
    Operator(operator): Operator,
    Path(event_id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<Json<BulkImportResponse>, AppError> {
    let mut sheet = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {}", e)))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Malformed upload: {}", e)))?;
            sheet = Some(data);
        }
    }
    let sheet = sheet
        .ok_or_else(|| AppError::Validation(format!("Missing required field: {}", UPLOAD_FIELD)))?;

    let report = import_orders(&state, event_id, &sheet).await?;
    let message = if report.failures.is_empty() {
        "Bulk orders imported successfully".to_string()
    } else {
        format!(
            "Bulk orders imported with {} failed row(s)",
            report.failures.len()
        )
    };
    Ok(Json(BulkImportResponse {
        success: true,
        message,
        total_rows: report.total_rows,
        processed: report.processed,
        processed_percentage: report.processed_percentage,
        failures: report.failures,
    }))
}
