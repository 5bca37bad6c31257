use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::Operator,
    error::AppError,
    orders::render::load_record,
    receipts::{
        pdf,
        queue::{JobPayload, JobPoll, PDF_CONTENT_TYPE},
    },
    state::AppState,
};

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/bulk-qrcodes", post(enqueue_receipts))
        .route("/task_status/:task_id", get(task_status))
}

pub fn receipt_routes() -> Router<AppState> {
    Router::new()
        .route("/qr_code/:qr_code", get(get_receipt))
        .route("/pos-qrcode/:qr_code", get(get_receipt))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub qr_codes: Option<Vec<String>>,
    #[serde(default)]
    pub qr_code: Option<String>,
}

impl EnqueueRequest {
    fn into_payload(self) -> Result<JobPayload, AppError> {
        match (self.qr_codes, self.qr_code) {
            (Some(ids), _) => Ok(JobPayload::Bulk(ids)),
            (None, Some(id)) => Ok(JobPayload::Single(id)),
            (None, None) => Err(AppError::Validation("Missing required field: qr_codes".into())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub success: bool,
    pub task_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TaskPending {
    pub finished: bool,
    pub is_started: bool,
}

#[derive(Debug, Deserialize)]
pub struct UnlockQuery {
    pub token: Option<String>,
}

/// Bulk rendering skips the per-receipt unlock token, so it is an operator route.
#[instrument(skip(state, body))]
pub async fn enqueue_receipts(
    State(state): State<AppState>,
    Operator(operator): Operator,
    Json(body): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    let task_id = state.queue.enqueue(body.into_payload()?).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            success: true,
            task_id,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn task_status(
    State(state): State<AppState>,
    Operator(operator): Operator,
    Path(task_id): Path<Uuid>,
) -> Result<Response, AppError> {
    match state.queue.poll(task_id, state.storage.as_ref()).await? {
        JobPoll::Pending { is_started } => Ok(Json(TaskPending {
            finished: false,
            is_started,
        })
        .into_response()),
        JobPoll::Finished(bytes) => Ok(pdf_response(bytes, "bulk_receipt.pdf")),
    }
}

/// Render one receipt straight from the cache. The unlock token handed out
/// with the order must accompany the request.
#[instrument(skip(state, query))]
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(qr_code): Path<String>,
    Query(query): Query<UnlockQuery>,
) -> Result<Response, AppError> {
    let record = load_record(state.cache.as_ref(), &qr_code)
        .await
        .map_err(|e| AppError::Internal(format!("{:#}", e)))?
        .ok_or_else(|| AppError::NotFound("The requested ticket data was not found".into()))?;

    let supplied = query.token.unwrap_or_default();
    if !tokens_match(&supplied, &record.unlock_token) {
        return Err(AppError::Unauthorized("Invalid unlock token".into()));
    }

    let document = tokio::task::spawn_blocking(move || pdf::render_receipts(&[record]))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(pdf_response(document, &format!("{}_receipt.pdf", qr_code)))
}

fn pdf_response(bytes: Bytes, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, PDF_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Length-independent comparison so the token can't be guessed byte by byte.
fn tokens_match(supplied: &str, expected: &str) -> bool {
    let (a, b) = (supplied.as_bytes(), expected.as_bytes());
    if a.len() != b.len() || b.is_empty() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use crate::fakes::Harness;
    use crate::orders::render::{write_record, RenderRecord};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn record(qr_code: &str) -> RenderRecord {
        RenderRecord {
            qr_code: qr_code.into(),
            phone: "+1234567890".into(),
            name: "John Doe".into(),
            event_coordinates: "www.chaleapp.org".into(),
            event_name: "Kenkey Party".into(),
            start_date: None,
            end_date: None,
            description: "Contact customer service for details.".into(),
            reference: "ref-1".into(),
            unlock_token: "Secr3tToken".into(),
            ticket_id: "t-1".into(),
            ticket_type: "VIP".into(),
        }
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abd", "abc"));
        assert!(!tokens_match("ab", "abc"));
        assert!(!tokens_match("", ""));
    }

    #[test]
    fn enqueue_body_accepts_one_or_many() {
        let many: EnqueueRequest = serde_json::from_str(r#"{"qr_codes":["a","b"]}"#).unwrap();
        assert_eq!(many.into_payload().unwrap(), JobPayload::Bulk(vec!["a".into(), "b".into()]));
        let one: EnqueueRequest = serde_json::from_str(r#"{"qr_code":"a"}"#).unwrap();
        assert_eq!(one.into_payload().unwrap(), JobPayload::Single("a".into()));
        let none: EnqueueRequest = serde_json::from_str("{}").unwrap();
        assert!(none.into_payload().is_err());
    }

    #[tokio::test]
    async fn receipt_requires_matching_token() {
        let h = Harness::new();
        write_record(h.cache.as_ref(), &record("qrcode_ref-1-1")).await.unwrap();
        let app = build_app(h.state.clone());

        let denied = app
            .clone()
            .oneshot(
                Request::get("/api/v1/qr_code/qrcode_ref-1-1?token=wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let ok = app
            .oneshot(
                Request::get("/api/v1/pos-qrcode/qrcode_ref-1-1?token=Secr3tToken")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()[header::CONTENT_TYPE], PDF_CONTENT_TYPE);
        let body = to_bytes(ok.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn missing_receipt_is_404() {
        let h = Harness::new();
        let res = build_app(h.state.clone())
            .oneshot(
                Request::get("/api/v1/qr_code/qrcode_nope?token=x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn render_jobs_need_an_operator() {
        let h = Harness::new();
        write_record(h.cache.as_ref(), &record("qrcode_ref-1-1")).await.unwrap();
        let app = build_app(h.state.clone());

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/v1/bulk-qrcodes")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"qr_code":"qrcode_ref-1-1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.state.queue.len().await, 0);

        let res = app
            .oneshot(
                Request::get(format!("/api/v1/task_status/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bulk_job_is_polled_until_pdf() {
        let mut h = Harness::new();
        write_record(h.cache.as_ref(), &record("qrcode_a-1")).await.unwrap();
        write_record(h.cache.as_ref(), &record("qrcode_b-2")).await.unwrap();
        let app = build_app(h.state.clone());
        let bearer = h.operator_bearer();
        let status_request = |uri: &str| {
            Request::get(uri)
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap()
        };

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/v1/bulk-qrcodes")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, &bearer)
                    .body(Body::from(r#"{"qr_codes":["qrcode_a-1","qrcode_b-2"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(res.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["success"], true);
        let task_id = body["task_id"].as_str().unwrap().to_string();
        let status_uri = format!("/api/v1/task_status/{task_id}");

        // No workers yet: the job can only be pending.
        let res = app
            .clone()
            .oneshot(status_request(&status_uri))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let pending: serde_json::Value =
            serde_json::from_slice(&to_bytes(res.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(pending["finished"], false);
        assert_eq!(pending["is_started"], false);

        let _workers = h.start_workers();
        for _ in 0..200 {
            let res = app
                .clone()
                .oneshot(status_request(&status_uri))
                .await
                .unwrap();
            if res.headers()[header::CONTENT_TYPE] == PDF_CONTENT_TYPE {
                let pdf = to_bytes(res.into_body(), usize::MAX).await.unwrap();
                assert!(pdf.starts_with(b"%PDF-"));
                assert_eq!(std::str::from_utf8(&pdf).unwrap().matches("/Type /Page ").count(), 2);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bulk job never finished");
    }
}
