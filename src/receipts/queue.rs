//! Background receipt rendering.
//!
//! Jobs are tracked in an in-process table and their ids travel over a bounded
//! channel to a pool of workers. Clients only ever poll; there is no push and
//! no cancellation. Workers read immutable render records, so re-enqueueing
//! the same QR-code id is always safe. Settled jobs are dropped from the
//! table once their retention window has passed; the rendered PDF itself
//! stays in object storage.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cache::RenderCache;
use crate::error::AppError;
use crate::orders::render::load_record;
use crate::receipts::pdf;
use crate::storage::StorageClient;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobPayload {
    /// One receipt.
    Single(String),
    /// One document with a page per QR-code id.
    Bulk(Vec<String>),
}

impl JobPayload {
    pub fn qr_codes(&self) -> &[String] {
        match self {
            JobPayload::Single(id) => std::slice::from_ref(id),
            JobPayload::Bulk(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    pub payload: JobPayload,
    /// Object-storage key of the rendered PDF once finished.
    pub result: Option<String>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the job finished or failed.
    #[serde(skip)]
    pub settled_at: Option<Instant>,
}

#[derive(Debug)]
pub enum JobPoll {
    Pending { is_started: bool },
    Finished(Bytes),
}

type JobTable = Arc<RwLock<HashMap<Uuid, JobRecord>>>;

/// Sending half, cloned into every request handler.
#[derive(Clone)]
pub struct RenderQueue {
    sender: mpsc::Sender<Uuid>,
    jobs: JobTable,
    retention: Duration,
}

/// Receiving half, handed to [`spawn_workers`] once at startup.
pub struct JobReceiver {
    receiver: mpsc::Receiver<Uuid>,
    jobs: JobTable,
}

#[derive(Clone)]
pub struct RenderContext {
    pub cache: Arc<dyn RenderCache>,
    pub storage: Arc<dyn StorageClient>,
}

impl RenderQueue {
    pub fn new(capacity: usize, retention: Duration) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        let jobs: JobTable = Arc::default();
        (
            Self {
                sender,
                jobs: jobs.clone(),
                retention,
            },
            JobReceiver { receiver, jobs },
        )
    }

    /// Record the job and hand it to the workers without waiting on them.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<Uuid, AppError> {
        if payload.qr_codes().is_empty() {
            return Err(AppError::Validation("at least one QR code is required".into()));
        }
        let id = Uuid::new_v4();
        {
            let mut table = self.jobs.write().await;
            evict_settled(&mut table, self.retention);
            table.insert(
                id,
                JobRecord {
                    id,
                    status: JobStatus::Queued,
                    payload,
                    result: None,
                    error: None,
                    created_at: OffsetDateTime::now_utc(),
                    settled_at: None,
                },
            );
        }

        if let Err(e) = self.sender.try_send(id) {
            self.jobs.write().await.remove(&id);
            return Err(AppError::Internal(format!("render queue rejected job: {}", e)));
        }
        debug!(job_id = %id, "render job queued");
        Ok(id)
    }

    pub async fn job(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Jobs currently tracked, settled or not.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Current state of a job. Bytes are only ever returned for finished jobs.
    pub async fn poll(&self, id: Uuid, storage: &dyn StorageClient) -> Result<JobPoll, AppError> {
        let job = self
            .job(id)
            .await
            .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

        match job.status {
            JobStatus::Queued => Ok(JobPoll::Pending { is_started: false }),
            JobStatus::Started => Ok(JobPoll::Pending { is_started: true }),
            JobStatus::Failed => Err(AppError::Internal(format!(
                "render job {} failed: {}",
                id,
                job.error.unwrap_or_default()
            ))),
            JobStatus::Finished => {
                let key = job
                    .result
                    .ok_or_else(|| AppError::Internal(format!("render job {} has no result", id)))?;
                let bytes = storage
                    .get_object(&key)
                    .await
                    .map_err(|e| AppError::Internal(format!("{:#}", e)))?;
                Ok(JobPoll::Finished(bytes))
            }
        }
    }
}

fn evict_settled(table: &mut HashMap<Uuid, JobRecord>, retention: Duration) {
    let before = table.len();
    table.retain(|_, job| match job.settled_at {
        Some(at) => at.elapsed() < retention,
        None => true,
    });
    let evicted = before - table.len();
    if evicted > 0 {
        debug!(evicted, "settled render jobs evicted");
    }
}

/// Start `count` workers sharing one receiver. They exit once every
/// [`RenderQueue`] has been dropped and the channel drains.
pub fn spawn_workers(jobs: JobReceiver, ctx: RenderContext, count: usize) -> Vec<JoinHandle<()>> {
    let JobReceiver { receiver, jobs } = jobs;
    let receiver = Arc::new(Mutex::new(receiver));
    (0..count.max(1))
        .map(|worker| {
            let receiver = receiver.clone();
            let jobs = jobs.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(id) = next else { break };
                    run_job(&ctx, &jobs, id).await;
                }
                debug!(worker, "render worker stopped");
            })
        })
        .collect()
}

#[instrument(skip(ctx, jobs))]
async fn run_job(ctx: &RenderContext, jobs: &JobTable, id: Uuid) {
    let payload = {
        let mut table = jobs.write().await;
        let Some(job) = table.get_mut(&id) else {
            warn!("job vanished before it started");
            return;
        };
        job.status = JobStatus::Started;
        job.payload.clone()
    };

    let outcome = render_payload(ctx, id, &payload).await;

    let mut table = jobs.write().await;
    let Some(job) = table.get_mut(&id) else { return };
    job.settled_at = Some(Instant::now());
    match outcome {
        Ok(key) => {
            info!(result = %key, "render job finished");
            job.status = JobStatus::Finished;
            job.result = Some(key);
        }
        Err(e) => {
            error!(error = ?e, "render job failed");
            job.status = JobStatus::Failed;
            job.error = Some(format!("{:#}", e));
        }
    }
}

async fn render_payload(ctx: &RenderContext, id: Uuid, payload: &JobPayload) -> anyhow::Result<String> {
    let mut records = Vec::with_capacity(payload.qr_codes().len());
    for qr_code in payload.qr_codes() {
        match load_record(ctx.cache.as_ref(), qr_code).await? {
            Some(record) => records.push(record),
            None => warn!(%qr_code, "render record not found; skipped"),
        }
    }
    anyhow::ensure!(!records.is_empty(), "no render records found");

    let document = tokio::task::spawn_blocking(move || pdf::render_receipts(&records))
        .await
        .context("pdf render task")?;

    let key = format!("receipts/{}.pdf", id);
    ctx.storage
        .put_object(&key, document, PDF_CONTENT_TYPE)
        .await?;
    Ok(key)
}
