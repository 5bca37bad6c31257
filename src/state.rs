use crate::cache::{RedisCache, RenderCache};
use crate::config::AppConfig;
use crate::db::{self, PgStore};
use crate::mail::{DisabledMailer, Mailer, SmtpMailer};
use crate::receipts::queue::{JobReceiver, RenderContext, RenderQueue};
use crate::storage::{S3Storage, StorageClient};
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn RenderCache>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub queue: RenderQueue,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connect every collaborator. The returned receiver feeds the render workers.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, JobReceiver)> {
        let config = Arc::new(config);

        let store = PgStore::new(db::connect(&config.database_url).await?);
        if let Err(e) = store.migrate().await {
            tracing::warn!(error = ?e, "migration failed; continuing");
        }

        let cache = Arc::new(RedisCache::connect(&config.redis_url).await?) as Arc<dyn RenderCache>;

        let storage = Arc::new(S3Storage::connect(&config).await) as Arc<dyn StorageClient>;

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => {
                tracing::info!("SMTP_HOST not set; ticket emails disabled");
                Arc::new(DisabledMailer)
            }
        };

        let (queue, receiver) = RenderQueue::new(config.render_queue_capacity, config.render_job_retention);

        Ok((
            Self::from_parts(Arc::new(store), cache, storage, mailer, queue, config),
            receiver,
        ))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        cache: Arc<dyn RenderCache>,
        storage: Arc<dyn StorageClient>,
        mailer: Arc<dyn Mailer>,
        queue: RenderQueue,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            cache,
            storage,
            mailer,
            queue,
            config,
        }
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext {
            cache: self.cache.clone(),
            storage: self.storage.clone(),
        }
    }
}
