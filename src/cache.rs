//! Rendering cache store.
//!
//! Render records live in Redis hashes keyed by QR-code id. A record is
//! written with a single `HSET`, so a reader observes either nothing or the
//! complete field set. No expiry is applied; records go away only when an
//! operator purges the cache.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

#[async_trait]
pub trait RenderCache: Send + Sync {
    async fn hash_set(&self, key: &str, fields: &[(&'static str, String)]) -> anyhow::Result<()>;
    /// `None` when nothing is stored under `key`.
    async fn hash_get_all(&self, key: &str) -> anyhow::Result<Option<HashMap<String, String>>>;
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url).context("create redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RenderCache for RedisCache {
    async fn hash_set(&self, key: &str, fields: &[(&'static str, String)]) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .with_context(|| format!("redis HSET {}", key))?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> anyhow::Result<Option<HashMap<String, String>>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(key)
            .await
            .with_context(|| format!("redis HGETALL {}", key))?;
        Ok((!fields.is_empty()).then_some(fields))
    }
}
