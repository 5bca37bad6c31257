//! In-memory collaborators for unit and router tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use axum::extract::FromRef;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    auth::JwtKeys,
    cache::RenderCache,
    config::AppConfig,
    mail::Mailer,
    models::{
        Event, NewOrder, NewSocial, NewTicket, NewUser, Order, Social, Ticket, User,
        DEFAULT_COUNTRY_ID,
    },
    receipts::queue::{spawn_workers, JobReceiver, RenderContext, RenderQueue},
    state::AppState,
    storage::StorageClient,
    store::Store,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    events: Vec<Event>,
    tickets: Vec<Ticket>,
    socials: Vec<Social>,
    orders: Vec<Order>,
}

/// Mirrors the Postgres constraints the real store relies on.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_bulk: AtomicBool,
}

fn user_row(u: &NewUser) -> User {
    User {
        id: u.id,
        name: u.name.clone(),
        phone: u.phone.clone(),
        email: u.email.clone(),
        country_id: u.country_id,
        created_at: u.created_at,
    }
}

impl MemoryStore {
    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn fail_bulk_inserts(&self, fail: bool) {
        self.fail_bulk.store(fail, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.tables().users.len()
    }

    pub fn ticket_count(&self) -> usize {
        self.tables().tickets.len()
    }

    pub fn order_count(&self) -> usize {
        self.tables().orders.len()
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.tables().tickets.clone()
    }

    pub fn seed_event(&self, name: &str) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            name: name.to_string(),
            coordinates: Some("5.6037,-0.1870".into()),
            starts_at: Some(OffsetDateTime::now_utc()),
            ends_at: None,
            description: Some(format!("{} description", name)),
            default_ticket_quantity: None,
        };
        self.tables().events.push(event.clone());
        event
    }

    pub fn seed_user(&self, phone: &str, name: &str) -> User {
        let user = user_row(&NewUser::new(phone, name, None, DEFAULT_COUNTRY_ID));
        self.tables().users.push(user.clone());
        user
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, user: &NewUser) -> anyhow::Result<User> {
        let mut t = self.tables();
        if let Some(existing) = t.users.iter_mut().find(|u| u.phone == user.phone) {
            if existing.email.is_none() {
                existing.email = user.email.clone();
            }
            return Ok(existing.clone());
        }
        let row = user_row(user);
        t.users.push(row.clone());
        Ok(row)
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.tables().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
        Ok(self.tables().users.iter().find(|u| u.phone == phone).cloned())
    }

    async fn find_event(&self, id: Uuid) -> anyhow::Result<Option<Event>> {
        Ok(self.tables().events.iter().find(|e| e.id == id).cloned())
    }

    async fn find_event_by_name(&self, name: &str) -> anyhow::Result<Option<Event>> {
        Ok(self.tables().events.iter().find(|e| e.name == name).cloned())
    }

    async fn upsert_ticket(&self, ticket: &NewTicket) -> anyhow::Result<Ticket> {
        let mut t = self.tables();
        if let Some(existing) = t.tickets.iter().find(|x| {
            x.event_id == ticket.event_id && x.title == ticket.title && x.price == ticket.price
        }) {
            return Ok(existing.clone());
        }
        let row = Ticket {
            id: ticket.id,
            title: ticket.title.clone(),
            event_id: ticket.event_id,
            price: ticket.price,
            quantity: ticket.quantity,
            entries_allowed_per_ticket: ticket.entries_allowed_per_ticket,
        };
        t.tickets.push(row.clone());
        Ok(row)
    }

    async fn upsert_social(&self, social: &NewSocial) -> anyhow::Result<Social> {
        let mut t = self.tables();
        if let Some(existing) = t
            .socials
            .iter_mut()
            .find(|s| s.platform == social.platform && s.user_id == social.user_id)
        {
            existing.handle = social.handle.clone();
            return Ok(existing.clone());
        }
        let row = Social {
            id: Uuid::new_v4(),
            platform: social.platform.clone(),
            user_id: social.user_id,
            handle: social.handle.clone(),
        };
        t.socials.push(row.clone());
        Ok(row)
    }

    async fn insert_order(&self, order: &NewOrder) -> anyhow::Result<Order> {
        let mut t = self.tables();
        if t.orders.iter().any(|o| o.qr_code == order.qr_code) {
            bail!("duplicate qr_code {}", order.qr_code);
        }
        let row = Order::from(order.clone());
        t.orders.push(row.clone());
        Ok(row)
    }

    async fn bulk_insert(&self, users: &[NewUser], orders: &[NewOrder]) -> anyhow::Result<()> {
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(anyhow!("bulk insert users: connection reset"));
        }
        let mut t = self.tables();
        for (i, u) in users.iter().enumerate() {
            if t.users.iter().any(|x| x.phone == u.phone)
                || users[..i].iter().any(|x| x.phone == u.phone)
            {
                bail!("bulk insert users: duplicate phone {}", u.phone);
            }
        }
        for o in orders {
            let user_known = t.users.iter().any(|u| u.id == o.user_id)
                || users.iter().any(|u| u.id == o.user_id);
            if !user_known || !t.tickets.iter().any(|x| x.id == o.ticket_id) {
                bail!("bulk insert orders: foreign key violation on {}", o.id);
            }
        }
        t.users.extend(users.iter().map(user_row));
        t.orders.extend(orders.iter().cloned().map(Order::from));
        Ok(())
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Order>> {
        let mut rows = self.tables().orders.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_orders(&self) -> anyhow::Result<i64> {
        Ok(self.tables().orders.len() as i64)
    }

    async fn orders_for_event(&self, event_id: Uuid) -> anyhow::Result<Vec<Order>> {
        let t = self.tables();
        let mut rows: Vec<Order> = t
            .orders
            .iter()
            .filter(|o| {
                t.tickets
                    .iter()
                    .any(|x| x.id == o.ticket_id && x.event_id == Some(event_id))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
    failing: bool,
}

impl MemoryCache {
    /// A cache whose every call errors, as if Redis were unreachable.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl RenderCache for MemoryCache {
    async fn hash_set(&self, key: &str, fields: &[(&'static str, String)]) -> anyhow::Result<()> {
        if self.failing {
            bail!("redis HSET {}: connection refused", key);
        }
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_default();
        for (name, value) in fields {
            entry.insert((*name).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> anyhow::Result<Option<HashMap<String, String>>> {
        if self.failing {
            bail!("redis HGETALL {}: connection refused", key);
        }
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no such key {}", key))
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub subject: String,
    pub recipients: Vec<String>,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, subject: &str, recipients: &[String], html_body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(SentMail {
            subject: subject.to_string(),
            recipients: recipients.to_vec(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

/// `AppState` wired to in-memory collaborators, with handles kept for assertions.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub storage: Arc<MemoryStorage>,
    pub mailer: Arc<RecordingMailer>,
    receiver: Option<JobReceiver>,
}

impl Harness {
    pub fn new() -> Self {
        let config = Arc::new(AppConfig::for_tests());
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(MemoryCache::default());
        let storage = Arc::new(MemoryStorage::default());
        let mailer = Arc::new(RecordingMailer::default());
        let (queue, receiver) = RenderQueue::new(config.render_queue_capacity, config.render_job_retention);

        let state = AppState::from_parts(
            store.clone(),
            cache.clone(),
            storage.clone(),
            mailer.clone(),
            queue,
            config,
        );
        Self {
            state,
            store,
            cache,
            storage,
            mailer,
            receiver: Some(receiver),
        }
    }

    /// Start the render workers. Only the first call spawns anything.
    pub fn start_workers(&mut self) -> Vec<JoinHandle<()>> {
        let Some(receiver) = self.receiver.take() else {
            return Vec::new();
        };
        let ctx = RenderContext {
            cache: self.cache.clone(),
            storage: self.storage.clone(),
        };
        spawn_workers(receiver, ctx, self.state.config.render_workers)
    }

    /// Bearer header value accepted by the operator guard.
    pub fn operator_bearer(&self) -> String {
        let keys = JwtKeys::from_ref(&self.state);
        format!("Bearer {}", keys.sign("operator@tickets.test").unwrap())
    }
}
