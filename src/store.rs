use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Event, NewOrder, NewSocial, NewTicket, NewUser, Order, Social, Ticket, User};

/// Relational store the order pipeline runs against.
///
/// Every `upsert_*` is a single conditional insert keyed by the entity's
/// natural key, so concurrent callers with the same key converge on one row.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert the user unless one with the same phone exists; returns the stored row.
    async fn upsert_user(&self, user: &NewUser) -> anyhow::Result<User>;
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>>;

    async fn find_event(&self, id: Uuid) -> anyhow::Result<Option<Event>>;
    async fn find_event_by_name(&self, name: &str) -> anyhow::Result<Option<Event>>;

    /// Keyed by `(event_id, title, price)`, a missing event counting as one key value.
    async fn upsert_ticket(&self, ticket: &NewTicket) -> anyhow::Result<Ticket>;

    /// Keyed by `(platform, user_id)`; an existing row takes the new handle.
    async fn upsert_social(&self, social: &NewSocial) -> anyhow::Result<Social>;

    async fn insert_order(&self, order: &NewOrder) -> anyhow::Result<Order>;

    /// Insert all users then all orders in one transaction.
    async fn bulk_insert(&self, users: &[NewUser], orders: &[NewOrder]) -> anyhow::Result<()>;

    async fn list_orders(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Order>>;
    async fn count_orders(&self) -> anyhow::Result<i64>;
    async fn orders_for_event(&self, event_id: Uuid) -> anyhow::Result<Vec<Order>>;
}
