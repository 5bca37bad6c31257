//! Resolve-or-create for the entities an order hangs off.
//!
//! Each resolution is a single upsert on the entity's natural key, so the
//! same key always comes back as the same id, even under concurrent requests.

use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Event, NewSocial, NewTicket, NewUser, Social, Ticket, User};
use crate::store::Store;

pub const INSTAGRAM: &str = "instagram";

/// `country_id` only applies to a newly created user.
pub async fn resolve_user(
    store: &dyn Store,
    phone: &str,
    name: &str,
    email: Option<&str>,
    country_id: i64,
) -> Result<User, AppError> {
    let user = store
        .upsert_user(&NewUser::new(phone, name, email, country_id))
        .await?;
    debug!(user_id = %user.id, "user resolved");
    Ok(user)
}

/// Events are never created here; an unknown name is a private event.
pub async fn resolve_event(store: &dyn Store, name: &str) -> Result<Option<Event>, AppError> {
    Ok(store.find_event_by_name(name).await?)
}

pub async fn resolve_ticket(
    store: &dyn Store,
    event: Option<&Event>,
    ticket_type: &str,
    price: Decimal,
) -> Result<Ticket, AppError> {
    let ticket = NewTicket {
        id: Uuid::new_v4(),
        title: ticket_type.to_string(),
        event_id: event.map(|e| e.id),
        price,
        quantity: event.and_then(|e| e.default_ticket_quantity).unwrap_or(1),
        entries_allowed_per_ticket: 1,
    };
    let ticket = store.upsert_ticket(&ticket).await?;
    debug!(ticket_id = %ticket.id, event_id = ?ticket.event_id, "ticket resolved");
    Ok(ticket)
}

/// Returns `None` without touching the store when no handle was supplied.
pub async fn resolve_social(
    store: &dyn Store,
    platform: &str,
    user_id: Uuid,
    handle: Option<&str>,
) -> Result<Option<Social>, AppError> {
    let Some(handle) = handle.map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(None);
    };
    let social = store
        .upsert_social(&NewSocial {
            platform: platform.to_string(),
            user_id,
            handle: handle.to_string(),
        })
        .await?;
    Ok(Some(social))
}
