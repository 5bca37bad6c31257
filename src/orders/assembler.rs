use std::sync::atomic::{AtomicI64, Ordering};

use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::RenderCache;
use crate::error::AppError;
use crate::models::{Event, NewOrder, Order, Ticket};
use crate::orders::render::{
    format_event_time, write_record, RenderRecord, DEFAULT_COORDINATES, DEFAULT_DESCRIPTION,
};
use crate::store::Store;

pub const DEFAULT_REFERENCE_PREFIX: &str = "ref";
pub const PAYMENT_COMPLETED: &str = "COMPLETED";

const UNLOCK_TOKEN_LEN: usize = 24;

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Where an order came from; decides the QR-code id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderChannel {
    Standard,
    Instant,
    Bulk,
}

impl OrderChannel {
    pub fn qr_prefix(self) -> &'static str {
        match self {
            OrderChannel::Standard => "qrcode_",
            OrderChannel::Instant => "pos-qrcode_",
            OrderChannel::Bulk => "bulk-qrcode_",
        }
    }

    /// Route the receipt for this channel is served from.
    pub fn receipt_route(self) -> &'static str {
        match self {
            OrderChannel::Instant => "pos-qrcode",
            OrderChannel::Standard | OrderChannel::Bulk => "qr_code",
        }
    }
}

/// Microseconds since the epoch, strictly increasing across calls in this process.
pub fn monotonic_micros() -> i64 {
    let now = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64;
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

pub fn generate_reference(prefix: Option<&str>) -> String {
    let prefix = prefix
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_REFERENCE_PREFIX);
    format!("{}-{}", prefix, monotonic_micros())
}

pub fn qr_code_id(channel: OrderChannel, reference: &str) -> String {
    format!("{}{}-{}", channel.qr_prefix(), reference, monotonic_micros())
}

/// Opaque alphanumeric credential from a CSPRNG, roughly 142 bits.
pub fn generate_unlock_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNLOCK_TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub struct OrderDraft<'a> {
    pub channel: OrderChannel,
    pub user_id: Uuid,
    pub ticket: &'a Ticket,
    pub ticket_type: &'a str,
    pub quantity: i32,
    pub price: Decimal,
    pub currency: &'a str,
    pub reference: &'a str,
    pub assigned_table: Option<&'a str>,
}

/// Build the order row without persisting it.
pub fn draft_order(d: OrderDraft<'_>) -> NewOrder {
    NewOrder {
        id: Uuid::new_v4(),
        user_id: d.user_id,
        ticket_id: d.ticket.id,
        quantity: d.quantity,
        price: d.price,
        currency: d.currency.to_string(),
        payment_status: PAYMENT_COMPLETED.to_string(),
        reference: d.reference.to_string(),
        qr_code: qr_code_id(d.channel, d.reference),
        ticket_type: d.ticket_type.to_string(),
        assigned_table: d.assigned_table.map(str::to_string),
        created_at: OffsetDateTime::now_utc(),
    }
}

pub async fn create_order(store: &dyn Store, order: &NewOrder) -> Result<Order, AppError> {
    let order = store.insert_order(order).await?;
    info!(order_id = %order.id, qr_code = %order.qr_code, "order created");
    Ok(order)
}

pub struct Holder<'a> {
    pub name: &'a str,
    pub phone: &'a str,
}

/// Assemble the render snapshot for `order`. `event_name` is what the caller
/// asked for and is kept even when no event row matched.
pub fn render_record(
    order: &NewOrder,
    holder: Holder<'_>,
    event: Option<&Event>,
    event_name: &str,
    ticket: &Ticket,
) -> RenderRecord {
    RenderRecord {
        qr_code: order.qr_code.clone(),
        phone: holder.phone.to_string(),
        name: holder.name.to_string(),
        event_coordinates: event
            .and_then(|e| e.coordinates.clone())
            .unwrap_or_else(|| DEFAULT_COORDINATES.to_string()),
        event_name: event_name.to_string(),
        start_date: event.and_then(|e| e.starts_at).and_then(format_event_time),
        end_date: event.and_then(|e| e.ends_at).and_then(format_event_time),
        description: event
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        reference: order.reference.clone(),
        unlock_token: generate_unlock_token(),
        ticket_id: ticket.id.to_string(),
        ticket_type: order.ticket_type.clone(),
    }
}

/// Assemble and write the render record. A cache failure is logged and the
/// record is still returned: the order stands even if its receipt can't render.
pub async fn build_render_record(
    cache: &dyn RenderCache,
    order: &NewOrder,
    holder: Holder<'_>,
    event: Option<&Event>,
    event_name: &str,
    ticket: &Ticket,
) -> RenderRecord {
    let record = render_record(order, holder, event, event_name, ticket);
    if let Err(e) = write_record(cache, &record).await {
        warn!(error = ?e, qr_code = %record.qr_code, "render record not cached");
    }
    record
}
