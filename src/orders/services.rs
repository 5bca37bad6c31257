use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::AppError;
use crate::models::Order;
use crate::orders::assembler::{
    build_render_record, create_order, draft_order, generate_reference, Holder, OrderChannel,
    OrderDraft,
};
use crate::orders::render::RenderRecord;
use crate::orders::resolver::{resolve_event, resolve_social, resolve_ticket, resolve_user, INSTAGRAM};
use crate::state::AppState;

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 \-]{4,18}[0-9]$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Trimmed, non-blank value of a required request field.
pub fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("Missing required field: {}", field)))
}

pub fn optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validated input shared by standard and instant orders.
pub struct PlaceOrder<'a> {
    pub channel: OrderChannel,
    pub event_name: &'a str,
    pub user_name: &'a str,
    pub phone: &'a str,
    pub email: Option<&'a str>,
    pub ticket_type: &'a str,
    pub price: Decimal,
    pub reference: Option<&'a str>,
    pub instagram: Option<&'a str>,
    pub assigned_table: Option<&'a str>,
}

impl PlaceOrder<'_> {
    pub fn validate(&self) -> Result<(), AppError> {
        if !is_valid_phone(self.phone) {
            return Err(AppError::Validation(format!("Invalid phone number: {}", self.phone)));
        }
        if let Some(email) = self.email {
            if !is_valid_email(email) {
                return Err(AppError::Validation(format!("Invalid email: {}", email)));
            }
        }
        if self.price < Decimal::ZERO {
            return Err(AppError::Validation("price must not be negative".into()));
        }
        Ok(())
    }
}

pub struct PlacedOrder {
    pub order: Order,
    pub record: RenderRecord,
    pub qr_code_url: String,
}

/// Resolve every entity the order hangs off, persist the order and cache
/// its render record.
pub async fn place_order(state: &AppState, req: PlaceOrder<'_>) -> Result<PlacedOrder, AppError> {
    req.validate()?;
    let store = state.store.as_ref();

    let user = resolve_user(
        store,
        req.phone,
        req.user_name,
        req.email,
        state.config.default_country_id,
    )
    .await?;
    if req.channel == OrderChannel::Instant {
        resolve_social(store, INSTAGRAM, user.id, req.instagram).await?;
    }
    let event = resolve_event(store, req.event_name).await?;
    let ticket = resolve_ticket(store, event.as_ref(), req.ticket_type, req.price).await?;

    let reference = match req.reference {
        Some(r) => r.to_string(),
        None => generate_reference(None),
    };
    let draft = draft_order(OrderDraft {
        channel: req.channel,
        user_id: user.id,
        ticket: &ticket,
        ticket_type: req.ticket_type,
        quantity: 1,
        price: req.price,
        currency: &state.config.order_currency,
        reference: &reference,
        assigned_table: req.assigned_table,
    });
    let order = create_order(store, &draft).await?;

    let record = build_render_record(
        state.cache.as_ref(),
        &draft,
        Holder {
            name: req.user_name,
            phone: req.phone,
        },
        event.as_ref(),
        req.event_name,
        &ticket,
    )
    .await;

    let qr_code_url = state
        .config
        .receipt_url(req.channel.receipt_route(), &order.qr_code, &record.unlock_token);
    info!(
        order_id = %order.id,
        channel = ?req.channel,
        private_event = event.is_none(),
        "order placed"
    );
    Ok(PlacedOrder {
        order,
        record,
        qr_code_url,
    })
}
