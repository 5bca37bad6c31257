use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_COUNTRY_ID: i64 = 1;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub country_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub country_id: i64,
    pub created_at: OffsetDateTime,
}

impl NewUser {
    pub fn new(phone: &str, name: &str, email: Option<&str>, country_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            phone: phone.to_string(),
            email: email.map(str::to_string),
            country_id,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub coordinates: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub starts_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    pub description: Option<String>,
    pub default_ticket_quantity: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub event_id: Option<Uuid>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: i32,
    pub entries_allowed_per_ticket: i32,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: Uuid,
    pub title: String,
    pub event_id: Option<Uuid>,
    pub price: Decimal,
    pub quantity: i32,
    pub entries_allowed_per_ticket: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Social {
    pub id: Uuid,
    pub platform: String,
    pub user_id: Uuid,
    pub handle: String,
}

#[derive(Debug, Clone)]
pub struct NewSocial {
    pub platform: String,
    pub user_id: Uuid,
    pub handle: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub currency: String,
    pub payment_status: String,
    pub reference: String,
    pub qr_code: String,
    pub ticket_type: String,
    pub assigned_table: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Order row as assembled in memory, before it reaches the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub currency: String,
    pub payment_status: String,
    pub reference: String,
    pub qr_code: String,
    pub ticket_type: String,
    pub assigned_table: Option<String>,
    pub created_at: OffsetDateTime,
}

impl From<NewOrder> for Order {
    fn from(o: NewOrder) -> Self {
        Self {
            id: o.id,
            user_id: o.user_id,
            ticket_id: o.ticket_id,
            quantity: o.quantity,
            price: o.price,
            currency: o.currency,
            payment_status: o.payment_status,
            reference: o.reference,
            qr_code: o.qr_code,
            ticket_type: o.ticket_type,
            assigned_table: o.assigned_table,
            created_at: o.created_at,
        }
    }
}
