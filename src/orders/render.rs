use std::collections::HashMap;

use anyhow::Context;
use serde::Serialize;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, UtcOffset};

use crate::cache::RenderCache;

pub const DEFAULT_COORDINATES: &str = "www.chaleapp.org";
pub const DEFAULT_DESCRIPTION: &str = "Contact customer service for details.";

const EVENT_TIME_FORMAT: &[FormatItem<'static>] = format_description!(
    "[month repr:long] [day], [year] [hour repr:12]:[minute][period] GMT"
);

/// Snapshot of everything a receipt needs, stored under the order's QR-code id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderRecord {
    pub qr_code: String,
    pub phone: String,
    pub name: String,
    pub event_coordinates: String,
    pub event_name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: String,
    pub reference: String,
    pub unlock_token: String,
    pub ticket_id: String,
    pub ticket_type: String,
}

impl RenderRecord {
    /// Hash fields as written to the cache; absent dates are left out.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("phone", self.phone.clone()),
            ("name", self.name.clone()),
            ("event_coordinates", self.event_coordinates.clone()),
            ("event_name", self.event_name.clone()),
            ("description", self.description.clone()),
            ("reference", self.reference.clone()),
            ("unlock_token", self.unlock_token.clone()),
            ("ticket_id", self.ticket_id.clone()),
            ("ticket_type", self.ticket_type.clone()),
        ];
        if let Some(start) = &self.start_date {
            fields.push(("start_date", start.clone()));
        }
        if let Some(end) = &self.end_date {
            fields.push(("end_date", end.clone()));
        }
        fields
    }

    pub fn from_fields(qr_code: &str, mut fields: HashMap<String, String>) -> anyhow::Result<Self> {
        let mut take = |name: &str| {
            fields
                .remove(name)
                .with_context(|| format!("render record {} missing field {}", qr_code, name))
        };
        Ok(Self {
            qr_code: qr_code.to_string(),
            phone: take("phone")?,
            name: take("name")?,
            event_coordinates: take("event_coordinates")?,
            event_name: take("event_name")?,
            description: take("description")?,
            reference: take("reference")?,
            unlock_token: take("unlock_token")?,
            ticket_id: take("ticket_id")?,
            ticket_type: take("ticket_type")?,
            start_date: take("start_date").ok(),
            end_date: take("end_date").ok(),
        })
    }
}

/// `March 05, 2025 07:30PM GMT`
pub fn format_event_time(at: OffsetDateTime) -> Option<String> {
    at.to_offset(UtcOffset::UTC).format(EVENT_TIME_FORMAT).ok()
}

pub async fn write_record(cache: &dyn RenderCache, record: &RenderRecord) -> anyhow::Result<()> {
    cache.hash_set(&record.qr_code, &record.to_fields()).await
}

pub async fn load_record(
    cache: &dyn RenderCache,
    qr_code: &str,
) -> anyhow::Result<Option<RenderRecord>> {
    match cache.hash_get_all(qr_code).await? {
        Some(fields) => RenderRecord::from_fields(qr_code, fields).map(Some),
        None => Ok(None),
    }
}
