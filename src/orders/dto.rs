use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::Order;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}
fn default_page() -> i64 { 1 }
fn default_page_size() -> i64 { 10 }

impl PageParams {
    /// Rejects, never clamps.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 || self.page_size < 1 {
            return Err(AppError::Validation(
                "Invalid pagination parameters. Page and page_size should be positive integers."
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (total - 1) / page_size + 1
}

#[derive(Debug, Serialize)]
pub struct OrdersPage {
    pub success: bool,
    pub data: Vec<Order>,
    pub page: i64,
    pub page_size: i64,
    pub total_orders: i64,
    pub total_pages: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EventOrders {
    pub success: bool,
    pub data: Vec<Order>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub event_name: Option<String>,
    pub user_name: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub phone: Option<String>,
    pub ticket_type: Option<String>,
    pub reference: Option<String>,
    pub email: Option<String>,
    pub assigned_table: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InstantOrderRequest {
    pub event_name: Option<String>,
    pub user_name: Option<String>,
    pub phone: Option<String>,
    pub ticket_type: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub instagram: Option<String>,
    pub email: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub success: bool,
    pub qr_code_url: String,
    pub pdf_unlock_token: String,
    pub message: String,
}
