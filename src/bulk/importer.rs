//! Bulk order import.
//!
//! Row problems are collected and never stop the batch. Persistence is the
//! opposite: every surviving user and order is flushed in one transaction,
//! and if that fails the whole import fails.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bulk::sheet::{read_sheet, SheetRow};
use crate::error::AppError;
use crate::models::{Event, NewOrder, NewUser, Ticket};
use crate::orders::assembler::{
    build_render_record, draft_order, generate_reference, Holder, OrderChannel, OrderDraft,
};
use crate::orders::resolver::resolve_ticket;
use crate::state::AppState;

pub const BULK_TICKET_TITLE: &str = "Bulk Ticket";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowFailure {
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub processed: usize,
    pub processed_percentage: f64,
    pub failures: Vec<RowFailure>,
}

/// A row that passed validation.
#[derive(Debug)]
struct ValidRow<'a> {
    name: String,
    phone: &'a str,
    email: Option<&'a str>,
    ticket_type: &'a str,
    assigned_table: Option<&'a str>,
    quantity: i32,
    price: Decimal,
}

fn validate(row: &SheetRow) -> Result<ValidRow<'_>, String> {
    fn non_blank<'a>(column: &str, value: &'a str) -> Result<&'a str, String> {
        if value.is_empty() {
            Err(format!("{} is required", column))
        } else {
            Ok(value)
        }
    }
    fn blank_to_none(value: &str) -> Option<&str> {
        (!value.is_empty()).then_some(value)
    }

    let first_name = non_blank("First Name", &row.first_name)?;
    let phone = non_blank("Tel", &row.tel)?;
    let ticket_type = non_blank("Ticket Type", &row.ticket_type)?;

    let quantity = match row.quantity.parse::<i32>() {
        Ok(q) if q >= 1 => q,
        _ => return Err(format!("Quantity must be a whole number of at least 1, got '{}'", row.quantity)),
    };
    let price = match Decimal::from_str(&row.price) {
        Ok(p) if p >= Decimal::ZERO => p,
        _ => return Err(format!("Price must be a non-negative number, got '{}'", row.price)),
    };

    let name = format!("{} {}", first_name, row.last_name).trim().to_string();
    Ok(ValidRow {
        name,
        phone,
        email: blank_to_none(&row.email),
        ticket_type,
        assigned_table: blank_to_none(&row.assigned_table),
        quantity,
        price,
    })
}

/// Users and orders held back until the flush.
#[derive(Default)]
struct Batch {
    users: Vec<NewUser>,
    user_by_phone: HashMap<String, Uuid>,
    orders: Vec<NewOrder>,
}

impl Batch {
    /// Existing user for the phone, else one already buffered, else a new buffered one.
    async fn user_for(&mut self, state: &AppState, row: &ValidRow<'_>) -> anyhow::Result<Uuid> {
        if let Some(id) = self.user_by_phone.get(row.phone) {
            return Ok(*id);
        }
        let id = match state.store.find_user_by_phone(row.phone).await? {
            Some(user) => user.id,
            None => {
                let user = NewUser::new(
                    row.phone,
                    &row.name,
                    row.email,
                    state.config.default_country_id,
                );
                let id = user.id;
                self.users.push(user);
                id
            }
        };
        self.user_by_phone.insert(row.phone.to_string(), id);
        Ok(id)
    }
}

#[instrument(skip(state, data), fields(bytes = data.len()))]
pub async fn import_orders(
    state: &AppState,
    event_id: Uuid,
    data: &[u8],
) -> Result<ImportReport, AppError> {
    let rows = read_sheet(data)?;
    let event = state
        .store
        .find_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

    let bulk_ticket = resolve_ticket(state.store.as_ref(), Some(&event), BULK_TICKET_TITLE, Decimal::ZERO).await?;

    let mut batch = Batch::default();
    let mut failures = Vec::new();
    for row in &rows {
        let outcome = match &row.cells {
            Ok(cells) => process_row(state, &mut batch, &event, &bulk_ticket, cells).await,
            Err(e) => Err(e.clone()),
        };
        if let Err(error) = outcome {
            warn!(row = row.number, %error, "bulk row skipped");
            failures.push(RowFailure {
                row: row.number,
                error,
            });
        }
    }

    if !batch.orders.is_empty() {
        state.store.bulk_insert(&batch.users, &batch.orders).await?;
    }

    let total_rows = rows.len();
    let processed = batch.orders.len();
    info!(
        %event_id,
        total_rows,
        processed,
        new_users = batch.users.len(),
        failed = failures.len(),
        "bulk import flushed"
    );
    Ok(ImportReport {
        total_rows,
        processed,
        processed_percentage: percentage(processed, total_rows),
        failures,
    })
}

async fn process_row(
    state: &AppState,
    batch: &mut Batch,
    event: &Event,
    bulk_ticket: &Ticket,
    cells: &SheetRow,
) -> Result<(), String> {
    let row = validate(cells)?;
    let user_id = batch
        .user_for(state, &row)
        .await
        .map_err(|e| format!("could not resolve user: {:#}", e))?;

    let reference = generate_reference(None);
    let order = draft_order(OrderDraft {
        channel: OrderChannel::Bulk,
        user_id,
        ticket: bulk_ticket,
        ticket_type: row.ticket_type,
        quantity: row.quantity,
        price: row.price,
        currency: &state.config.order_currency,
        reference: &reference,
        assigned_table: row.assigned_table,
    });
    build_render_record(
        state.cache.as_ref(),
        &order,
        Holder {
            name: &row.name,
            phone: row.phone,
        },
        Some(event),
        &event.name,
        bulk_ticket,
    )
    .await;
    batch.orders.push(order);
    Ok(())
}

fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    processed as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::Harness;

    const HEADER: &str = "First Name,Last Name,Tel,Email,Ticket Type,Assigned Table,Quantity,Price";

    fn sheet(rows: &[&str]) -> Vec<u8> {
        let mut s = String::from(HEADER);
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s.push('\n');
        s.into_bytes()
    }

    fn cells(first: &str, tel: &str, ticket_type: &str, quantity: &str, price: &str) -> SheetRow {
        SheetRow {
            first_name: first.into(),
            tel: tel.into(),
            ticket_type: ticket_type.into(),
            quantity: quantity.into(),
            price: price.into(),
            ..SheetRow::default()
        }
    }

    #[test]
    fn row_validation() {
        assert!(validate(&cells("Ama", "+233200000000", "VIP", "1", "150.50")).is_ok());
        assert!(validate(&cells("", "+233200000000", "VIP", "1", "0")).unwrap_err().contains("First Name"));
        assert!(validate(&cells("Ama", "", "VIP", "1", "0")).unwrap_err().contains("Tel"));
        assert!(validate(&cells("Ama", "+1", "", "1", "0")).unwrap_err().contains("Ticket Type"));
        assert!(validate(&cells("Ama", "+1", "VIP", "0", "0")).unwrap_err().contains("Quantity"));
        assert!(validate(&cells("Ama", "+1", "VIP", "two", "0")).unwrap_err().contains("Quantity"));
        assert!(validate(&cells("Ama", "+1", "VIP", "1", "-5")).unwrap_err().contains("Price"));
        assert!(validate(&cells("Ama", "+1", "VIP", "1", "")).unwrap_err().contains("Price"));
    }

    #[test]
    fn percentage_of_empty_sheet_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 4), 75.0);
    }

    #[tokio::test]
    async fn schema_gate_has_no_side_effects() {
        let h = Harness::new();
        let event = h.store.seed_event("Afrochella");
        let data = b"First Name,Tel,Quantity\nAma,+233200000000,1\n";

        let err = import_orders(&h.state, event.id, data).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(h.store.user_count(), 0);
        assert_eq!(h.store.ticket_count(), 0);
        assert_eq!(h.store.order_count(), 0);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let h = Harness::new();
        let err = import_orders(&h.state, Uuid::new_v4(), &sheet(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(h.store.ticket_count(), 0);
    }

    #[tokio::test]
    async fn bad_rows_are_reported_and_the_rest_flushed() {
        let h = Harness::new();
        let event = h.store.seed_event("Afrochella");
        let data = sheet(&[
            "Ama,Mensah,+233200000001,ama@x.com,VIP,T1,1,150",
            "Kofi,Boateng,+233200000002,,,T2,1,150",
            "Esi,Owusu,+233200000003,,Regular,,2,50",
            "Yaw,Asante,+233200000004,,,,1,50",
            "Akua,Darko,+233200000005,,Regular,,1,50",
        ]);

        let report = import_orders(&h.state, event.id, &data).await.unwrap();
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.processed, 3);
        assert_eq!(report.failures.iter().map(|f| f.row).collect::<Vec<_>>(), vec![2, 4]);
        assert!((report.processed_percentage - 60.0).abs() < 1e-9);

        assert_eq!(h.store.order_count(), 3);
        assert_eq!(h.store.user_count(), 3);
        assert_eq!(h.cache.len(), 3);

        let tickets = h.store.tickets();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].title, BULK_TICKET_TITLE);
        assert_eq!(tickets[0].event_id, Some(event.id));
        assert!(tickets[0].price.is_zero());
    }

    #[tokio::test]
    async fn repeated_phone_reuses_buffered_and_existing_users() {
        let h = Harness::new();
        let event = h.store.seed_event("Afrochella");
        let existing = h.store.seed_user("+233200000009", "Abena");
        let data = sheet(&[
            "Ama,Mensah,+233200000001,,VIP,,1,10",
            "Ama,Mensah,+233200000001,,VIP,,1,10",
            "Abena,K,+233200000009,,VIP,,1,10",
        ]);

        let report = import_orders(&h.state, event.id, &data).await.unwrap();
        assert_eq!(report.processed, 3);
        assert!(report.failures.is_empty());
        assert_eq!(h.store.user_count(), 2);
        let for_event = h.state.store.orders_for_event(event.id).await.unwrap();
        assert_eq!(for_event.iter().filter(|o| o.user_id == existing.id).count(), 1);
        assert!(for_event.iter().all(|o| o.qr_code.starts_with("bulk-qrcode_ref-")));
    }

    #[tokio::test]
    async fn bulk_ticket_is_shared_across_imports() {
        let h = Harness::new();
        let event = h.store.seed_event("Afrochella");
        import_orders(&h.state, event.id, &sheet(&["A,B,+15550001,,VIP,,1,1"])).await.unwrap();
        import_orders(&h.state, event.id, &sheet(&["C,D,+15550002,,VIP,,1,1"])).await.unwrap();
        assert_eq!(h.store.ticket_count(), 1);
    }

    #[tokio::test]
    async fn flush_failure_fails_the_whole_batch() {
        let h = Harness::new();
        let event = h.store.seed_event("Afrochella");
        h.store.fail_bulk_inserts(true);
        let data = sheet(&["Ama,Mensah,+233200000001,,VIP,,1,150", "Kofi,B,+233200000002,,VIP,,1,150"]);

        let err = import_orders(&h.state, event.id, &data).await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(h.store.order_count(), 0);
        assert_eq!(h.store.user_count(), 0);
    }

    #[tokio::test]
    async fn empty_sheet_reports_zero() {
        let h = Harness::new();
        let event = h.store.seed_event("Afrochella");
        let report = import_orders(&h.state, event.id, &sheet(&[])).await.unwrap();
        assert_eq!(report.total_rows, 0);
        assert_eq!(report.processed, 0);
        assert_eq!(report.processed_percentage, 0.0);
    }
}
