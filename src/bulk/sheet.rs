//! CSV sheet reading for bulk imports.

use std::collections::HashMap;

use crate::error::AppError;

pub const REQUIRED_COLUMNS: [&str; 8] = [
    "First Name",
    "Last Name",
    "Tel",
    "Email",
    "Ticket Type",
    "Assigned Table",
    "Quantity",
    "Price",
];

/// Raw cells of one data row, trimmed. Absent trailing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    pub first_name: String,
    pub last_name: String,
    pub tel: String,
    pub email: String,
    pub ticket_type: String,
    pub assigned_table: String,
    pub quantity: String,
    pub price: String,
}

/// One data row, numbered from 1. A row the CSV reader itself rejects keeps its
/// number and carries the reader error.
#[derive(Debug)]
pub struct NumberedRow {
    pub number: usize,
    pub cells: Result<SheetRow, String>,
}

/// Check the header against [`REQUIRED_COLUMNS`] and read every data row.
/// Nothing is returned unless the whole schema is present.
pub fn read_sheet(data: &[u8]) -> Result<Vec<NumberedRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| AppError::Validation(format!("Unreadable sheet header: {}", e)))?
        .clone();
    let positions: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name, i))
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !positions.contains_key(c))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing required columns: {}",
            missing.join(", ")
        )));
    }

    let column = |name: &str| positions.get(name).copied().unwrap_or_default();
    let index = [
        column("First Name"),
        column("Last Name"),
        column("Tel"),
        column("Email"),
        column("Ticket Type"),
        column("Assigned Table"),
        column("Quantity"),
        column("Price"),
    ];

    let rows = reader
        .records()
        .enumerate()
        .map(|(i, record)| NumberedRow {
            number: i + 1,
            cells: record.map_err(|e| e.to_string()).map(|r| {
                let cell = |pos: usize| r.get(pos).unwrap_or_default().to_string();
                SheetRow {
                    first_name: cell(index[0]),
                    last_name: cell(index[1]),
                    tel: cell(index[2]),
                    email: cell(index[3]),
                    ticket_type: cell(index[4]),
                    assigned_table: cell(index[5]),
                    quantity: cell(index[6]),
                    price: cell(index[7]),
                }
            }),
        })
        .collect();
    Ok(rows)
}
