//! Plain PDF 1.4 receipts: one A4 page per render record, Helvetica text
//! plus the ticket's QR code drawn as filled squares.

use std::fmt::Write as _;

use bytes::Bytes;
use qrcode::{Color, QrCode};

use crate::orders::render::RenderRecord;

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN: u32 = 56;
const WRAP_AT: usize = 80;
/// Largest side of the QR code, in points.
const QR_MAX_SIDE: u32 = 240;
const QR_MAX_MODULE: u32 = 4;
const QR_BOTTOM: u32 = MARGIN + 40;

pub fn render_receipts(records: &[RenderRecord]) -> Bytes {
    // Object layout: 1 catalog, 2 page tree, 3 font, then a (page, content) pair per record.
    let mut objects: Vec<String> = Vec::with_capacity(3 + records.len() * 2);
    let kids: Vec<String> = (0..records.len())
        .map(|i| format!("{} 0 R", 4 + i * 2))
        .collect();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        records.len()
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".into());

    for (i, record) in records.iter().enumerate() {
        let content_id = 5 + i * 2;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = page_content(record);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body);
    }

    let xref_at = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    );
    Bytes::from(out)
}

fn page_content(record: &RenderRecord) -> String {
    let mut lines: Vec<String> = vec![
        format!("Event: {}", record.event_name),
        format!("Ticket holder: {}", record.name),
        format!("Phone: {}", record.phone),
        format!("Ticket type: {}", record.ticket_type),
    ];
    if let Some(start) = &record.start_date {
        lines.push(format!("Starts: {}", start));
    }
    if let Some(end) = &record.end_date {
        lines.push(format!("Ends: {}", end));
    }
    lines.push(format!("Location: {}", record.event_coordinates));
    lines.push(format!("Reference: {}", record.reference));
    lines.push(format!("Ticket code: {}", record.qr_code));
    lines.push(String::new());
    lines.extend(wrap(&record.description, WRAP_AT));

    let mut s = String::new();
    let _ = write!(
        s,
        "BT /F1 20 Tf {MARGIN} {} Td ({}) Tj ET\n",
        PAGE_HEIGHT - MARGIN - 20,
        escape("Admission Ticket")
    );
    let _ = write!(s, "BT /F1 11 Tf 16 TL {MARGIN} {} Td", PAGE_HEIGHT - MARGIN - 60);
    for line in &lines {
        let _ = write!(s, " ({}) Tj T*", escape(line));
    }
    s.push_str(" ET");
    if let Some(qr) = qr_drawing(&record.qr_code) {
        s.push('\n');
        s.push_str(&qr);
    }
    s
}

/// Dark modules of the QR code for `data`, centred near the foot of the page.
/// `None` when the data does not fit in a QR code.
fn qr_drawing(data: &str) -> Option<String> {
    let code = QrCode::new(data.as_bytes()).ok()?;
    let width = code.width();
    let module = (QR_MAX_SIDE / width as u32).clamp(1, QR_MAX_MODULE);
    let side = module * width as u32;
    let left = (PAGE_WIDTH - side) / 2;
    let top = QR_BOTTOM + side;

    let mut s = String::from("q 0 0 0 rg\n");
    for (i, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let (col, row) = ((i % width) as u32, (i / width) as u32);
        let _ = writeln!(
            s,
            "{} {} {module} {module} re",
            left + col * module,
            top - (row + 1) * module
        );
    }
    s.push_str("f Q");
    Some(s)
}

/// Escape a string for a PDF literal. Anything outside printable ASCII becomes `?`.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
