//! Spreadsheet rendering for message exports.
//!
//! # Responsibility
//! - Shape fetched platform messages and contacts into export rows.
//! - Write rows into an `.xlsx` workbook split across `Messages N` sheets.
//!
//! # Invariants
//! - Every workbook has at least one sheet, even with no rows.
//! - A sheet holds at most [`MAX_ROWS_PER_SHEET`] data rows under its header.
//! - Times are written as UTC date-time cells.

use crate::remote::{RemoteContact, RemoteMessage, SYSTEM_LABEL_FLAGGED};
use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, XlsxError};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Columns written before the org's contact fields.
pub const BASE_FIELDS: [&str; 6] = [
    "Time",
    "Message ID",
    "Flagged",
    "Labels",
    "Text",
    "Contact",
];
pub const MAX_ROWS_PER_SHEET: usize = 65_535;
/// Contacts are fetched from the platform in batches of this size.
pub const CONTACT_BATCH_SIZE: usize = 25;
pub const EXPORT_FILE_EXTENSION: &str = "xlsx";

const DATE_NUM_FORMAT: &str = "dd-mm-yyyy hh:mm:ss";
const MAX_CELL_CHARS: usize = 32_767;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug)]
pub enum ExportError {
    Xlsx(XlsxError),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xlsx(err) => write!(f, "cannot write spreadsheet: {err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Xlsx(err) => Some(err),
        }
    }
}

impl From<XlsxError> for ExportError {
    fn from(value: XlsxError) -> Self {
        Self::Xlsx(value)
    }
}

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub time: DateTime<Utc>,
    pub message_id: i64,
    pub flagged: bool,
    /// Comma-space joined names of known labels on the message.
    pub labels: String,
    pub text: String,
    pub contact: String,
    /// One entry per org contact field; `None` renders as a blank cell.
    pub fields: Vec<Option<String>>,
}

/// Header row: base columns followed by contact fields.
pub fn export_columns(contact_fields: &[String]) -> Vec<String> {
    BASE_FIELDS
        .iter()
        .map(|field| field.to_string())
        .chain(contact_fields.iter().cloned())
        .collect()
}

pub fn sheet_name(number: usize) -> String {
    format!("Messages {number}")
}

/// Builds export rows in message order.
///
/// `known_labels` holds the names of the org's active labels; other label
/// names on a message (including system labels) are left out of the Labels
/// column. Contacts missing from `contacts` yield blank field cells.
pub fn build_rows(
    messages: &[RemoteMessage],
    contacts: &HashMap<String, RemoteContact>,
    known_labels: &HashSet<String>,
    contact_fields: &[String],
) -> Vec<ExportRow> {
    messages
        .iter()
        .map(|msg| {
            let flagged = msg.labels.iter().any(|l| l == SYSTEM_LABEL_FLAGGED);
            let labels = msg
                .labels
                .iter()
                .filter(|name| known_labels.contains(name.as_str()))
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let contact = contacts.get(&msg.contact);
            let fields = contact_fields
                .iter()
                .map(|key| contact.and_then(|c| c.fields.get(key).cloned().flatten()))
                .collect();
            ExportRow {
                time: msg.created_on,
                message_id: msg.id,
                flagged,
                labels,
                text: msg.text.clone(),
                contact: msg.contact.clone(),
                fields,
            }
        })
        .collect()
}

/// Renders the workbook and returns the `.xlsx` bytes.
pub fn write_workbook(columns: &[String], rows: &[ExportRow]) -> ExportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format(DATE_NUM_FORMAT);

    let empty: &[ExportRow] = &[];
    let chunks: Vec<&[ExportRow]> = if rows.is_empty() {
        vec![empty]
    } else {
        rows.chunks(MAX_ROWS_PER_SHEET).collect()
    };

    for (index, chunk) in chunks.into_iter().enumerate() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name(index + 1).as_str())?;
        for (col, title) in columns.iter().enumerate() {
            sheet.write_string(0, col as u16, title.as_str())?;
        }

        for (offset, row) in chunk.iter().enumerate() {
            let r = (offset + 1) as u32;
            sheet.write_datetime_with_format(r, 0, &excel_time(row.time)?, &date_format)?;
            sheet.write_number(r, 1, row.message_id as f64)?;
            sheet.write_string(r, 2, if row.flagged { "Yes" } else { "No" })?;
            sheet.write_string(r, 3, row.labels.as_str())?;
            sheet.write_string(r, 4, cell_text(&row.text).as_str())?;
            sheet.write_string(r, 5, row.contact.as_str())?;
            for (i, value) in row.fields.iter().enumerate() {
                if let Some(value) = value {
                    let col = (BASE_FIELDS.len() + i) as u16;
                    sheet.write_string(r, col, cell_text(value).as_str())?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Number of sheets a workbook with `row_count` rows is split into.
pub fn sheet_count(row_count: usize) -> usize {
    row_count.div_ceil(MAX_ROWS_PER_SHEET).max(1)
}

fn excel_time(value: DateTime<Utc>) -> ExportResult<ExcelDateTime> {
    let date = ExcelDateTime::from_ymd(
        value.year() as u16,
        value.month() as u8,
        value.day() as u8,
    )?;
    Ok(date.and_hms(value.hour() as u16, value.minute() as u8, value.second())?)
}

fn cell_text(value: &str) -> String {
    if value.chars().count() <= MAX_CELL_CHARS {
        value.to_string()
    } else {
        value.chars().take(MAX_CELL_CHARS).collect()
    }
}
