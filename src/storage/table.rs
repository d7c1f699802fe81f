//! Tabular encoding
//!
//! Turns JSON row-sets into CSV and inspects stored CSV for the status and
//! export endpoints.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// One record as pushed by the producer: column name to cell value
pub type Row = Map<String, Value>;

/// Shape of a parsed CSV table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSummary {
    pub columns: usize,
    pub rows: usize,
}

/// Columns in order of first appearance across all rows
fn column_order(rows: &[Row]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for key in rows.iter().flat_map(Map::keys) {
        if seen.insert(key.as_str()) {
            columns.push(key.as_str());
        }
    }
    columns
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Encode rows as CSV with a header line
///
/// Cells missing from a row are left empty. An empty row-set encodes to
/// an empty file.
pub fn encode_rows(rows: &[Row]) -> Result<Vec<u8>, csv::Error> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let columns = column_order(rows);
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&columns)?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(*column).map_or_else(String::new, render_cell)),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Parse stored CSV and count its data rows
///
/// The error string describes why the table cannot be read; it ends up in
/// the status endpoint's "corrupted" message.
pub fn summarize(data: &[u8]) -> Result<TableSummary, String> {
    if let Some(line) = unterminated_quote_line(data) {
        return Err(format!(
            "Error tokenizing data. EOF inside string starting at line {line}"
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);

    let columns = reader.headers().map_err(|e| e.to_string())?.len();
    if columns == 0 {
        return Err("No columns to parse from file".to_string());
    }

    let mut rows = 0;
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        if record.len() > columns {
            let line = record.position().map_or(0, csv::Position::line);
            return Err(format!(
                "Error tokenizing data. Expected {columns} fields in line {line}, saw {}",
                record.len()
            ));
        }
        rows += 1;
    }

    Ok(TableSummary { columns, rows })
}

/// Line of a quoted field still open at end of input, if any
///
/// Only a quote at the start of a field opens one; a quote inside an
/// unquoted field is literal text.
fn unterminated_quote_line(data: &[u8]) -> Option<usize> {
    let mut line = 1;
    let mut opened_at = None;
    let mut field_start = true;
    let mut bytes = data.iter().peekable();

    while let Some(&b) = bytes.next() {
        if opened_at.is_some() {
            if b == b'"' {
                if bytes.peek() == Some(&&b'"') {
                    bytes.next();
                } else {
                    opened_at = None;
                }
            }
        } else if b == b'"' && field_start {
            opened_at = Some(line);
        }
        if b == b'\n' {
            line += 1;
        }
        field_start = opened_at.is_none() && matches!(b, b',' | b'\n' | b'\r');
    }

    opened_at
}
