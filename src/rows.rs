//! Uploaded table model and cell typing.
//!
//! A [`Table`] keeps the upload's column order and holds one [`Value`] per
//! cell. [`parse_cell()`] turns raw text into a typed cell: placeholders become
//! null, integer and float literals become numbers, and everything else stays
//! text. Non-finite floats never survive into a table.

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime};

use crate::document::{Document, Value};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from keyed rows, taking columns in first-seen order and
    /// keeping each row's own key order. Nested documents and lists are kept
    /// as-is; they never count as numbers.
    pub fn from_record_iter<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Vec<(String, Value)>>,
    {
        let mut table = Table::default();
        let mut pending = Vec::new();
        for record in records {
            for (key, _) in &record {
                if table.column_index(key).is_none() {
                    table.columns.push(key.clone());
                }
            }
            pending.push(record);
        }
        for record in pending {
            let mut row = vec![Value::Null; table.columns.len()];
            for (key, value) in record {
                if let Some(idx) = table.column_index(&key) {
                    row[idx] = sanitize(value);
                }
            }
            table.rows.push(row);
        }
        table
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) -> Result<()> {
        if row.len() > self.columns.len() {
            bail!(
                "Row has {} cell(s) but the table defines {} column(s)",
                row.len(),
                self.columns.len()
            );
        }
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row.into_iter().map(sanitize).collect());
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }

    /// Rows as documents keyed by column name, for persistence and for the
    /// field completer.
    pub fn to_records(&self) -> Vec<Document> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Document>()
            })
            .collect()
    }

    /// Concatenates tables, unioning their columns in first-seen order.
    pub fn concat<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Table {
        Table::from_record_iter(tables.into_iter().flat_map(|table| {
            table.rows.iter().map(|row| {
                table
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Vec<_>>()
            })
        }))
    }
}

fn sanitize(value: Value) -> Value {
    match value {
        Value::Float(f) => Value::float(f),
        other => other,
    }
}

pub fn is_placeholder_token(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    let stripped = lowered.trim_start_matches('#');
    matches!(
        stripped,
        "" | "na" | "n/a" | "n.a." | "nan" | "null" | "none" | "missing" | "inf" | "-inf"
    ) || stripped.chars().all(|c| c == '-')
}

pub fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if is_placeholder_token(trimmed) {
        return Value::Null;
    }
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Value::Integer(parsed);
    }
    let numeric = trimmed.replace(',', "");
    if looks_numeric(&numeric)
        && let Ok(parsed) = numeric.parse::<f64>()
    {
        return Value::float(parsed);
    }
    Value::Text(trimmed.to_string())
}

fn looks_numeric(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && value.chars().any(|c| c.is_ascii_digit())
}

pub fn parse_typed_row(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|cell| parse_cell(cell)).collect()
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Reads a cell as a calendar date, accepting date and datetime text.
pub fn cell_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    parse_naive_date(text).or_else(|| parse_naive_datetime(text).map(|dt| dt.date()))
}
