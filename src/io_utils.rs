//! Upload reading: format detection, decoding, and conversion into a [`Table`].
//!
//! - **Format resolution**: extension-based (`.csv`, `.tsv`, `.txt` → delimited
//!   text, `.json` → array of row objects) with a manual override.
//! - **Encoding**: delimited input is decoded via `encoding_rs`, defaulting to UTF-8.
//! - **stdin**: the `-` path reads standard input as delimited text.
//! - **Digest**: every upload is fingerprinted with SHA-256 for its file summary.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::{Encoding, UTF_8};
use sha2::{Digest, Sha256};

use crate::{
    document::Value,
    rows::{Table, parse_typed_row},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Delimited(u8),
    Json,
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_format(path: &Path, delimiter: Option<u8>) -> Result<UploadFormat> {
    if is_dash(path) {
        return Ok(UploadFormat::Delimited(
            delimiter.unwrap_or(DEFAULT_CSV_DELIMITER),
        ));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" | "txt" => Ok(UploadFormat::Delimited(
            delimiter.unwrap_or(DEFAULT_CSV_DELIMITER),
        )),
        "tsv" => Ok(UploadFormat::Delimited(
            delimiter.unwrap_or(DEFAULT_TSV_DELIMITER),
        )),
        "json" => Ok(UploadFormat::Json),
        other => bail!("Unsupported file type: .{other}"),
    }
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if is_dash(path) {
        std::io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Reading upload from stdin")?;
    } else {
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?)
            .read_to_end(&mut buf)
            .with_context(|| format!("Reading input file {path:?}"))?;
    }
    Ok(buf)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn parse_table(
    bytes: &[u8],
    format: UploadFormat,
    encoding: &'static Encoding,
) -> Result<Table> {
    match format {
        UploadFormat::Delimited(delimiter) => parse_delimited(bytes, delimiter, encoding),
        UploadFormat::Json => parse_json_records(bytes),
    }
}

fn parse_delimited(bytes: &[u8], delimiter: u8, encoding: &'static Encoding) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(bytes);
    let headers = reader
        .byte_headers()
        .context("Reading header row")?
        .iter()
        .map(|field| decode_bytes(field, encoding).map(|h| h.trim().to_string()))
        .collect::<Result<Vec<_>>>()?;
    let mut table = Table::new(headers);
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = record
            .iter()
            .map(|field| decode_bytes(field, encoding))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        table
            .push_row(parse_typed_row(&decoded))
            .with_context(|| format!("Row {}", row_idx + 2))?;
    }
    Ok(table)
}

fn parse_json_records(bytes: &[u8]) -> Result<Table> {
    let parsed: serde_json::Value =
        serde_json::from_slice(bytes).context("Parsing JSON upload")?;
    let serde_json::Value::Array(items) = parsed else {
        bail!("JSON uploads must be an array of row objects");
    };
    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let serde_json::Value::Object(map) = item else {
            bail!("JSON row {} is not an object", idx + 1);
        };
        records.push(
            map.into_iter()
                .map(|(key, value)| (key, json_cell(value)))
                .collect::<Vec<_>>(),
        );
    }
    Ok(Table::from_record_iter(records))
}

fn json_cell(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::String(s) => crate::rows::parse_cell(&s),
        other => Value::from(other),
    }
}

pub fn load_table(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<(Table, String)> {
    let format = resolve_format(path, delimiter)?;
    let bytes = read_bytes(path)?;
    let digest = sha256_hex(&bytes);
    let table =
        parse_table(&bytes, format, encoding).with_context(|| format!("Parsing {path:?}"))?;
    Ok((table, digest))
}
