use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use encoding_rs::{Encoding, EUC_KR, UTF_8};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// In-memory delimited table: a header row plus string cells. Missing
/// values are empty cells.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Add a column, or replace its values if the header already exists.
    /// `values` must have one entry per row.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }
}

/// Decode raw CSV bytes with the first candidate encoding that parses
/// cleanly. Government exports arrive in cp949 about as often as UTF-8.
///
/// cp949 and euc-kr resolve to the same decoder here (windows-949 is the
/// superset), and a UTF-8 signature is honored by BOM sniffing before
/// either candidate runs, so the four documented labels collapse to two.
pub fn decode_with_fallback(bytes: &[u8]) -> Option<String> {
    let candidates: [(&str, &'static Encoding); 2] = [("cp949", EUC_KR), ("utf-8", UTF_8)];
    for (label, encoding) in candidates {
        let (text, used, had_errors) = encoding.decode(bytes);
        if !had_errors {
            debug!("decoded input as {} ({})", label, used.name());
            return Some(text.into_owned());
        }
    }
    None
}

/// Parse decoded CSV text. Ragged rows are padded (or truncated) to the
/// header width so cells can always be addressed by column index.
pub fn parse_table(text: &str) -> Result<Table, csv::Error> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let width = headers.len();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }
    Ok(Table { headers, rows })
}

/// Read a delimited table from disk, trying candidate encodings in order.
pub fn read_table(path: &Path) -> Result<Table> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = decode_with_fallback(&bytes)
        .with_context(|| format!("no candidate encoding could decode {}", path.display()))?;
    Ok(parse_table(&text)?)
}

/// Write a table as UTF-8 CSV with a signature, the flavor downstream
/// spreadsheet tools expect for Korean text.
pub fn write_table(path: &Path, table: &Table) -> Result<(), csv::Error> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Append-mode CSV writer that flushes every row straight to disk, so rows
/// survive a mid-batch crash.
pub struct AppendWriter {
    writer: csv::Writer<File>,
}

impl AppendWriter {
    /// Open `path` for append. A new or empty file gets the signature and
    /// the header row first; an existing file is continued as-is.
    pub fn open(path: &Path, headers: &[&str]) -> Result<Self> {
        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {} for append", path.display()))?;
        if is_new {
            file.write_all(UTF8_BOM)?;
        }
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(headers)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }

    /// Write one row and flush it immediately.
    pub fn append(&mut self, row: &[&str]) -> Result<(), csv::Error> {
        self.writer.write_record(row)?;
        self.writer.flush()?;
        Ok(())
    }
}
