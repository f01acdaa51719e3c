use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::regions;
use crate::table::{self, Table};

/// Required name column; every downstream step keys on it.
pub const NAME_COLUMN: &str = "도서관명";

const NUMERIC_COLUMNS: [&str; 3] = ["건물면적", "좌석수", "대출가능권수"];
const ADDRESS_COLUMNS: [&str; 2] = ["소재지도로명주소", "소재지지번주소"];
const ROAD_ADDRESS_COLUMN: &str = "소재지도로명주소";
const REGION_COLUMN: &str = "시도명";
const SUB_REGION_COLUMN: &str = "시군구명";

/// One-sided winsorization bound for capacity columns.
const UPPER_QUANTILE: f64 = 0.99;

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("could not read {path} with any candidate encoding")]
    UnreadableInput { path: String },
    #[error("required column '{column}' is missing from the input")]
    MissingRequiredColumn { column: String },
    #[error("failed to write cleaned table to {path}")]
    WriteError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Counters from one cleaning run, for logging and assertions.
#[derive(Debug, Default)]
pub struct CleanReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub duplicates_removed: usize,
    pub empty_names_dropped: usize,
    pub non_numeric_cleared: usize,
    pub negatives_cleared: usize,
    pub values_clamped: usize,
}

impl CleanReport {
    pub fn print(&self) {
        println!(
            "Cleaned {} -> {} rows ({} duplicates, {} empty names removed; {} non-numeric, {} negatives cleared; {} outliers clamped).",
            self.input_rows,
            self.output_rows,
            self.duplicates_removed,
            self.empty_names_dropped,
            self.non_numeric_cleared,
            self.negatives_cleared,
            self.values_clamped,
        );
    }
}

/// Clean a raw library table end to end. Nothing is written unless the
/// input loads and carries the name column.
pub fn clean_file(input: &Path, output: &Path) -> Result<CleanReport, CleanError> {
    let unreadable = || CleanError::UnreadableInput {
        path: input.display().to_string(),
    };

    let bytes = std::fs::read(input).map_err(|_| unreadable())?;
    let text = table::decode_with_fallback(&bytes).ok_or_else(|| unreadable())?;
    let raw = table::parse_table(&text).map_err(|_| unreadable())?;
    println!(
        "Loaded {} rows x {} columns from {}",
        raw.rows.len(),
        raw.headers.len(),
        input.display()
    );

    let (cleaned, report) = clean_table(raw)?;

    table::write_table(output, &cleaned).map_err(|source| CleanError::WriteError {
        path: output.display().to_string(),
        source,
    })?;
    Ok(report)
}

/// The transform sequence. Order matters: dedup and name filtering run
/// before any per-column work so the quantiles see only surviving rows.
pub fn clean_table(mut table: Table) -> Result<(Table, CleanReport), CleanError> {
    let mut report = CleanReport {
        input_rows: table.rows.len(),
        ..Default::default()
    };

    let name_idx =
        table
            .column_index(NAME_COLUMN)
            .ok_or_else(|| CleanError::MissingRequiredColumn {
                column: NAME_COLUMN.to_string(),
            })?;

    // Exact-duplicate rows
    let before = table.rows.len();
    let mut seen = HashSet::new();
    table.rows.retain(|row| seen.insert(row.clone()));
    report.duplicates_removed = before - table.rows.len();

    // Name column: trim, then drop rows left without a name
    for row in &mut table.rows {
        row[name_idx] = row[name_idx].trim().to_string();
    }
    let before = table.rows.len();
    table.rows.retain(|row| !row[name_idx].is_empty());
    report.empty_names_dropped = before - table.rows.len();

    // Capacity columns: coerce, clear negatives, clamp the top 1%
    for column in NUMERIC_COLUMNS {
        if let Some(idx) = table.column_index(column) {
            clean_numeric_column(&mut table, idx, column, &mut report);
        }
    }

    // Address columns: surrounding whitespace only
    for column in ADDRESS_COLUMNS {
        if let Some(idx) = table.column_index(column) {
            for row in &mut table.rows {
                row[idx] = row[idx].trim().to_string();
            }
        }
    }

    // Region / sub-region derived from the road address
    if let Some(idx) = table.column_index(ROAD_ADDRESS_COLUMN) {
        derive_regions(&mut table, idx);
    }

    report_missing(&table);
    report.output_rows = table.rows.len();
    Ok((table, report))
}

fn clean_numeric_column(table: &mut Table, idx: usize, column: &str, report: &mut CleanReport) {
    let mut values: Vec<Option<f64>> = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let cell = row[idx].trim();
        let value = if cell.is_empty() {
            None
        } else {
            match cell.parse::<f64>() {
                Ok(v) if !v.is_finite() => {
                    report.non_numeric_cleared += 1;
                    None
                }
                Ok(v) if v < 0.0 => {
                    report.negatives_cleared += 1;
                    None
                }
                Ok(v) => Some(v),
                Err(_) => {
                    report.non_numeric_cleared += 1;
                    None
                }
            }
        };
        values.push(value);
    }

    let mut valid: Vec<f64> = values.iter().flatten().copied().collect();
    let upper = quantile(&mut valid, UPPER_QUANTILE);

    let mut clamped = 0usize;
    for (row, value) in table.rows.iter_mut().zip(values) {
        row[idx] = match (value, upper) {
            (None, _) => String::new(),
            (Some(v), Some(u)) if v > u => {
                clamped += 1;
                format_number(u)
            }
            (Some(v), _) => format_number(v),
        };
    }
    if clamped > 0 {
        info!(
            "{}: clamped {} outliers to {}",
            column,
            clamped,
            upper.unwrap_or_default()
        );
    }
    report.values_clamped += clamped;
}

/// Linear-interpolated quantile over the valid samples, matching pandas'
/// default so the winsorization bound lines up with the original outputs.
fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let h = q * (values.len() - 1) as f64;
    let lo = values[h.floor() as usize];
    let hi = values[h.ceil() as usize];
    Some(lo + (h - h.floor()) * (hi - lo))
}

/// Render a numeric cell without a trailing `.0` so a rerun parses the
/// same value back.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

fn derive_regions(table: &mut Table, addr_idx: usize) {
    let mut region_col = Vec::with_capacity(table.rows.len());
    let mut sub_col = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let (region, sub) = regions::split_region(&row[addr_idx]);
        region_col.push(region.map(str::to_string).unwrap_or_default());
        sub_col.push(sub.map(str::to_string).unwrap_or_default());
    }

    let distinct =
        |col: &[String]| col.iter().filter(|v| !v.is_empty()).collect::<HashSet<_>>().len();
    info!(
        "derived {} distinct regions, {} distinct sub-regions",
        distinct(&region_col),
        distinct(&sub_col)
    );

    table.set_column(REGION_COLUMN, region_col);
    table.set_column(SUB_REGION_COLUMN, sub_col);
}

/// Per-column missing-value counts. Observability only.
fn report_missing(table: &Table) {
    let total = table.rows.len();
    if total == 0 {
        return;
    }
    for (idx, header) in table.headers.iter().enumerate() {
        let missing = table.rows.iter().filter(|row| row[idx].is_empty()).count();
        if missing > 0 {
            info!(
                "{}: {} missing ({:.1}%)",
                header,
                missing,
                missing as f64 / total as f64 * 100.0
            );
        }
    }
}
