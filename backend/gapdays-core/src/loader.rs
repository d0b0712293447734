// src/loader.rs
//! Reads the daily hours view (exported as CSV) and applies the population filters
//! that the source query would otherwise apply.

use chrono::{Duration, NaiveDate};
use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, info, warn};

use crate::error::{io_context, PipelineError};
use crate::normalize::{self, CanonicalColumn};

/// Untyped rows exactly as they came out of the source, one `String` cell per column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn read_csv(path: &Path) -> Result<RawTable, PipelineError> {
    let file = File::open(path)
        .map_err(|e| io_context(e, format!("Failed to open input file: {:?}", path)))?;
    let table = read_csv_from_reader(file)?;
    info!("Loaded {} rows ({} columns) from {:?}", table.len(), table.columns.len(), path);
    Ok(table)
}

pub fn read_csv_from_reader<R: Read>(reader: R) -> Result<RawTable, PipelineError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row = (0..columns.len())
            .map(|idx| record.get(idx).unwrap_or("").to_string())
            .collect();
        rows.push(row);
    }
    Ok(RawTable::new(columns, rows))
}

/// Cell at `idx`, or an empty string for short rows.
pub(crate) fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

// --- Analysis Window ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AnalysisWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::Config(format!(
                "Window start {} is after window end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// `days` calendar days ending on (and including) `end`.
    pub fn ending_on(end: NaiveDate, days: u32) -> Result<Self, PipelineError> {
        let span = i64::from(days.max(1)) - 1;
        let start = end
            .checked_sub_signed(Duration::days(span))
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "A window of {} days ending on {} starts before the earliest supported date",
                    days, end
                ))
            })?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// --- Population Filter ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFilter {
    pub employment_type: Option<String>,
    pub employment_status: Option<String>,
    pub excluded_project_prefixes: Vec<String>,
}

impl Default for LoadFilter {
    fn default() -> Self {
        Self {
            employment_type: Some("Full-time".to_string()),
            employment_status: Some("Active".to_string()),
            excluded_project_prefixes: ["1000", "1050", "3300", "8600"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl LoadFilter {
    /// No filtering at all; used by the raw export.
    pub fn none() -> Self {
        Self {
            employment_type: None,
            employment_status: None,
            excluded_project_prefixes: Vec::new(),
        }
    }

    /// Keeps the rows the reporting population is made of. A filter whose column is
    /// missing from the input is skipped. Rows whose date cannot be parsed are kept so
    /// that normalization reports them.
    pub fn apply(&self, table: RawTable, window: Option<&AnalysisWindow>) -> RawTable {
        let type_idx = self.column_for(
            &table,
            CanonicalColumn::EmploymentType,
            self.employment_type.is_some(),
        );
        let status_idx = self.column_for(
            &table,
            CanonicalColumn::EmploymentStatus,
            self.employment_status.is_some(),
        );
        let project_idx = self.column_for(
            &table,
            CanonicalColumn::ProjectCode,
            !self.excluded_project_prefixes.is_empty(),
        );
        let date_idx = self.column_for(&table, CanonicalColumn::Date, window.is_some());

        let before = table.len();
        let RawTable { columns, rows } = table;
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .filter(|row| {
                if let (Some(idx), Some(expected)) = (type_idx, &self.employment_type) {
                    if cell(row, idx).trim() != expected.as_str() {
                        return false;
                    }
                }
                if let (Some(idx), Some(expected)) = (status_idx, &self.employment_status) {
                    if cell(row, idx).trim() != expected.as_str() {
                        return false;
                    }
                }
                if let Some(idx) = project_idx {
                    // An absent code never satisfies `NOT LIKE`, so it is excluded too.
                    let code = cell(row, idx).trim();
                    if normalize::is_null(code)
                        || self
                            .excluded_project_prefixes
                            .iter()
                            .any(|prefix| code.starts_with(prefix.as_str()))
                    {
                        return false;
                    }
                }
                if let (Some(idx), Some(window)) = (date_idx, window) {
                    if let Some(date) = normalize::parse_date(cell(row, idx)) {
                        return window.contains(date);
                    }
                }
                true
            })
            .collect();

        info!(
            "Population filter kept {} of {} rows (window: {:?})",
            rows.len(),
            before,
            window
        );
        RawTable::new(columns, rows)
    }

    fn column_for(&self, table: &RawTable, column: CanonicalColumn, wanted: bool) -> Option<usize> {
        if !wanted {
            return None;
        }
        let idx = normalize::resolve_column(table, column);
        if idx.is_none() {
            warn!(
                "Column for {} not present in input; skipping that filter",
                column.canonical_name()
            );
        } else {
            debug!("Filtering on column {}", column.canonical_name());
        }
        idx
    }
}
