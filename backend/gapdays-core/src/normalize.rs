// src/normalize.rs
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::loader::{cell, RawTable};
use crate::record::{week_start, AttendanceRecord, CategoryHours, EmployeeProfile, HourCategory};

// --- Column Mapping ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalColumn {
    Date,
    EmployeeId,
    Hours(HourCategory),
    UserName,
    FirstName,
    LastName,
    EmploymentType,
    EmploymentStatus,
    Title,
    ProjectCode,
    Location,
    ReportsTo,
    ReportsToName,
}

impl CanonicalColumn {
    pub const REQUIRED: [CanonicalColumn; 8] = [
        CanonicalColumn::Date,
        CanonicalColumn::EmployeeId,
        CanonicalColumn::Hours(HourCategory::ProductiveActive),
        CanonicalColumn::Hours(HourCategory::ProductivePassive),
        CanonicalColumn::Hours(HourCategory::Holiday),
        CanonicalColumn::Hours(HourCategory::Pto),
        CanonicalColumn::Hours(HourCategory::Undefined),
        CanonicalColumn::Hours(HourCategory::Unproductive),
    ];

    pub fn canonical_name(self) -> &'static str {
        match self {
            CanonicalColumn::Date => "Date",
            CanonicalColumn::EmployeeId => "EEID",
            CanonicalColumn::Hours(category) => category.column_name(),
            CanonicalColumn::UserName => "UserName",
            CanonicalColumn::FirstName => "FirstName",
            CanonicalColumn::LastName => "LastName",
            CanonicalColumn::EmploymentType => "EmploymentType",
            CanonicalColumn::EmploymentStatus => "EmploymentStatus",
            CanonicalColumn::Title => "Title",
            CanonicalColumn::ProjectCode => "ProjectCode",
            CanonicalColumn::Location => "Location",
            CanonicalColumn::ReportsTo => "ReportsTo",
            CanonicalColumn::ReportsToName => "ReportsToName",
        }
    }

    /// Column name used by the daily hours view.
    pub fn source_name(self) -> &'static str {
        match self {
            CanonicalColumn::Date => "AT_Date",
            CanonicalColumn::EmployeeId => "Employee_ID",
            CanonicalColumn::Hours(HourCategory::ProductiveActive) => "Productive_Active",
            CanonicalColumn::Hours(HourCategory::ProductivePassive) => "Productive_Passive",
            CanonicalColumn::Hours(HourCategory::Holiday) => "HOLHrs",
            CanonicalColumn::Hours(HourCategory::Pto) => "PTOHrs",
            CanonicalColumn::Hours(HourCategory::Undefined) => "Undefined",
            CanonicalColumn::Hours(HourCategory::Unproductive) => "Unproductive",
            CanonicalColumn::UserName => "AT_UserName",
            CanonicalColumn::FirstName => "FName",
            CanonicalColumn::LastName => "LName",
            CanonicalColumn::EmploymentType => "EmployeeTypeDescription",
            CanonicalColumn::EmploymentStatus => "EmployeeStatusDescription",
            CanonicalColumn::Title => "Title",
            CanonicalColumn::ProjectCode => "Company Project Code Desc Only",
            CanonicalColumn::Location => "Location",
            CanonicalColumn::ReportsTo => "ReportsTo",
            CanonicalColumn::ReportsToName => "ReportsToName",
        }
    }
}

/// Index of the column under its source name, falling back to its canonical name.
pub fn resolve_column(table: &RawTable, column: CanonicalColumn) -> Option<usize> {
    table
        .column_index(column.source_name())
        .or_else(|| table.column_index(column.canonical_name()))
}

/// Fails with every missing required column named, before any row is parsed.
pub fn validate_required_columns(table: &RawTable) -> Result<(), PipelineError> {
    let missing: Vec<String> = CanonicalColumn::REQUIRED
        .iter()
        .filter(|c| resolve_column(table, **c).is_none())
        .map(|c| format!("{} ({})", c.canonical_name(), c.source_name()))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Schema { missing })
    }
}

// --- Value Coercion ---

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
}

pub(crate) fn is_null(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("none")
}

/// Upper bound for a single hour cell. One row is one day.
pub const MAX_HOURS_PER_DAY: Decimal = dec!(24);

/// Null-like cells become zero; anything else must be a number in `0..=24`.
pub fn parse_hours(raw: &str) -> Option<Decimal> {
    if is_null(raw) {
        return Some(dec!(0));
    }
    let trimmed = raw.trim();
    let value = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()?;
    (value >= dec!(0) && value <= MAX_HOURS_PER_DAY).then_some(value)
}

fn optional_text(raw: &str) -> Option<String> {
    (!is_null(raw)).then(|| raw.trim().to_string())
}

fn text(row: &[String], column: Option<usize>) -> Option<String> {
    column.and_then(|i| optional_text(cell(row, i)))
}

// --- Normalization ---

struct ColumnIndexes {
    date: usize,
    employee_id: usize,
    hours: Vec<(HourCategory, usize)>,
    user_name: Option<usize>,
    first_name: Option<usize>,
    last_name: Option<usize>,
    employment_type: Option<usize>,
    employment_status: Option<usize>,
    title: Option<usize>,
    project_code: Option<usize>,
    location: Option<usize>,
    reports_to: Option<usize>,
    reports_to_name: Option<usize>,
}

impl ColumnIndexes {
    fn resolve(table: &RawTable) -> Result<Self, PipelineError> {
        validate_required_columns(table)?;
        let required = |column: CanonicalColumn| {
            resolve_column(table, column).ok_or_else(|| PipelineError::Schema {
                missing: vec![column.canonical_name().to_string()],
            })
        };
        let hours = HourCategory::ALL
            .iter()
            .map(|c| required(CanonicalColumn::Hours(*c)).map(|idx| (*c, idx)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            date: required(CanonicalColumn::Date)?,
            employee_id: required(CanonicalColumn::EmployeeId)?,
            hours,
            user_name: resolve_column(table, CanonicalColumn::UserName),
            first_name: resolve_column(table, CanonicalColumn::FirstName),
            last_name: resolve_column(table, CanonicalColumn::LastName),
            employment_type: resolve_column(table, CanonicalColumn::EmploymentType),
            employment_status: resolve_column(table, CanonicalColumn::EmploymentStatus),
            title: resolve_column(table, CanonicalColumn::Title),
            project_code: resolve_column(table, CanonicalColumn::ProjectCode),
            location: resolve_column(table, CanonicalColumn::Location),
            reports_to: resolve_column(table, CanonicalColumn::ReportsTo),
            reports_to_name: resolve_column(table, CanonicalColumn::ReportsToName),
        })
    }
}

/// Turns raw rows into canonical daily records. The input table is left untouched.
pub fn normalize(
    table: &RawTable,
    config: &PipelineConfig,
) -> Result<Vec<AttendanceRecord>, PipelineError> {
    let idx = ColumnIndexes::resolve(table)?;

    let mut records = Vec::with_capacity(table.len());
    for (row_num, row) in table.rows.iter().enumerate() {
        let row_num = row_num + 1;
        let raw_date = cell(row, idx.date);
        let date = parse_date(raw_date).ok_or_else(|| PipelineError::DataType {
            row: row_num,
            column: CanonicalColumn::Date.canonical_name().to_string(),
            value: raw_date.to_string(),
        })?;

        let employee_id = cell(row, idx.employee_id).trim().to_string();
        if employee_id.is_empty() {
            return Err(PipelineError::DataType {
                row: row_num,
                column: CanonicalColumn::EmployeeId.canonical_name().to_string(),
                value: String::new(),
            });
        }

        let mut hours = CategoryHours::default();
        for (category, col) in &idx.hours {
            let raw = cell(row, *col);
            let value = parse_hours(raw).ok_or_else(|| PipelineError::DataType {
                row: row_num,
                column: category.column_name().to_string(),
                value: raw.to_string(),
            })?;
            hours.set(*category, value);
        }

        let profile = EmployeeProfile {
            user_name: text(row, idx.user_name),
            first_name: text(row, idx.first_name),
            last_name: text(row, idx.last_name),
            employment_type: text(row, idx.employment_type),
            employment_status: text(row, idx.employment_status),
            title: text(row, idx.title),
            project_code: text(row, idx.project_code),
            location: text(row, idx.location),
            reports_to: text(row, idx.reports_to),
            reports_to_name: text(row, idx.reports_to_name),
        };

        records.push(AttendanceRecord {
            employee_id,
            date,
            week: week_start(date, config.week_anchor),
            hours,
            profile,
        });
    }

    debug!("Normalized columns: {:?}", table.columns);
    info!("Normalized {} daily records", records.len());
    Ok(records)
}
