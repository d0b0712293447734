// src/export.rs
use chrono::NaiveDate;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregate::WeekRange;
use crate::classify::{Category, Classification};
use crate::error::{io_context, PipelineError};
use crate::loader::AnalysisWindow;
use crate::record::{AttendanceRecord, HourCategory};

// --- Labelled Dataset ---

#[derive(Debug, Serialize)]
struct DatasetRow<'a> {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Week")]
    week: NaiveDate,
    #[serde(rename = "EmployeeID")]
    employee_id: &'a str,
    #[serde(rename = "UserName")]
    user_name: Option<&'a str>,
    #[serde(rename = "FirstName")]
    first_name: Option<&'a str>,
    #[serde(rename = "LastName")]
    last_name: Option<&'a str>,
    #[serde(rename = "EmploymentType")]
    employment_type: Option<&'a str>,
    #[serde(rename = "Title")]
    title: Option<&'a str>,
    #[serde(rename = "ProjectCode")]
    project_code: Option<&'a str>,
    #[serde(rename = "Location")]
    location: Option<&'a str>,
    #[serde(rename = "ReportsTo")]
    reports_to: Option<&'a str>,
    #[serde(rename = "GapStatus")]
    gap_status: &'static str,
    #[serde(rename = "MissingProdStatus")]
    missing_prod_status: &'static str,
}

pub fn dataset_file_name(range: &WeekRange) -> String {
    format!("GapDaysDataset_{}_{}.csv", range.start, range.end)
}

/// One labelled row per retained daily record, written to
/// `<output_root>/<area>/GapDaysDataset_<start>_<end>.csv`.
pub fn export_dataset(
    records: &[AttendanceRecord],
    classification: &Classification,
    range: &WeekRange,
    output_root: &Path,
    area: &str,
) -> Result<PathBuf, PipelineError> {
    let dir = output_root.join(area);
    fs::create_dir_all(&dir)
        .map_err(|e| io_context(e, format!("Failed to create dataset directory: {:?}", dir)))?;
    let path = dir.join(dataset_file_name(range));

    let gap_ids = classification.id_set(Category::GapDays);
    let missing_ids = classification.id_set(Category::MissingProductivity);

    let mut writer = Writer::from_path(&path)?;
    for record in records {
        let p = &record.profile;
        let id = record.employee_id.as_str();
        writer.serialize(DatasetRow {
            date: record.date,
            week: record.week,
            employee_id: id,
            user_name: p.user_name.as_deref(),
            first_name: p.first_name.as_deref(),
            last_name: p.last_name.as_deref(),
            employment_type: p.employment_type.as_deref(),
            title: p.title.as_deref(),
            project_code: p.project_code.as_deref(),
            location: p.location.as_deref(),
            reports_to: p.reports_to.as_deref(),
            gap_status: if gap_ids.contains(id) { "Gap" } else { "No Gap" },
            missing_prod_status: if missing_ids.contains(id) {
                "Missing Prod"
            } else {
                "Has Prod"
            },
        })?;
    }
    writer
        .flush()
        .map_err(|e| io_context(e, format!("Failed to flush dataset: {:?}", path)))?;

    info!("Exported {} labelled rows to {:?}", records.len(), path);
    Ok(path)
}

// --- Raw Export ---

#[derive(Debug, Serialize)]
struct RawExportRow<'a> {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Week")]
    week: NaiveDate,
    #[serde(rename = "EEID")]
    employee_id: &'a str,
    #[serde(rename = "UserName")]
    user_name: Option<&'a str>,
    #[serde(rename = "FirstName")]
    first_name: Option<&'a str>,
    #[serde(rename = "LastName")]
    last_name: Option<&'a str>,
    #[serde(rename = "Productive Active Hours")]
    productive_active: Decimal,
    #[serde(rename = "Productive Passive Hours")]
    productive_passive: Decimal,
    #[serde(rename = "Holiday Hours")]
    holiday: Decimal,
    #[serde(rename = "PTO Hours")]
    pto: Decimal,
    #[serde(rename = "Undefined Hours")]
    undefined: Decimal,
    #[serde(rename = "Unproductive Hours")]
    unproductive: Decimal,
    #[serde(rename = "Total Hours")]
    total: Decimal,
    #[serde(rename = "EmploymentType")]
    employment_type: Option<&'a str>,
    #[serde(rename = "EmploymentStatus")]
    employment_status: Option<&'a str>,
    #[serde(rename = "Title")]
    title: Option<&'a str>,
    #[serde(rename = "ProjectCode")]
    project_code: Option<&'a str>,
    #[serde(rename = "Location")]
    location: Option<&'a str>,
    #[serde(rename = "ReportsTo")]
    reports_to: Option<&'a str>,
    #[serde(rename = "ReportsToName")]
    reports_to_name: Option<&'a str>,
}

pub fn raw_export_file_name(window: &AnalysisWindow) -> String {
    format!("Data_Export_{}_{}.csv", window.start, window.end)
}

/// Normalized records without classification labels.
pub fn export_normalized(
    records: &[AttendanceRecord],
    window: &AnalysisWindow,
    output_root: &Path,
    area: &str,
) -> Result<PathBuf, PipelineError> {
    let dir = output_root.join(area);
    fs::create_dir_all(&dir)
        .map_err(|e| io_context(e, format!("Failed to create export directory: {:?}", dir)))?;
    let path = dir.join(raw_export_file_name(window));

    let mut writer = Writer::from_path(&path)?;
    for record in records {
        let p = &record.profile;
        let h = &record.hours;
        writer.serialize(RawExportRow {
            date: record.date,
            week: record.week,
            employee_id: &record.employee_id,
            user_name: p.user_name.as_deref(),
            first_name: p.first_name.as_deref(),
            last_name: p.last_name.as_deref(),
            productive_active: h.get(HourCategory::ProductiveActive),
            productive_passive: h.get(HourCategory::ProductivePassive),
            holiday: h.get(HourCategory::Holiday),
            pto: h.get(HourCategory::Pto),
            undefined: h.get(HourCategory::Undefined),
            unproductive: h.get(HourCategory::Unproductive),
            total: record.total_hours(),
            employment_type: p.employment_type.as_deref(),
            employment_status: p.employment_status.as_deref(),
            title: p.title.as_deref(),
            project_code: p.project_code.as_deref(),
            location: p.location.as_deref(),
            reports_to: p.reports_to.as_deref(),
            reports_to_name: p.reports_to_name.as_deref(),
        })?;
    }
    writer
        .flush()
        .map_err(|e| io_context(e, format!("Failed to flush export: {:?}", path)))?;

    info!("Exported {} normalized rows to {:?}", records.len(), path);
    Ok(path)
}
