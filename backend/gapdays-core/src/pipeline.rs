// src/pipeline.rs
//! End-to-end run: load filter, normalize, weekend filter, aggregate, classify,
//! subtract the completion cache, render, export.

use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregate::{aggregate_weekly, WeekRange, WeeklyAggregate};
use crate::classify::{classify, Category, Classification};
use crate::completion::{load_completion_cache, pending_ids, RunManifest};
use crate::config::PipelineConfig;
use crate::driver::{new_run_id, BatchTelemetry, PendingWork, ReportDriver};
use crate::error::{PipelineError, RunWarning};
use crate::export::{export_dataset, export_normalized};
use crate::loader::{AnalysisWindow, LoadFilter, RawTable};
use crate::normalize::{normalize, validate_required_columns};
use crate::record::AttendanceRecord;
use crate::report::{ReportContext, ReportRenderer};
use crate::weekend::drop_unworked_weekends;

// --- Preparation ---

/// Everything derived from the input before any output is touched.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    /// Daily records after the weekend filter.
    pub records: Vec<AttendanceRecord>,
    pub weekly: Vec<WeeklyAggregate>,
    pub classification: Classification,
    pub week_range: Option<WeekRange>,
}

/// Runs the pure stages. With an `end_date`, only the configured window ending on it
/// is considered; without one, every row that passes the population filter is.
pub fn prepare(
    table: RawTable,
    end_date: Option<NaiveDate>,
    config: &PipelineConfig,
) -> Result<PreparedRun, PipelineError> {
    validate_required_columns(&table)?;

    let window = end_date
        .map(|end| AnalysisWindow::ending_on(end, config.window_days))
        .transpose()?;
    let filtered = config.load_filter.apply(table, window.as_ref());
    let normalized = normalize(&filtered, config)?;
    let records = drop_unworked_weekends(&normalized, config);
    let weekly = aggregate_weekly(&records);
    let classification = classify(&weekly, config);
    let week_range = WeekRange::spanning(&weekly);

    if let Some(range) = &week_range {
        info!("Run covers {}", range.label());
    }
    Ok(PreparedRun {
        records,
        weekly,
        classification,
        week_range,
    })
}

// --- Pending Work ---

pub fn area_for(category: Category, config: &PipelineConfig) -> &str {
    match category {
        Category::MissingProductivity => config.missing_productivity_area.as_str(),
        _ => config.gap_days_area.as_str(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPlan {
    pub classified: usize,
    pub already_reported: usize,
    pub work: PendingWork,
}

/// Pending work for every reported category. Empty categories are skipped with an
/// `EmptyPopulation` warning; absent report areas add `CacheUnavailable`.
pub fn plan_pending(
    prepared: &PreparedRun,
    output_root: &Path,
    manifest: &RunManifest,
    config: &PipelineConfig,
    warnings: &mut Vec<RunWarning>,
) -> Result<Vec<CategoryPlan>, PipelineError> {
    let mut plans = Vec::new();
    for category in Category::REPORTED {
        let ids = prepared.classification.ids(category);
        if ids.is_empty() {
            warn!("No employees classified as {}; skipping its reports", category);
            warnings.push(RunWarning::EmptyPopulation { category });
            continue;
        }

        let area = area_for(category, config);
        let cache = load_completion_cache(
            output_root,
            area,
            category,
            manifest,
            &config.employee_id_pattern,
        )?;
        if !cache.area_exists() {
            let path = output_root.join(area);
            warnings.push(RunWarning::CacheUnavailable {
                category,
                path: path.display().to_string(),
            });
        }

        let pending = pending_ids(ids, &cache);
        let plan = CategoryPlan {
            classified: ids.len(),
            already_reported: ids.len() - pending.len(),
            work: PendingWork {
                category,
                employee_ids: pending,
                target_dir: output_root.join(area),
            },
        };
        info!(
            "{}: {} classified, {} already reported, {} pending",
            category,
            plan.classified,
            plan.already_reported,
            plan.work.len()
        );
        plans.push(plan);
    }
    Ok(plans)
}

// --- Run ---

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub population: usize,
    pub counts: Vec<(Category, usize)>,
    pub week_range: Option<WeekRange>,
    pub plans: Vec<CategoryPlan>,
    pub batches: Vec<BatchTelemetry>,
    pub dataset: Option<PathBuf>,
    pub warnings: Vec<RunWarning>,
}

impl RunSummary {
    fn new(run_id: String, prepared: &PreparedRun) -> Self {
        Self {
            run_id,
            population: prepared.classification.population(),
            counts: Category::ALL
                .iter()
                .map(|c| (*c, prepared.classification.count(*c)))
                .collect(),
            week_range: prepared.week_range,
            plans: Vec::new(),
            batches: Vec::new(),
            dataset: None,
            warnings: Vec::new(),
        }
    }

    pub fn pending(&self, category: Category) -> Option<&[String]> {
        self.plans
            .iter()
            .find(|p| p.work.category == category)
            .map(|p| p.work.employee_ids.as_slice())
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(BatchTelemetry::failed).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        if let Some(range) = &self.week_range {
            writeln!(f, "  Weeks: {}", range.label())?;
        }
        writeln!(f, "  Employees analyzed: {}", self.population)?;
        for (category, count) in &self.counts {
            writeln!(f, "  {}: {}", category, count)?;
        }
        for plan in &self.plans {
            writeln!(
                f,
                "  {} pending: {} (already reported: {})",
                plan.work.category,
                plan.work.len(),
                plan.already_reported
            )?;
        }
        for batch in &self.batches {
            writeln!(
                f,
                "  {} rendered: {} completed, {} failed, {} deferred",
                batch.category,
                batch.completed(),
                batch.failed(),
                batch.deferred
            )?;
        }
        if let Some(path) = &self.dataset {
            writeln!(f, "  Dataset: {}", path.display())?;
        }
        for warning in &self.warnings {
            writeln!(f, "  Warning: {}", warning)?;
        }
        Ok(())
    }
}

/// Computes the pending sets without rendering anything or writing any file.
pub fn dry_run(
    table: RawTable,
    output_root: &Path,
    end_date: Option<NaiveDate>,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    let prepared = prepare(table, end_date, config)?;
    let manifest = RunManifest::at(output_root, &config.manifest_file_name);
    let mut summary = RunSummary::new(new_run_id(), &prepared);
    summary.plans = plan_pending(&prepared, output_root, &manifest, config, &mut summary.warnings)?;
    Ok(summary)
}

/// Full run: renders every pending employee of each reported category and writes
/// the labelled dataset.
pub async fn run(
    table: RawTable,
    output_root: &Path,
    end_date: Option<NaiveDate>,
    config: &PipelineConfig,
    renderer: Arc<dyn ReportRenderer>,
) -> Result<RunSummary, PipelineError> {
    let prepared = prepare(table, end_date, config)?;
    let manifest = RunManifest::at(output_root, &config.manifest_file_name);
    let mut summary = RunSummary::new(new_run_id(), &prepared);
    summary.plans = plan_pending(&prepared, output_root, &manifest, config, &mut summary.warnings)?;

    let context = ReportContext::new(&prepared.records, &prepared.weekly, config);
    let driver = ReportDriver::new(renderer, manifest, summary.run_id.clone(), config);
    for plan in &summary.plans {
        if plan.work.is_empty() {
            info!("{}: nothing pending", plan.work.category);
            continue;
        }
        let telemetry = driver.run(&plan.work, &context).await?;
        summary.batches.push(telemetry);
    }

    match &prepared.week_range {
        Some(range) => {
            summary.dataset = Some(export_dataset(
                &prepared.records,
                &prepared.classification,
                range,
                output_root,
                &config.dataset_area,
            )?);
        }
        None => warn!("No records survived filtering; dataset export skipped"),
    }

    info!("Run {} finished", summary.run_id);
    Ok(summary)
}

/// Normalized records for `start..=end`, without population filters or labels.
pub fn export_range(
    table: RawTable,
    start: NaiveDate,
    end: NaiveDate,
    output_root: &Path,
    config: &PipelineConfig,
) -> Result<PathBuf, PipelineError> {
    let window = AnalysisWindow::new(start, end)?;
    validate_required_columns(&table)?;
    let filtered = LoadFilter::none().apply(table, Some(&window));
    let records = normalize(&filtered, config)?;
    export_normalized(&records, &window, output_root, &config.raw_export_area)
}
