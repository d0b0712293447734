// src/config.rs
use chrono::Weekday;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::{str::FromStr, time::Duration};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::loader::LoadFilter;

// --- Defaults ---

pub const DEFAULT_GAP_THRESHOLD: Decimal = dec!(2.0);
pub const DEFAULT_WEEKEND_DAYS: [Weekday; 2] = [Weekday::Sat, Weekday::Sun];
/// Weeks run Sunday..Saturday.
pub const DEFAULT_WEEK_ANCHOR: Weekday = Weekday::Sun;
pub const DEFAULT_EMPLOYEE_ID_PATTERN: &str = r"[A-Z]\d{5}";
pub const DEFAULT_GAP_DAYS_AREA: &str = "reports/gap_days";
pub const DEFAULT_MISSING_PRODUCTIVITY_AREA: &str = "reports/missing_productivity";
pub const DEFAULT_DATASET_AREA: &str = "csv_datasets";
pub const DEFAULT_RAW_EXPORT_AREA: &str = "exported_data";
pub const DEFAULT_MANIFEST_FILE_NAME: &str = "report_manifest.jsonl";
pub const DEFAULT_RENDER_DELAY_MS: u64 = 500;
/// The end date plus the 26 days before it.
pub const DEFAULT_WINDOW_DAYS: u32 = 27;

const ENV_PREFIX: &str = "GAPDAYS_";

static EMPLOYEE_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(DEFAULT_EMPLOYEE_ID_PATTERN).expect("default employee id pattern is valid")
});

/// Everything a run needs to know, passed explicitly into each stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub gap_threshold: Decimal,
    pub weekend_days: Vec<Weekday>,
    pub week_anchor: Weekday,
    pub employee_id_pattern: Regex,
    pub gap_days_area: String,
    pub missing_productivity_area: String,
    pub dataset_area: String,
    pub raw_export_area: String,
    pub manifest_file_name: String,
    pub render_delay: Duration,
    pub window_days: u32,
    /// When false, the first rendering failure aborts the remaining batch.
    pub isolate_failures: bool,
    /// Caps the number of reports rendered per category in one run.
    pub report_limit: Option<usize>,
    pub load_filter: LoadFilter,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gap_threshold: DEFAULT_GAP_THRESHOLD,
            weekend_days: DEFAULT_WEEKEND_DAYS.to_vec(),
            week_anchor: DEFAULT_WEEK_ANCHOR,
            employee_id_pattern: EMPLOYEE_ID_REGEX.clone(),
            gap_days_area: DEFAULT_GAP_DAYS_AREA.to_string(),
            missing_productivity_area: DEFAULT_MISSING_PRODUCTIVITY_AREA.to_string(),
            dataset_area: DEFAULT_DATASET_AREA.to_string(),
            raw_export_area: DEFAULT_RAW_EXPORT_AREA.to_string(),
            manifest_file_name: DEFAULT_MANIFEST_FILE_NAME.to_string(),
            render_delay: Duration::from_millis(DEFAULT_RENDER_DELAY_MS),
            window_days: DEFAULT_WINDOW_DAYS,
            isolate_failures: true,
            report_limit: None,
            load_filter: LoadFilter::default(),
        }
    }
}

/// Raw `GAPDAYS_*` environment values. Everything is optional and parsed by hand so a
/// bad value produces a message naming the variable.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    gap_threshold: Option<String>,
    weekend_days: Option<String>,
    week_anchor: Option<String>,
    employee_id_pattern: Option<String>,
    gap_days_area: Option<String>,
    missing_productivity_area: Option<String>,
    dataset_area: Option<String>,
    render_delay_ms: Option<u64>,
    window_days: Option<u32>,
    isolate_failures: Option<bool>,
    report_limit: Option<usize>,
    employment_type: Option<String>,
    employment_status: Option<String>,
    excluded_project_prefixes: Option<String>,
}

impl PipelineConfig {
    /// Defaults overlaid with `GAPDAYS_*` variables (a `.env` file is honoured).
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenv::dotenv().ok();
        let overrides = envy::prefixed(ENV_PREFIX)
            .from_env::<EnvOverrides>()
            .map_err(|e| PipelineError::Config(format!("Failed to read environment: {}", e)))?;
        let config = Self::default().apply(overrides)?;
        info!(
            "Configuration loaded: threshold={}, weekend={:?}, anchor={:?}, window_days={}",
            config.gap_threshold, config.weekend_days, config.week_anchor, config.window_days
        );
        Ok(config)
    }

    fn apply(mut self, env: EnvOverrides) -> Result<Self, PipelineError> {
        if let Some(raw) = env.gap_threshold {
            self.gap_threshold = Decimal::from_str(raw.trim()).map_err(|_| {
                PipelineError::Config(format!("GAPDAYS_GAP_THRESHOLD is not a number: {}", raw))
            })?;
        }
        if let Some(raw) = env.weekend_days {
            self.weekend_days = parse_weekdays(&raw)?;
        }
        if let Some(raw) = env.week_anchor {
            self.week_anchor = parse_weekday(&raw)?;
        }
        if let Some(raw) = env.employee_id_pattern {
            self = self.with_employee_id_pattern(&raw)?;
        }
        if let Some(area) = env.gap_days_area {
            self.gap_days_area = area;
        }
        if let Some(area) = env.missing_productivity_area {
            self.missing_productivity_area = area;
        }
        if let Some(area) = env.dataset_area {
            self.dataset_area = area;
        }
        if let Some(ms) = env.render_delay_ms {
            self.render_delay = Duration::from_millis(ms);
        }
        if let Some(days) = env.window_days {
            if days == 0 {
                return Err(PipelineError::Config(
                    "GAPDAYS_WINDOW_DAYS must be at least 1".to_string(),
                ));
            }
            self.window_days = days;
        }
        if let Some(isolate) = env.isolate_failures {
            self.isolate_failures = isolate;
        }
        if env.report_limit.is_some() {
            self.report_limit = env.report_limit;
        }
        if let Some(kind) = env.employment_type {
            self.load_filter.employment_type = non_empty(kind);
        }
        if let Some(status) = env.employment_status {
            self.load_filter.employment_status = non_empty(status);
        }
        if let Some(raw) = env.excluded_project_prefixes {
            self.load_filter.excluded_project_prefixes = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        debug!("Applied environment overrides: {:?}", self);
        Ok(self)
    }

    pub fn with_employee_id_pattern(mut self, pattern: &str) -> Result<Self, PipelineError> {
        self.employee_id_pattern = Regex::new(pattern)?;
        Ok(self)
    }

    pub fn is_weekend(&self, day: Weekday) -> bool {
        self.weekend_days.contains(&day)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn parse_weekday(raw: &str) -> Result<Weekday, PipelineError> {
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| PipelineError::Config(format!("Unknown weekday: '{}'", raw.trim())))
}

/// Comma separated weekday list, e.g. `Sat,Sun`.
pub fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>, PipelineError> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_weekday)
        .collect()
}
