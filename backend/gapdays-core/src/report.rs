// src/report.rs
//! Per-employee report requests and the renderer seam.
//!
//! A [`ReportRequest`] holds everything a chart/document renderer needs for one
//! employee: the text block, the daily and weekly series, and one slice per run week
//! with the accumulated daily average. Turning that into pixels is the renderer's
//! job; [`JsonArtifactRenderer`] simply persists the request.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::aggregate::{run_weeks, WeekRange, WeeklyAggregate};
use crate::classify::Category;
use crate::config::PipelineConfig;
use crate::error::{io_context, PipelineError};
use crate::record::{title_case, AttendanceRecord, CategoryHours, EmployeeId};

pub const UNKNOWN_MANAGER: &str = "[Manager Name]";

// --- Formatting ---

/// Hours as `HHh:MMm`. Minutes are rounded; 60 rounded minutes carry into the hour.
pub fn hours_to_hhmm(hours: Decimal) -> String {
    let whole = hours.trunc();
    let mut h = whole.to_i64().unwrap_or(0);
    let mut m = ((hours - whole) * dec!(60)).round().to_i64().unwrap_or(0);
    if m == 60 {
        h += 1;
        m = 0;
    }
    format!("{:02}h:{:02}m", h, m)
}

fn percent(proportion: f64) -> String {
    format!("{:.2}%", proportion * 100.0)
}

// --- Request Types ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub week: NaiveDate,
    pub hours: CategoryHours,
    pub total_hours: Decimal,
    pub total_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyPoint {
    pub week: NaiveDate,
    pub hours: CategoryHours,
    pub total_hours: Decimal,
    pub daily_productive_average: Decimal,
    pub total_label: String,
    pub average_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceDay {
    pub date: NaiveDate,
    pub total_hours: Decimal,
    /// Mean of this week's daily totals up to and including this day.
    pub accumulated_average: Decimal,
    pub accumulated_label: String,
    pub zero_activity: bool,
}

/// One run week for one employee. Weeks the employee has no retained days in are
/// still present, with no days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSlice {
    pub week_number: usize,
    pub week: NaiveDate,
    pub days: Vec<SliceDay>,
}

impl WeekSlice {
    pub fn final_average(&self) -> Option<Decimal> {
        self.days.last().map(|d| d.accumulated_average)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportText {
    pub title: String,
    pub employee_info: Vec<String>,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRequest {
    pub category: Category,
    pub report_title: &'static str,
    pub employee_id: EmployeeId,
    pub display_name: String,
    pub manager_name: String,
    pub week_range: WeekRange,
    pub zero_hour_days: usize,
    pub zero_hour_proportion: f64,
    pub weeks_below_threshold: usize,
    pub text: ReportText,
    pub daily: Vec<DailyPoint>,
    pub weekly: Vec<WeeklyPoint>,
    pub week_slices: Vec<WeekSlice>,
}

impl ReportRequest {
    /// `<Report Title> - <EEID> <Name>`; the id in it is what the completion cache
    /// recognises on later runs.
    pub fn artifact_stem(&self) -> String {
        let stem = format!(
            "{} - {} {}",
            self.report_title,
            self.employee_id,
            self.display_name
        );
        stem.replace(['/', '\\'], "-")
    }
}

// --- Request Assembly ---

/// Per-employee lookup over one run's retained records and weekly aggregates.
#[derive(Debug, Clone)]
pub struct ReportContext {
    daily_by_employee: HashMap<EmployeeId, Vec<AttendanceRecord>>,
    weekly_by_employee: HashMap<EmployeeId, Vec<WeeklyAggregate>>,
    run_weeks: Vec<NaiveDate>,
    week_range: Option<WeekRange>,
    gap_threshold: Decimal,
}

impl ReportContext {
    pub fn new(
        records: &[AttendanceRecord],
        weekly: &[WeeklyAggregate],
        config: &PipelineConfig,
    ) -> Self {
        let mut daily_by_employee: HashMap<EmployeeId, Vec<AttendanceRecord>> = HashMap::new();
        for record in records {
            daily_by_employee
                .entry(record.employee_id.clone())
                .or_default()
                .push(record.clone());
        }
        for days in daily_by_employee.values_mut() {
            days.sort_by_key(|r| r.date);
        }

        let mut weekly_by_employee: HashMap<EmployeeId, Vec<WeeklyAggregate>> = HashMap::new();
        for week in weekly {
            weekly_by_employee
                .entry(week.employee_id.clone())
                .or_default()
                .push(week.clone());
        }

        Self {
            daily_by_employee,
            weekly_by_employee,
            run_weeks: run_weeks(weekly),
            week_range: WeekRange::spanning(weekly),
            gap_threshold: config.gap_threshold,
        }
    }

    pub fn week_range(&self) -> Option<WeekRange> {
        self.week_range
    }

    pub fn build(
        &self,
        category: Category,
        employee_id: &str,
    ) -> Result<ReportRequest, PipelineError> {
        let report_title = category.report_title().ok_or_else(|| PipelineError::Render {
            employee_id: employee_id.to_string(),
            message: format!("{} employees are not reported", category),
        })?;
        let no_data = |what: &str| PipelineError::Render {
            employee_id: employee_id.to_string(),
            message: format!("no {} for employee", what),
        };
        let days = self
            .daily_by_employee
            .get(employee_id)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| no_data("retained daily records"))?;
        let weeks = self
            .weekly_by_employee
            .get(employee_id)
            .ok_or_else(|| no_data("weekly aggregates"))?;
        let week_range = self.week_range.ok_or_else(|| no_data("run weeks"))?;

        let profile = &days[0].profile;
        let display_name = profile.display_name();
        let manager_name = profile
            .reports_to_name
            .as_deref()
            .map(title_case)
            .unwrap_or_else(|| UNKNOWN_MANAGER.to_string());

        let zero_hour_days = days.iter().filter(|r| r.is_zero_hours()).count();
        let zero_hour_proportion = zero_hour_days as f64 / days.len() as f64;
        let weeks_below_threshold = weeks
            .iter()
            .filter(|w| w.daily_productive_average < self.gap_threshold)
            .count();

        let daily = days
            .iter()
            .map(|r| DailyPoint {
                date: r.date,
                week: r.week,
                hours: r.hours,
                total_hours: r.total_hours(),
                total_label: hours_to_hhmm(r.total_hours()),
            })
            .collect();

        let weekly = weeks
            .iter()
            .map(|w| WeeklyPoint {
                week: w.week,
                hours: w.hours,
                total_hours: w.total_hours,
                daily_productive_average: w.daily_productive_average,
                total_label: hours_to_hhmm(w.total_hours),
                average_label: hours_to_hhmm(w.daily_productive_average),
            })
            .collect();

        let week_slices = self
            .run_weeks
            .iter()
            .enumerate()
            .map(|(i, week)| week_slice(i + 1, *week, days))
            .collect();

        let text = ReportText {
            title: format!("{} ({})", report_title, week_range.label()),
            employee_info: vec![
                format!("Employee ID: {}.", employee_id),
                format!("Name: {}.", display_name),
                format!("Reports To: {}.", manager_name),
                format!(
                    "Total Days with Zero Productive Hours: {} ({}).",
                    zero_hour_days,
                    percent(zero_hour_proportion)
                ),
                format!(
                    "Total Weeks Where Daily Productive Average is Below Threshold ({} hours): {}.",
                    self.gap_threshold.normalize(),
                    weeks_below_threshold
                ),
            ],
            description: description_for(category),
        };

        debug!(
            "Assembled {} request for {}: {} days, {} weeks",
            category,
            employee_id,
            days.len(),
            weeks.len()
        );

        Ok(ReportRequest {
            category,
            report_title,
            employee_id: employee_id.to_string(),
            display_name,
            manager_name,
            week_range,
            zero_hour_days,
            zero_hour_proportion,
            weeks_below_threshold,
            text,
            daily,
            weekly,
            week_slices,
        })
    }
}

fn week_slice(week_number: usize, week: NaiveDate, days: &[AttendanceRecord]) -> WeekSlice {
    let mut running_total = Decimal::ZERO;
    let mut count = 0u32;
    let days = days
        .iter()
        .filter(|r| r.week == week)
        .map(|r| {
            let total = r.total_hours();
            running_total += total;
            count += 1;
            let accumulated_average = running_total / Decimal::from(count);
            SliceDay {
                date: r.date,
                total_hours: total,
                accumulated_average,
                accumulated_label: hours_to_hhmm(accumulated_average),
                zero_activity: total == Decimal::ZERO,
            }
        })
        .collect();
    WeekSlice {
        week_number,
        week,
        days,
    }
}

fn description_for(category: Category) -> Vec<String> {
    let weekly_chart = match category {
        Category::MissingProductivity => {
            "The chart below displays the user's weekly hours by category. No productive, \
             undefined or unproductive time was recorded in any week of this period; any \
             hours shown are holiday or PTO."
        }
        _ => {
            "The chart below displays the user's weekly working hours. Each bar corresponds \
             to a specific category, as described in the legend beneath the chart. The line \
             shows the trend of the user's average hours worked each week, and the markers \
             with data labels indicate the exact average for that week."
        }
    };
    vec![
        "How to read this report?".to_string(),
        weekly_chart.to_string(),
        "To dive deeper into each week, refer to the auxiliary charts. They are arranged \
         chronologically, each one representing a single week. The bars show the total \
         hours worked per day, highlighted days had zero activity, and the line is the \
         accumulated average working hours. The value at the end of the line is the final \
         average for that week."
            .to_string(),
    ]
}

// --- Renderer Seam ---

/// Turns one assembled request into an artifact under `target_dir` and returns its
/// path. The artifact name must keep the employee id from
/// [`ReportRequest::artifact_stem`].
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(
        &self,
        request: &ReportRequest,
        target_dir: &Path,
    ) -> Result<PathBuf, PipelineError>;
}

/// Writes the request as pretty JSON, one file per employee.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArtifactRenderer;

#[async_trait]
impl ReportRenderer for JsonArtifactRenderer {
    async fn render(
        &self,
        request: &ReportRequest,
        target_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(target_dir).await.map_err(|e| {
            io_context(e, format!("Failed to create report directory: {:?}", target_dir))
        })?;
        let path = target_dir.join(format!("{}.json", request.artifact_stem()));
        let json = serde_json::to_string_pretty(request)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| io_context(e, format!("Failed to write report artifact: {:?}", path)))?;
        debug!("Wrote report artifact {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_weekly;
    use crate::config::PipelineConfig;
    use crate::record::{week_start, EmployeeProfile, HourCategory};
    use chrono::Weekday;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    fn day(emp: &str, date: &str, active: Decimal, profile: &EmployeeProfile) -> AttendanceRecord {
        let date = d(date);
        AttendanceRecord {
            employee_id: emp.to_string(),
            date,
            week: week_start(date, Weekday::Sun),
            hours: CategoryHours::default().with(HourCategory::ProductiveActive, active),
            profile: profile.clone(),
        }
    }

    fn jane() -> EmployeeProfile {
        EmployeeProfile {
            user_name: Some("JANE DOE".to_string()),
            reports_to_name: Some("mary major".to_string()),
            ..Default::default()
        }
    }

    fn fixture() -> (Vec<AttendanceRecord>, PipelineConfig) {
        let jane = jane();
        let other = EmployeeProfile::default();
        let records = vec![
            // Unsorted on purpose.
            day("A12345", "2024-01-10", dec!(3), &jane),
            day("A12345", "2024-01-08", dec!(1), &jane),
            day("A12345", "2024-01-09", dec!(0), &jane),
            day("A12345", "2024-01-22", dec!(4), &jane),
            // Another employee stretches the run to three weeks.
            day("B54321", "2024-01-15", dec!(8), &other),
        ];
        (records, PipelineConfig::default())
    }

    #[test]
    fn hhmm_formatting() {
        assert_eq!(hours_to_hhmm(dec!(7.5)), "07h:30m");
        assert_eq!(hours_to_hhmm(dec!(0)), "00h:00m");
        assert_eq!(hours_to_hhmm(dec!(12.25)), "12h:15m");
        assert_eq!(hours_to_hhmm(dec!(1.9999)), "02h:00m");
        assert_eq!(hours_to_hhmm(dec!(1.0001)), "01h:00m");
    }

    #[test]
    fn request_carries_text_and_series() {
        let (records, config) = fixture();
        let weekly = aggregate_weekly(&records);
        let context = ReportContext::new(&records, &weekly, &config);

        let request = context.build(Category::GapDays, "A12345").unwrap();

        assert_eq!(request.display_name, "Jane Doe");
        assert_eq!(request.manager_name, "Mary Major");
        assert_eq!(request.zero_hour_days, 1);
        assert_eq!(request.weeks_below_threshold, 1);
        assert_eq!(
            request.text.title,
            "Gap Days Report (Jan 07, 2024 - Jan 27, 2024)"
        );
        assert_eq!(request.text.employee_info[0], "Employee ID: A12345.");
        assert_eq!(
            request.text.employee_info[3],
            "Total Days with Zero Productive Hours: 1 (25.00%)."
        );
        assert_eq!(
            request.text.employee_info[4],
            "Total Weeks Where Daily Productive Average is Below Threshold (2 hours): 1."
        );
        assert_eq!(request.artifact_stem(), "Gap Days Report - A12345 Jane Doe");

        let dates: Vec<NaiveDate> = request.daily.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![d("2024-01-08"), d("2024-01-09"), d("2024-01-10"), d("2024-01-22")]
        );
        assert_eq!(request.weekly.len(), 2);
        assert_eq!(request.weekly[0].average_label, "01h:20m");
    }

    #[test]
    fn week_slices_cover_every_run_week_with_expanding_mean() {
        let (records, config) = fixture();
        let weekly = aggregate_weekly(&records);
        let context = ReportContext::new(&records, &weekly, &config);

        let request = context.build(Category::GapDays, "A12345").unwrap();
        assert_eq!(request.week_slices.len(), 3);

        let first = &request.week_slices[0];
        assert_eq!(first.week_number, 1);
        let averages: Vec<Decimal> = first.days.iter().map(|s| s.accumulated_average).collect();
        assert_eq!(averages, vec![dec!(1), dec!(0.5), dec!(4) / dec!(3)]);
        assert!(first.days[1].zero_activity);
        assert_eq!(first.days[2].accumulated_label, "01h:20m");

        // Week of Jan 14 only has the other employee's data.
        assert!(request.week_slices[1].days.is_empty());
        assert_eq!(request.week_slices[1].final_average(), None);
        assert_eq!(request.week_slices[2].final_average(), Some(dec!(4)));
    }

    #[test]
    fn manager_and_name_fallbacks() {
        let (records, config) = fixture();
        let weekly = aggregate_weekly(&records);
        let context = ReportContext::new(&records, &weekly, &config);

        let request = context.build(Category::MissingProductivity, "B54321").unwrap();
        assert_eq!(request.manager_name, UNKNOWN_MANAGER);
        assert_eq!(request.display_name, "");
        assert!(request.text.title.starts_with("Missing Productivity Report ("));
    }

    #[test]
    fn unknown_employee_is_a_render_error() {
        let (records, config) = fixture();
        let weekly = aggregate_weekly(&records);
        let context = ReportContext::new(&records, &weekly, &config);

        assert!(matches!(
            context.build(Category::GapDays, "Z99999"),
            Err(PipelineError::Render { employee_id, .. }) if employee_id == "Z99999"
        ));
    }

    #[test]
    fn normal_employees_get_no_report() {
        let (records, config) = fixture();
        let weekly = aggregate_weekly(&records);
        let context = ReportContext::new(&records, &weekly, &config);
        let employee_id = records[0].employee_id.clone();

        assert!(context.build(Category::GapDays, &employee_id).is_ok());
        assert!(matches!(
            context.build(Category::Normal, &employee_id),
            Err(PipelineError::Render { message, .. }) if message.contains("not reported")
        ));
    }

    #[tokio::test]
    async fn json_renderer_writes_named_artifact() {
        let (records, config) = fixture();
        let weekly = aggregate_weekly(&records);
        let context = ReportContext::new(&records, &weekly, &config);
        let request = context.build(Category::GapDays, "A12345").unwrap();

        let root = tempfile::tempdir().expect("tempdir");
        let target = root.path().join("reports/gap_days");
        let path = JsonArtifactRenderer.render(&request, &target).await.unwrap();

        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("Gap Days Report - A12345 Jane Doe.json")
        );
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["employee_id"], "A12345");
        assert_eq!(written["category"], "GapDays");
    }
}
