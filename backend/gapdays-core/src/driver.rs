// src/driver.rs
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::classify::Category;
use crate::completion::{ManifestEntry, ReportStatus, RunManifest};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::record::EmployeeId;
use crate::report::{ReportContext, ReportRenderer};

// --- Work Items ---

/// Producer output: the ordered pending ids of one category and where their
/// artifacts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWork {
    pub category: Category,
    pub employee_ids: Vec<EmployeeId>,
    pub target_dir: PathBuf,
}

impl PendingWork {
    pub fn len(&self) -> usize {
        self.employee_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employee_ids.is_empty()
    }
}

// --- Telemetry ---

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub employee_id: EmployeeId,
    pub status: ReportStatus,
    pub elapsed: Duration,
    pub artifact: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchTelemetry {
    pub category: Category,
    pub outcomes: Vec<RenderOutcome>,
    /// Pending ids left out because of the per-run report limit.
    pub deferred: usize,
}

impl BatchTelemetry {
    fn new(category: Category) -> Self {
        Self {
            category,
            outcomes: Vec::new(),
            deferred: 0,
        }
    }

    pub fn completed(&self) -> usize {
        self.count(ReportStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(ReportStatus::Failed)
    }

    fn count(&self, status: ReportStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Mean render time over every attempted employee, failures included.
    pub fn mean_elapsed(&self) -> Option<Duration> {
        if self.outcomes.is_empty() {
            return None;
        }
        let total: Duration = self.outcomes.iter().map(|o| o.elapsed).sum();
        Some(total / self.outcomes.len() as u32)
    }
}

// --- Driver ---

/// Sequential consumer of [`PendingWork`]. One employee at a time, with a fixed delay
/// between renderer calls.
pub struct ReportDriver {
    renderer: Arc<dyn ReportRenderer>,
    manifest: RunManifest,
    run_id: String,
    render_delay: Duration,
    isolate_failures: bool,
    report_limit: Option<usize>,
}

impl ReportDriver {
    pub fn new(
        renderer: Arc<dyn ReportRenderer>,
        manifest: RunManifest,
        run_id: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            renderer,
            manifest,
            run_id: run_id.into(),
            render_delay: config.render_delay,
            isolate_failures: config.isolate_failures,
            report_limit: config.report_limit,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Renders every pending employee. Each attempt is appended to the manifest.
    /// With failure isolation off, the first rendering error is returned and the rest
    /// of the batch is left for the next run.
    pub async fn run(
        &self,
        work: &PendingWork,
        context: &ReportContext,
    ) -> Result<BatchTelemetry, PipelineError> {
        let mut telemetry = BatchTelemetry::new(work.category);
        let take = self
            .report_limit
            .map_or(work.len(), |limit| limit.min(work.len()));
        telemetry.deferred = work.len() - take;
        if telemetry.deferred > 0 {
            info!(
                "Report limit {} reached: deferring {} {} employees to a later run",
                take, telemetry.deferred, work.category
            );
        }

        info!(
            "Rendering {} {} reports into {:?}",
            take, work.category, work.target_dir
        );

        for (i, employee_id) in work.employee_ids.iter().take(take).enumerate() {
            if i > 0 && !self.render_delay.is_zero() {
                sleep(self.render_delay).await;
            }

            let started = Instant::now();
            let result = self.render_one(work, context, employee_id).await;
            let elapsed = started.elapsed();

            match result {
                Ok(path) => {
                    info!(
                        "[{}/{}] {} report for {} done in {:.2?}",
                        i + 1,
                        take,
                        work.category,
                        employee_id,
                        elapsed
                    );
                    self.record(work.category, employee_id, ReportStatus::Completed, Some(&path));
                    telemetry.outcomes.push(RenderOutcome {
                        employee_id: employee_id.clone(),
                        status: ReportStatus::Completed,
                        elapsed,
                        artifact: Some(path),
                        error: None,
                    });
                }
                Err(e) => {
                    error!(
                        "[{}/{}] {} report for {} failed: {}",
                        i + 1,
                        take,
                        work.category,
                        employee_id,
                        e
                    );
                    self.record(work.category, employee_id, ReportStatus::Failed, None);
                    if !self.isolate_failures {
                        warn!("Fail-fast enabled; aborting {} batch", work.category);
                        return Err(e);
                    }
                    telemetry.outcomes.push(RenderOutcome {
                        employee_id: employee_id.clone(),
                        status: ReportStatus::Failed,
                        elapsed,
                        artifact: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if let Some(mean) = telemetry.mean_elapsed() {
            info!(
                "{} batch finished: {} completed, {} failed, average time per report {:.2?}",
                work.category,
                telemetry.completed(),
                telemetry.failed(),
                mean
            );
        }
        Ok(telemetry)
    }

    async fn render_one(
        &self,
        work: &PendingWork,
        context: &ReportContext,
        employee_id: &str,
    ) -> Result<PathBuf, PipelineError> {
        let request = context.build(work.category, employee_id)?;
        self.renderer.render(&request, &work.target_dir).await
    }

    /// Appends to the manifest. A failed append is only logged: the artifact scan
    /// still finds completed reports on the next run.
    fn record(
        &self,
        category: Category,
        employee_id: &str,
        status: ReportStatus,
        artifact: Option<&PathBuf>,
    ) {
        let appended = self.manifest.append(&ManifestEntry {
            run_id: self.run_id.clone(),
            category,
            employee_id: employee_id.to_string(),
            status,
            artifact: artifact
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .map(String::from),
            recorded_at: Utc::now(),
        });
        if let Err(e) = appended {
            warn!(
                "Could not record {} {:?} for {} in manifest {:?}: {}",
                category,
                status,
                employee_id,
                self.manifest.path(),
                e
            );
        }
    }
}

/// Timestamped identifier for one invocation, e.g. `run-20240128T101500Z`.
pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_weekly;
    use crate::record::{week_start, AttendanceRecord, CategoryHours, EmployeeProfile, HourCategory};
    use crate::report::ReportRequest;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Weekday};
    use rust_decimal_macros::dec;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records calls; fails for the listed ids.
    #[derive(Default)]
    struct MockRenderer {
        calls: Mutex<Vec<String>>,
        fail_for: Vec<String>,
    }

    #[async_trait]
    impl ReportRenderer for MockRenderer {
        async fn render(
            &self,
            request: &ReportRequest,
            target_dir: &Path,
        ) -> Result<PathBuf, PipelineError> {
            self.calls.lock().unwrap().push(request.employee_id.clone());
            if self.fail_for.contains(&request.employee_id) {
                return Err(PipelineError::Render {
                    employee_id: request.employee_id.clone(),
                    message: "renderer exploded".to_string(),
                });
            }
            Ok(target_dir.join(format!("{}.json", request.artifact_stem())))
        }
    }

    fn context_for(ids: &[&str]) -> ReportContext {
        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let records: Vec<AttendanceRecord> = ids
            .iter()
            .map(|id| AttendanceRecord {
                employee_id: id.to_string(),
                date,
                week: week_start(date, Weekday::Sun),
                hours: CategoryHours::default().with(HourCategory::ProductiveActive, dec!(1)),
                profile: EmployeeProfile::default(),
            })
            .collect();
        let weekly = aggregate_weekly(&records);
        ReportContext::new(&records, &weekly, &PipelineConfig::default())
    }

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            render_delay: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    fn work(root: &Path, ids: &[&str]) -> PendingWork {
        PendingWork {
            category: Category::GapDays,
            employee_ids: ids.iter().map(|s| s.to_string()).collect(),
            target_dir: root.join("reports/gap_days"),
        }
    }

    #[tokio::test]
    async fn renders_in_order_and_records_manifest() {
        let root = tempfile::tempdir().expect("tempdir");
        let ids = ["A00003", "A00001", "A00002"];
        let renderer = Arc::new(MockRenderer::default());
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(renderer.clone(), manifest.clone(), "run-test", &quick_config());

        let telemetry = driver
            .run(&work(root.path(), &ids), &context_for(&ids))
            .await
            .unwrap();

        assert_eq!(*renderer.calls.lock().unwrap(), ids.to_vec());
        assert_eq!(telemetry.completed(), 3);
        assert_eq!(telemetry.failed(), 0);
        assert!(telemetry.mean_elapsed().is_some());

        let entries = manifest.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.run_id == "run-test"));
        assert_eq!(
            entries[0].artifact.as_deref(),
            Some("Gap Days Report - A00003 .json")
        );
    }

    #[tokio::test]
    async fn failures_are_isolated_by_default() {
        let root = tempfile::tempdir().expect("tempdir");
        let ids = ["A00001", "A00002", "A00003"];
        let renderer = Arc::new(MockRenderer {
            fail_for: vec!["A00002".to_string()],
            ..Default::default()
        });
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(renderer.clone(), manifest.clone(), "run-test", &quick_config());

        let telemetry = driver
            .run(&work(root.path(), &ids), &context_for(&ids))
            .await
            .unwrap();

        assert_eq!(renderer.calls.lock().unwrap().len(), 3);
        assert_eq!(telemetry.completed(), 2);
        assert_eq!(telemetry.failed(), 1);
        assert_eq!(
            manifest.completed_ids(Category::GapDays).unwrap().len(),
            2,
            "failed attempts must not count as completed"
        );
    }

    #[tokio::test]
    async fn fail_fast_stops_at_first_failure() {
        let root = tempfile::tempdir().expect("tempdir");
        let ids = ["A00001", "A00002", "A00003"];
        let renderer = Arc::new(MockRenderer {
            fail_for: vec!["A00002".to_string()],
            ..Default::default()
        });
        let config = PipelineConfig {
            isolate_failures: false,
            ..quick_config()
        };
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(renderer.clone(), manifest, "run-test", &config);

        let result = driver
            .run(&work(root.path(), &ids), &context_for(&ids))
            .await;

        assert!(matches!(result, Err(PipelineError::Render { .. })));
        assert_eq!(*renderer.calls.lock().unwrap(), vec!["A00001", "A00002"]);
    }

    #[tokio::test]
    async fn missing_employee_data_is_a_failure_not_a_panic() {
        let root = tempfile::tempdir().expect("tempdir");
        let renderer = Arc::new(MockRenderer::default());
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(renderer.clone(), manifest, "run-test", &quick_config());

        let telemetry = driver
            .run(&work(root.path(), &["A00001", "Z99999"]), &context_for(&["A00001"]))
            .await
            .unwrap();

        assert_eq!(telemetry.completed(), 1);
        assert_eq!(telemetry.failed(), 1);
        assert_eq!(renderer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unwritable_manifest_does_not_stop_the_batch() {
        let root = tempfile::tempdir().expect("tempdir");
        // A directory where the manifest file should be makes every append fail.
        std::fs::create_dir_all(root.path().join("report_manifest.jsonl")).unwrap();
        let ids = ["A00001", "A00002", "A00003"];
        let renderer = Arc::new(MockRenderer {
            fail_for: vec!["A00002".to_string()],
            ..Default::default()
        });
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(renderer.clone(), manifest, "run-test", &quick_config());

        let telemetry = driver
            .run(&work(root.path(), &ids), &context_for(&ids))
            .await
            .unwrap();
        assert_eq!(renderer.calls.lock().unwrap().len(), 3);
        assert_eq!(telemetry.completed(), 2);
        assert_eq!(telemetry.failed(), 1);

        // Fail-fast still surfaces the render error, not the manifest one.
        let config = PipelineConfig {
            isolate_failures: false,
            ..quick_config()
        };
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(renderer, manifest, "run-test", &config);
        let result = driver
            .run(&work(root.path(), &ids), &context_for(&ids))
            .await;
        assert!(matches!(result, Err(PipelineError::Render { employee_id, .. }) if employee_id == "A00002"));
    }

    #[tokio::test]
    async fn report_limit_defers_the_tail() {
        let root = tempfile::tempdir().expect("tempdir");
        let ids = ["A00001", "A00002", "A00003"];
        let renderer = Arc::new(MockRenderer::default());
        let config = PipelineConfig {
            report_limit: Some(2),
            ..quick_config()
        };
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(renderer.clone(), manifest, "run-test", &config);

        let telemetry = driver
            .run(&work(root.path(), &ids), &context_for(&ids))
            .await
            .unwrap();

        assert_eq!(telemetry.completed(), 2);
        assert_eq!(telemetry.deferred, 1);
        assert_eq!(*renderer.calls.lock().unwrap(), vec!["A00001", "A00002"]);
    }

    #[tokio::test]
    async fn delay_applies_between_employees_only() {
        let root = tempfile::tempdir().expect("tempdir");
        let ids = ["A00001", "A00002", "A00003"];
        let config = PipelineConfig {
            render_delay: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let manifest = RunManifest::at(root.path(), "report_manifest.jsonl");
        let driver = ReportDriver::new(Arc::new(MockRenderer::default()), manifest, "run-test", &config);

        let started = Instant::now();
        driver
            .run(&work(root.path(), &ids), &context_for(&ids))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
