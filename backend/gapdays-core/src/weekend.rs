// src/weekend.rs
use chrono::Datelike;
use tracing::info;

use crate::config::PipelineConfig;
use crate::record::AttendanceRecord;

/// Drops weekend days on which nothing at all was recorded. Weekend days with any
/// hours stay, so they count fully towards the weekly mean. Must run before
/// aggregation.
pub fn drop_unworked_weekends(
    records: &[AttendanceRecord],
    config: &PipelineConfig,
) -> Vec<AttendanceRecord> {
    let retained: Vec<AttendanceRecord> = records
        .iter()
        .filter(|r| !(config.is_weekend(r.date.weekday()) && r.is_zero_hours()))
        .cloned()
        .collect();
    info!(
        "Weekend filter removed {} unworked weekend days ({} retained)",
        records.len() - retained.len(),
        retained.len()
    );
    retained
}
