// src/aggregate.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::record::{AttendanceRecord, CategoryHours, EmployeeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub employee_id: EmployeeId,
    pub week: NaiveDate,
    pub hours: CategoryHours,
    /// Mean of daily totals over the days retained for this week.
    pub daily_productive_average: Decimal,
    pub total_hours: Decimal,
    pub productive_only_hours: Decimal,
    pub retained_days: usize,
}

#[derive(Default)]
struct WeekAccumulator {
    hours: CategoryHours,
    daily_total_sum: Decimal,
    productive_only: Decimal,
    days: usize,
}

/// Groups retained daily records by (employee, week start). Output is ordered by
/// employee id, then week.
pub fn aggregate_weekly(records: &[AttendanceRecord]) -> Vec<WeeklyAggregate> {
    let mut groups: BTreeMap<(EmployeeId, NaiveDate), WeekAccumulator> = BTreeMap::new();
    for record in records {
        let acc = groups
            .entry((record.employee_id.clone(), record.week))
            .or_default();
        acc.hours.add_assign(&record.hours);
        acc.daily_total_sum += record.total_hours();
        acc.productive_only += record.productive_only_hours();
        acc.days += 1;
    }

    let aggregates: Vec<WeeklyAggregate> = groups
        .into_iter()
        .map(|((employee_id, week), acc)| {
            // A group only exists because at least one row landed in it.
            let daily_productive_average = acc.daily_total_sum / Decimal::from(acc.days);
            let total_hours = acc.hours.total();
            debug!(
                "Week {} for {}: days={}, total={}, avg={}",
                week, employee_id, acc.days, total_hours, daily_productive_average
            );
            WeeklyAggregate {
                employee_id,
                week,
                hours: acc.hours,
                daily_productive_average,
                total_hours,
                productive_only_hours: acc.productive_only,
                retained_days: acc.days,
            }
        })
        .collect();

    info!(
        "Aggregated {} daily records into {} employee-weeks",
        records.len(),
        aggregates.len()
    );
    aggregates
}

/// First week start through the last day of the final week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekRange {
    /// `None` when there are no aggregates to span.
    pub fn spanning(weekly: &[WeeklyAggregate]) -> Option<Self> {
        let start = weekly.iter().map(|w| w.week).min()?;
        let last_week = weekly.iter().map(|w| w.week).max()?;
        Some(Self {
            start,
            end: last_week + chrono::Duration::days(6),
        })
    }

    /// Human form used in report titles, e.g. `Jan 07, 2024 - Feb 03, 2024`.
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%b %d, %Y"),
            self.end.format("%b %d, %Y")
        )
    }
}

/// Distinct week starts in ascending order.
pub fn run_weeks(weekly: &[WeeklyAggregate]) -> Vec<NaiveDate> {
    let weeks: std::collections::BTreeSet<NaiveDate> = weekly.iter().map(|w| w.week).collect();
    weeks.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::record::{week_start, EmployeeProfile, HourCategory};
    use crate::weekend::drop_unworked_weekends;
    use chrono::Weekday;
    use rust_decimal_macros::dec;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    fn day(emp: &str, date: &str, hours: CategoryHours) -> AttendanceRecord {
        let date = d(date);
        AttendanceRecord {
            employee_id: emp.to_string(),
            date,
            week: week_start(date, Weekday::Sun),
            hours,
            profile: EmployeeProfile::default(),
        }
    }

    fn active(h: Decimal) -> CategoryHours {
        CategoryHours::default().with(HourCategory::ProductiveActive, h)
    }

    #[test]
    fn average_divides_by_retained_days_not_seven() {
        // Week of Sun 2024-01-07: Sunday and Saturday unworked, five weekdays of 4h.
        let mut records = vec![day("A00001", "2024-01-07", active(dec!(0)))];
        for date in ["2024-01-08", "2024-01-09", "2024-01-10", "2024-01-11", "2024-01-12"] {
            records.push(day("A00001", date, active(dec!(4))));
        }
        records.push(day("A00001", "2024-01-13", active(dec!(0))));

        let retained = drop_unworked_weekends(&records, &PipelineConfig::default());
        let weekly = aggregate_weekly(&retained);

        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].retained_days, 5);
        assert_eq!(weekly[0].daily_productive_average, dec!(4));
        assert_eq!(weekly[0].total_hours, dec!(20));

        // Filtering after aggregation would have produced 20 / 7.
        let unfiltered = aggregate_weekly(&records);
        assert!(unfiltered[0].daily_productive_average < dec!(3));
    }

    #[test]
    fn total_equals_sum_of_category_sums_exactly() {
        let mixed = |a: Decimal, h: Decimal, p: Decimal| {
            CategoryHours::default()
                .with(HourCategory::ProductiveActive, a)
                .with(HourCategory::Holiday, h)
                .with(HourCategory::Pto, p)
                .with(HourCategory::Unproductive, dec!(0.1))
        };
        let records = vec![
            day("A00001", "2024-01-08", mixed(dec!(0.1), dec!(0), dec!(0.2))),
            day("A00001", "2024-01-09", mixed(dec!(0.7), dec!(8), dec!(0))),
            day("A00001", "2024-01-10", mixed(dec!(3.3), dec!(0), dec!(0.3))),
        ];
        let weekly = aggregate_weekly(&records);
        let agg = &weekly[0];

        let category_sum: Decimal = agg.hours.iter().map(|(_, h)| h).sum();
        let daily_sum: Decimal = records.iter().map(|r| r.total_hours()).sum();
        assert_eq!(agg.total_hours, category_sum);
        assert_eq!(agg.total_hours, daily_sum);
        assert_eq!(agg.total_hours, dec!(12.9));
        assert_eq!(agg.productive_only_hours, dec!(4.4));
        assert_eq!(agg.hours.get(HourCategory::Holiday), dec!(8));
    }

    #[test]
    fn groups_by_employee_then_week() {
        let records = vec![
            day("B00002", "2024-01-15", active(dec!(1))),
            day("A00001", "2024-01-15", active(dec!(2))),
            day("B00002", "2024-01-08", active(dec!(3))),
            day("A00001", "2024-01-09", active(dec!(4))),
            day("A00001", "2024-01-10", active(dec!(6))),
        ];
        let weekly = aggregate_weekly(&records);

        let keys: Vec<(String, NaiveDate)> = weekly
            .iter()
            .map(|w| (w.employee_id.clone(), w.week))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A00001".to_string(), d("2024-01-07")),
                ("A00001".to_string(), d("2024-01-14")),
                ("B00002".to_string(), d("2024-01-07")),
                ("B00002".to_string(), d("2024-01-14")),
            ]
        );
        assert_eq!(weekly[0].daily_productive_average, dec!(5));
        assert_eq!(weekly[0].retained_days, 2);

        assert_eq!(run_weeks(&weekly), vec![d("2024-01-07"), d("2024-01-14")]);
        let range = WeekRange::spanning(&weekly).unwrap();
        assert_eq!(range.start, d("2024-01-07"));
        assert_eq!(range.end, d("2024-01-20"));
        assert_eq!(range.label(), "Jan 07, 2024 - Jan 20, 2024");
    }

    #[test]
    fn empty_input_has_no_range() {
        assert!(aggregate_weekly(&[]).is_empty());
        assert_eq!(WeekRange::spanning(&[]), None);
    }
}
