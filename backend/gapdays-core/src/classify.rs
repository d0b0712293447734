// src/classify.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

use crate::aggregate::WeeklyAggregate;
use crate::config::PipelineConfig;
use crate::record::EmployeeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    MissingProductivity,
    GapDays,
    Normal,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::MissingProductivity,
        Category::GapDays,
        Category::Normal,
    ];

    /// Categories that get a per-employee report.
    pub const REPORTED: [Category; 2] = [Category::MissingProductivity, Category::GapDays];

    /// `None` for categories outside [`Category::REPORTED`].
    pub fn report_title(self) -> Option<&'static str> {
        match self {
            Category::MissingProductivity => Some("Missing Productivity Report"),
            Category::GapDays => Some("Gap Days Report"),
            Category::Normal => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::MissingProductivity => "MissingProductivity",
            Category::GapDays => "GapDays",
            Category::Normal => "Normal",
        };
        f.write_str(name)
    }
}

/// Disjoint partition of every employee seen in the weekly aggregates.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    assignments: HashMap<EmployeeId, Category>,
    /// Per category, ids in order of first appearance in the weekly aggregates.
    members: HashMap<Category, Vec<EmployeeId>>,
    population: usize,
}

impl Classification {
    pub fn category_of(&self, employee_id: &str) -> Option<Category> {
        self.assignments.get(employee_id).copied()
    }

    pub fn ids(&self, category: Category) -> &[EmployeeId] {
        self.members
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn id_set(&self, category: Category) -> HashSet<&str> {
        self.ids(category).iter().map(String::as_str).collect()
    }

    pub fn count(&self, category: Category) -> usize {
        self.ids(category).len()
    }

    pub fn population(&self) -> usize {
        self.population
    }

    /// Share of the population in `category`; 0.0 when nobody was classified.
    pub fn proportion(&self, category: Category) -> f64 {
        if self.population == 0 {
            return 0.0;
        }
        self.count(category) as f64 / self.population as f64
    }

    fn assign(&mut self, employee_id: &str, category: Category) {
        self.assignments.insert(employee_id.to_string(), category);
        self.members
            .entry(category)
            .or_default()
            .push(employee_id.to_string());
    }
}

#[derive(Default)]
struct EmployeeTotals {
    productive_only: Decimal,
    below_threshold_weeks: usize,
}

/// Two ordered passes: zero productive-only hours over the whole window first, then
/// any week whose daily average is strictly below the threshold. Everyone else is
/// normal.
pub fn classify(weekly: &[WeeklyAggregate], config: &PipelineConfig) -> Classification {
    let mut order: Vec<&str> = Vec::new();
    let mut totals: HashMap<&str, EmployeeTotals> = HashMap::new();
    for week in weekly {
        let entry = totals.entry(week.employee_id.as_str()).or_insert_with(|| {
            order.push(week.employee_id.as_str());
            EmployeeTotals::default()
        });
        entry.productive_only += week.productive_only_hours;
        if week.daily_productive_average < config.gap_threshold {
            entry.below_threshold_weeks += 1;
        }
    }

    let mut classification = Classification {
        population: order.len(),
        ..Default::default()
    };

    // Missing productivity takes precedence and removes the employee from later passes.
    let mut remaining = Vec::with_capacity(order.len());
    for employee_id in &order {
        if totals[employee_id].productive_only == dec!(0) {
            classification.assign(employee_id, Category::MissingProductivity);
        } else {
            remaining.push(*employee_id);
        }
    }

    for employee_id in remaining {
        let below = totals[employee_id].below_threshold_weeks;
        let category = if below > 0 {
            Category::GapDays
        } else {
            Category::Normal
        };
        debug!(
            "Employee {} -> {} ({} weeks below {})",
            employee_id, category, below, config.gap_threshold
        );
        classification.assign(employee_id, category);
    }

    info!("Total users analyzed: {}", classification.population());
    for category in Category::ALL {
        info!(
            "{}: {} users ({:.2}% of population)",
            category,
            classification.count(category),
            classification.proportion(category) * 100.0
        );
    }
    classification
}
