// src/record.rs
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// --- Hour Categories ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HourCategory {
    ProductiveActive,
    ProductivePassive,
    Holiday,
    Pto,
    Undefined,
    Unproductive,
}

impl HourCategory {
    /// Chart/export order.
    pub const ALL: [HourCategory; 6] = [
        HourCategory::ProductiveActive,
        HourCategory::ProductivePassive,
        HourCategory::Holiday,
        HourCategory::Pto,
        HourCategory::Undefined,
        HourCategory::Unproductive,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            HourCategory::ProductiveActive => "Productive Active Hours",
            HourCategory::ProductivePassive => "Productive Passive Hours",
            HourCategory::Holiday => "Holiday Hours",
            HourCategory::Pto => "PTO Hours",
            HourCategory::Undefined => "Undefined Hours",
            HourCategory::Unproductive => "Unproductive Hours",
        }
    }

    /// Holiday and PTO are leave, everything else counts as productive-only time.
    pub fn is_productive_only(self) -> bool {
        !matches!(self, HourCategory::Holiday | HourCategory::Pto)
    }

    fn index(self) -> usize {
        match self {
            HourCategory::ProductiveActive => 0,
            HourCategory::ProductivePassive => 1,
            HourCategory::Holiday => 2,
            HourCategory::Pto => 3,
            HourCategory::Undefined => 4,
            HourCategory::Unproductive => 5,
        }
    }
}

/// Hours per category, always holding all six slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryHours([Decimal; 6]);

impl CategoryHours {
    pub fn get(&self, category: HourCategory) -> Decimal {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: HourCategory, hours: Decimal) {
        self.0[category.index()] = hours;
    }

    pub fn with(mut self, category: HourCategory, hours: Decimal) -> Self {
        self.set(category, hours);
        self
    }

    pub fn add_assign(&mut self, other: &CategoryHours) {
        for (slot, value) in self.0.iter_mut().zip(other.0.iter()) {
            *slot += *value;
        }
    }

    pub fn total(&self) -> Decimal {
        self.0.iter().copied().sum()
    }

    pub fn productive_only(&self) -> Decimal {
        HourCategory::ALL
            .iter()
            .filter(|c| c.is_productive_only())
            .map(|c| self.get(*c))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HourCategory, Decimal)> + '_ {
        HourCategory::ALL.iter().map(move |c| (*c, self.get(*c)))
    }
}

// --- Employee Profile ---

/// Descriptive fields carried from the source view; none of them are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub employment_type: Option<String>,
    pub employment_status: Option<String>,
    pub title: Option<String>,
    pub project_code: Option<String>,
    pub location: Option<String>,
    pub reports_to: Option<String>,
    pub reports_to_name: Option<String>,
}

impl EmployeeProfile {
    /// User name when present, otherwise "First Last". Title-cased either way.
    pub fn display_name(&self) -> String {
        match self.user_name.as_deref() {
            Some(user_name) => title_case(user_name),
            None => {
                let first = self.first_name.as_deref().unwrap_or_default();
                let last = self.last_name.as_deref().unwrap_or_default();
                title_case(format!("{} {}", first, last).trim())
            }
        }
    }
}

/// Uppercases the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_is_alpha = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if prev_is_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_alpha = true;
        } else {
            out.push(ch);
            prev_is_alpha = false;
        }
    }
    out
}

// --- Attendance Record ---

pub type EmployeeId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub week: NaiveDate,
    pub hours: CategoryHours,
    pub profile: EmployeeProfile,
}

impl AttendanceRecord {
    pub fn total_hours(&self) -> Decimal {
        self.hours.total()
    }

    pub fn productive_only_hours(&self) -> Decimal {
        self.hours.productive_only()
    }

    pub fn is_zero_hours(&self) -> bool {
        self.total_hours() == dec!(0)
    }
}

/// Start of the week containing `date`, where weeks begin on `anchor`.
pub fn week_start(date: NaiveDate, anchor: Weekday) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_monday() - anchor.num_days_from_monday()) % 7;
    date - chrono::Duration::days(offset as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    #[test]
    fn week_start_anchors_on_sunday() {
        // 2024-01-10 is a Wednesday; the Sunday before is 2024-01-07.
        assert_eq!(week_start(d("2024-01-10"), Weekday::Sun), d("2024-01-07"));
        assert_eq!(week_start(d("2024-01-07"), Weekday::Sun), d("2024-01-07"));
        assert_eq!(week_start(d("2024-01-13"), Weekday::Sun), d("2024-01-07"));
        assert_eq!(week_start(d("2024-01-14"), Weekday::Sun), d("2024-01-14"));
    }

    #[test]
    fn week_start_anchors_on_monday() {
        assert_eq!(week_start(d("2024-01-07"), Weekday::Mon), d("2024-01-01"));
        assert_eq!(week_start(d("2024-01-08"), Weekday::Mon), d("2024-01-08"));
    }

    #[test]
    fn totals_split_leave_from_productive_only() {
        let hours = CategoryHours::default()
            .with(HourCategory::ProductiveActive, dec!(3.5))
            .with(HourCategory::ProductivePassive, dec!(1.25))
            .with(HourCategory::Holiday, dec!(8))
            .with(HourCategory::Pto, dec!(0.5))
            .with(HourCategory::Undefined, dec!(0.25))
            .with(HourCategory::Unproductive, dec!(1));

        assert_eq!(hours.total(), dec!(14.5));
        assert_eq!(hours.productive_only(), dec!(6.0));
    }

    #[test]
    fn display_name_prefers_user_name() {
        let profile = EmployeeProfile {
            user_name: Some("jane DOE".to_string()),
            first_name: Some("ignored".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.display_name(), "Jane Doe");
    }

    #[test]
    fn display_name_falls_back_to_first_and_last() {
        let profile = EmployeeProfile {
            first_name: Some("MARY-ANN".to_string()),
            last_name: Some("o'neil".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.display_name(), "Mary-Ann O'Neil");
    }
}
