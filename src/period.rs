// 📅 Financial Periods - Calendar ordering for statement months
//
// Period ids are storage keys and are not monotonic. Anything that asks
// "which period comes first" orders by (year, month).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinancialPeriod {
    pub id: i64,
    pub property_id: String,
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl FinancialPeriod {
    pub fn new(id: i64, property_id: impl Into<String>, year: i32, month: u32) -> Self {
        FinancialPeriod {
            id,
            property_id: property_id.into(),
            year,
            month,
        }
    }

    /// Months since year 0, for window arithmetic
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// Calendar order, ignoring id
    pub fn calendar_cmp(&self, other: &FinancialPeriod) -> Ordering {
        (self.year, self.month).cmp(&(other.year, other.month))
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for FinancialPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.property_id, self.label())
    }
}

/// Signed month distance from `begin` to `end`
pub fn months_between(begin: &FinancialPeriod, end: &FinancialPeriod) -> i64 {
    end.ordinal() - begin.ordinal()
}

/// Parse "YYYY-MM" into (year, month)
pub fn parse_period_label(label: &str) -> Result<(i32, u32)> {
    let (y, m) = label
        .trim()
        .split_once('-')
        .ok_or_else(|| anyhow!("Period must look like YYYY-MM: {}", label))?;
    let year: i32 = y.parse().map_err(|_| anyhow!("Invalid year in period: {}", label))?;
    let month: u32 = m.parse().map_err(|_| anyhow!("Invalid month in period: {}", label))?;
    if !(1..=12).contains(&month) {
        return Err(anyhow!("Month out of range in period: {}", label));
    }
    Ok((year, month))
}

/// Most recent period strictly before `current`, by calendar
pub fn prior_period<'a>(periods: &'a [FinancialPeriod], current: &FinancialPeriod) -> Option<&'a FinancialPeriod> {
    periods
        .iter()
        .filter(|p| p.calendar_cmp(current) == Ordering::Less)
        .max_by(|a, b| a.calendar_cmp(b))
}

/// Earliest period on record
pub fn earliest_period(periods: &[FinancialPeriod]) -> Option<&FinancialPeriod> {
    periods.iter().min_by(|a, b| a.calendar_cmp(b))
}
