//! Overdue fine computation

use chrono::NaiveDate;

use crate::{config::LendingConfig, models::HistoryEntry};

/// Loan period and per-day fine applied to late returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineSchedule {
    pub loan_period_days: i64,
    pub fine_per_day: i64,
}

impl From<&LendingConfig> for FineSchedule {
    fn from(config: &LendingConfig) -> Self {
        Self {
            loan_period_days: config.loan_period_days,
            fine_per_day: config.fine_per_day,
        }
    }
}

impl FineSchedule {
    /// Days past the loan period for a loan running from `start` to `end`
    pub fn days_late(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        ((end - start).num_days() - self.loan_period_days).max(0)
    }
}

/// Fine owed for an entry, measured up to its return date or `today` while
/// the loan is open. Zero within the loan period.
pub fn check_overdue(entry: &HistoryEntry, today: NaiveDate, schedule: &FineSchedule) -> i64 {
    let end = entry.date_return.unwrap_or(today);
    schedule.days_late(entry.date_check_out, end) * schedule.fine_per_day
}
