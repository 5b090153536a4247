//! Per-user analysis quota.
//!
//! The monthly counter is reset lazily: any access in a calendar month other
//! than the stored reset month zeroes it, however many months were skipped.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::plan::PlanTier;

/// Quota counters embedded in the user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuotaState {
    /// Analyses charged in the current month
    #[serde(default)]
    pub monthly_used: u32,
    /// Analyses charged over the account lifetime
    #[serde(default)]
    pub total_used: u64,
    /// Month (1-12) of the last reset
    #[serde(default)]
    pub last_reset_month: u32,
    /// Year of the last reset
    #[serde(default)]
    pub last_reset_year: i32,
    /// Time of the last charged analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl QuotaState {
    /// Whether `now` falls in a different calendar month than the last reset.
    pub fn needs_reset(&self, now: DateTime<Utc>) -> bool {
        self.last_reset_year != now.year() || self.last_reset_month != now.month()
    }

    /// Zero the monthly counter on a month rollover. Returns true if a reset happened.
    pub fn reset_if_new_month(&mut self, now: DateTime<Utc>) -> bool {
        if !self.needs_reset(now) {
            return false;
        }
        self.monthly_used = 0;
        self.last_reset_month = now.month();
        self.last_reset_year = now.year();
        true
    }

    /// Charge one analysis.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.reset_if_new_month(now);
        self.monthly_used = self.monthly_used.saturating_add(1);
        self.total_used = self.total_used.saturating_add(1);
        self.last_used_at = Some(now);
    }

    /// Whether another analysis fits in `plan`'s allowance.
    pub fn allows(&self, plan: PlanTier) -> bool {
        self.monthly_used < plan.monthly_allowance()
    }
}

/// Quota-relevant view of an identity provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default)]
    pub quota: QuotaState,
}

/// Usage report for a user's current month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuotaSummary {
    pub plan: PlanTier,
    pub monthly_limit: u32,
    pub monthly_used: u32,
    pub remaining: u32,
    pub total_analyses: u64,
    pub can_submit: bool,
    pub next_reset: DateTime<Utc>,
    pub usage_percentage: f64,
    pub current_month: String,
}

impl QuotaSummary {
    /// Build the report from an already reset quota.
    pub fn new(plan: PlanTier, quota: &QuotaState, now: DateTime<Utc>) -> Self {
        let limit = plan.monthly_allowance();
        let used = quota.monthly_used;
        let usage_percentage = if limit > 0 {
            f64::from(used) / f64::from(limit) * 100.0
        } else {
            0.0
        };

        Self {
            plan,
            monthly_limit: limit,
            monthly_used: used,
            remaining: limit.saturating_sub(used),
            total_analyses: quota.total_used,
            can_submit: quota.allows(plan),
            next_reset: first_day_of_next_month(now),
            usage_percentage,
            current_month: month_key(now),
        }
    }
}

/// `YYYY-MM` key for the month containing `now`.
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Midnight UTC on the first day of the month after `now`.
pub fn first_day_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|| now + Duration::days(31))
}
