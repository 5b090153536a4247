//! Quota gate: monthly admission control.
//!
//! The monthly counter is reset lazily on the first access after a calendar
//! month rollover. Usage tracking is best-effort: a failed write is logged
//! and never rolls back an admission.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use vnotes_firestore::UserRepository;
use vnotes_models::{QuotaSummary, UserRecord};

use crate::error::{QuotaError, QuotaResult};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny { used: u32, limit: u32 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// Admission control backed by the identity provider's user records.
#[derive(Clone)]
pub struct QuotaGate {
    users: UserRepository,
}

impl QuotaGate {
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }

    /// Decide whether `user_id` may submit another job.
    pub async fn admit(&self, user_id: &str) -> QuotaResult<Admission> {
        self.admit_at(user_id, Utc::now()).await
    }

    /// Charge one analysis to `user_id`.
    ///
    /// Failures are logged and swallowed.
    pub async fn record_usage(&self, user_id: &str) {
        if let Err(e) = self.record_usage_at(user_id, Utc::now()).await {
            warn!(user_id = %user_id, error = %e, "Failed to record analysis usage");
        }
    }

    /// Current month's usage report.
    pub async fn usage_summary(&self, user_id: &str) -> QuotaResult<QuotaSummary> {
        let now = Utc::now();
        let user = self.load_current(user_id, now).await?;
        Ok(QuotaSummary::new(user.plan, &user.quota, now))
    }

    pub(crate) async fn admit_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> QuotaResult<Admission> {
        let user = self.load_current(user_id, now).await?;
        let limit = user.plan.monthly_allowance();

        if user.quota.allows(user.plan) {
            debug!(
                user_id = %user_id,
                used = user.quota.monthly_used,
                limit,
                "Admission granted"
            );
            Ok(Admission::Allow)
        } else {
            info!(
                user_id = %user_id,
                used = user.quota.monthly_used,
                limit,
                plan = %user.plan,
                "Admission denied: monthly limit reached"
            );
            Ok(Admission::Deny {
                used: user.quota.monthly_used,
                limit,
            })
        }
    }

    pub(crate) async fn record_usage_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> QuotaResult<()> {
        let mut user = self.fetch(user_id).await?;
        user.quota.record_use(now);
        self.users.update_quota(&user).await?;
        debug!(
            user_id = %user_id,
            monthly_used = user.quota.monthly_used,
            total_used = user.quota.total_used,
            "Recorded analysis usage"
        );
        Ok(())
    }

    /// Load the user and apply a pending month reset, persisting it best-effort.
    async fn load_current(&self, user_id: &str, now: DateTime<Utc>) -> QuotaResult<UserRecord> {
        let mut user = self.fetch(user_id).await?;
        if user.quota.reset_if_new_month(now) {
            info!(user_id = %user_id, "Monthly analysis counter reset");
            if let Err(e) = self.users.update_quota(&user).await {
                warn!(user_id = %user_id, error = %e, "Failed to persist monthly reset");
            }
        }
        Ok(user)
    }

    async fn fetch(&self, user_id: &str) -> QuotaResult<UserRecord> {
        self.users
            .get(user_id)
            .await?
            .ok_or_else(|| QuotaError::UserNotFound(user_id.to_string()))
    }
}
