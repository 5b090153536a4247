//! Subscription plans and their monthly analysis allowance.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Monthly analyses allowed on the free plan.
pub const FREE_MONTHLY_ANALYSES: u32 = 50;
/// Monthly analyses allowed on the premium plan.
pub const PREMIUM_MONTHLY_ANALYSES: u32 = 500;

/// Plan tier enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Premium,
}

impl PlanTier {
    /// Parse from string (case-insensitive). Unknown plans fall back to free.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "premium" => PlanTier::Premium,
            _ => PlanTier::Free,
        }
    }

    /// Number of video analyses allowed per calendar month.
    pub fn monthly_allowance(&self) -> u32 {
        match self {
            PlanTier::Free => FREE_MONTHLY_ANALYSES,
            PlanTier::Premium => PREMIUM_MONTHLY_ANALYSES,
        }
    }

    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowance_table() {
        assert_eq!(PlanTier::Free.monthly_allowance(), 50);
        assert_eq!(PlanTier::Premium.monthly_allowance(), 500);
    }

    #[test]
    fn test_from_str_falls_back_to_free() {
        assert_eq!(PlanTier::from_str("PREMIUM"), PlanTier::Premium);
        assert_eq!(PlanTier::from_str("business"), PlanTier::Free);
        assert_eq!(PlanTier::from_str(""), PlanTier::Free);
    }
}
