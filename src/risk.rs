//! Dwell-time risk tiers.
//!
//! [`RiskTier::classify`] is the only place the duration thresholds live.
//! The report tier and the "at risk" draw colour both go through it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Seconds on screen after which a person is `medium` risk.
pub const MEDIUM_AFTER_SECS: f64 = 60.0;
/// Seconds on screen after which a person is `high` risk.
pub const HIGH_AFTER_SECS: f64 = 120.0;
/// Seconds on screen after which a person is `critical` risk.
pub const CRITICAL_AFTER_SECS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Map an on-screen duration to its tier. Each bound is exclusive, so
    /// exactly 60.0 seconds is still `Low`.
    pub fn classify(duration_seconds: f64) -> Self {
        if duration_seconds > CRITICAL_AFTER_SECS {
            Self::Critical
        } else if duration_seconds > HIGH_AFTER_SECS {
            Self::High
        } else if duration_seconds > MEDIUM_AFTER_SECS {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn is_critical(self) -> bool {
        self == Self::Critical
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_exclusive() {
        assert_eq!(RiskTier::classify(0.0), RiskTier::Low);
        assert_eq!(RiskTier::classify(60.0), RiskTier::Low);
        assert_eq!(RiskTier::classify(60.0001), RiskTier::Medium);
        assert_eq!(RiskTier::classify(120.0), RiskTier::Medium);
        assert_eq!(RiskTier::classify(120.0001), RiskTier::High);
        assert_eq!(RiskTier::classify(300.0), RiskTier::High);
        assert_eq!(RiskTier::classify(300.0001), RiskTier::Critical);
    }

    #[test]
    fn test_monotonic_in_duration() {
        let mut previous = RiskTier::Low;
        for step in 0..=4000 {
            let tier = RiskTier::classify(step as f64 * 0.1);
            assert!(tier >= previous, "tier dropped at {}s", step as f64 * 0.1);
            previous = tier;
        }
        assert_eq!(previous, RiskTier::Critical);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RiskTier::Critical).unwrap(), "\"critical\"");
        assert_eq!(RiskTier::Medium.to_string(), "medium");
    }
}
