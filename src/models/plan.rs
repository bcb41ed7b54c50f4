use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::user::Tier;

/// Named subscription products. Unknown names parse to `Free`, so plan
/// lookups always resolve to a defined set of limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanName {
    Free,
    Weekly,
    Monthly,
    Lifetime,
}

impl PlanName {
    pub fn parse(s: &str) -> Self {
        match s {
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "lifetime" => Self::Lifetime,
            _ => Self::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Lifetime => "lifetime",
        }
    }

    /// Subscription duration. `None` means the plan never expires.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Free => None,
            Self::Weekly => Some(Duration::days(7)),
            Self::Monthly => Some(Duration::days(30)),
            Self::Lifetime => None,
        }
    }

    /// Charge amount in KES subunits (cents), used when initializing payment.
    pub fn price_subunits(&self) -> u64 {
        match self {
            Self::Free => 0,
            Self::Weekly => 10_000,
            Self::Monthly => 30_000,
            Self::Lifetime => 200_000,
        }
    }
}

/// Per-tier numeric limits from the plan catalog.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanLimits {
    pub daily_doc_uploads: u32,
    pub daily_image_uploads: u32,
    pub monthly_exam_analyses: u32,
    pub max_sessions: u32,
}

impl PlanLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                daily_doc_uploads: 3,
                daily_image_uploads: 2,
                monthly_exam_analyses: 1,
                max_sessions: 5,
            },
            Tier::Paid => Self {
                daily_doc_uploads: 50,
                daily_image_uploads: 20,
                monthly_exam_analyses: 30,
                max_sessions: 100,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_plan_falls_back_to_free() {
        assert_eq!(PlanName::parse("platinum"), PlanName::Free);
        assert_eq!(PlanName::parse(""), PlanName::Free);
        assert_eq!(PlanName::parse("monthly"), PlanName::Monthly);
    }

    #[test]
    fn lifetime_plan_has_no_expiry() {
        assert!(PlanName::Lifetime.duration().is_none());
        assert_eq!(PlanName::Weekly.duration(), Some(Duration::days(7)));
    }

    #[test]
    fn free_tier_session_cap_is_five() {
        assert_eq!(PlanLimits::for_tier(Tier::Free).max_sessions, 5);
    }
}
