use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::plan::PlanName;

/// Days a lapsed paid subscription stays locked before reverting to free.
pub const GRACE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Paid,
}

/// Stored user profile, persisted as a Redis hash at `user:{id}:profile`.
/// Created lazily with free-tier defaults on first resolution; never deleted
/// (a lapsed subscription soft-expires via tier reversion instead).
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub plan_name: PlanName,
    pub expiry_date: Option<DateTime<Utc>>,
    pub xp: u64,
    pub coins: u64,
    pub streak_days: u32,
    pub daily_doc_uploads: u32,
    pub daily_image_uploads: u32,
    pub monthly_exam_analyses: u32,
    pub last_reset_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new_free(now: DateTime<Utc>) -> Self {
        Self {
            plan_name: PlanName::Free,
            expiry_date: None,
            xp: 0,
            coins: 0,
            streak_days: 0,
            daily_doc_uploads: 0,
            daily_image_uploads: 0,
            monthly_exam_analyses: 0,
            last_reset_date: now.date_naive(),
            created_at: now,
        }
    }

    /// Parse from hash fields. Missing or malformed fields take defaults so a
    /// partially written profile still resolves.
    pub fn from_hash(fields: &HashMap<String, String>, now: DateTime<Utc>) -> Self {
        let get_u64 =
            |k: &str| -> u64 { fields.get(k).and_then(|v| v.parse().ok()).unwrap_or(0) };
        let get_u32 =
            |k: &str| -> u32 { fields.get(k).and_then(|v| v.parse().ok()).unwrap_or(0) };

        let expiry_date = fields
            .get("expiry_date")
            .filter(|v| v.as_str() != "none")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc));

        Self {
            plan_name: fields
                .get("plan_name")
                .map(|v| PlanName::parse(v))
                .unwrap_or(PlanName::Free),
            expiry_date,
            xp: get_u64("xp"),
            coins: get_u64("coins"),
            streak_days: get_u32("streak_days"),
            daily_doc_uploads: get_u32("daily_doc_uploads"),
            daily_image_uploads: get_u32("daily_image_uploads"),
            monthly_exam_analyses: get_u32("monthly_exam_analyses"),
            last_reset_date: fields
                .get("last_reset_date")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| now.date_naive()),
            created_at: fields
                .get("created_at")
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(now),
        }
    }

    pub fn to_hash(&self) -> Vec<(String, String)> {
        vec![
            ("plan_name".into(), self.plan_name.as_str().into()),
            (
                "expiry_date".into(),
                self.expiry_date
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "none".into()),
            ),
            ("xp".into(), self.xp.to_string()),
            ("coins".into(), self.coins.to_string()),
            ("streak_days".into(), self.streak_days.to_string()),
            (
                "daily_doc_uploads".into(),
                self.daily_doc_uploads.to_string(),
            ),
            (
                "daily_image_uploads".into(),
                self.daily_image_uploads.to_string(),
            ),
            (
                "monthly_exam_analyses".into(),
                self.monthly_exam_analyses.to_string(),
            ),
            ("last_reset_date".into(), self.last_reset_date.to_string()),
            ("created_at".into(), self.created_at.to_rfc3339()),
        ]
    }
}

/// Projected subscription state. `tier` is derived, never stored: a paid plan
/// past its grace window reads as free without a profile write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    pub tier: Tier,
    pub is_active: bool,
    pub is_locked: bool,
}

/// The subscription state machine: Guest/Free → active and unlocked;
/// PaidActive while `now <= expiry`; PaidExpiredInGrace (locked) for
/// `GRACE_DAYS` past expiry; after that the one-way reversion to free.
pub fn entitlement(
    plan_name: PlanName,
    expiry_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Entitlement {
    if plan_name == PlanName::Free {
        return Entitlement {
            tier: Tier::Free,
            is_active: true,
            is_locked: false,
        };
    }

    let Some(expiry) = expiry_date else {
        // Lifetime plan: paid, non-expiring
        return Entitlement {
            tier: Tier::Paid,
            is_active: true,
            is_locked: false,
        };
    };

    if now <= expiry {
        Entitlement {
            tier: Tier::Paid,
            is_active: true,
            is_locked: false,
        }
    } else if now <= expiry + chrono::Duration::days(GRACE_DAYS) {
        Entitlement {
            tier: Tier::Paid,
            is_active: false,
            is_locked: true,
        }
    } else {
        Entitlement {
            tier: Tier::Free,
            is_active: true,
            is_locked: false,
        }
    }
}

/// Immutable per-request view of the resolved user, attached as a request
/// extension by the auth middleware.
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub user_id: String,
    pub is_guest: bool,
    pub tier: Tier,
    pub plan_name: PlanName,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_locked: bool,
    pub xp: u64,
    pub coins: u64,
    pub streak_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        "2026-08-30T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn free_plan_is_active_and_unlocked() {
        let e = entitlement(PlanName::Free, None, now());
        assert_eq!(e.tier, Tier::Free);
        assert!(e.is_active);
        assert!(!e.is_locked);
    }

    #[test]
    fn lifetime_plan_never_expires() {
        let e = entitlement(PlanName::Lifetime, None, now());
        assert_eq!(e.tier, Tier::Paid);
        assert!(e.is_active);
        assert!(!e.is_locked);
    }

    #[test]
    fn paid_active_while_within_expiry() {
        let e = entitlement(PlanName::Monthly, Some(now() + Duration::days(3)), now());
        assert_eq!(e.tier, Tier::Paid);
        assert!(e.is_active);
        assert!(!e.is_locked);

        // Boundary: expiring right now still counts as active
        let e = entitlement(PlanName::Monthly, Some(now()), now());
        assert!(e.is_active);
    }

    #[test]
    fn expired_paid_plan_locks_during_grace() {
        let expiry = now() - Duration::days(2);
        let e = entitlement(PlanName::Monthly, Some(expiry), now());
        assert_eq!(e.tier, Tier::Paid);
        assert!(!e.is_active);
        assert!(e.is_locked);
    }

    #[test]
    fn grace_window_boundary() {
        // Exactly GRACE_DAYS past expiry: still locked
        let expiry = now() - Duration::days(GRACE_DAYS);
        let e = entitlement(PlanName::Weekly, Some(expiry), now());
        assert!(e.is_locked);

        // One second beyond: reverted to free, unlocked
        let expiry = now() - Duration::days(GRACE_DAYS) - Duration::seconds(1);
        let e = entitlement(PlanName::Weekly, Some(expiry), now());
        assert_eq!(e.tier, Tier::Free);
        assert!(e.is_active);
        assert!(!e.is_locked);
    }

    #[test]
    fn profile_hash_round_trip() {
        let mut p = UserProfile::new_free(now());
        p.plan_name = PlanName::Monthly;
        p.expiry_date = Some(now() + Duration::days(30));
        p.xp = 120;
        p.coins = 45;
        p.streak_days = 6;
        p.daily_doc_uploads = 2;

        let fields: HashMap<String, String> = p.to_hash().into_iter().collect();
        let back = UserProfile::from_hash(&fields, now());

        assert_eq!(back.plan_name, PlanName::Monthly);
        assert_eq!(back.expiry_date, p.expiry_date);
        assert_eq!(back.xp, 120);
        assert_eq!(back.coins, 45);
        assert_eq!(back.streak_days, 6);
        assert_eq!(back.daily_doc_uploads, 2);
        assert_eq!(back.last_reset_date, p.last_reset_date);
    }

    #[test]
    fn empty_hash_resolves_to_defaults() {
        let back = UserProfile::from_hash(&HashMap::new(), now());
        assert_eq!(back.plan_name, PlanName::Free);
        assert!(back.expiry_date.is_none());
        assert_eq!(back.xp, 0);
    }
}
