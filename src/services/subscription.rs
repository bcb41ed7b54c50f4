//! Subscription activation and durability re-application.

use chrono::{DateTime, Utc};

use crate::models::plan::PlanName;
use crate::models::user::Tier;
use crate::services::resolver::profile_key;
use crate::store::sessions::FREE_SESSION_TTL_SECS;
use crate::store::{CacheStore, SessionDirectory};

/// Expiry for a plan activated now. `None` means the plan never expires.
pub fn plan_expiry(plan: PlanName, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    plan.duration().map(|d| now + d)
}

/// Activate or renew a subscription: write the plan fields onto the profile
/// and re-apply session durability for the new tier. Activating a paid plan
/// makes every existing session record persistent; reverting to free puts
/// the 7-day window back on each of them.
pub async fn activate(
    store: &CacheStore,
    sessions: &SessionDirectory,
    user_id: &str,
    plan: PlanName,
) -> bool {
    let now = Utc::now();
    let expiry = plan_expiry(plan, now);

    let written = store
        .hset(
            &profile_key(user_id),
            &[
                ("plan_name".into(), plan.as_str().into()),
                (
                    "expiry_date".into(),
                    expiry
                        .map(|d| d.to_rfc3339())
                        .unwrap_or_else(|| "none".into()),
                ),
            ],
        )
        .await;
    if !written {
        return false;
    }

    let tier = if plan == PlanName::Free {
        Tier::Free
    } else {
        Tier::Paid
    };
    apply_tier_durability(sessions, user_id, tier).await;

    tracing::info!(
        user_id = user_id,
        plan = plan.as_str(),
        expiry = ?expiry,
        "Subscription activated"
    );
    true
}

/// Bulk TTL re-application across a user's session records.
pub async fn apply_tier_durability(sessions: &SessionDirectory, user_id: &str, tier: Tier) {
    match tier {
        Tier::Paid => {
            sessions.persist_user_sessions(user_id).await;
        }
        Tier::Free => {
            sessions
                .expire_user_sessions(user_id, FREE_SESSION_TTL_SECS as i64)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn timed_plans_expire_lifetime_does_not() {
        let now: DateTime<Utc> = "2026-08-30T00:00:00Z".parse().unwrap();
        assert_eq!(
            plan_expiry(PlanName::Weekly, now),
            Some(now + Duration::days(7))
        );
        assert_eq!(
            plan_expiry(PlanName::Monthly, now),
            Some(now + Duration::days(30))
        );
        assert_eq!(plan_expiry(PlanName::Lifetime, now), None);
        assert_eq!(plan_expiry(PlanName::Free, now), None);
    }
}
