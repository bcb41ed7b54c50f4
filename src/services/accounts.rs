//! Account maintenance: merging a guest identity into an authenticated one.

use crate::models::user::{UserContext, UserProfile};
use crate::services::resolver::profile_key;
use crate::store::sessions::membership_key;
use crate::store::{CacheStore, SessionDirectory};

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MergeOutcome {
    pub merged_sessions: usize,
    pub xp_added: u64,
    pub coins_added: u64,
}

/// Counter credits a guest contributes to the target profile. Applied via
/// `HINCRBY`, so the target ends up with the field-wise sum.
fn gamification_credits(guest: &UserProfile) -> Vec<(&'static str, i64)> {
    let mut credits = Vec::new();
    if guest.xp > 0 {
        credits.push(("xp", guest.xp as i64));
    }
    if guest.coins > 0 {
        credits.push(("coins", guest.coins as i64));
    }
    credits
}

/// Final batch of a merge: union the moved ids into the target's membership
/// set and delete the guest's membership and profile keys, atomically. After
/// it runs the guest's membership set is gone, hence empty.
fn finalize_pipe(target_id: &str, guest_id: &str, moved: &[String]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for sid in moved {
        pipe.sadd(membership_key(target_id), sid).ignore();
    }
    pipe.del(membership_key(guest_id)).ignore();
    pipe.del(profile_key(guest_id)).ignore();
    pipe
}

/// Move everything owned by `guest_id` onto the authenticated target:
/// counters are credited onto the target profile, each session record is
/// rewritten under the target's ownership and tier durability, and the
/// membership union plus guest-key deletion happen in one atomic batch.
/// Afterwards the guest's membership set is empty.
pub async fn merge_guest_into(
    store: &CacheStore,
    sessions: &SessionDirectory,
    guest_id: &str,
    target: &UserContext,
) -> MergeOutcome {
    let now = chrono::Utc::now();
    let guest_fields = store.hgetall(&profile_key(guest_id)).await;
    let guest_profile = UserProfile::from_hash(&guest_fields, now);

    // Field-wise gamification merge: xp and coins sum, streak takes the max.
    // Atomic field credits; concurrent merges cannot lose an increment.
    for (field, delta) in gamification_credits(&guest_profile) {
        store
            .hincrby(&profile_key(&target.user_id), field, delta)
            .await;
    }
    if guest_profile.streak_days > target.streak_days {
        store
            .hset(
                &profile_key(&target.user_id),
                &[(
                    "streak_days".into(),
                    guest_profile.streak_days.to_string(),
                )],
            )
            .await;
    }

    // Re-home each session record under the new owner before the membership
    // sets change, so a concurrent reader never sees a record pointing at an
    // identity that doesn't hold it.
    let guest_sessions = sessions.list_user_sessions(guest_id).await;
    let mut moved = Vec::with_capacity(guest_sessions.len());
    for sid in &guest_sessions {
        match sessions.get_session(sid).await {
            Some(mut record) => {
                record.owner = target.user_id.clone();
                record.tier = target.tier;
                record.plan_name = target.plan_name;
                record.expiry_date = target.expiry_date;
                if sessions.save_session(&record).await {
                    moved.push(sid.clone());
                }
            }
            None => {
                // Expired record, stale membership entry
                tracing::debug!(session_id = %sid, "Skipping dangling guest session");
            }
        }
    }

    store
        .exec_atomic(&finalize_pipe(&target.user_id, guest_id, &moved))
        .await;

    tracing::info!(
        guest_id = guest_id,
        user_id = %target.user_id,
        sessions = moved.len(),
        "Merged guest account"
    );

    MergeOutcome {
        merged_sessions: moved.len(),
        xp_added: guest_profile.xp,
        coins_added: guest_profile.coins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn packed_contains(pipe: &redis::Pipeline, needle: &[u8]) -> bool {
        let packed = pipe.get_packed_pipeline();
        packed.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn credits_applied_as_increments_sum_fieldwise() {
        let mut guest = UserProfile::new_free(Utc::now());
        guest.xp = 40;
        guest.coins = 5;

        let credits = gamification_credits(&guest);
        assert_eq!(credits, vec![("xp", 40), ("coins", 5)]);

        // HINCRBY on a target holding (100, 10) lands on the sums
        let (mut xp, mut coins) = (100i64, 10i64);
        for (field, delta) in credits {
            match field {
                "xp" => xp += delta,
                "coins" => coins += delta,
                _ => unreachable!(),
            }
        }
        assert_eq!((xp, coins), (140, 15));
    }

    #[test]
    fn zero_counters_contribute_no_writes() {
        let guest = UserProfile::new_free(Utc::now());
        assert!(gamification_credits(&guest).is_empty());
    }

    #[test]
    fn finalize_unions_membership_and_deletes_guest_keys_atomically() {
        let moved = vec!["s1".to_string(), "s2".to_string()];
        let pipe = finalize_pipe("auth0|user42", "guest_1", &moved);

        assert!(packed_contains(&pipe, b"MULTI"));
        assert!(packed_contains(&pipe, b"EXEC"));
        assert!(packed_contains(&pipe, b"SADD"));
        // Target set gains the moved ids
        assert!(packed_contains(&pipe, b"user:auth0|user42:sessions"));
        assert!(packed_contains(&pipe, b"s2"));
        // Guest membership set and profile are deleted, leaving nothing behind
        assert!(packed_contains(&pipe, b"user:guest_1:sessions"));
        assert!(packed_contains(&pipe, b"user:guest_1:profile"));
    }
}

