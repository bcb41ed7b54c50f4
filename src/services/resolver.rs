//! User/subscription context resolution.
//!
//! Evaluated fresh on every request: load (or lazily create) the profile,
//! project the subscription state machine onto it, and hand back an immutable
//! `UserContext`. The lazy creation is the only write this path performs, so
//! repeated concurrent resolutions are idempotent and side-effect-free.

use chrono::Utc;

use crate::auth::identity::Credential;
use crate::models::plan::PlanName;
use crate::models::user::{entitlement, Tier, UserContext, UserProfile};
use crate::store::CacheStore;

pub fn profile_key(user_id: &str) -> String {
    format!("user:{user_id}:profile")
}

#[derive(Clone)]
pub struct ContextResolver {
    store: CacheStore,
}

impl ContextResolver {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    pub async fn load_profile(&self, user_id: &str) -> UserProfile {
        let now = Utc::now();
        let fields = self.store.hgetall(&profile_key(user_id)).await;
        if fields.is_empty() {
            // First sighting of this identity: persist free-tier defaults.
            // Absent-only writes, so a profile that merely read as empty
            // (transient store failure) is not clobbered.
            let profile = UserProfile::new_free(now);
            let created = self
                .store
                .hset_if_absent(&profile_key(user_id), &profile.to_hash())
                .await;
            if created {
                tracing::info!(user_id = user_id, "Created new user profile");
            }
            return profile;
        }
        UserProfile::from_hash(&fields, now)
    }

    pub async fn resolve(&self, credential: &Credential) -> UserContext {
        let user_id = credential.user_id().to_string();
        let profile = self.load_profile(&user_id).await;

        let now = Utc::now();
        let ent = entitlement(profile.plan_name, profile.expiry_date, now);

        // Past the grace window the account is observably free: the plan and
        // expiry projection clears along with the tier. The stored profile is
        // left untouched (soft expiry, no write).
        let (plan_name, expiry_date) = if ent.tier == Tier::Free {
            (PlanName::Free, None)
        } else {
            (profile.plan_name, profile.expiry_date)
        };

        UserContext {
            user_id,
            is_guest: credential.is_guest(),
            tier: ent.tier,
            plan_name,
            expiry_date,
            is_active: ent.is_active,
            is_locked: ent.is_locked,
            xp: profile.xp,
            coins: profile.coins,
            streak_days: profile.streak_days,
        }
    }
}
