//! Session directory.
//!
//! Maps a user identity to its set of session ids (`user:{id}:sessions`) and
//! each session id to a JSON record (`session:{id}`). The two keys are always
//! written together in one atomic pipeline, so a reader sees either both the
//! record and the membership entry or neither.
//!
//! Durability follows the owner's tier: paid records are persistent, free
//! records carry a 7-day TTL. The policy is re-applied in bulk on tier change.

use crate::models::session::SessionRecord;
use crate::models::user::Tier;
use crate::store::CacheStore;

/// TTL applied to free-tier session records.
pub const FREE_SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

pub fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

pub fn membership_key(user_id: &str) -> String {
    format!("user:{user_id}:sessions")
}

#[derive(Clone)]
pub struct SessionDirectory {
    store: CacheStore,
}

impl SessionDirectory {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Write the record with tier-appropriate durability and register the id
    /// in the owner's membership set, as one atomic unit.
    pub async fn add_session_for_user(&self, record: &SessionRecord) -> bool {
        let payload = match serde_json::to_string(record) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(session_id = %record.session_id, error = %e, "Failed to serialize session");
                return false;
            }
        };

        self.store.exec_atomic(&creation_pipe(record, payload)).await
    }

    /// Deregister the membership entry and delete the record atomically.
    /// After success, listings exclude the id and the record reads not-found.
    pub async fn remove_session_for_user(&self, user_id: &str, session_id: &str) -> bool {
        self.store
            .exec_atomic(&removal_pipe(user_id, session_id))
            .await
    }

    /// Membership set contents. Order is not significant here; display
    /// ordering by `created_at` is the caller's responsibility.
    pub async fn list_user_sessions(&self, user_id: &str) -> Vec<String> {
        self.store.smembers(&membership_key(user_id)).await
    }

    /// Live cardinality of the membership set, for session-cap checks.
    pub async fn session_count(&self, user_id: &str) -> u64 {
        self.store.scard(&membership_key(user_id)).await
    }

    /// Ownership check against the membership set. Access control at the
    /// edge consults this before touching the record.
    pub async fn is_owner(&self, user_id: &str, session_id: &str) -> bool {
        self.store
            .sismember(&membership_key(user_id), session_id)
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        self.store.get_json(&session_key(session_id)).await
    }

    /// Rewrite a record in place, preserving tier durability.
    pub async fn save_session(&self, record: &SessionRecord) -> bool {
        let ttl = match record.tier {
            Tier::Paid => None,
            Tier::Free => Some(FREE_SESSION_TTL_SECS),
        };
        self.store
            .set_json(&session_key(&record.session_id), record, ttl)
            .await
    }

    /// A membership entry whose record has expired is stale; drop it so
    /// listings stay consistent.
    pub async fn prune_stale(&self, user_id: &str, session_id: &str) {
        tracing::debug!(user_id = user_id, session_id = session_id, "Pruning stale session entry");
        self.store
            .srem(&membership_key(user_id), session_id)
            .await;
    }

    /// Make every session record of a user durable (paid upgrade).
    pub async fn persist_user_sessions(&self, user_id: &str) -> bool {
        let sessions = self.list_user_sessions(user_id).await;
        if sessions.is_empty() {
            return true;
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for sid in &sessions {
            pipe.persist(session_key(sid)).ignore();
        }
        self.store.exec_atomic(&pipe).await
    }

    /// Re-apply a TTL to every session record of a user (downgrade to free).
    pub async fn expire_user_sessions(&self, user_id: &str, ttl_seconds: i64) -> bool {
        let sessions = self.list_user_sessions(user_id).await;
        if sessions.is_empty() {
            return true;
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for sid in &sessions {
            pipe.expire(session_key(sid), ttl_seconds).ignore();
        }
        self.store.exec_atomic(&pipe).await
    }
}

fn creation_pipe(record: &SessionRecord, payload: String) -> redis::Pipeline {
    let skey = session_key(&record.session_id);
    let mkey = membership_key(&record.owner);

    let mut pipe = redis::pipe();
    pipe.atomic();
    match record.tier {
        Tier::Paid => {
            pipe.set(&skey, payload).ignore();
        }
        Tier::Free => {
            pipe.set_ex(&skey, payload, FREE_SESSION_TTL_SECS).ignore();
        }
    }
    pipe.sadd(&mkey, &record.session_id).ignore();
    pipe
}

fn removal_pipe(user_id: &str, session_id: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe.srem(membership_key(user_id), session_id).ignore();
    pipe.del(session_key(session_id)).ignore();
    pipe
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::PlanName;
    use crate::models::session::SessionMode;

    fn packed_contains(pipe: &redis::Pipeline, needle: &[u8]) -> bool {
        let packed = pipe.get_packed_pipeline();
        packed.windows(needle.len()).any(|w| w == needle)
    }

    fn free_record() -> SessionRecord {
        SessionRecord {
            session_id: "s1".into(),
            document_name: "notes.txt".into(),
            created_at: "2026-08-30T10:00:00Z".parse().unwrap(),
            mode: SessionMode::Study,
            owner: "guest_1".into(),
            tier: Tier::Free,
            plan_name: PlanName::Free,
            expiry_date: None,
            history: Vec::new(),
            study_started_at: None,
        }
    }

    #[test]
    fn key_layout() {
        assert_eq!(session_key("abc"), "session:abc");
        assert_eq!(membership_key("guest_1"), "user:guest_1:sessions");
    }

    #[test]
    fn creation_writes_record_and_membership_in_one_transaction() {
        let pipe = creation_pipe(&free_record(), "{}".into());
        assert!(packed_contains(&pipe, b"MULTI"));
        assert!(packed_contains(&pipe, b"EXEC"));
        // Free tier: record written with its TTL, id added to the set
        assert!(packed_contains(&pipe, b"SETEX"));
        assert!(packed_contains(&pipe, b"SADD"));
        assert!(packed_contains(&pipe, b"session:s1"));
        assert!(packed_contains(&pipe, b"user:guest_1:sessions"));
    }

    #[test]
    fn paid_records_are_created_without_a_ttl() {
        let mut record = free_record();
        record.tier = Tier::Paid;
        let pipe = creation_pipe(&record, "{}".into());
        assert!(!packed_contains(&pipe, b"SETEX"));
        assert!(packed_contains(&pipe, b"SADD"));
    }

    #[test]
    fn removal_drops_membership_and_record_in_one_transaction() {
        let pipe = removal_pipe("guest_1", "s1");
        assert!(packed_contains(&pipe, b"MULTI"));
        assert!(packed_contains(&pipe, b"EXEC"));
        assert!(packed_contains(&pipe, b"SREM"));
        assert!(packed_contains(&pipe, b"DEL"));
        assert!(packed_contains(&pipe, b"session:s1"));
        assert!(packed_contains(&pipe, b"user:guest_1:sessions"));
    }
}
