use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::plan::PlanName;
use crate::models::user::Tier;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Chat,
    Study,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of a conversation. History order is insertion order and is
/// significant; the sequence is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The per-session record stored as JSON at `session:{id}`. Tier, plan and
/// expiry are snapshotted at creation; durability (TTL vs. persistent) is
/// decided from the owner's tier and may be re-applied on tier change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub document_name: String,
    pub created_at: DateTime<Utc>,
    pub mode: SessionMode,
    pub owner: String,
    pub tier: Tier,
    pub plan_name: PlanName,
    pub expiry_date: Option<DateTime<Utc>>,
    pub history: Vec<ChatMessage>,
    /// Set while a timed study session is running, cleared on end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_started_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn push_turn(&mut self, user_message: String, model_response: String) {
        self.history.push(ChatMessage {
            role: Role::User,
            content: user_message,
        });
        self.history.push(ChatMessage {
            role: Role::Model,
            content: model_response,
        });
    }
}

/// Listing entry for `GET /sessions/`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub document_name: String,
    pub created_at: DateTime<Utc>,
    pub mode: SessionMode,
}

impl From<&SessionRecord> for SessionInfo {
    fn from(r: &SessionRecord) -> Self {
        Self {
            id: r.session_id.clone(),
            document_name: r.document_name.clone(),
            created_at: r.created_at,
            mode: r.mode,
        }
    }
}

/// Newest first, the display order for session listings.
pub fn sort_newest_first(sessions: &mut [SessionInfo]) {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(history: Vec<ChatMessage>) -> SessionRecord {
        SessionRecord {
            session_id: "s1".into(),
            document_name: "notes.txt".into(),
            created_at: "2026-08-30T10:00:00Z".parse().unwrap(),
            mode: SessionMode::Chat,
            owner: "guest_abc".into(),
            tier: Tier::Free,
            plan_name: PlanName::Free,
            expiry_date: None,
            history,
            study_started_at: None,
        }
    }

    #[test]
    fn history_round_trips_in_order() {
        let history = vec![
            ChatMessage {
                role: Role::User,
                content: "summarize this".into(),
            },
            ChatMessage {
                role: Role::Model,
                content: "here is a summary".into(),
            },
            ChatMessage {
                role: Role::User,
                content: "now quiz me".into(),
            },
        ];
        let rec = record(history.clone());

        let json = serde_json::to_string(&rec).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.history, history);
    }

    #[test]
    fn push_turn_appends_role_tagged_pair() {
        let mut rec = record(vec![]);
        rec.push_turn("hello".into(), "hi there".into());
        assert_eq!(rec.history.len(), 2);
        assert_eq!(rec.history[0].role, Role::User);
        assert_eq!(rec.history[1].role, Role::Model);
    }

    #[test]
    fn listing_sorts_newest_first() {
        let mut infos: Vec<SessionInfo> = ["2026-08-28T10:00:00Z", "2026-08-30T10:00:00Z", "2026-08-29T10:00:00Z"]
            .iter()
            .enumerate()
            .map(|(i, ts)| SessionInfo {
                id: format!("s{i}"),
                document_name: "doc".into(),
                created_at: ts.parse().unwrap(),
                mode: SessionMode::Chat,
            })
            .collect();

        sort_newest_first(&mut infos);
        assert_eq!(infos[0].id, "s1");
        assert_eq!(infos[1].id, "s2");
        assert_eq!(infos[2].id, "s0");
    }
}
