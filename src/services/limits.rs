//! Usage and limit enforcement.
//!
//! Two independent gates, both read from the plan catalog for the resolved
//! tier: per-action counters with daily/monthly resets, and the concurrent
//! session cap measured against the live membership set.

use chrono::{Datelike, NaiveDate, Utc};

use crate::error::{AppError, AppResult};
use crate::models::plan::PlanLimits;
use crate::models::user::{Tier, UserProfile};
use crate::services::resolver::profile_key;
use crate::store::{CacheStore, SessionDirectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAction {
    DocUpload,
    ImageUpload,
    ExamAnalysis,
}

impl UsageAction {
    pub fn field(&self) -> &'static str {
        match self {
            Self::DocUpload => "daily_doc_uploads",
            Self::ImageUpload => "daily_image_uploads",
            Self::ExamAnalysis => "monthly_exam_analyses",
        }
    }

    pub fn limit(&self, limits: &PlanLimits) -> u32 {
        match self {
            Self::DocUpload => limits.daily_doc_uploads,
            Self::ImageUpload => limits.daily_image_uploads,
            Self::ExamAnalysis => limits.monthly_exam_analyses,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::DocUpload => "daily document upload limit reached",
            Self::ImageUpload => "daily image upload limit reached",
            Self::ExamAnalysis => "monthly exam analysis limit reached",
        }
    }
}

/// Zero counters whose reset window has rolled over. Daily counters reset on
/// any date change; the monthly counter only when the year-month differs.
pub fn apply_rollover(profile: &mut UserProfile, today: NaiveDate) {
    if profile.last_reset_date == today {
        return;
    }
    profile.daily_doc_uploads = 0;
    profile.daily_image_uploads = 0;

    let stored = profile.last_reset_date;
    if (stored.year(), stored.month()) != (today.year(), today.month()) {
        profile.monthly_exam_analyses = 0;
    }
    profile.last_reset_date = today;
}

pub fn counter(profile: &UserProfile, action: UsageAction) -> u32 {
    match action {
        UsageAction::DocUpload => profile.daily_doc_uploads,
        UsageAction::ImageUpload => profile.daily_image_uploads,
        UsageAction::ExamAnalysis => profile.monthly_exam_analyses,
    }
}

fn set_counter(profile: &mut UserProfile, action: UsageAction, value: u32) {
    match action {
        UsageAction::DocUpload => profile.daily_doc_uploads = value,
        UsageAction::ImageUpload => profile.daily_image_uploads = value,
        UsageAction::ExamAnalysis => profile.monthly_exam_analyses = value,
    }
}

/// The full counter write-set. Every check persists all three counters, not
/// just the incremented one: a rollover that zeroed a counter must reach the
/// store before `last_reset_date` advances past it, or the zeroing is lost.
pub fn counter_fields(profile: &UserProfile) -> Vec<(String, String)> {
    vec![
        (
            "daily_doc_uploads".into(),
            profile.daily_doc_uploads.to_string(),
        ),
        (
            "daily_image_uploads".into(),
            profile.daily_image_uploads.to_string(),
        ),
        (
            "monthly_exam_analyses".into(),
            profile.monthly_exam_analyses.to_string(),
        ),
        (
            "last_reset_date".into(),
            profile.last_reset_date.to_string(),
        ),
    ]
}

/// Session-cap predicate: at or above the plan's cap, creation is refused.
pub fn cap_reached(current_sessions: u64, max_sessions: u32) -> bool {
    current_sessions >= max_sessions as u64
}

#[derive(Clone)]
pub struct UsageLimiter {
    store: CacheStore,
}

impl UsageLimiter {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Increment-then-compare. The incremented counter is persisted before
    /// the comparison, so a rejected attempt still counts against the quota
    /// (observed behavior, kept deliberately).
    pub async fn check_action(
        &self,
        user_id: &str,
        tier: Tier,
        action: UsageAction,
    ) -> AppResult<()> {
        let now = Utc::now();
        let key = profile_key(user_id);

        let fields = self.store.hgetall(&key).await;
        let mut profile = UserProfile::from_hash(&fields, now);

        apply_rollover(&mut profile, now.date_naive());
        let next = counter(&profile, action) + 1;
        set_counter(&mut profile, action, next);

        self.store.hset(&key, &counter_fields(&profile)).await;

        let limits = PlanLimits::for_tier(tier);
        if next > action.limit(&limits) {
            tracing::info!(
                user_id = user_id,
                action = action.field(),
                count = next,
                "Usage quota exceeded"
            );
            return Err(AppError::QuotaExceeded(action.describe().into()));
        }
        Ok(())
    }

    /// Refuse new sessions at or above the plan's concurrent cap.
    pub async fn check_session_cap(
        &self,
        sessions: &SessionDirectory,
        user_id: &str,
        tier: Tier,
    ) -> AppResult<()> {
        let current = sessions.session_count(user_id).await;
        let limits = PlanLimits::for_tier(tier);
        if cap_reached(current, limits.max_sessions) {
            tracing::info!(
                user_id = user_id,
                sessions = current,
                cap = limits.max_sessions,
                "Session cap reached"
            );
            return Err(AppError::SessionLimitExceeded(
                "concurrent session limit reached for your plan".into(),
            ));
        }
        Ok(())
    }
}
