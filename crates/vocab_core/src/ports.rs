//! crates/vocab_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the progress engine's core
//! logic. These traits form the boundary of the hexagonal architecture,
//! allowing the core to be independent of the concrete database adapter.

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use uuid::Uuid;

use crate::domain::{
    Achievement, AchievementProgress, EarnedAchievement, LearningInsights, PracticeSession,
    Quiz, SelectionCandidate, UserAchievement, UserStats, WordProgress, WordProgressPatch,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// A referenced user, word, list or session does not exist.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A unique-constraint violation where the duplication is meaningful
    /// to the caller (e.g. subscribing to the same list twice).
    #[error("Already exists: {0}")]
    Conflict(String),
    /// A connection or transaction failure; retryable by the caller.
    #[error("Storage error: {0}")]
    Store(String),
    /// A broken invariant that should never occur in production.
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable progress state: user stats, per-word progress, the streak ledger
/// and practice sessions. The implementation owns transaction and locking
/// discipline; the decision logic it runs lives in [`crate::streak`] and
/// [`crate::mastery`].
#[async_trait]
pub trait ProgressStore: Send + Sync {
    // --- User stats ---

    /// Fetches the stats row, creating a zeroed one if absent.
    async fn get_or_create_stats(&self, user_id: i64) -> PortResult<UserStats>;

    /// Runs the day-boundary streak transaction: lock the stats row, lock
    /// the daily tracker, evaluate the decision table for `today` in the
    /// given timezone, persist. At most one mutation per local day.
    async fn advance_streak(&self, user_id: i64, tz: Tz) -> PortResult<UserStats>;

    // --- Word progress ---

    async fn word_progress(&self, user_id: i64, word_id: i64)
        -> PortResult<Option<WordProgress>>;

    /// Atomic insert-or-update for one practice attempt. A first-insert race
    /// must fall back to the update path, never fail the caller.
    async fn record_attempt(
        &self,
        user_id: i64,
        word_id: i64,
        was_correct: bool,
    ) -> PortResult<WordProgress>;

    /// Upserts the fields carried by the patch; unset fields keep their
    /// stored (or default) values.
    async fn apply_progress_update(
        &self,
        user_id: i64,
        word_id: i64,
        patch: &WordProgressPatch,
    ) -> PortResult<WordProgress>;

    /// Inserts the subscription row and zeroed progress rows for every word
    /// in the list not already tracked, in one transaction. Returns the
    /// number of progress rows created. A duplicate subscription is a
    /// `Conflict`.
    async fn subscribe_to_list(&self, user_id: i64, list_id: i64) -> PortResult<usize>;

    // --- Read-only queries for selection and stats ---

    /// Words in the user's subscribed lists with a recognition score below
    /// the mastery ceiling, unordered.
    async fn daily_candidates(&self, user_id: i64) -> PortResult<Vec<SelectionCandidate>>;

    async fn progress_for_words(
        &self,
        user_id: i64,
        word_ids: &[i64],
    ) -> PortResult<Vec<WordProgress>>;

    /// How many distinct words the user practiced on the given local date.
    async fn practiced_on(&self, user_id: i64, local_date: NaiveDate, tz: Tz)
        -> PortResult<i64>;

    async fn insights(&self, user_id: i64) -> PortResult<LearningInsights>;

    // --- Practice sessions ---

    async fn start_session(&self, user_id: i64, session_type: &str)
        -> PortResult<PracticeSession>;

    async fn session(&self, session_id: Uuid) -> PortResult<PracticeSession>;

    /// The user's sessions, most recently started first.
    async fn sessions_for_user(&self, user_id: i64) -> PortResult<Vec<PracticeSession>>;

    /// Records one answered word within a session. `time_taken` is seconds.
    async fn record_session_word(
        &self,
        session_id: Uuid,
        word_id: i64,
        was_correct: bool,
        time_taken: i32,
    ) -> PortResult<()>;

    /// Closes the session, aggregates its totals and folds practice time
    /// and accuracy into the user's stats row. Ending an already ended
    /// session is a `Conflict`; the fold runs at most once per session.
    async fn end_session(&self, session_id: Uuid) -> PortResult<PracticeSession>;
}

/// Read-only access to the user's settings. Misses are reported as `None`;
/// defaults are applied by the caller.
#[async_trait]
pub trait PreferenceLookup: Send + Sync {
    async fn time_zone(&self, user_id: i64) -> PortResult<Option<String>>;
    async fn daily_goal(&self, user_id: i64) -> PortResult<Option<i32>>;
}

/// Read-only access to the quiz catalog.
#[async_trait]
pub trait QuizCatalog: Send + Sync {
    /// Every quiz for every word in the set; the caller picks one per word.
    async fn quizzes_for_words(&self, word_ids: &[i64]) -> PortResult<Vec<Quiz>>;
}

/// The achievements catalog and per-user award ledger. Which thresholds are
/// due is decided in [`crate::achievements`]; this port only stores.
#[async_trait]
pub trait AchievementStore: Send + Sync {
    /// The whole catalog, lowest-value entries first.
    async fn achievements(&self) -> PortResult<Vec<Achievement>>;

    /// Ids of the achievements the user has already earned.
    async fn earned_achievement_ids(&self, user_id: i64) -> PortResult<Vec<i64>>;

    /// Awards the achievement. Awarding one the user already holds returns
    /// the existing ledger row unchanged.
    async fn award_achievement(
        &self,
        user_id: i64,
        achievement_id: i64,
    ) -> PortResult<UserAchievement>;

    /// Earned achievements joined with catalog data, most recent first.
    async fn user_achievements(&self, user_id: i64) -> PortResult<Vec<EarnedAchievement>>;

    /// The whole catalog flagged with whether the user holds each entry.
    async fn achievement_progress(&self, user_id: i64) -> PortResult<Vec<AchievementProgress>>;
}
