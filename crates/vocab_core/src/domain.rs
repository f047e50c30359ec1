//! crates/vocab_core/src/domain.rs
//!
//! Defines the pure, core data structures for the progress engine.
//! These structs are independent of any database or serialization format
//! beyond the serde derives needed at the API boundary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user aggregate counters, one row per user.
///
/// Streak fields are mutated only by the streak ledger; diamonds, practice
/// time and accuracy are owned by the progress service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: i64,
    pub diamonds: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    /// None means the user has never had a streak-relevant event.
    pub last_streak_updated_at: Option<DateTime<Utc>>,
    /// Accumulated practice time in minutes.
    pub total_practice_time: i64,
    pub average_accuracy: f64,
}

impl UserStats {
    /// The zeroed row created lazily on a user's first practice-relevant event.
    pub fn zeroed(user_id: i64) -> Self {
        Self {
            user_id,
            diamonds: 0,
            current_streak: 0,
            longest_streak: 0,
            last_streak_updated_at: None,
            total_practice_time: 0,
            average_accuracy: 0.0,
        }
    }
}

/// Per-(user, word) practice statistics. The row is the unit of
/// "is this word due for review".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordProgress {
    pub user_id: i64,
    pub word_id: i64,
    pub recognition_mastery_score: i32,
    pub usage_mastery_score: i32,
    pub practice_count: i64,
    pub success_count: i64,
    /// Remaining reps counter, decremented toward zero on each attempt.
    pub number_of_times_to_practice: i32,
    pub last_practiced: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A structured partial update for a `WordProgress` row. Fields left as
/// `None` are not touched. This replaces ad-hoc dynamic SQL column lists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordProgressPatch {
    pub recognition_mastery_score: Option<i32>,
    pub usage_mastery_score: Option<i32>,
    pub practice_count: Option<i64>,
    pub success_count: Option<i64>,
    pub number_of_times_to_practice: Option<i32>,
    pub last_practiced: Option<DateTime<Utc>>,
}

impl WordProgressPatch {
    pub fn is_empty(&self) -> bool {
        self.recognition_mastery_score.is_none()
            && self.usage_mastery_score.is_none()
            && self.practice_count.is_none()
            && self.success_count.is_none()
            && self.number_of_times_to_practice.is_none()
            && self.last_practiced.is_none()
    }
}

/// Read-only user settings that parameterize daily selection and the
/// timezone-aware day boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub user_id: i64,
    pub daily_word_goal: i32,
    /// IANA timezone name, e.g. "America/Los_Angeles".
    pub time_zone: String,
}

/// The kind of question attached to a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    MultipleChoice,
    TrueFalse,
    FillInBlank,
}

/// A single quiz question for a word. Read-only from this core's perspective.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub word_id: i64,
    pub quiz_type: QuizType,
    pub question: String,
    pub options: Vec<String>,
    pub correct_options: Vec<String>,
}

/// One entry of the daily practice set: a word, the user's progress on it
/// (if any) and one randomly chosen quiz (if the word has any).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyWord {
    pub word_id: i64,
    pub progress: Option<WordProgress>,
    pub quiz: Option<Quiz>,
}

/// Progress toward the user's daily word goal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGoalProgress {
    pub daily_goal: i32,
    pub practiced_today: i64,
    pub remaining: i64,
}

/// Aggregate mastery counters surfaced alongside user stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningInsights {
    pub words_mastered: i64,
    pub words_in_progress: i64,
    pub average_accuracy: f64,
}

/// The read-only aggregate returned by `get_user_stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsSummary {
    pub diamonds: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub daily_progress: DailyGoalProgress,
    pub insights: LearningInsights,
}

/// An explicit practice session, opened by the client and closed with
/// aggregated results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSession {
    pub id: Uuid,
    pub user_id: i64,
    pub session_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_questions: i64,
    pub correct_answers: i64,
    /// Total answer time in seconds, summed over session words.
    pub total_time: i64,
}

/// The measurement an achievement's threshold is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCriteria {
    /// Current streak length in days.
    Streak,
    /// Lifetime average accuracy in [0, 1].
    Accuracy,
    /// Number of mastered words.
    Words,
}

/// One entry of the achievements catalog. Read-only from this core's
/// perspective; awarding happens against the ledger, not the catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub criteria: AchievementCriteria,
    pub threshold: f64,
    pub points: i32,
}

/// A ledger row: one achievement earned by one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub user_id: i64,
    pub achievement_id: i64,
    pub achieved_at: DateTime<Utc>,
}

/// An earned achievement joined with its catalog entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub achieved_at: DateTime<Utc>,
}

/// A catalog entry flagged with whether the user has earned it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub earned: bool,
}

/// A word eligible for daily selection, before ordering and quiz attachment.
/// `updated_at` is the review-staleness key.
#[derive(Debug, Clone)]
pub struct SelectionCandidate {
    pub word_id: i64,
    pub recognition_mastery_score: i32,
    pub updated_at: DateTime<Utc>,
}

/// The local calendar date guard preventing more than one streak mutation
/// per user per local day.
#[derive(Debug, Clone, Copy)]
pub struct StreakDailyTracker {
    pub user_id: i64,
    pub last_processed_date: NaiveDate,
}
