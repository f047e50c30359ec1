//! crates/vocab_core/src/mastery.rs
//!
//! Per-word mastery bookkeeping: the bounded score step function, attempt
//! counters and the structured patch path.
//!
//! The score model is intentionally simple: a correct answer moves the
//! recognition score one step toward the ceiling, an incorrect answer
//! leaves it where it is. Bounded, monotonic in successes, and a word is
//! "mastered" once the score reaches the ceiling.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{WordProgress, WordProgressPatch};

/// Default mastery ceiling; a score at or above it means "learned".
pub const DEFAULT_MASTERY_CEILING: i32 = 5;

/// Default remaining-reps counter for a fresh progress row.
pub const DEFAULT_TIMES_TO_PRACTICE: i32 = 5;

/// How far in the past bulk-initialized rows are backdated so that
/// staleness heuristics treat never-practiced words as due immediately.
pub const BULK_INIT_BACKDATE_DAYS: i64 = 30;

/// Whether a word counts as learned for selection and insights.
pub fn is_mastered(progress: &WordProgress, ceiling: i32) -> bool {
    progress.recognition_mastery_score >= ceiling
}

/// Builds the progress row for a user's very first attempt at a word.
/// The recognition score is seeded success-weighted: 1 for a correct
/// first answer, 0 otherwise.
pub fn initial_attempt(
    user_id: i64,
    word_id: i64,
    was_correct: bool,
    now: DateTime<Utc>,
    ceiling: i32,
) -> WordProgress {
    let seed = if was_correct { 1 } else { 0 };
    WordProgress {
        user_id,
        word_id,
        recognition_mastery_score: seed.min(ceiling),
        usage_mastery_score: 0,
        practice_count: 1,
        success_count: if was_correct { 1 } else { 0 },
        number_of_times_to_practice: (DEFAULT_TIMES_TO_PRACTICE - 1).max(0),
        last_practiced: Some(now),
        updated_at: now,
    }
}

/// The zeroed row created when a user subscribes to a list containing the
/// word. Timestamps are backdated so the word is immediately eligible for
/// review.
pub fn bulk_init_row(user_id: i64, word_id: i64, now: DateTime<Utc>) -> WordProgress {
    let backdated = now - Duration::days(BULK_INIT_BACKDATE_DAYS);
    WordProgress {
        user_id,
        word_id,
        recognition_mastery_score: 0,
        usage_mastery_score: 0,
        practice_count: 0,
        success_count: 0,
        number_of_times_to_practice: DEFAULT_TIMES_TO_PRACTICE,
        last_practiced: None,
        updated_at: backdated,
    }
}

/// Applies one practice attempt to an existing progress row.
pub fn apply_attempt(
    progress: &mut WordProgress,
    was_correct: bool,
    now: DateTime<Utc>,
    ceiling: i32,
) {
    progress.practice_count += 1;
    if was_correct {
        progress.success_count += 1;
        progress.recognition_mastery_score =
            (progress.recognition_mastery_score + 1).min(ceiling);
    }
    // Clamp rather than trust whatever the row held before.
    progress.success_count = progress.success_count.min(progress.practice_count);
    progress.number_of_times_to_practice = (progress.number_of_times_to_practice - 1).max(0);
    progress.last_practiced = Some(now);
    progress.updated_at = now;
}

/// Applies a structured partial update, clamping every field into its
/// invariant range. Unset fields are left untouched.
pub fn apply_patch(
    progress: &mut WordProgress,
    patch: &WordProgressPatch,
    now: DateTime<Utc>,
    ceiling: i32,
) {
    if let Some(score) = patch.recognition_mastery_score {
        progress.recognition_mastery_score = score.clamp(0, ceiling);
    }
    if let Some(score) = patch.usage_mastery_score {
        progress.usage_mastery_score = score.clamp(0, ceiling);
    }
    if let Some(count) = patch.practice_count {
        progress.practice_count = count.max(0);
    }
    if let Some(count) = patch.success_count {
        progress.success_count = count.max(0);
    }
    if let Some(reps) = patch.number_of_times_to_practice {
        progress.number_of_times_to_practice = reps.max(0);
    }
    if let Some(ts) = patch.last_practiced {
        progress.last_practiced = Some(ts);
    }
    // success_count <= practice_count holds regardless of caller deltas.
    progress.success_count = progress.success_count.min(progress.practice_count);
    progress.updated_at = now;
}
