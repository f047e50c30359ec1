//! crates/vocab_core/src/selection.rs
//!
//! Ordering and truncation for the daily practice set.
//!
//! Candidates (subscribed words below the mastery ceiling) are ranked by an
//! urgency bucket first and review staleness second: partially learned words
//! at risk of decay come before barely started ones, which come before the
//! rest; within a bucket the least recently touched word wins. The result is
//! truncated to the user's daily goal.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{Quiz, SelectionCandidate};

/// The urgency bucket of a recognition score, lower is more urgent.
///
/// The bands are the original deployment's 30–60 / under-30 split of an
/// 80-point threshold, rescaled to the configured ceiling.
pub fn urgency_bucket(score: i32, ceiling: i32) -> u8 {
    let mid_low = (ceiling * 3 + 7) / 8; // 0.375 * ceiling, rounded up
    let mid_high = ceiling * 3 / 4; // 0.75 * ceiling, rounded down
    if score >= mid_low && score <= mid_high {
        0
    } else if score < mid_low {
        1
    } else {
        2
    }
}

/// Orders candidates by urgency then staleness, drops duplicate word ids
/// (first occurrence wins) and truncates to `goal` entries.
pub fn select(mut candidates: Vec<SelectionCandidate>, goal: usize, ceiling: i32) -> Vec<SelectionCandidate> {
    candidates.sort_by(|a, b| {
        urgency_bucket(a.recognition_mastery_score, ceiling)
            .cmp(&urgency_bucket(b.recognition_mastery_score, ceiling))
            .then(a.updated_at.cmp(&b.updated_at))
            .then(a.word_id.cmp(&b.word_id))
    });

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.word_id));
    candidates.truncate(goal);
    candidates
}

/// Picks one quiz uniformly at random. Randomized per call on purpose, to
/// vary question phrasing across requests.
pub fn pick_quiz<R: Rng + ?Sized>(rng: &mut R, quizzes: &[Quiz]) -> Option<Quiz> {
    quizzes.choose(rng).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuizType;
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn cand(word_id: i64, score: i32, hour: u32) -> SelectionCandidate {
        SelectionCandidate {
            word_id,
            recognition_mastery_score: score,
            updated_at: at(hour),
        }
    }

    fn quiz(id: i64) -> Quiz {
        Quiz {
            id,
            word_id: 1,
            quiz_type: QuizType::MultipleChoice,
            question: "pick one".into(),
            options: vec!["a".into(), "b".into()],
            correct_options: vec!["a".into()],
        }
    }

    #[test]
    fn buckets_scale_from_ceiling() {
        // Ceiling 5: mid-range (decaying) is 2..=3.
        assert_eq!(urgency_bucket(2, 5), 0);
        assert_eq!(urgency_bucket(3, 5), 0);
        assert_eq!(urgency_bucket(0, 5), 1);
        assert_eq!(urgency_bucket(1, 5), 1);
        assert_eq!(urgency_bucket(4, 5), 2);
        // The original 80-point scale keeps its 30..60 band.
        assert_eq!(urgency_bucket(30, 80), 0);
        assert_eq!(urgency_bucket(60, 80), 0);
        assert_eq!(urgency_bucket(29, 80), 1);
        assert_eq!(urgency_bucket(61, 80), 2);
    }

    #[test]
    fn decaying_words_come_before_new_ones() {
        let picked = select(
            vec![cand(1, 0, 1), cand(2, 3, 5), cand(3, 4, 2)],
            10,
            5,
        );
        let ids: Vec<i64> = picked.iter().map(|c| c.word_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn staleness_breaks_ties_within_a_bucket() {
        let picked = select(
            vec![cand(1, 2, 9), cand(2, 3, 1), cand(3, 2, 4)],
            10,
            5,
        );
        let ids: Vec<i64> = picked.iter().map(|c| c.word_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn result_is_bounded_by_goal() {
        let candidates: Vec<_> = (0..20).map(|i| cand(i, 0, 1)).collect();
        assert_eq!(select(candidates, 5, 5).len(), 5);
    }

    #[test]
    fn duplicate_word_ids_are_dropped() {
        let picked = select(vec![cand(1, 2, 1), cand(1, 2, 2), cand(2, 0, 1)], 10, 5);
        let ids: Vec<i64> = picked.iter().map(|c| c.word_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn empty_candidate_set_is_not_an_error() {
        assert!(select(Vec::new(), 5, 5).is_empty());
    }

    #[test]
    fn quiz_pick_is_uniform_over_available_quizzes() {
        let quizzes = vec![quiz(1), quiz(2), quiz(3)];
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(pick_quiz(&mut rng, &quizzes).unwrap().id);
        }
        assert_eq!(seen.len(), 3);
        assert!(pick_quiz(&mut rng, &[]).is_none());
    }
}
