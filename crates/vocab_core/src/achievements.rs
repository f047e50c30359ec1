//! crates/vocab_core/src/achievements.rs
//!
//! Threshold checks for the achievements catalog. An achievement names a
//! measurement (streak length, lifetime accuracy, mastered-word count) and
//! a numeric threshold; when the measurement reaches the threshold the
//! achievement is awarded, once. The check itself is pure; the award ledger
//! lives behind [`crate::ports::AchievementStore`].

use std::collections::HashSet;

use crate::domain::{Achievement, AchievementCriteria};

/// Whether the measured value satisfies the achievement's threshold.
pub fn satisfied(achievement: &Achievement, value: f64) -> bool {
    value >= achievement.threshold
}

/// Ids of catalog achievements for `criteria` that `value` satisfies and the
/// user has not earned yet, in ascending threshold order so a single jump
/// awards the smaller milestones first.
pub fn newly_earned(
    catalog: &[Achievement],
    earned: &HashSet<i64>,
    criteria: AchievementCriteria,
    value: f64,
) -> Vec<i64> {
    let mut hits: Vec<&Achievement> = catalog
        .iter()
        .filter(|a| a.criteria == criteria && !earned.contains(&a.id) && satisfied(a, value))
        .collect();
    hits.sort_by(|a, b| {
        a.threshold
            .partial_cmp(&b.threshold)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.into_iter().map(|a| a.id).collect()
}
