//! crates/vocab_core/src/service.rs
//!
//! The progress service: the externally callable façade that composes the
//! mastery tracker, the streak ledger and the daily selection engine.
//!
//! Ordering contract: the mastery upsert commits before the streak check
//! runs, and the two are independent transactions. If the streak update
//! fails after the attempt was durably recorded, the error propagates but
//! the attempt stands; the streak self-corrects on the next attempt.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use rand::thread_rng;
use uuid::Uuid;

use crate::domain::{
    Achievement, AchievementCriteria, AchievementProgress, DailyGoalProgress, DailyWord,
    EarnedAchievement, PracticeSession, Quiz, UserStatsSummary, WordProgress, WordProgressPatch,
};
use crate::ports::{AchievementStore, PortResult, PreferenceLookup, ProgressStore, QuizCatalog};
use crate::{achievements, mastery, selection, streak};

/// Tunables resolved from configuration at construction time.
#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mastery_ceiling: i32,
    pub default_daily_goal: i32,
    /// Fallback timezone for users without a configured one.
    pub default_time_zone: Tz,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mastery_ceiling: mastery::DEFAULT_MASTERY_CEILING,
            default_daily_goal: 5,
            default_time_zone: streak::resolve_time_zone(None),
        }
    }
}

/// The orchestrator over the store, preference, quiz-catalog and
/// achievement ports.
#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    prefs: Arc<dyn PreferenceLookup>,
    quizzes: Arc<dyn QuizCatalog>,
    achievements: Arc<dyn AchievementStore>,
    config: ProgressConfig,
}

impl ProgressService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        prefs: Arc<dyn PreferenceLookup>,
        quizzes: Arc<dyn QuizCatalog>,
        achievements: Arc<dyn AchievementStore>,
        config: ProgressConfig,
    ) -> Self {
        Self {
            store,
            prefs,
            quizzes,
            achievements,
            config,
        }
    }

    async fn user_time_zone(&self, user_id: i64) -> PortResult<Tz> {
        let name = self.prefs.time_zone(user_id).await?;
        Ok(name
            .and_then(|n| n.parse::<Tz>().ok())
            .unwrap_or(self.config.default_time_zone))
    }

    /// Records one practice attempt: mastery first, then the streak check,
    /// then the achievement thresholds the attempt may have crossed.
    pub async fn record_practice_attempt(
        &self,
        user_id: i64,
        word_id: i64,
        was_correct: bool,
    ) -> PortResult<WordProgress> {
        let progress = self
            .store
            .record_attempt(user_id, word_id, was_correct)
            .await?;
        let tz = self.user_time_zone(user_id).await?;
        let stats = self.store.advance_streak(user_id, tz).await?;
        self.check_achievements(
            user_id,
            AchievementCriteria::Streak,
            stats.current_streak as f64,
        )
        .await?;
        if was_correct && mastery::is_mastered(&progress, self.config.mastery_ceiling) {
            let insights = self.store.insights(user_id).await?;
            self.check_achievements(
                user_id,
                AchievementCriteria::Words,
                insights.words_mastered as f64,
            )
            .await?;
        }
        Ok(progress)
    }

    /// Applies an explicit API-level override to a progress row. Read-only
    /// from the streak ledger's perspective: no streak check runs here.
    pub async fn apply_direct_update(
        &self,
        user_id: i64,
        word_id: i64,
        patch: &WordProgressPatch,
    ) -> PortResult<WordProgress> {
        self.store
            .apply_progress_update(user_id, word_id, patch)
            .await
    }

    pub async fn get_word_progress(
        &self,
        user_id: i64,
        word_id: i64,
    ) -> PortResult<Option<WordProgress>> {
        self.store.word_progress(user_id, word_id).await
    }

    /// Subscribes the user to a list, bulk-initializing progress rows for
    /// its words atomically with the subscription record.
    pub async fn subscribe_to_list(&self, user_id: i64, list_id: i64) -> PortResult<usize> {
        self.store.subscribe_to_list(user_id, list_id).await
    }

    /// The daily practice set: subscribed words below the mastery ceiling,
    /// ordered by urgency then staleness, truncated to the daily goal, each
    /// paired with its progress and one randomly chosen quiz.
    pub async fn get_daily_words(&self, user_id: i64) -> PortResult<Vec<DailyWord>> {
        let goal = self
            .prefs
            .daily_goal(user_id)
            .await?
            .unwrap_or(self.config.default_daily_goal)
            .max(0) as usize;

        let candidates = self.store.daily_candidates(user_id).await?;
        let picked = selection::select(candidates, goal, self.config.mastery_ceiling);
        if picked.is_empty() {
            return Ok(Vec::new());
        }

        let word_ids: Vec<i64> = picked.iter().map(|c| c.word_id).collect();
        let mut progress_by_word: HashMap<i64, WordProgress> = self
            .store
            .progress_for_words(user_id, &word_ids)
            .await?
            .into_iter()
            .map(|p| (p.word_id, p))
            .collect();

        let mut quizzes_by_word: HashMap<i64, Vec<Quiz>> = HashMap::new();
        for quiz in self.quizzes.quizzes_for_words(&word_ids).await? {
            quizzes_by_word.entry(quiz.word_id).or_default().push(quiz);
        }

        let mut rng = thread_rng();
        let daily = picked
            .into_iter()
            .map(|c| {
                let quiz = quizzes_by_word
                    .get(&c.word_id)
                    .and_then(|qs| selection::pick_quiz(&mut rng, qs));
                DailyWord {
                    word_id: c.word_id,
                    progress: progress_by_word.remove(&c.word_id),
                    quiz,
                }
            })
            .collect();
        Ok(daily)
    }

    /// The read-only stats aggregate: diamonds, streaks, today's goal
    /// progress and learning insights.
    pub async fn get_user_stats(&self, user_id: i64) -> PortResult<UserStatsSummary> {
        let stats = self.store.get_or_create_stats(user_id).await?;
        let tz = self.user_time_zone(user_id).await?;
        let today = streak::local_date(Utc::now(), tz);
        let practiced_today = self.store.practiced_on(user_id, today, tz).await?;
        let daily_goal = self
            .prefs
            .daily_goal(user_id)
            .await?
            .unwrap_or(self.config.default_daily_goal);
        let insights = self.store.insights(user_id).await?;

        Ok(UserStatsSummary {
            diamonds: stats.diamonds,
            current_streak: stats.current_streak,
            longest_streak: stats.longest_streak,
            daily_progress: DailyGoalProgress {
                daily_goal,
                practiced_today,
                remaining: (daily_goal as i64 - practiced_today).max(0),
            },
            insights,
        })
    }

    // --- Practice sessions ---

    pub async fn start_practice_session(
        &self,
        user_id: i64,
        session_type: &str,
    ) -> PortResult<PracticeSession> {
        self.store.start_session(user_id, session_type).await
    }

    /// Logs one answered word inside a session and feeds the same attempt
    /// through the mastery tracker and the streak ledger.
    pub async fn record_session_word(
        &self,
        session_id: Uuid,
        word_id: i64,
        was_correct: bool,
        time_taken: i32,
    ) -> PortResult<WordProgress> {
        let session = self.store.session(session_id).await?;
        self.store
            .record_session_word(session_id, word_id, was_correct, time_taken)
            .await?;
        self.record_practice_attempt(session.user_id, word_id, was_correct)
            .await
    }

    /// Closes the session, then runs the accuracy threshold check against
    /// the freshly folded stats.
    pub async fn end_practice_session(&self, session_id: Uuid) -> PortResult<PracticeSession> {
        let session = self.store.end_session(session_id).await?;
        let stats = self.store.get_or_create_stats(session.user_id).await?;
        self.check_achievements(
            session.user_id,
            AchievementCriteria::Accuracy,
            stats.average_accuracy,
        )
        .await?;
        Ok(session)
    }

    pub async fn get_practice_session(&self, session_id: Uuid) -> PortResult<PracticeSession> {
        self.store.session(session_id).await
    }

    pub async fn get_practice_sessions(&self, user_id: i64) -> PortResult<Vec<PracticeSession>> {
        self.store.sessions_for_user(user_id).await
    }

    // --- Achievements ---

    pub async fn get_achievement_catalog(&self) -> PortResult<Vec<Achievement>> {
        self.achievements.achievements().await
    }

    pub async fn get_user_achievements(&self, user_id: i64) -> PortResult<Vec<EarnedAchievement>> {
        self.achievements.user_achievements(user_id).await
    }

    pub async fn get_achievement_progress(
        &self,
        user_id: i64,
    ) -> PortResult<Vec<AchievementProgress>> {
        self.achievements.achievement_progress(user_id).await
    }

    /// Awards every unearned achievement for `criteria` whose threshold
    /// `value` now satisfies. Awarding is idempotent, so a re-run after a
    /// partial failure converges.
    async fn check_achievements(
        &self,
        user_id: i64,
        criteria: AchievementCriteria,
        value: f64,
    ) -> PortResult<()> {
        let catalog = self.achievements.achievements().await?;
        if catalog.iter().all(|a| a.criteria != criteria) {
            return Ok(());
        }
        let earned: std::collections::HashSet<i64> = self
            .achievements
            .earned_achievement_ids(user_id)
            .await?
            .into_iter()
            .collect();
        for achievement_id in achievements::newly_earned(&catalog, &earned, criteria, value) {
            self.achievements
                .award_achievement(user_id, achievement_id)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        LearningInsights, QuizType, SelectionCandidate, UserAchievement, UserStats,
    };
    use crate::ports::{PortError, PreferenceLookup, ProgressStore, QuizCatalog};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory store mirroring the adapter's transaction behavior; the
    /// clock is a settable field so day boundaries can be crossed at will.
    #[derive(Default)]
    struct MemStore {
        now: Mutex<DateTime<Utc>>,
        stats: Mutex<HashMap<i64, UserStats>>,
        trackers: Mutex<HashMap<i64, NaiveDate>>,
        progress: Mutex<HashMap<(i64, i64), WordProgress>>,
        subscriptions: Mutex<HashSet<(i64, i64)>>,
        lists: Mutex<HashMap<i64, Vec<i64>>>,
        sessions: Mutex<HashMap<Uuid, PracticeSession>>,
        fail_streak: AtomicBool,
        ceiling: i32,
    }

    impl MemStore {
        fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
                ceiling: mastery::DEFAULT_MASTERY_CEILING,
                ..Default::default()
            }
        }

        fn set_now(&self, now: DateTime<Utc>) {
            *self.now.lock().unwrap() = now;
        }

        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    #[async_trait]
    impl ProgressStore for MemStore {
        async fn get_or_create_stats(&self, user_id: i64) -> PortResult<UserStats> {
            let mut stats = self.stats.lock().unwrap();
            Ok(stats
                .entry(user_id)
                .or_insert_with(|| UserStats::zeroed(user_id))
                .clone())
        }

        async fn advance_streak(&self, user_id: i64, tz: Tz) -> PortResult<UserStats> {
            if self.fail_streak.load(Ordering::SeqCst) {
                return Err(PortError::Store("streak transaction failed".into()));
            }
            let now = self.now();
            let today = streak::local_date(now, tz);
            let mut all = self.stats.lock().unwrap();
            let mut trackers = self.trackers.lock().unwrap();
            let stats = all
                .entry(user_id)
                .or_insert_with(|| UserStats::zeroed(user_id));
            let last_update = streak::local_date_of(stats.last_streak_updated_at, tz);
            let decision = streak::decide(trackers.get(&user_id).copied(), last_update, today);
            if streak::apply(stats, decision) {
                stats.last_streak_updated_at = Some(now);
                trackers.insert(user_id, today);
            }
            Ok(stats.clone())
        }

        async fn word_progress(
            &self,
            user_id: i64,
            word_id: i64,
        ) -> PortResult<Option<WordProgress>> {
            Ok(self
                .progress
                .lock()
                .unwrap()
                .get(&(user_id, word_id))
                .cloned())
        }

        async fn record_attempt(
            &self,
            user_id: i64,
            word_id: i64,
            was_correct: bool,
        ) -> PortResult<WordProgress> {
            let now = self.now();
            let mut progress = self.progress.lock().unwrap();
            let row = progress
                .entry((user_id, word_id))
                .and_modify(|p| mastery::apply_attempt(p, was_correct, now, self.ceiling))
                .or_insert_with(|| {
                    mastery::initial_attempt(user_id, word_id, was_correct, now, self.ceiling)
                });
            Ok(row.clone())
        }

        async fn apply_progress_update(
            &self,
            user_id: i64,
            word_id: i64,
            patch: &WordProgressPatch,
        ) -> PortResult<WordProgress> {
            let now = self.now();
            let mut progress = self.progress.lock().unwrap();
            let row = progress
                .entry((user_id, word_id))
                .or_insert_with(|| mastery::bulk_init_row(user_id, word_id, now));
            mastery::apply_patch(row, patch, now, self.ceiling);
            Ok(row.clone())
        }

        async fn subscribe_to_list(&self, user_id: i64, list_id: i64) -> PortResult<usize> {
            let words = self
                .lists
                .lock()
                .unwrap()
                .get(&list_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("List {list_id} not found")))?;
            if !self.subscriptions.lock().unwrap().insert((user_id, list_id)) {
                return Err(PortError::Conflict(format!(
                    "User {user_id} already subscribed to list {list_id}"
                )));
            }
            let now = self.now();
            let mut progress = self.progress.lock().unwrap();
            let mut created = 0;
            for word_id in words {
                progress.entry((user_id, word_id)).or_insert_with(|| {
                    created += 1;
                    mastery::bulk_init_row(user_id, word_id, now)
                });
            }
            Ok(created)
        }

        async fn daily_candidates(&self, user_id: i64) -> PortResult<Vec<SelectionCandidate>> {
            Ok(self
                .progress
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.user_id == user_id && p.recognition_mastery_score < self.ceiling)
                .map(|p| SelectionCandidate {
                    word_id: p.word_id,
                    recognition_mastery_score: p.recognition_mastery_score,
                    updated_at: p.updated_at,
                })
                .collect())
        }

        async fn progress_for_words(
            &self,
            user_id: i64,
            word_ids: &[i64],
        ) -> PortResult<Vec<WordProgress>> {
            let progress = self.progress.lock().unwrap();
            Ok(word_ids
                .iter()
                .filter_map(|w| progress.get(&(user_id, *w)).cloned())
                .collect())
        }

        async fn practiced_on(
            &self,
            user_id: i64,
            local_date: NaiveDate,
            tz: Tz,
        ) -> PortResult<i64> {
            Ok(self
                .progress
                .lock()
                .unwrap()
                .values()
                .filter(|p| {
                    p.user_id == user_id
                        && streak::local_date_of(p.last_practiced, tz) == Some(local_date)
                })
                .count() as i64)
        }

        async fn insights(&self, user_id: i64) -> PortResult<LearningInsights> {
            let progress = self.progress.lock().unwrap();
            let rows: Vec<_> = progress.values().filter(|p| p.user_id == user_id).collect();
            let mastered = rows
                .iter()
                .filter(|p| mastery::is_mastered(p, self.ceiling))
                .count() as i64;
            let attempts: i64 = rows.iter().map(|p| p.practice_count).sum();
            let successes: i64 = rows.iter().map(|p| p.success_count).sum();
            Ok(LearningInsights {
                words_mastered: mastered,
                words_in_progress: rows.len() as i64 - mastered,
                average_accuracy: if attempts > 0 {
                    successes as f64 / attempts as f64
                } else {
                    0.0
                },
            })
        }

        async fn start_session(
            &self,
            user_id: i64,
            session_type: &str,
        ) -> PortResult<PracticeSession> {
            let session = PracticeSession {
                id: Uuid::new_v4(),
                user_id,
                session_type: session_type.to_string(),
                start_time: self.now(),
                end_time: None,
                total_questions: 0,
                correct_answers: 0,
                total_time: 0,
            };
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(session)
        }

        async fn session(&self, session_id: Uuid) -> PortResult<PracticeSession> {
            self.sessions
                .lock()
                .unwrap()
                .get(&session_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("Session {session_id} not found")))
        }

        async fn sessions_for_user(&self, user_id: i64) -> PortResult<Vec<PracticeSession>> {
            let mut rows: Vec<PracticeSession> = self
                .sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
            Ok(rows)
        }

        async fn record_session_word(
            &self,
            session_id: Uuid,
            _word_id: i64,
            was_correct: bool,
            time_taken: i32,
        ) -> PortResult<()> {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&session_id)
                .ok_or_else(|| PortError::NotFound(format!("Session {session_id} not found")))?;
            session.total_questions += 1;
            session.correct_answers += if was_correct { 1 } else { 0 };
            session.total_time += time_taken as i64;
            Ok(())
        }

        async fn end_session(&self, session_id: Uuid) -> PortResult<PracticeSession> {
            let session = {
                let mut sessions = self.sessions.lock().unwrap();
                let session = sessions.get_mut(&session_id).ok_or_else(|| {
                    PortError::NotFound(format!("Session {session_id} not found"))
                })?;
                if session.end_time.is_some() {
                    return Err(PortError::Conflict(format!(
                        "Session {session_id} already ended"
                    )));
                }
                session.end_time = Some(self.now());
                session.clone()
            };
            // Mirrors the adapter's fold: time in minutes rounded up,
            // accuracy averaged over finished sessions.
            let (finished, accuracy_sum) = {
                let sessions = self.sessions.lock().unwrap();
                let mut count = 0i64;
                let mut sum = 0.0f64;
                for s in sessions.values() {
                    if s.user_id == session.user_id
                        && s.end_time.is_some()
                        && s.total_questions > 0
                    {
                        count += 1;
                        sum += s.correct_answers as f64 / s.total_questions as f64;
                    }
                }
                (count, sum)
            };
            let mut all = self.stats.lock().unwrap();
            let stats = all
                .entry(session.user_id)
                .or_insert_with(|| UserStats::zeroed(session.user_id));
            stats.total_practice_time += (session.total_time + 59) / 60;
            if finished > 0 {
                stats.average_accuracy = accuracy_sum / finished as f64;
            }
            Ok(session)
        }
    }

    #[derive(Default)]
    struct MemPrefs {
        time_zones: Mutex<HashMap<i64, String>>,
        goals: Mutex<HashMap<i64, i32>>,
    }

    #[async_trait]
    impl PreferenceLookup for MemPrefs {
        async fn time_zone(&self, user_id: i64) -> PortResult<Option<String>> {
            Ok(self.time_zones.lock().unwrap().get(&user_id).cloned())
        }

        async fn daily_goal(&self, user_id: i64) -> PortResult<Option<i32>> {
            Ok(self.goals.lock().unwrap().get(&user_id).copied())
        }
    }

    #[derive(Default)]
    struct MemQuizzes {
        by_word: Mutex<HashMap<i64, Vec<Quiz>>>,
    }

    #[async_trait]
    impl QuizCatalog for MemQuizzes {
        async fn quizzes_for_words(&self, word_ids: &[i64]) -> PortResult<Vec<Quiz>> {
            let by_word = self.by_word.lock().unwrap();
            Ok(word_ids
                .iter()
                .flat_map(|w| by_word.get(w).cloned().unwrap_or_default())
                .collect())
        }
    }

    #[derive(Default)]
    struct MemAchievements {
        catalog: Mutex<Vec<Achievement>>,
        earned: Mutex<HashMap<i64, Vec<UserAchievement>>>,
    }

    #[async_trait]
    impl AchievementStore for MemAchievements {
        async fn achievements(&self) -> PortResult<Vec<Achievement>> {
            Ok(self.catalog.lock().unwrap().clone())
        }

        async fn earned_achievement_ids(&self, user_id: i64) -> PortResult<Vec<i64>> {
            Ok(self
                .earned
                .lock()
                .unwrap()
                .get(&user_id)
                .map(|rows| rows.iter().map(|r| r.achievement_id).collect())
                .unwrap_or_default())
        }

        async fn award_achievement(
            &self,
            user_id: i64,
            achievement_id: i64,
        ) -> PortResult<UserAchievement> {
            let mut earned = self.earned.lock().unwrap();
            let rows = earned.entry(user_id).or_default();
            if let Some(existing) = rows.iter().find(|r| r.achievement_id == achievement_id) {
                return Ok(existing.clone());
            }
            let row = UserAchievement {
                user_id,
                achievement_id,
                achieved_at: Utc::now(),
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn user_achievements(&self, user_id: i64) -> PortResult<Vec<EarnedAchievement>> {
            let catalog = self.catalog.lock().unwrap();
            Ok(self
                .earned
                .lock()
                .unwrap()
                .get(&user_id)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|r| {
                            catalog.iter().find(|a| a.id == r.achievement_id).map(|a| {
                                EarnedAchievement {
                                    achievement: a.clone(),
                                    achieved_at: r.achieved_at,
                                }
                            })
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn achievement_progress(
            &self,
            user_id: i64,
        ) -> PortResult<Vec<AchievementProgress>> {
            let earned: HashSet<i64> = self
                .earned_achievement_ids(user_id)
                .await?
                .into_iter()
                .collect();
            Ok(self
                .catalog
                .lock()
                .unwrap()
                .iter()
                .map(|a| AchievementProgress {
                    achievement: a.clone(),
                    earned: earned.contains(&a.id),
                })
                .collect())
        }
    }

    struct Harness {
        store: Arc<MemStore>,
        prefs: Arc<MemPrefs>,
        quizzes: Arc<MemQuizzes>,
        achievements: Arc<MemAchievements>,
        service: ProgressService,
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn milestone(id: i64, criteria: AchievementCriteria, threshold: f64) -> Achievement {
        Achievement {
            id,
            name: format!("milestone {id}"),
            description: None,
            criteria,
            threshold,
            points: 10,
        }
    }

    fn harness(start: DateTime<Utc>) -> Harness {
        let store = Arc::new(MemStore::new(start));
        let prefs = Arc::new(MemPrefs::default());
        let quizzes = Arc::new(MemQuizzes::default());
        let achievements = Arc::new(MemAchievements::default());
        let service = ProgressService::new(
            store.clone(),
            prefs.clone(),
            quizzes.clone(),
            achievements.clone(),
            ProgressConfig::default(),
        );
        Harness {
            store,
            prefs,
            quizzes,
            achievements,
            service,
        }
    }

    fn use_utc(h: &Harness, user_id: i64) {
        h.prefs
            .time_zones
            .lock()
            .unwrap()
            .insert(user_id, "UTC".to_string());
    }

    #[tokio::test]
    async fn first_attempt_starts_streak_and_marks_the_day() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);

        h.service.record_practice_attempt(1, 42, true).await.unwrap();

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 1);
        assert_eq!(
            h.store.trackers.lock().unwrap().get(&1).copied(),
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[tokio::test]
    async fn second_attempt_same_day_is_a_no_op_for_the_streak() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);

        h.service.record_practice_attempt(1, 42, true).await.unwrap();
        h.store.set_now(utc(2024, 1, 1, 18));
        h.service.record_practice_attempt(1, 43, false).await.unwrap();

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.current_streak, 1);
    }

    #[tokio::test]
    async fn consecutive_day_increments_and_gap_resets() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);

        h.service.record_practice_attempt(1, 42, true).await.unwrap();
        h.store.set_now(utc(2024, 1, 2, 9));
        h.service.record_practice_attempt(1, 42, true).await.unwrap();

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.current_streak, 2);

        h.store.set_now(utc(2024, 1, 5, 9));
        h.service.record_practice_attempt(1, 42, true).await.unwrap();

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 2);
    }

    #[tokio::test]
    async fn many_same_day_events_equal_one_event() {
        let h = harness(utc(2024, 1, 1, 8));
        use_utc(&h, 1);

        for hour in 8..16 {
            h.store.set_now(utc(2024, 1, 1, hour));
            h.service.record_practice_attempt(1, 42, true).await.unwrap();
        }

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 1);
    }

    #[tokio::test]
    async fn streak_failure_still_leaves_the_attempt_recorded() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);
        h.store.fail_streak.store(true, Ordering::SeqCst);

        let err = h.service.record_practice_attempt(1, 42, true).await;
        assert!(matches!(err, Err(PortError::Store(_))));

        let progress = h.store.word_progress(1, 42).await.unwrap().unwrap();
        assert_eq!(progress.practice_count, 1);
    }

    #[tokio::test]
    async fn subscribing_bulk_initializes_zeroed_rows() {
        let h = harness(utc(2024, 1, 1, 10));
        h.store.lists.lock().unwrap().insert(9, vec![1, 2, 3]);

        let created = h.service.subscribe_to_list(1, 9).await.unwrap();
        assert_eq!(created, 3);

        for word_id in [1, 2, 3] {
            let p = h.store.word_progress(1, word_id).await.unwrap().unwrap();
            assert_eq!(p.recognition_mastery_score, 0);
            assert_eq!(p.practice_count, 0);
        }

        let dup = h.service.subscribe_to_list(1, 9).await;
        assert!(matches!(dup, Err(PortError::Conflict(_))));
    }

    #[tokio::test]
    async fn daily_words_are_bounded_deduplicated_and_quizzed() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);
        h.prefs.goals.lock().unwrap().insert(1, 3);
        h.store
            .lists
            .lock()
            .unwrap()
            .insert(9, vec![1, 2, 3, 4, 5, 6]);
        h.service.subscribe_to_list(1, 9).await.unwrap();
        h.quizzes.by_word.lock().unwrap().insert(
            1,
            vec![Quiz {
                id: 100,
                word_id: 1,
                quiz_type: QuizType::TrueFalse,
                question: "is it?".into(),
                options: vec!["true".into(), "false".into()],
                correct_options: vec!["true".into()],
            }],
        );

        let daily = h.service.get_daily_words(1).await.unwrap();
        assert_eq!(daily.len(), 3);

        let mut seen = HashSet::new();
        for word in &daily {
            assert!(seen.insert(word.word_id));
            assert!(word.progress.is_some());
        }
        // Words without quizzes are still returned, quiz-less.
        if let Some(first) = daily.iter().find(|w| w.word_id == 1) {
            assert!(first.quiz.is_some());
        }
    }

    #[tokio::test]
    async fn no_subscriptions_means_an_empty_daily_set() {
        let h = harness(utc(2024, 1, 1, 10));
        assert!(h.service.get_daily_words(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mastered_words_leave_the_daily_pool() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);
        h.store.lists.lock().unwrap().insert(9, vec![1, 2]);
        h.service.subscribe_to_list(1, 9).await.unwrap();

        for _ in 0..mastery::DEFAULT_MASTERY_CEILING {
            h.service.record_practice_attempt(1, 1, true).await.unwrap();
        }

        let daily = h.service.get_daily_words(1).await.unwrap();
        assert!(daily.iter().all(|w| w.word_id != 1));
    }

    #[tokio::test]
    async fn stats_summary_reflects_goal_progress_and_insights() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);
        h.prefs.goals.lock().unwrap().insert(1, 5);

        h.service.record_practice_attempt(1, 1, true).await.unwrap();
        h.service.record_practice_attempt(1, 2, false).await.unwrap();

        let summary = h.service.get_user_stats(1).await.unwrap();
        assert_eq!(summary.current_streak, 1);
        assert_eq!(summary.daily_progress.daily_goal, 5);
        assert_eq!(summary.daily_progress.practiced_today, 2);
        assert_eq!(summary.daily_progress.remaining, 3);
        assert_eq!(summary.insights.words_in_progress, 2);
        assert!((summary.insights.average_accuracy - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn session_words_flow_through_mastery_and_streak() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);

        let session = h.service.start_practice_session(1, "daily").await.unwrap();
        h.service
            .record_session_word(session.id, 42, true, 12)
            .await
            .unwrap();
        h.service
            .record_session_word(session.id, 43, false, 30)
            .await
            .unwrap();
        let ended = h.service.end_practice_session(session.id).await.unwrap();

        assert_eq!(ended.total_questions, 2);
        assert_eq!(ended.correct_answers, 1);
        assert_eq!(ended.total_time, 42);
        assert!(ended.end_time.is_some());

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.current_streak, 1);
        assert!(h.store.word_progress(1, 42).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ending_a_session_twice_folds_time_only_once() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);

        let session = h.service.start_practice_session(1, "daily").await.unwrap();
        h.service
            .record_session_word(session.id, 42, true, 90)
            .await
            .unwrap();
        h.service.end_practice_session(session.id).await.unwrap();

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.total_practice_time, 2);

        let again = h.service.end_practice_session(session.id).await;
        assert!(matches!(again, Err(PortError::Conflict(_))));

        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.total_practice_time, 2);
    }

    #[tokio::test]
    async fn session_history_is_most_recent_first() {
        let h = harness(utc(2024, 1, 1, 10));
        let first = h.service.start_practice_session(1, "daily").await.unwrap();
        h.store.set_now(utc(2024, 1, 1, 12));
        let second = h.service.start_practice_session(1, "review").await.unwrap();

        let history = h.service.get_practice_sessions(1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);

        let detail = h.service.get_practice_session(first.id).await.unwrap();
        assert_eq!(detail.session_type, "daily");
    }

    #[tokio::test]
    async fn streak_milestones_are_awarded_once() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);
        h.achievements.catalog.lock().unwrap().extend([
            milestone(1, AchievementCriteria::Streak, 1.0),
            milestone(2, AchievementCriteria::Streak, 3.0),
        ]);

        h.service.record_practice_attempt(1, 42, true).await.unwrap();
        h.service.record_practice_attempt(1, 43, true).await.unwrap();
        assert_eq!(
            h.achievements.earned_achievement_ids(1).await.unwrap(),
            vec![1]
        );

        h.store.set_now(utc(2024, 1, 2, 10));
        h.service.record_practice_attempt(1, 42, true).await.unwrap();
        h.store.set_now(utc(2024, 1, 3, 10));
        h.service.record_practice_attempt(1, 42, true).await.unwrap();

        assert_eq!(
            h.achievements.earned_achievement_ids(1).await.unwrap(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn accuracy_achievement_awarded_when_a_session_closes() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);
        h.achievements
            .catalog
            .lock()
            .unwrap()
            .push(milestone(7, AchievementCriteria::Accuracy, 0.8));

        let session = h.service.start_practice_session(1, "daily").await.unwrap();
        h.service
            .record_session_word(session.id, 1, true, 10)
            .await
            .unwrap();
        h.service
            .record_session_word(session.id, 2, true, 10)
            .await
            .unwrap();
        h.service.end_practice_session(session.id).await.unwrap();

        assert_eq!(
            h.achievements.earned_achievement_ids(1).await.unwrap(),
            vec![7]
        );
    }

    #[tokio::test]
    async fn mastering_a_word_awards_word_milestones() {
        let h = harness(utc(2024, 1, 1, 10));
        use_utc(&h, 1);
        h.achievements
            .catalog
            .lock()
            .unwrap()
            .push(milestone(5, AchievementCriteria::Words, 1.0));

        for _ in 0..mastery::DEFAULT_MASTERY_CEILING {
            h.service.record_practice_attempt(1, 42, true).await.unwrap();
        }

        assert_eq!(
            h.achievements.earned_achievement_ids(1).await.unwrap(),
            vec![5]
        );
        let progress = h.service.get_achievement_progress(1).await.unwrap();
        assert!(progress.iter().any(|p| p.achievement.id == 5 && p.earned));
    }

    #[tokio::test]
    async fn timezone_shifts_the_day_boundary() {
        let h = harness(utc(2024, 1, 1, 20));
        h.prefs
            .time_zones
            .lock()
            .unwrap()
            .insert(1, "Asia/Tokyo".to_string());

        // 20:00 UTC on Jan 1 is already Jan 2 in Tokyo.
        h.service.record_practice_attempt(1, 42, true).await.unwrap();
        assert_eq!(
            h.store.trackers.lock().unwrap().get(&1).copied(),
            Some(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );

        // 16:00 UTC on Jan 2 is Jan 3 in Tokyo: consecutive.
        h.store.set_now(utc(2024, 1, 2, 16));
        h.service.record_practice_attempt(1, 42, true).await.unwrap();
        let stats = h.store.get_or_create_stats(1).await.unwrap();
        assert_eq!(stats.current_streak, 2);
    }
}
