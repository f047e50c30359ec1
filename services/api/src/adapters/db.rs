//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ProgressStore`, `PreferenceLookup` and `QuizCatalog` ports from the
//! `vocab_core` crate. It handles all interactions with the PostgreSQL database
//! using `sqlx`; the decision logic it persists lives in the core crate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;
use vocab_core::domain::{
    Achievement, AchievementCriteria, AchievementProgress, EarnedAchievement, LearningInsights,
    PracticeSession, Quiz, QuizType, SelectionCandidate, UserAchievement, UserStats,
    WordProgress, WordProgressPatch,
};
use vocab_core::ports::{
    AchievementStore, PortError, PortResult, PreferenceLookup, ProgressStore, QuizCatalog,
};
use vocab_core::{mastery, streak};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter backed by a connection pool injected at construction.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
    mastery_ceiling: i32,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool, mastery_ceiling: i32) -> Self {
        Self {
            pool,
            mastery_ceiling,
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Ensures the zeroed stats row exists, then locks and returns it.
    /// Must be called inside the transaction that needs the lock.
    async fn lock_stats(
        txn: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> PortResult<UserStats> {
        sqlx::query("INSERT INTO user_stats (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut **txn)
            .await
            .map_err(|e| store_err("ensure user_stats", user_id, e))?;

        let record = sqlx::query_as::<_, UserStatsRecord>(
            "SELECT user_id, diamonds, current_streak, longest_streak, last_streak_updated_at, \
             total_practice_time, average_accuracy \
             FROM user_stats WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut **txn)
        .await
        .map_err(|e| store_err("lock user_stats", user_id, e))?;

        Ok(record.to_domain())
    }
}

fn store_err(op: &str, user_id: i64, e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            PortError::Conflict(format!("{op} for user {user_id}: {e}"))
        }
        // Foreign-key violations mean the referenced user/word/list is gone.
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
            PortError::NotFound(format!("{op} for user {user_id}: {e}"))
        }
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{op} for user {user_id}")),
        _ => PortError::Store(format!("{op} for user {user_id}: {e}")),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserStatsRecord {
    user_id: i64,
    diamonds: i64,
    current_streak: i32,
    longest_streak: i32,
    last_streak_updated_at: Option<DateTime<Utc>>,
    total_practice_time: i64,
    average_accuracy: f64,
}
impl UserStatsRecord {
    fn to_domain(self) -> UserStats {
        UserStats {
            user_id: self.user_id,
            diamonds: self.diamonds,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_streak_updated_at: self.last_streak_updated_at,
            total_practice_time: self.total_practice_time,
            average_accuracy: self.average_accuracy,
        }
    }
}

#[derive(FromRow)]
struct WordProgressRecord {
    user_id: i64,
    word_id: i64,
    recognition_mastery_score: i32,
    usage_mastery_score: i32,
    practice_count: i64,
    success_count: i64,
    number_of_times_to_practice: i32,
    last_practiced: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}
impl WordProgressRecord {
    fn to_domain(self) -> WordProgress {
        WordProgress {
            user_id: self.user_id,
            word_id: self.word_id,
            recognition_mastery_score: self.recognition_mastery_score,
            usage_mastery_score: self.usage_mastery_score,
            practice_count: self.practice_count,
            success_count: self.success_count,
            number_of_times_to_practice: self.number_of_times_to_practice,
            last_practiced: self.last_practiced,
            updated_at: self.updated_at,
        }
    }
}

const WORD_PROGRESS_COLUMNS: &str = "user_id, word_id, recognition_mastery_score, \
     usage_mastery_score, practice_count, success_count, number_of_times_to_practice, \
     last_practiced, updated_at";

#[derive(FromRow)]
struct CandidateRecord {
    word_id: i64,
    recognition_mastery_score: i32,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct QuizRecord {
    id: i64,
    word_id: i64,
    quiz_type: String,
    question: String,
    options: Vec<String>,
    correct_options: Vec<String>,
}
impl QuizRecord {
    fn to_domain(self) -> PortResult<Quiz> {
        let quiz_type = match self.quiz_type.as_str() {
            "multiple_choice" => QuizType::MultipleChoice,
            "true_false" => QuizType::TrueFalse,
            "fill_in_blank" => QuizType::FillInBlank,
            other => {
                return Err(PortError::Invariant(format!(
                    "Quiz {} has unknown quiz_type '{}'",
                    self.id, other
                )))
            }
        };
        Ok(Quiz {
            id: self.id,
            word_id: self.word_id,
            quiz_type,
            question: self.question,
            options: self.options,
            correct_options: self.correct_options,
        })
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: i64,
    session_type: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    total_questions: i64,
    correct_answers: i64,
    total_time: i64,
}
impl SessionRecord {
    fn to_domain(self) -> PracticeSession {
        PracticeSession {
            id: self.id,
            user_id: self.user_id,
            session_type: self.session_type,
            start_time: self.start_time,
            end_time: self.end_time,
            total_questions: self.total_questions,
            correct_answers: self.correct_answers,
            total_time: self.total_time,
        }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, session_type, start_time, end_time, \
     total_questions, correct_answers, total_time";

fn parse_criteria(achievement_id: i64, raw: &str) -> PortResult<AchievementCriteria> {
    match raw {
        "streak" => Ok(AchievementCriteria::Streak),
        "accuracy" => Ok(AchievementCriteria::Accuracy),
        "words" => Ok(AchievementCriteria::Words),
        other => Err(PortError::Invariant(format!(
            "Achievement {achievement_id} has unknown criteria '{other}'"
        ))),
    }
}

#[derive(FromRow)]
struct AchievementRecord {
    id: i64,
    name: String,
    description: Option<String>,
    criteria: String,
    threshold: f64,
    points: i32,
}
impl AchievementRecord {
    fn to_domain(self) -> PortResult<Achievement> {
        let criteria = parse_criteria(self.id, &self.criteria)?;
        Ok(Achievement {
            id: self.id,
            name: self.name,
            description: self.description,
            criteria,
            threshold: self.threshold,
            points: self.points,
        })
    }
}

#[derive(FromRow)]
struct EarnedAchievementRecord {
    id: i64,
    name: String,
    description: Option<String>,
    criteria: String,
    threshold: f64,
    points: i32,
    achieved_at: DateTime<Utc>,
}
impl EarnedAchievementRecord {
    fn to_domain(self) -> PortResult<EarnedAchievement> {
        let criteria = parse_criteria(self.id, &self.criteria)?;
        Ok(EarnedAchievement {
            achievement: Achievement {
                id: self.id,
                name: self.name,
                description: self.description,
                criteria,
                threshold: self.threshold,
                points: self.points,
            },
            achieved_at: self.achieved_at,
        })
    }
}

#[derive(FromRow)]
struct AchievementProgressRecord {
    id: i64,
    name: String,
    description: Option<String>,
    criteria: String,
    threshold: f64,
    points: i32,
    earned: bool,
}
impl AchievementProgressRecord {
    fn to_domain(self) -> PortResult<AchievementProgress> {
        let criteria = parse_criteria(self.id, &self.criteria)?;
        Ok(AchievementProgress {
            achievement: Achievement {
                id: self.id,
                name: self.name,
                description: self.description,
                criteria,
                threshold: self.threshold,
                points: self.points,
            },
            earned: self.earned,
        })
    }
}

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn get_or_create_stats(&self, user_id: i64) -> PortResult<UserStats> {
        sqlx::query("INSERT INTO user_stats (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("ensure user_stats", user_id, e))?;

        let record = sqlx::query_as::<_, UserStatsRecord>(
            "SELECT user_id, diamonds, current_streak, longest_streak, last_streak_updated_at, \
             total_practice_time, average_accuracy FROM user_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_err("fetch user_stats", user_id, e))?;

        Ok(record.to_domain())
    }

    /// One transaction, locks acquired in a fixed global order: the stats
    /// row first (its insert-if-absent makes it a reliable serialization
    /// point), then the daily-tracker guard. Concurrent calls for the same
    /// user queue on the stats lock, so the guard read is never stale.
    async fn advance_streak(&self, user_id: i64, tz: Tz) -> PortResult<UserStats> {
        let now = Utc::now();
        let today = streak::local_date(now, tz);

        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| store_err("begin streak txn", user_id, e))?;

        let mut stats = Self::lock_stats(&mut txn, user_id).await?;

        let tracker: Option<(NaiveDate,)> = sqlx::query_as(
            "SELECT last_processed_date FROM streak_daily_tracker WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *txn)
        .await
        .map_err(|e| store_err("lock streak_daily_tracker", user_id, e))?;

        let last_update = streak::local_date_of(stats.last_streak_updated_at, tz);
        let decision = streak::decide(tracker.map(|t| t.0), last_update, today);
        debug!(user_id, ?decision, %today, "streak decision");

        if streak::apply(&mut stats, decision) {
            stats.last_streak_updated_at = Some(now);
            sqlx::query(
                "UPDATE user_stats SET current_streak = $2, longest_streak = $3, \
                 last_streak_updated_at = $4, updated_at = $4 WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(stats.current_streak)
            .bind(stats.longest_streak)
            .bind(now)
            .execute(&mut *txn)
            .await
            .map_err(|e| store_err("update streak", user_id, e))?;

            sqlx::query(
                "INSERT INTO streak_daily_tracker (user_id, last_processed_date) VALUES ($1, $2) \
                 ON CONFLICT (user_id) DO UPDATE \
                 SET last_processed_date = EXCLUDED.last_processed_date, updated_at = now()",
            )
            .bind(user_id)
            .bind(today)
            .execute(&mut *txn)
            .await
            .map_err(|e| store_err("upsert streak_daily_tracker", user_id, e))?;
        }

        txn.commit()
            .await
            .map_err(|e| store_err("commit streak txn", user_id, e))?;
        Ok(stats)
    }

    async fn word_progress(
        &self,
        user_id: i64,
        word_id: i64,
    ) -> PortResult<Option<WordProgress>> {
        let record = sqlx::query_as::<_, WordProgressRecord>(&format!(
            "SELECT {WORD_PROGRESS_COLUMNS} FROM word_progress WHERE user_id = $1 AND word_id = $2"
        ))
        .bind(user_id)
        .bind(word_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("fetch word_progress", user_id, e))?;
        Ok(record.map(WordProgressRecord::to_domain))
    }

    /// A single atomic upsert: a first-insert race lands in the DO UPDATE
    /// arm instead of failing. The arithmetic mirrors `mastery::apply_attempt`
    /// / `mastery::initial_attempt`, which define (and test) the semantics.
    async fn record_attempt(
        &self,
        user_id: i64,
        word_id: i64,
        was_correct: bool,
    ) -> PortResult<WordProgress> {
        let now = Utc::now();
        let seed = mastery::initial_attempt(user_id, word_id, was_correct, now, self.mastery_ceiling);

        let record = sqlx::query_as::<_, WordProgressRecord>(&format!(
            "INSERT INTO word_progress ({WORD_PROGRESS_COLUMNS}, created_at) \
             VALUES ($1, $2, $3, 0, 1, $4, $5, $6, $6, $6) \
             ON CONFLICT (user_id, word_id) DO UPDATE SET \
                 practice_count = word_progress.practice_count + 1, \
                 success_count = LEAST(word_progress.success_count + CASE WHEN $7 THEN 1 ELSE 0 END, \
                                       word_progress.practice_count + 1), \
                 recognition_mastery_score = LEAST(word_progress.recognition_mastery_score \
                                                       + CASE WHEN $7 THEN 1 ELSE 0 END, $8), \
                 number_of_times_to_practice = GREATEST(word_progress.number_of_times_to_practice - 1, 0), \
                 last_practiced = $6, \
                 updated_at = $6 \
             RETURNING {WORD_PROGRESS_COLUMNS}"
        ))
        .bind(user_id)
        .bind(word_id)
        .bind(seed.recognition_mastery_score)
        .bind(seed.success_count)
        .bind(seed.number_of_times_to_practice)
        .bind(now)
        .bind(was_correct)
        .bind(self.mastery_ceiling)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_err("record attempt", user_id, e))?;

        Ok(record.to_domain())
    }

    /// Upsert-with-default contract: a missing row is created with fresh
    /// defaults before the patch lands; the patch is applied by the core's
    /// clamping logic under a row lock.
    async fn apply_progress_update(
        &self,
        user_id: i64,
        word_id: i64,
        patch: &WordProgressPatch,
    ) -> PortResult<WordProgress> {
        let now = Utc::now();
        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| store_err("begin progress update", user_id, e))?;

        sqlx::query(
            "INSERT INTO word_progress (user_id, word_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $3) ON CONFLICT (user_id, word_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(word_id)
        .bind(now)
        .execute(&mut *txn)
        .await
        .map_err(|e| store_err("ensure word_progress", user_id, e))?;

        let record = sqlx::query_as::<_, WordProgressRecord>(&format!(
            "SELECT {WORD_PROGRESS_COLUMNS} FROM word_progress \
             WHERE user_id = $1 AND word_id = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(word_id)
        .fetch_one(&mut *txn)
        .await
        .map_err(|e| store_err("lock word_progress", user_id, e))?;

        let mut progress = record.to_domain();
        mastery::apply_patch(&mut progress, patch, now, self.mastery_ceiling);

        sqlx::query(
            "UPDATE word_progress SET recognition_mastery_score = $3, usage_mastery_score = $4, \
             practice_count = $5, success_count = $6, number_of_times_to_practice = $7, \
             last_practiced = $8, updated_at = $9 WHERE user_id = $1 AND word_id = $2",
        )
        .bind(user_id)
        .bind(word_id)
        .bind(progress.recognition_mastery_score)
        .bind(progress.usage_mastery_score)
        .bind(progress.practice_count)
        .bind(progress.success_count)
        .bind(progress.number_of_times_to_practice)
        .bind(progress.last_practiced)
        .bind(progress.updated_at)
        .execute(&mut *txn)
        .await
        .map_err(|e| store_err("update word_progress", user_id, e))?;

        txn.commit()
            .await
            .map_err(|e| store_err("commit progress update", user_id, e))?;
        Ok(progress)
    }

    /// Subscription row and bulk progress initialization are one atomic
    /// unit; a crash mid-way leaves neither. Initialized rows are backdated
    /// so staleness heuristics treat the words as due immediately.
    async fn subscribe_to_list(&self, user_id: i64, list_id: i64) -> PortResult<usize> {
        let now = Utc::now();
        let backdated = now - Duration::days(mastery::BULK_INIT_BACKDATE_DAYS);

        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| store_err("begin subscribe", user_id, e))?;

        let list: Option<(i64,)> = sqlx::query_as("SELECT id FROM lists WHERE id = $1")
            .bind(list_id)
            .fetch_optional(&mut *txn)
            .await
            .map_err(|e| store_err("fetch list", user_id, e))?;
        if list.is_none() {
            return Err(PortError::NotFound(format!("List {list_id} not found")));
        }

        sqlx::query("INSERT INTO user_lists (user_id, list_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(list_id)
            .execute(&mut *txn)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    PortError::Conflict(format!(
                        "User {user_id} is already subscribed to list {list_id}"
                    ))
                }
                _ => store_err("insert user_lists", user_id, e),
            })?;

        let inserted = sqlx::query(
            "INSERT INTO word_progress (user_id, word_id, created_at, updated_at) \
             SELECT $1, lw.word_id, $3, $3 FROM list_words lw WHERE lw.list_id = $2 \
             ON CONFLICT (user_id, word_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(list_id)
        .bind(backdated)
        .execute(&mut *txn)
        .await
        .map_err(|e| store_err("bulk init word_progress", user_id, e))?;

        txn.commit()
            .await
            .map_err(|e| store_err("commit subscribe", user_id, e))?;
        Ok(inserted.rows_affected() as usize)
    }

    async fn daily_candidates(&self, user_id: i64) -> PortResult<Vec<SelectionCandidate>> {
        let records = sqlx::query_as::<_, CandidateRecord>(
            "SELECT wp.word_id, wp.recognition_mastery_score, wp.updated_at \
             FROM word_progress wp \
             WHERE wp.user_id = $1 \
               AND wp.recognition_mastery_score < $2 \
               AND EXISTS ( \
                   SELECT 1 FROM user_lists ul \
                   JOIN list_words lw ON lw.list_id = ul.list_id \
                   WHERE ul.user_id = $1 AND lw.word_id = wp.word_id)",
        )
        .bind(user_id)
        .bind(self.mastery_ceiling)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("fetch daily candidates", user_id, e))?;

        Ok(records
            .into_iter()
            .map(|r| SelectionCandidate {
                word_id: r.word_id,
                recognition_mastery_score: r.recognition_mastery_score,
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn progress_for_words(
        &self,
        user_id: i64,
        word_ids: &[i64],
    ) -> PortResult<Vec<WordProgress>> {
        let records = sqlx::query_as::<_, WordProgressRecord>(&format!(
            "SELECT {WORD_PROGRESS_COLUMNS} FROM word_progress \
             WHERE user_id = $1 AND word_id = ANY($2)"
        ))
        .bind(user_id)
        .bind(word_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("fetch progress batch", user_id, e))?;
        Ok(records.into_iter().map(WordProgressRecord::to_domain).collect())
    }

    async fn practiced_on(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        tz: Tz,
    ) -> PortResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM word_progress \
             WHERE user_id = $1 AND last_practiced IS NOT NULL \
               AND (last_practiced AT TIME ZONE $2)::date = $3",
        )
        .bind(user_id)
        .bind(tz.name())
        .bind(local_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_err("count practiced words", user_id, e))?;
        Ok(count)
    }

    async fn insights(&self, user_id: i64) -> PortResult<LearningInsights> {
        let row: (i64, i64, f64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE recognition_mastery_score >= $2), \
                    COUNT(*) FILTER (WHERE recognition_mastery_score < $2), \
                    COALESCE(SUM(success_count)::float8 / NULLIF(SUM(practice_count), 0), 0) \
             FROM word_progress WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(self.mastery_ceiling)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_err("fetch insights", user_id, e))?;

        Ok(LearningInsights {
            words_mastered: row.0,
            words_in_progress: row.1,
            average_accuracy: row.2,
        })
    }

    async fn start_session(
        &self,
        user_id: i64,
        session_type: &str,
    ) -> PortResult<PracticeSession> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO practice_sessions (user_id, session_type) VALUES ($1, $2) \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(session_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_err("start session", user_id, e))?;
        Ok(record.to_domain())
    }

    async fn session(&self, session_id: Uuid) -> PortResult<PracticeSession> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Store(format!("fetch session {session_id}: {e}")))?
        .ok_or_else(|| PortError::NotFound(format!("Session {session_id} not found")))?;
        Ok(record.to_domain())
    }

    async fn sessions_for_user(&self, user_id: i64) -> PortResult<Vec<PracticeSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM practice_sessions \
             WHERE user_id = $1 ORDER BY start_time DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("fetch sessions", user_id, e))?;
        Ok(records.into_iter().map(SessionRecord::to_domain).collect())
    }

    async fn record_session_word(
        &self,
        session_id: Uuid,
        word_id: i64,
        was_correct: bool,
        time_taken: i32,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO session_words (session_id, word_id, was_correct, time_taken) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(session_id)
        .bind(word_id)
        .bind(was_correct)
        .bind(time_taken)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Store(format!("record session word {session_id}: {e}")))?;
        Ok(())
    }

    /// Closes the session and folds its totals into the user's stats row:
    /// practice time in minutes and the accuracy average across finished
    /// sessions.
    async fn end_session(&self, session_id: Uuid) -> PortResult<PracticeSession> {
        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Store(format!("begin end session: {e}")))?;

        let existing = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM practice_sessions WHERE id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(&mut *txn)
        .await
        .map_err(|e| PortError::Store(format!("lock session {session_id}: {e}")))?
        .ok_or_else(|| PortError::NotFound(format!("Session {session_id} not found")))?;

        // The fold below must run at most once per session.
        if existing.end_time.is_some() {
            return Err(PortError::Conflict(format!(
                "Session {session_id} already ended"
            )));
        }

        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE practice_sessions SET end_time = now(), \
                 total_questions = agg.total_questions, \
                 correct_answers = agg.correct_answers, \
                 total_time = agg.total_time \
             FROM (SELECT COUNT(*) AS total_questions, \
                          COALESCE(SUM(CASE WHEN was_correct THEN 1 ELSE 0 END), 0) AS correct_answers, \
                          COALESCE(SUM(time_taken), 0) AS total_time \
                   FROM session_words WHERE session_id = $1) AS agg \
             WHERE id = $1 \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .fetch_one(&mut *txn)
        .await
        .map_err(|e| PortError::Store(format!("end session {session_id}: {e}")))?;

        let session = record.to_domain();
        Self::lock_stats(&mut txn, session.user_id).await?;
        sqlx::query(
            "UPDATE user_stats SET \
                 total_practice_time = total_practice_time + $2, \
                 average_accuracy = COALESCE( \
                     (SELECT AVG(correct_answers::float8 / NULLIF(total_questions, 0)) \
                      FROM practice_sessions WHERE user_id = $1 AND end_time IS NOT NULL), 0), \
                 updated_at = now() \
             WHERE user_id = $1",
        )
        .bind(session.user_id)
        .bind((session.total_time + 59) / 60)
        .execute(&mut *txn)
        .await
        .map_err(|e| store_err("fold session stats", session.user_id, e))?;

        txn.commit()
            .await
            .map_err(|e| PortError::Store(format!("commit end session: {e}")))?;

        debug!(user_id = existing.user_id, %session_id, "practice session closed");
        Ok(session)
    }
}

//=========================================================================================
// `PreferenceLookup` and `QuizCatalog` Trait Implementations
//=========================================================================================

#[async_trait]
impl PreferenceLookup for DbAdapter {
    async fn time_zone(&self, user_id: i64) -> PortResult<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT time_zone FROM user_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| store_err("fetch time_zone", user_id, e))?;
        Ok(row.and_then(|r| r.0))
    }

    async fn daily_goal(&self, user_id: i64) -> PortResult<Option<i32>> {
        let row: Option<(Option<i32>,)> =
            sqlx::query_as("SELECT daily_word_goal FROM user_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| store_err("fetch daily_word_goal", user_id, e))?;
        Ok(row.and_then(|r| r.0))
    }
}

#[async_trait]
impl AchievementStore for DbAdapter {
    async fn achievements(&self) -> PortResult<Vec<Achievement>> {
        let records = sqlx::query_as::<_, AchievementRecord>(
            "SELECT id, name, description, criteria, threshold, points \
             FROM achievements ORDER BY points ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Store(format!("fetch achievements: {e}")))?;
        records.into_iter().map(AchievementRecord::to_domain).collect()
    }

    async fn earned_achievement_ids(&self, user_id: i64) -> PortResult<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT achievement_id FROM user_achievements WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| store_err("fetch earned achievements", user_id, e))?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Re-awarding keeps the original `achieved_at`; the conflict arm is a
    /// no-op rather than an error.
    async fn award_achievement(
        &self,
        user_id: i64,
        achievement_id: i64,
    ) -> PortResult<UserAchievement> {
        sqlx::query(
            "INSERT INTO user_achievements (user_id, achievement_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, achievement_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(achievement_id)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("award achievement", user_id, e))?;

        let (achieved_at,): (DateTime<Utc>,) = sqlx::query_as(
            "SELECT achieved_at FROM user_achievements \
             WHERE user_id = $1 AND achievement_id = $2",
        )
        .bind(user_id)
        .bind(achievement_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_err("fetch awarded achievement", user_id, e))?;

        Ok(UserAchievement {
            user_id,
            achievement_id,
            achieved_at,
        })
    }

    async fn user_achievements(&self, user_id: i64) -> PortResult<Vec<EarnedAchievement>> {
        let records = sqlx::query_as::<_, EarnedAchievementRecord>(
            "SELECT a.id, a.name, a.description, a.criteria, a.threshold, a.points, \
                    ua.achieved_at \
             FROM user_achievements ua \
             JOIN achievements a ON a.id = ua.achievement_id \
             WHERE ua.user_id = $1 ORDER BY ua.achieved_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("fetch user achievements", user_id, e))?;
        records
            .into_iter()
            .map(EarnedAchievementRecord::to_domain)
            .collect()
    }

    async fn achievement_progress(&self, user_id: i64) -> PortResult<Vec<AchievementProgress>> {
        let records = sqlx::query_as::<_, AchievementProgressRecord>(
            "SELECT a.id, a.name, a.description, a.criteria, a.threshold, a.points, \
                    ua.achievement_id IS NOT NULL AS earned \
             FROM achievements a \
             LEFT JOIN user_achievements ua \
               ON ua.achievement_id = a.id AND ua.user_id = $1 \
             ORDER BY a.points ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("fetch achievement progress", user_id, e))?;
        records
            .into_iter()
            .map(AchievementProgressRecord::to_domain)
            .collect()
    }
}

#[async_trait]
impl QuizCatalog for DbAdapter {
    async fn quizzes_for_words(&self, word_ids: &[i64]) -> PortResult<Vec<Quiz>> {
        let records = sqlx::query_as::<_, QuizRecord>(
            "SELECT id, word_id, quiz_type, question, options, correct_options \
             FROM quizzes WHERE word_id = ANY($1)",
        )
        .bind(word_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Store(format!("fetch quizzes: {e}")))?;

        records.into_iter().map(QuizRecord::to_domain).collect()
    }
}
