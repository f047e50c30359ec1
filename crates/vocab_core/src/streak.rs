//! crates/vocab_core/src/streak.rs
//!
//! The day-boundary state machine behind the daily practice streak.
//!
//! The store adapter runs this logic inside a single transaction with
//! row locks on the stats row and the daily tracker (in that order).
//! Everything here is pure so the decision table can be tested without
//! a database: the adapter only supplies locked rows and persists the
//! outcome.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Fallback when a user has no configured timezone.
pub const DEFAULT_TIME_ZONE: &str = "America/Los_Angeles";

/// What the streak ledger decided to do for one practice event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakDecision {
    /// Already processed this local day (or same-day timestamp); no mutation.
    Hold,
    /// First ever activity; streak becomes 1.
    Start,
    /// Consecutive local day; streak grows by 1.
    Increment,
    /// A gap of at least one full local day; streak resets to 1.
    Reset,
}

/// Resolves an IANA timezone name, falling back to [`DEFAULT_TIME_ZONE`]
/// when the name is absent or unparseable.
pub fn resolve_time_zone(name: Option<&str>) -> Tz {
    name.and_then(|n| n.parse::<Tz>().ok())
        .unwrap_or_else(|| {
            DEFAULT_TIME_ZONE
                .parse::<Tz>()
                .unwrap_or(chrono_tz::America::Los_Angeles)
        })
}

/// The date portion of a UTC instant in the given timezone. This is the
/// "local day boundary" every streak comparison is made against.
pub fn local_date(now_utc: DateTime<Utc>, tz: Tz) -> NaiveDate {
    tz.from_utc_datetime(&now_utc.naive_utc()).date_naive()
}

/// The decision table of the streak ledger.
///
/// `last_processed` is the daily-tracker guard date, `last_update_date` the
/// local date of the last streak mutation (None if never updated), `today`
/// the current local date. Timezone changes between calls are deliberately
/// not compensated for: the comparison always uses the current timezone.
pub fn decide(
    last_processed: Option<NaiveDate>,
    last_update_date: Option<NaiveDate>,
    today: NaiveDate,
) -> StreakDecision {
    // Idempotency guard: at most one mutation per local calendar day.
    if last_processed == Some(today) {
        return StreakDecision::Hold;
    }
    match last_update_date {
        None => StreakDecision::Start,
        Some(last) if last == today => StreakDecision::Hold,
        Some(last) if last.succ_opt() == Some(today) => StreakDecision::Increment,
        Some(_) => StreakDecision::Reset,
    }
}

/// Applies a decision to the streak counters, maintaining the invariant
/// `longest_streak >= current_streak`.
///
/// Returns true when the counters were mutated (the caller must then also
/// persist `last_streak_updated_at = now` and upsert the daily tracker).
pub fn apply(stats: &mut crate::domain::UserStats, decision: StreakDecision) -> bool {
    match decision {
        StreakDecision::Hold => false,
        StreakDecision::Start | StreakDecision::Reset => {
            stats.current_streak = 1;
            stats.longest_streak = stats.longest_streak.max(1);
            true
        }
        StreakDecision::Increment => {
            stats.current_streak += 1;
            stats.longest_streak = stats.longest_streak.max(stats.current_streak);
            true
        }
    }
}

/// The local date of an optional UTC timestamp.
pub fn local_date_of(ts: Option<DateTime<Utc>>, tz: Tz) -> Option<NaiveDate> {
    ts.map(|t| local_date(t, tz))
}
