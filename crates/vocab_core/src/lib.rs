pub mod achievements;
pub mod domain;
pub mod mastery;
pub mod ports;
pub mod selection;
pub mod service;
pub mod streak;

pub use domain::{
    Achievement, AchievementCriteria, AchievementProgress, DailyGoalProgress, DailyWord,
    EarnedAchievement, LearningInsights, PracticeSession, Quiz, QuizType, SelectionCandidate,
    UserAchievement, UserPreferences, UserStats, UserStatsSummary, WordProgress,
    WordProgressPatch,
};
pub use ports::{
    AchievementStore, PortError, PortResult, PreferenceLookup, ProgressStore, QuizCatalog,
};
pub use service::{ProgressConfig, ProgressService};
