// Library interface for FitTrack modules
// The CLI and the integration tests both drive the crate through these

pub mod app;
pub mod config;
pub mod error;
pub mod exercise;
pub mod export;
pub mod focus;
pub mod history;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod profile;
pub mod routine;
pub mod schedule;
pub mod session;
pub mod store;

// Re-export commonly used types for convenience
pub use app::FitTrack;
pub use config::AppConfig;
pub use error::{ErrorKind, FitTrackError, Result};
pub use exercise::{ExerciseEdit, ExerciseField, FavoriteSet, FavoriteToggle};
pub use focus::{FocusClassifier, FocusKeywords, FocusLabel};
pub use history::{HistoryLog, RecordPatch};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::*;
pub use oracle::{GeminiOracle, RoutineOracle};
pub use profile::{Goals, ProfileRepository, UserProfile};
pub use routine::{AiRoutineStrategy, FatigueLevel, ManualAssembly, RetryPolicy, RoutineContext};
pub use schedule::{resolve_day, DayPlan, Schedule, ScheduleEditor, SessionField, WeekdayLocale};
pub use session::{SessionManager, StartOutcome};
pub use store::{DocumentStore, MemoryStore, Snapshot, SqliteStore, Subscription, UserPaths};
