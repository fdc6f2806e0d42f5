//! Routine acquisition: populating a new session from the oracle or from
//! the user's favorites

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::OracleConfig;
use crate::error::{FitTrackError, OracleError, Result};
use crate::history::HistorySummary;
use crate::models::{ExerciseEntry, FavoriteExercise};
use crate::oracle::RoutineOracle;
use crate::schedule::DayPlan;

/// Self-reported fatigue sent along with a routine request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatigueLevel {
    Low,
    #[default]
    Normal,
    High,
}

impl FromStr for FatigueLevel {
    type Err = FitTrackError;

    fn from_str(s: &str) -> Result<Self> {
        match crate::models::normalize_key(s).as_str() {
            "low" | "baja" | "bajo" => Ok(FatigueLevel::Low),
            "normal" | "media" | "medio" => Ok(FatigueLevel::Normal),
            "high" | "alta" | "alto" => Ok(FatigueLevel::High),
            _ => Err(FitTrackError::Validation(format!("Unknown fatigue level: {}", s))),
        }
    }
}

impl fmt::Display for FatigueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatigueLevel::Low => write!(f, "baja"),
            FatigueLevel::Normal => write!(f, "normal"),
            FatigueLevel::High => write!(f, "alta"),
        }
    }
}

/// What the oracle is asked to focus on today
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusRequest {
    /// User notes, which win over the scheduled label
    Notes { notes: String, scheduled: String },
    Scheduled(String),
}

/// Everything the oracle is told about the user and the day
#[derive(Debug, Clone)]
pub struct RoutineContext {
    pub objective: String,
    pub equipment: String,
    pub fatigue: FatigueLevel,
    pub notes: Option<String>,
    pub today: DayPlan,
    /// Most recent workouts, newest first
    pub recent_history: Vec<HistorySummary>,
    pub favorites: Vec<FavoriteExercise>,
}

impl RoutineContext {
    /// Non-blank notes take precedence over the scheduled label. The oracle is
    /// instructed accordingly; its compliance is not checked.
    pub fn focus_request(&self) -> FocusRequest {
        let scheduled = self.today.label();
        match self.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(notes) => FocusRequest::Notes { notes: notes.to_string(), scheduled },
            None => FocusRequest::Scheduled(scheduled),
        }
    }
}

/// Bounded exponential backoff for oracle calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff: Duration::from_millis(1000) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> std::result::Result<T, OracleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, OracleError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Oracle call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Routine acquisition through the oracle
pub struct AiRoutineStrategy {
    oracle: Arc<dyn RoutineOracle>,
    retry: RetryPolicy,
}

impl AiRoutineStrategy {
    pub fn new(oracle: Arc<dyn RoutineOracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    /// A non-empty routine with every entry not yet completed. Nothing is
    /// started here; the caller hands the list to the session manager.
    pub async fn generate(&self, context: &RoutineContext) -> Result<Vec<ExerciseEntry>> {
        let oracle = &self.oracle;
        let mut exercises = self
            .retry
            .run("generate_routine", move || oracle.generate_routine(context))
            .await?;

        if exercises.is_empty() {
            return Err(OracleError::EmptyResponse.into());
        }
        for entry in &mut exercises {
            entry.completed = false;
        }
        info!(count = exercises.len(), "Oracle produced routine");
        Ok(exercises)
    }

    /// Explicit, user-triggered calorie re-estimate for one entry
    pub async fn recalculate_calories(&self, entry: &ExerciseEntry) -> Result<String> {
        let oracle = &self.oracle;
        let calories = self
            .retry
            .run("recalculate_calories", move || oracle.recalculate_calories(entry))
            .await?;
        info!(exercise = %entry.name, calories = %calories, "Recalculated calories");
        Ok(calories)
    }
}

/// Routine acquisition from pinned favorites
pub struct ManualAssembly;

impl ManualAssembly {
    /// Entries for the selected favorites, in favorites order, none completed.
    /// Names that are not favorites are ignored.
    pub fn assemble(selected: &HashSet<String>, favorites: &[FavoriteExercise]) -> Vec<ExerciseEntry> {
        favorites
            .iter()
            .filter(|f| selected.contains(&f.name))
            .map(FavoriteExercise::to_entry)
            .collect()
    }
}
