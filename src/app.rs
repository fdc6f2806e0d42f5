//! Wiring of store, profile, session and history for one user

use chrono::NaiveDate;
use std::fs;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{FitTrackError, Result};
use crate::focus::FocusClassifier;
use crate::profile::ProfileRepository;
use crate::routine::{FatigueLevel, RoutineContext};
use crate::schedule::{resolve_day, DayPlan};
use crate::session::SessionManager;
use crate::store::{DocumentStore, SqliteStore, UserPaths};

/// Workouts summarised for the oracle
pub const RECENT_HISTORY_LIMIT: usize = 5;

pub struct FitTrack {
    pub config: AppConfig,
    pub profile: ProfileRepository,
    pub sessions: SessionManager,
    pub classifier: FocusClassifier,
}

impl FitTrack {
    /// Open the SQLite store named in the config and resume any active session
    pub async fn open(config: AppConfig) -> Result<Self> {
        let db_path = config.settings.database_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let store = SqliteStore::open(&db_path)?;
        info!(path = %db_path.display(), "Opened document store");
        Self::with_store(config, Arc::new(store)).await
    }

    pub async fn with_store(config: AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        if config.settings.user_id.trim().is_empty() {
            return Err(FitTrackError::Configuration("settings.user_id is empty".to_string()));
        }
        let paths = UserPaths::for_user(&config.settings.user_id);
        let mut sessions = SessionManager::new(Arc::clone(&store), &paths);
        sessions.resume().await?;

        Ok(Self {
            profile: ProfileRepository::new(store, &paths),
            sessions,
            classifier: FocusClassifier::new(&config.focus),
            config,
        })
    }

    pub async fn plan_for(&self, date: NaiveDate) -> Result<DayPlan> {
        let schedule = self.profile.load().await?.workout_schedule;
        Ok(resolve_day(&schedule, date, self.config.settings.locale))
    }

    /// Context bundle for a routine request on `date`
    pub async fn routine_context(
        &self,
        date: NaiveDate,
        fatigue: FatigueLevel,
        notes: Option<String>,
    ) -> Result<RoutineContext> {
        let profile = self.profile.load().await?;
        let recent_history = self
            .sessions
            .history()
            .recent_summaries(RECENT_HISTORY_LIMIT, &self.classifier)
            .await?;

        Ok(RoutineContext {
            objective: self.config.athlete.objective.clone(),
            equipment: self.config.athlete.equipment.clone(),
            fatigue,
            notes,
            today: resolve_day(&profile.workout_schedule, date, self.config.settings.locale),
            recent_history,
            favorites: profile.favorite_exercises.as_slice().to_vec(),
        })
    }
}
