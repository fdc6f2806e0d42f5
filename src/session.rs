//! In-progress workout lifecycle
//!
//! Each user has one slot that is either empty or holds the active session.
//! Every change is checkpointed to the store before it becomes visible
//! locally, so a reload resumes exactly where the last successful write
//! left off.
//!
//! ```text
//! Empty --start--> Active --finish--> Empty (record archived)
//!                  Active --abandon-> Empty (nothing archived)
//! ```

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{FitTrackError, Result, StoreError};
use crate::exercise::ExerciseEdit;
use crate::history::HistoryLog;
use crate::models::{ArchiveReservation, CompletedWorkoutRecord, ExerciseEntry, InProgressSession, SessionKind};
use crate::routine::AiRoutineStrategy;
use crate::store::{DocumentStore, UserPaths};

/// Result of [`SessionManager::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(InProgressSession),
    /// A session was already active; it is returned untouched
    AlreadyActive(InProgressSession),
}

impl StartOutcome {
    pub fn session(&self) -> &InProgressSession {
        match self {
            StartOutcome::Started(session) | StartOutcome::AlreadyActive(session) => session,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

pub struct SessionManager {
    store: Arc<dyn DocumentStore>,
    slot_path: String,
    history: HistoryLog,
    active: Option<InProgressSession>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn DocumentStore>, paths: &UserPaths) -> Self {
        let history = HistoryLog::new(Arc::clone(&store), paths);
        Self { store, slot_path: paths.in_progress.clone(), history, active: None }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn current(&self) -> Option<&InProgressSession> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    async fn read_slot(&self) -> Result<Option<InProgressSession>> {
        match self.store.get(&self.slot_path).await? {
            Some(doc) => {
                let session = serde_json::from_value(doc).map_err(|e| StoreError::Corrupt {
                    path: self.slot_path.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Load the persisted slot, e.g. after a restart
    pub async fn resume(&mut self) -> Result<Option<&InProgressSession>> {
        self.active = self.read_slot().await?;
        if let Some(session) = &self.active {
            info!(kind = %session.kind, exercises = session.exercises.len(), "Resumed active session");
        }
        Ok(self.active.as_ref())
    }

    fn require_active(&self, operation: &str) -> Result<&InProgressSession> {
        self.active
            .as_ref()
            .ok_or_else(|| FitTrackError::InvariantViolation(format!("cannot {} without an active session", operation)))
    }

    /// Begin a session. If one is already active (locally or in the store)
    /// it is kept and returned instead.
    pub async fn start(&mut self, kind: SessionKind, exercises: Vec<ExerciseEntry>) -> Result<StartOutcome> {
        if let Some(existing) = &self.active {
            warn!(kind = %existing.kind, "Start requested while a session is active");
            return Ok(StartOutcome::AlreadyActive(existing.clone()));
        }
        if let Some(existing) = self.read_slot().await? {
            warn!(kind = %existing.kind, "Found an active session in the store");
            self.active = Some(existing.clone());
            return Ok(StartOutcome::AlreadyActive(existing));
        }
        if exercises.is_empty() {
            return Err(FitTrackError::Validation("A session needs at least one exercise".to_string()));
        }

        let session = InProgressSession { kind, exercises, started_at: Utc::now(), finishing: None };
        self.store.put(&self.slot_path, serde_json::to_value(&session)?).await?;
        info!(kind = %kind, exercises = session.exercises.len(), "Session started");

        self.active = Some(session.clone());
        Ok(StartOutcome::Started(session))
    }

    /// Apply one edit and checkpoint the whole session. Local state changes
    /// only after the write succeeds. The slot is overwritten, never merged,
    /// so a slot cleared meanwhile by another device is recreated whole.
    pub async fn update(&mut self, edit: ExerciseEdit) -> Result<&InProgressSession> {
        let mut session = self.require_active("edit")?.clone();
        edit.apply(&mut session.exercises)?;

        self.store.put(&self.slot_path, serde_json::to_value(&session)?).await?;

        let active = self
            .active
            .as_mut()
            .ok_or_else(|| FitTrackError::Internal("session vanished during update".to_string()))?;
        *active = session;
        Ok(&*active)
    }

    /// Explicit calorie re-estimate for one entry via the oracle
    pub async fn recalculate_calories(&mut self, index: usize, strategy: &AiRoutineStrategy) -> Result<String> {
        let entry = self
            .require_active("recalculate calories")?
            .exercises
            .get(index)
            .cloned()
            .ok_or_else(|| FitTrackError::NotFound(format!("exercise {}", index)))?;

        let calories = strategy.recalculate_calories(&entry).await?;
        self.update(ExerciseEdit::SetCalories { index, calories: calories.clone() }).await?;
        Ok(calories)
    }

    /// Archive the session and clear the slot.
    ///
    /// The history id and end time are reserved in the slot first. If the
    /// archive write or the slot delete fails, the session stays active with
    /// its reservation, and calling `finish` again rewrites the same record
    /// rather than adding a second one. Nothing is retried automatically.
    pub async fn finish(&mut self) -> Result<CompletedWorkoutRecord> {
        let session = self.require_active("finish")?.clone();
        if session.exercises.is_empty() {
            return Err(FitTrackError::Validation(
                "Cannot finish a session without exercises; abandon it instead".to_string(),
            ));
        }

        let reservation = match &session.finishing {
            Some(reservation) => reservation.clone(),
            None => {
                let reservation = ArchiveReservation { id: Uuid::new_v4().to_string(), date: Utc::now() };
                let reserved = InProgressSession { finishing: Some(reservation.clone()), ..session.clone() };
                self.store
                    .put(&self.slot_path, serde_json::to_value(&reserved)?)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Could not reserve history record");
                        e
                    })?;
                if let Some(active) = self.active.as_mut() {
                    active.finishing = Some(reservation.clone());
                }
                reservation
            }
        };

        let record = self
            .history
            .archive_reserved(&reservation, &session.exercises)
            .await
            .map_err(|e| {
                error!(id = %reservation.id, error = %e, "Archiving workout failed; session kept active");
                e
            })?;

        self.store.delete(&self.slot_path).await.map_err(|e| {
            error!(id = %reservation.id, error = %e, "Workout archived but slot not cleared; finish again to complete");
            FitTrackError::from(e)
        })?;

        self.active = None;
        info!(id = %record.id, exercises = record.exercises.len(), "Session finished");
        Ok(record)
    }

    /// Clear the slot without archiving. Returns whether a session was
    /// active; abandoning an empty slot is a no-op. An undecodable slot is
    /// cleared as well.
    pub async fn abandon(&mut self) -> Result<bool> {
        let had_session = self.active.is_some() || self.store.get(&self.slot_path).await?.is_some();
        if !had_session {
            return Ok(false);
        }

        self.store.delete(&self.slot_path).await?;
        self.active = None;
        info!("Session abandoned");
        Ok(true)
    }
}
