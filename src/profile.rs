//! User profile aggregate: weekly schedule, favorites, session-type
//! vocabulary and nutrition goals

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{FitTrackError, Result, StoreError};
use crate::exercise::{FavoriteSet, FavoriteToggle};
use crate::models::{ExerciseEntry, SessionTypeVocabulary};
use crate::schedule::{Schedule, ScheduleEditor};
use crate::store::{Document, DocumentStore, Snapshot, Subscription, UserPaths};

/// Daily nutrition targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goals {
    pub calories: u32,
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
}

impl Default for Goals {
    fn default() -> Self {
        Self { calories: 2500, protein: 180, carbs: 250, fat: 70 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub goals: Goals,
    /// A stored profile without a schedule trains on no day; only a brand
    /// new profile gets the starter plan
    #[serde(default = "Schedule::empty")]
    pub workout_schedule: Schedule,
    #[serde(default)]
    pub favorite_exercises: FavoriteSet,
    #[serde(default)]
    pub custom_workout_types: SessionTypeVocabulary,
}

fn decode_profile(path: &str, doc: Document) -> std::result::Result<UserProfile, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Corrupt { path: path.to_string(), reason: e.to_string() })
}

pub struct ProfileRepository {
    store: Arc<dyn DocumentStore>,
    path: String,
}

impl ProfileRepository {
    pub fn new(store: Arc<dyn DocumentStore>, paths: &UserPaths) -> Self {
        Self { store, path: paths.profile.clone() }
    }

    /// Current profile; a default profile is created on first use
    pub async fn load(&self) -> Result<UserProfile> {
        match self.store.get(&self.path).await? {
            Some(doc) => Ok(decode_profile(&self.path, doc)?),
            None => {
                let profile = UserProfile::default();
                self.store.put(&self.path, serde_json::to_value(&profile)?).await?;
                info!(path = %self.path, "Created default profile");
                Ok(profile)
            }
        }
    }

    /// Editor seeded with the persisted schedule
    pub async fn schedule_editor(&self) -> Result<ScheduleEditor> {
        Ok(ScheduleEditor::new(self.load().await?.workout_schedule))
    }

    /// Persist the editor's draft. On failure the editor is reset to the
    /// last saved schedule and the stored document is untouched.
    pub async fn save_schedule(&self, editor: &mut ScheduleEditor) -> Result<()> {
        let body = json!({ "workoutSchedule": serde_json::to_value(editor.draft())? });
        match self.store.merge(&self.path, body).await {
            Ok(()) => {
                editor.commit();
                info!("Schedule saved");
                Ok(())
            }
            Err(e) => {
                editor.rollback();
                Err(e.into())
            }
        }
    }

    /// Pin or unpin an exercise by name
    pub async fn toggle_favorite(&self, entry: &ExerciseEntry) -> Result<FavoriteToggle> {
        let mut favorites = self.load().await?.favorite_exercises;
        let outcome = favorites.toggle(entry);
        self.store
            .merge(&self.path, json!({ "favoriteExercises": serde_json::to_value(&favorites)? }))
            .await?;
        info!(exercise = %entry.name, ?outcome, "Toggled favorite");
        Ok(outcome)
    }

    pub async fn favorites(&self) -> Result<FavoriteSet> {
        Ok(self.load().await?.favorite_exercises)
    }

    /// Append a session type label; false if it was blank, rest, or known
    pub async fn add_session_type(&self, label: &str) -> Result<bool> {
        let mut vocabulary = self.load().await?.custom_workout_types;
        if !vocabulary.add(label) {
            return Ok(false);
        }
        self.store
            .merge(&self.path, json!({ "customWorkoutTypes": serde_json::to_value(&vocabulary)? }))
            .await?;
        Ok(true)
    }

    pub async fn update_goals(&self, goals: Goals) -> Result<()> {
        if goals.calories == 0 {
            return Err(FitTrackError::Validation("Calorie goal must be positive".to_string()));
        }
        self.store
            .merge(&self.path, json!({ "goals": serde_json::to_value(goals)? }))
            .await?;
        Ok(())
    }

    /// Live profile updates; unreadable documents are skipped
    pub fn watch<F>(&self, callback: F) -> Subscription
    where
        F: Fn(UserProfile) + Send + Sync + 'static,
    {
        let path = self.path.clone();
        self.store.subscribe(
            &self.path,
            Arc::new(move |snapshot: &Snapshot| {
                if let Snapshot::Document(Some(doc)) = snapshot {
                    match decode_profile(&path, doc.clone()) {
                        Ok(profile) => callback(profile),
                        Err(e) => warn!(error = %e, "Ignoring unreadable profile update"),
                    }
                }
            }),
        )
    }
}
