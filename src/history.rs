//! Completed-workout history
//!
//! An append-only per-user log. Records are created by archival (finishing a
//! session or logging a past workout) and only change through
//! [`HistoryLog::update_record`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{FitTrackError, Result, StoreError};
use crate::focus::{FocusClassifier, FocusLabel};
use crate::models::{ArchiveReservation, CompletedWorkoutRecord, ExerciseEntry};
use crate::store::{Document, DocumentStore, Snapshot, Subscription, UserPaths};

/// One-line description of a past workout, used as oracle context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub date: DateTime<Utc>,
    pub focus: FocusLabel,
    pub exercises: Vec<String>,
}

impl fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.date.format("%Y-%m-%d"), self.focus, self.exercises.join(", "))
    }
}

/// Replacement values for a record; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub date: Option<DateTime<Utc>>,
    pub exercises: Option<Vec<ExerciseEntry>>,
}

fn decode_record(collection: &str, id: String, doc: Document) -> std::result::Result<CompletedWorkoutRecord, StoreError> {
    let mut record: CompletedWorkoutRecord = serde_json::from_value(doc).map_err(|e| StoreError::Corrupt {
        path: format!("{}/{}", collection, id),
        reason: e.to_string(),
    })?;
    record.id = id;
    Ok(record)
}

/// Newest first; ties keep id order
fn sort_newest_first(records: &mut [CompletedWorkoutRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
}

pub struct HistoryLog {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn DocumentStore>, paths: &UserPaths) -> Self {
        Self { store, collection: paths.completed.clone() }
    }

    fn record_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection, id)
    }

    /// Snapshot `exercises` as a new record dated now
    pub async fn archive(&self, exercises: &[ExerciseEntry]) -> Result<CompletedWorkoutRecord> {
        self.log_workout(Utc::now(), exercises).await
    }

    /// Record a workout that was done without a live session
    pub async fn log_workout(&self, date: DateTime<Utc>, exercises: &[ExerciseEntry]) -> Result<CompletedWorkoutRecord> {
        if exercises.is_empty() {
            return Err(FitTrackError::Validation("Cannot log a workout without exercises".to_string()));
        }
        let mut record = CompletedWorkoutRecord { id: String::new(), date, exercises: exercises.to_vec() };
        record.id = self
            .store
            .append_to_collection(&self.collection, serde_json::to_value(&record)?)
            .await?;
        info!(id = %record.id, exercises = record.exercises.len(), "Archived workout");
        Ok(record)
    }

    /// Write the record under a reserved id. Writing the same reservation
    /// twice leaves a single record.
    pub(crate) async fn archive_reserved(
        &self,
        reservation: &ArchiveReservation,
        exercises: &[ExerciseEntry],
    ) -> Result<CompletedWorkoutRecord> {
        let record = CompletedWorkoutRecord {
            id: reservation.id.clone(),
            date: reservation.date,
            exercises: exercises.to_vec(),
        };
        self.store
            .put(&self.record_path(&record.id), serde_json::to_value(&record)?)
            .await?;
        info!(id = %record.id, exercises = record.exercises.len(), "Archived workout");
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<CompletedWorkoutRecord>> {
        match self.store.get(&self.record_path(id)).await? {
            Some(doc) => Ok(Some(decode_record(&self.collection, id.to_string(), doc)?)),
            None => Ok(None),
        }
    }

    /// All records, newest first. Undecodable documents are skipped.
    pub async fn list(&self) -> Result<Vec<CompletedWorkoutRecord>> {
        let documents = self.store.list_collection(&self.collection).await?;
        let mut records: Vec<CompletedWorkoutRecord> = documents
            .into_iter()
            .filter_map(|(id, doc)| match decode_record(&self.collection, id, doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable history record");
                    None
                }
            })
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Overwrite date and/or exercises of an existing record
    pub async fn update_record(&self, id: &str, patch: RecordPatch) -> Result<CompletedWorkoutRecord> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| FitTrackError::NotFound(format!("workout record {}", id)))?;

        if let Some(date) = patch.date {
            record.date = date;
        }
        if let Some(exercises) = patch.exercises {
            record.exercises = exercises;
        }
        self.store
            .put(&self.record_path(id), serde_json::to_value(&record)?)
            .await?;
        info!(id, "Updated workout record");
        Ok(record)
    }

    /// Summaries of the `limit` most recent workouts
    pub async fn recent_summaries(&self, limit: usize, classifier: &FocusClassifier) -> Result<Vec<HistorySummary>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .take(limit)
            .map(|record| HistorySummary {
                date: record.date,
                focus: classifier.classify(&record.exercises),
                exercises: record.exercises.iter().map(|e| e.name.clone()).collect(),
            })
            .collect())
    }

    /// Live view of the log, newest first
    pub fn watch<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Vec<CompletedWorkoutRecord>) + Send + Sync + 'static,
    {
        let collection = self.collection.clone();
        self.store.subscribe(
            &self.collection,
            Arc::new(move |snapshot: &Snapshot| {
                if let Snapshot::Collection(documents) = snapshot {
                    let mut records: Vec<CompletedWorkoutRecord> = documents
                        .iter()
                        .filter_map(|(id, doc)| decode_record(&collection, id.clone(), doc.clone()).ok())
                        .collect();
                    sort_newest_first(&mut records);
                    callback(records);
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Mutex;

    fn log() -> (Arc<MemoryStore>, HistoryLog) {
        let store = Arc::new(MemoryStore::new());
        let log = HistoryLog::new(store.clone(), &UserPaths::for_user("u1"));
        (store, log)
    }

    fn exercises(names: &[&str]) -> Vec<ExerciseEntry> {
        names.iter().map(|n| ExerciseEntry::named(*n)).collect()
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let (_, log) = log();
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
        log.log_workout(base, &exercises(&["A"])).await.unwrap();
        log.log_workout(base + Duration::days(2), &exercises(&["C"])).await.unwrap();
        log.log_workout(base + Duration::days(1), &exercises(&["B"])).await.unwrap();

        let names: Vec<String> = log.list().await.unwrap().iter().map(|r| r.exercises[0].name.clone()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_archive_deep_copies_and_assigns_id() {
        let (_, log) = log();
        let mut list = exercises(&["Remo"]);
        let record = log.archive(&list).await.unwrap();
        list[0].name = "changed".to_string();

        let stored = log.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.exercises[0].name, "Remo");
        assert!(!record.id.is_empty());
        assert!(log.log_workout(Utc::now(), &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_update_record_replaces_given_fields() {
        let (_, log) = log();
        let record = log.archive(&exercises(&["A", "B"])).await.unwrap();
        let new_date = Utc.with_ymd_and_hms(2025, 12, 24, 9, 30, 0).unwrap();

        let updated = log
            .update_record(&record.id, RecordPatch { date: Some(new_date), exercises: None })
            .await
            .unwrap();
        assert_eq!(updated.date, new_date);
        assert_eq!(updated.exercises.len(), 2);

        let err = log.update_record("missing", RecordPatch::default()).await.unwrap_err();
        assert!(matches!(err, FitTrackError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_corrupt_records_are_skipped() {
        let (store, log) = log();
        log.archive(&exercises(&["A"])).await.unwrap();
        store.put("users/u1/completedWorkouts/bad", json!({"date": "yesterday"})).await.unwrap();

        assert_eq!(log.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_delivers_sorted_records() {
        let (_, log) = log();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = log.watch(move |records| sink.lock().unwrap().push(records.len()));

        log.archive(&exercises(&["A"])).await.unwrap();
        log.archive(&exercises(&["B"])).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
