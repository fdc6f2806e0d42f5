//! End-to-end workout flows against the in-memory document store
//!
//! Covers schedule editing, AI and manual session start, editing, finishing,
//! abandoning, and recovery from partial write failures.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fittrack::error::{OracleError, StoreError};
use fittrack::store::{Document, WatchCallback};
use fittrack::{
    resolve_day, AiRoutineStrategy, AppConfig, DocumentStore, ExerciseEdit, ExerciseEntry, FatigueLevel, FitTrack,
    FitTrackError, FocusLabel, ManualAssembly, MemoryStore, RetryPolicy, RoutineContext, RoutineOracle, SessionField,
    SessionKind, StartOutcome, Subscription, Weekday, WeekdayLocale,
};

/// Oracle that replays a fixed routine and records the contexts it saw
struct ScriptedOracle {
    routine: Vec<ExerciseEntry>,
    transient_failures: u32,
    calls: AtomicU32,
    seen_notes: Mutex<Vec<Option<String>>>,
}

impl ScriptedOracle {
    fn new(routine: Vec<ExerciseEntry>) -> Self {
        Self { routine, transient_failures: 0, calls: AtomicU32::new(0), seen_notes: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl RoutineOracle for ScriptedOracle {
    async fn generate_routine(&self, context: &RoutineContext) -> Result<Vec<ExerciseEntry>, OracleError> {
        self.seen_notes.lock().unwrap().push(context.notes.clone());
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.transient_failures {
            return Err(OracleError::Unavailable("model overloaded".to_string()));
        }
        Ok(self.routine.clone())
    }

    async fn recalculate_calories(&self, entry: &ExerciseEntry) -> Result<String, OracleError> {
        Ok(if entry.weight.raw().is_empty() { "40-60".to_string() } else { "90-110".to_string() })
    }
}

/// Wraps a store and fails the next delete when armed
struct FlakyDeleteStore {
    inner: MemoryStore,
    fail_next_delete: AtomicBool,
}

#[async_trait]
impl DocumentStore for FlakyDeleteStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, doc: Document) -> Result<(), StoreError> {
        self.inner.put(path, doc).await
    }

    async fn merge(&self, path: &str, partial: Document) -> Result<(), StoreError> {
        self.inner.merge(path, partial).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable { path: path.to_string(), reason: "connection reset".to_string() });
        }
        self.inner.delete(path).await
    }

    async fn append_to_collection(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        self.inner.append_to_collection(collection, doc).await
    }

    async fn list_collection(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        self.inner.list_collection(collection).await
    }

    fn subscribe(&self, path: &str, callback: WatchCallback) -> Subscription {
        self.inner.subscribe(path, callback)
    }
}

fn exercise(name: &str, group: &str, weight: &str) -> ExerciseEntry {
    let mut entry = ExerciseEntry::named(name);
    entry.sets = "4".into();
    entry.reps = "8-10".into();
    entry.weight = weight.into();
    entry.muscle_group = group.to_string();
    entry.calories_burned = "80-100".to_string();
    entry
}

fn upper_body_routine() -> Vec<ExerciseEntry> {
    vec![
        exercise("Press de banca", "Pecho", "60kg"),
        exercise("Remo con barra", "Espalda", "50kg"),
        exercise("Press militar", "Hombros", "30kg"),
    ]
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.settings.user_id = "athlete-1".to_string();
    config
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, initial_backoff: Duration::from_millis(1) }
}

async fn app_with(store: Arc<dyn DocumentStore>) -> FitTrack {
    FitTrack::with_store(test_config(), store).await.unwrap()
}

#[tokio::test]
async fn test_ai_session_flow_archives_exactly_one_record() {
    let store = Arc::new(MemoryStore::new());
    let mut app = app_with(store.clone()).await;
    let oracle = Arc::new(ScriptedOracle::new(upper_body_routine()));
    let strategy = AiRoutineStrategy::new(oracle.clone(), fast_retry());

    // 2026-10-19 is a Monday
    let context = app
        .routine_context(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(), FatigueLevel::Normal, None)
        .await
        .unwrap();
    assert_eq!(context.today.weekday_key, Weekday::Lunes);
    assert!(!context.today.is_rest());

    let routine = strategy.generate(&context).await.unwrap();
    let outcome = app.sessions.start(SessionKind::Ai, routine).await.unwrap();
    assert!(outcome.is_new());

    app.sessions.update(ExerciseEdit::ToggleComplete { index: 0 }).await.unwrap();
    app.sessions.update(ExerciseEdit::ToggleComplete { index: 1 }).await.unwrap();
    let calories = app.sessions.recalculate_calories(2, &strategy).await.unwrap();
    assert_eq!(calories, "90-110");

    let expected = app.sessions.current().unwrap().exercises.clone();
    let record = app.sessions.finish().await.unwrap();

    assert!(!app.sessions.is_active());
    assert_eq!(record.exercises, expected);
    let history = app.sessions.history().list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
    assert_eq!(history[0].exercises, expected);
    assert_eq!(app.classifier.classify(&history[0].exercises), FocusLabel::TrenSuperior);
}

#[tokio::test]
async fn test_transient_oracle_failures_are_retried() {
    let store = Arc::new(MemoryStore::new());
    let app = app_with(store).await;
    let oracle = Arc::new(ScriptedOracle { transient_failures: 2, ..ScriptedOracle::new(upper_body_routine()) });
    let strategy = AiRoutineStrategy::new(oracle.clone(), fast_retry());

    let context = app
        .routine_context(
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            FatigueLevel::High,
            Some("solo tengo 20 minutos".to_string()),
        )
        .await
        .unwrap();
    let routine = strategy.generate(&context).await.unwrap();

    assert_eq!(routine.len(), 3);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    assert!(oracle
        .seen_notes
        .lock()
        .unwrap()
        .iter()
        .all(|n| n.as_deref() == Some("solo tengo 20 minutos")));
}

#[tokio::test]
async fn test_abandon_leaves_history_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let mut app = app_with(store).await;

    app.sessions.start(SessionKind::Manual, upper_body_routine()).await.unwrap();
    app.sessions.update(ExerciseEdit::ToggleComplete { index: 0 }).await.unwrap();

    assert!(app.sessions.abandon().await.unwrap());
    assert!(!app.sessions.is_active());
    assert!(app.sessions.history().list().await.unwrap().is_empty());
    assert!(!app.sessions.abandon().await.unwrap());
}

#[tokio::test]
async fn test_second_start_observes_first_session() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let mut first = app_with(Arc::clone(&store)).await;
    first.sessions.start(SessionKind::Ai, upper_body_routine()).await.unwrap();

    // Another device for the same user
    let mut second = app_with(Arc::clone(&store)).await;
    let outcome = second
        .sessions
        .start(SessionKind::Manual, vec![exercise("Sentadilla", "Piernas", "80kg")])
        .await
        .unwrap();

    match outcome {
        StartOutcome::AlreadyActive(session) => {
            assert_eq!(session.kind, SessionKind::Ai);
            assert_eq!(session.exercises, upper_body_routine());
        }
        StartOutcome::Started(_) => panic!("second start must not replace the active session"),
    }
}

#[tokio::test]
async fn test_finish_retry_after_archive_failure_does_not_duplicate() {
    let store = Arc::new(MemoryStore::new());
    let mut app = app_with(store.clone()).await;
    app.sessions.start(SessionKind::Manual, upper_body_routine()).await.unwrap();

    store.fail_writes_matching("completedWorkouts");
    let err = app.sessions.finish().await.unwrap_err();
    assert!(matches!(err, FitTrackError::Store(StoreError::Unavailable { .. })));
    assert!(app.sessions.is_active());
    let reserved = app.sessions.current().unwrap().finishing.clone().unwrap();

    store.heal();
    let record = app.sessions.finish().await.unwrap();

    assert_eq!(record.id, reserved.id);
    assert_eq!(app.sessions.history().list().await.unwrap().len(), 1);
    assert!(!app.sessions.is_active());
}

#[tokio::test]
async fn test_finish_retry_after_slot_delete_failure_does_not_duplicate() {
    let store = Arc::new(FlakyDeleteStore { inner: MemoryStore::new(), fail_next_delete: AtomicBool::new(true) });
    let mut app = app_with(store.clone()).await;
    app.sessions.start(SessionKind::Manual, upper_body_routine()).await.unwrap();

    assert!(app.sessions.finish().await.is_err());
    assert!(app.sessions.is_active());
    assert_eq!(app.sessions.history().list().await.unwrap().len(), 1);

    // A restart in between must pick the reservation up from the store
    let mut restarted = app_with(store.clone()).await;
    assert!(restarted.sessions.is_active());
    let record = restarted.sessions.finish().await.unwrap();

    let history = restarted.sessions.history().list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
}

#[tokio::test]
async fn test_failed_schedule_save_rolls_back() {
    let store = Arc::new(MemoryStore::new());
    let app = app_with(store.clone()).await;
    let wednesday = NaiveDate::from_ymd_opt(2026, 10, 21).unwrap();
    let before = app.plan_for(wednesday).await.unwrap();

    let mut editor = app.profile.schedule_editor().await.unwrap();
    editor
        .update_session(Weekday::Miercoles, 0, SessionField::Name("Natación".to_string()))
        .unwrap();
    assert!(editor.is_dirty());

    store.fail_writes_matching("profile");
    assert!(app.profile.save_schedule(&mut editor).await.is_err());
    store.heal();

    assert!(!editor.is_dirty());
    assert_eq!(editor.draft(), editor.confirmed());
    let after = app.plan_for(wednesday).await.unwrap();
    assert_eq!(after, before);
    let stored = app.profile.load().await.unwrap().workout_schedule;
    assert_eq!(resolve_day(&stored, wednesday, WeekdayLocale::Es), before);
}

#[tokio::test]
async fn test_manual_session_from_favorites() {
    let store = Arc::new(MemoryStore::new());
    let mut app = app_with(store).await;

    for entry in upper_body_routine() {
        app.profile.toggle_favorite(&entry).await.unwrap();
    }
    let favorites = app.profile.favorites().await.unwrap();
    assert_eq!(favorites.len(), 3);

    let selected: HashSet<String> = ["Press militar", "Press de banca", "Dominadas"].iter().map(|s| s.to_string()).collect();
    let routine = ManualAssembly::assemble(&selected, favorites.as_slice());
    let names: Vec<&str> = routine.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Press de banca", "Press militar"]);
    assert!(routine.iter().all(|e| !e.completed));

    let outcome = app.sessions.start(SessionKind::Manual, routine).await.unwrap();
    assert_eq!(outcome.session().kind, SessionKind::Manual);

    let err = app.sessions.update(ExerciseEdit::Remove { index: 7 }).await.unwrap_err();
    assert!(matches!(err, FitTrackError::NotFound(_)));
    assert_eq!(app.sessions.current().unwrap().exercises.len(), 2);
}

#[tokio::test]
async fn test_failed_update_keeps_local_state() {
    let store = Arc::new(MemoryStore::new());
    let mut app = app_with(store.clone()).await;
    app.sessions.start(SessionKind::Manual, upper_body_routine()).await.unwrap();

    store.fail_writes_matching("inProgressWorkout");
    assert!(app.sessions.update(ExerciseEdit::ToggleComplete { index: 0 }).await.is_err());
    store.heal();

    assert_eq!(app.sessions.current().unwrap().completed_count(), 0);
}

#[tokio::test]
async fn test_history_watch_sees_finished_workouts() {
    let store = Arc::new(MemoryStore::new());
    let mut app = app_with(store).await;
    let counts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&counts);
    let _sub = app.sessions.history().watch(move |records| sink.lock().unwrap().push(records.len()));

    app.sessions.start(SessionKind::Manual, upper_body_routine()).await.unwrap();
    app.sessions.finish().await.unwrap();
    app.sessions.start(SessionKind::Manual, vec![exercise("Sentadilla", "Piernas", "80kg")]).await.unwrap();
    app.sessions.finish().await.unwrap();

    assert_eq!(counts.lock().unwrap().last(), Some(&2));
}

#[tokio::test]
async fn test_empty_user_id_is_rejected() {
    let mut config = AppConfig::default();
    config.settings.user_id = "  ".to_string();
    let err = FitTrack::with_store(config, Arc::new(MemoryStore::new())).await.err().unwrap();
    assert!(matches!(err, FitTrackError::Configuration(_)));
}
