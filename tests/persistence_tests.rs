//! Restart behaviour against the SQLite document store

use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use fittrack::export::{write_history, DateRange, ExportFormat};
use fittrack::{
    AppConfig, ExerciseEdit, ExerciseEntry, FitTrack, Goals, SessionField, SessionKind, StartOutcome, Weekday,
};

fn config_in(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.settings.data_dir = dir.path().join("data");
    config.settings.user_id = "athlete-1".to_string();
    config
}

fn routine() -> Vec<ExerciseEntry> {
    let mut squat = ExerciseEntry::named("Sentadilla");
    squat.muscle_group = "Piernas".to_string();
    squat.calories_burned = "100-120".to_string();
    let mut lunge = ExerciseEntry::named("Zancadas");
    lunge.muscle_group = "Glúteos".to_string();
    lunge.calories_burned = "60".to_string();
    vec![squat, lunge]
}

#[tokio::test]
async fn test_active_session_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let mut app = FitTrack::open(config_in(&dir)).await.unwrap();
        app.sessions.start(SessionKind::Manual, routine()).await.unwrap();
        app.sessions.update(ExerciseEdit::ToggleComplete { index: 1 }).await.unwrap();
    }

    let mut app = FitTrack::open(config_in(&dir)).await.unwrap();
    let resumed = app.sessions.current().expect("session resumed from disk");
    assert_eq!(resumed.exercises.len(), 2);
    assert!(resumed.exercises[1].completed);

    let outcome = app.sessions.start(SessionKind::Ai, vec![ExerciseEntry::named("Burpees")]).await.unwrap();
    assert!(matches!(outcome, StartOutcome::AlreadyActive(_)));

    let record = app.sessions.finish().await.unwrap();
    drop(app);

    let app = FitTrack::open(config_in(&dir)).await.unwrap();
    assert!(!app.sessions.is_active());
    let history = app.sessions.history().list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
    assert_eq!(history[0].exercises, record.exercises);
}

#[tokio::test]
async fn test_profile_edits_persist() {
    let dir = TempDir::new().unwrap();

    {
        let app = FitTrack::open(config_in(&dir)).await.unwrap();
        let mut editor = app.profile.schedule_editor().await.unwrap();
        editor.remove_session(Weekday::Jueves, 0).unwrap();
        let profile = app.profile.load().await.unwrap();
        let index = editor.add_session(Weekday::Domingo, &profile.custom_workout_types);
        editor
            .update_session(Weekday::Domingo, index, SessionField::Name("Ciclismo".to_string()))
            .unwrap();
        app.profile.save_schedule(&mut editor).await.unwrap();
        app.profile.update_goals(Goals { calories: 2800, ..Goals::default() }).await.unwrap();
        app.profile.add_session_type("Ciclismo").await.unwrap();
    }

    let app = FitTrack::open(config_in(&dir)).await.unwrap();
    // 2026-10-22 is a Thursday, 2026-10-25 a Sunday
    assert!(app.plan_for(NaiveDate::from_ymd_opt(2026, 10, 22).unwrap()).await.unwrap().is_rest());
    let sunday = app.plan_for(NaiveDate::from_ymd_opt(2026, 10, 25).unwrap()).await.unwrap();
    assert_eq!(sunday.sessions[0].name, "Ciclismo");

    let profile = app.profile.load().await.unwrap();
    assert_eq!(profile.goals.calories, 2800);
    assert!(profile.custom_workout_types.contains("Ciclismo"));
}

#[tokio::test]
async fn test_logged_workouts_export_in_date_order() {
    let dir = TempDir::new().unwrap();
    let app = FitTrack::open(config_in(&dir)).await.unwrap();
    let history = app.sessions.history();

    history
        .log_workout(Utc.with_ymd_and_hms(2026, 10, 1, 7, 30, 0).unwrap(), &routine())
        .await
        .unwrap();
    history
        .log_workout(Utc.with_ymd_and_hms(2026, 10, 8, 7, 30, 0).unwrap(), &routine())
        .await
        .unwrap();
    assert!(history.log_workout(Utc::now(), &[]).await.is_err());

    let records = history.list().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].date > records[1].date);

    let mut out: Vec<u8> = Vec::new();
    let written = write_history(
        &records,
        &app.classifier,
        DateRange::new(NaiveDate::from_ymd_opt(2026, 10, 5), None),
        ExportFormat::Csv,
        &mut out,
    )
    .unwrap();
    let csv = String::from_utf8(out).unwrap();

    assert_eq!(written, 1);
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("Tren Inferior"));
    assert!(csv.contains("2026-10-08"));
}
