//! History export to CSV (one row per exercise) and JSON (one object per
//! workout)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::focus::{FocusClassifier, FocusLabel};
use crate::models::{CompletedWorkoutRecord, ExerciseEntry};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl ExportFormat {
    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(|e| e.parse().ok())
    }
}

/// Inclusive date range filter (UTC dates)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        let after_start = self.start.map_or(true, |start| date >= &start);
        let before_end = self.end.map_or(true, |end| date <= &end);
        after_start && before_end
    }
}

#[derive(Debug, Serialize)]
struct ExerciseRow<'a> {
    workout_id: &'a str,
    date: String,
    focus: String,
    exercise: &'a str,
    sets: &'a str,
    reps: &'a str,
    weight: &'a str,
    equipment: String,
    muscle_group: &'a str,
    calories: &'a str,
    completed: bool,
}

#[derive(Debug, Serialize)]
struct WorkoutExport<'a> {
    id: &'a str,
    date: DateTime<Utc>,
    focus: FocusLabel,
    estimated_calories: Decimal,
    exercises: &'a [ExerciseEntry],
}

/// Write `records` in the chosen format. Returns the number of workouts written.
pub fn write_history<W: Write>(
    records: &[CompletedWorkoutRecord],
    classifier: &FocusClassifier,
    range: DateRange,
    format: ExportFormat,
    writer: W,
) -> Result<usize, ExportError> {
    let selected: Vec<&CompletedWorkoutRecord> =
        records.iter().filter(|r| range.contains(&r.date.date_naive())).collect();

    match format {
        ExportFormat::Csv => {
            let mut csv = csv::Writer::from_writer(writer);
            for record in &selected {
                let focus = classifier.classify(&record.exercises).to_string();
                let date = record.date.format("%Y-%m-%d %H:%M").to_string();
                for entry in &record.exercises {
                    csv.serialize(ExerciseRow {
                        workout_id: &record.id,
                        date: date.clone(),
                        focus: focus.clone(),
                        exercise: &entry.name,
                        sets: entry.sets.raw(),
                        reps: entry.reps.raw(),
                        weight: entry.weight.raw(),
                        equipment: format!("{:?}", entry.equipment).to_lowercase(),
                        muscle_group: &entry.muscle_group,
                        calories: &entry.calories_burned,
                        completed: entry.completed,
                    })?;
                }
            }
            csv.flush()?;
        }
        ExportFormat::Json => {
            let workouts: Vec<WorkoutExport> = selected
                .iter()
                .map(|record| WorkoutExport {
                    id: &record.id,
                    date: record.date,
                    focus: classifier.classify(&record.exercises),
                    estimated_calories: record.estimated_calories(),
                    exercises: &record.exercises,
                })
                .collect();
            serde_json::to_writer_pretty(writer, &workouts)?;
        }
    }

    Ok(selected.len())
}

/// Export history to a file
pub fn export_history<P: AsRef<Path>>(
    records: &[CompletedWorkoutRecord],
    classifier: &FocusClassifier,
    range: DateRange,
    format: ExportFormat,
    output_path: P,
) -> Result<usize, ExportError> {
    let file = File::create(output_path)?;
    let count = write_history(records, classifier, range, format, file)?;
    tracing::info!(count, ?format, "Exported workout history");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::FocusKeywords;
    use chrono::TimeZone;

    fn record(id: &str, day: u32, names: &[(&str, &str)]) -> CompletedWorkoutRecord {
        CompletedWorkoutRecord {
            id: id.to_string(),
            date: Utc.with_ymd_and_hms(2026, 4, day, 18, 0, 0).unwrap(),
            exercises: names
                .iter()
                .map(|(name, group)| {
                    let mut e = ExerciseEntry::named(*name);
                    e.muscle_group = group.to_string();
                    e.calories_burned = "60-80".to_string();
                    e
                })
                .collect(),
        }
    }

    #[test]
    fn test_csv_has_one_row_per_exercise() {
        let records = vec![
            record("a", 1, &[("Press, banca", "pecho"), ("Remo", "espalda")]),
            record("b", 3, &[("Sentadilla", "piernas")]),
        ];
        let mut out: Vec<u8> = Vec::new();
        let count = write_history(
            &records,
            &FocusClassifier::new(&FocusKeywords::default()),
            DateRange::default(),
            ExportFormat::Csv,
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("workout_id,date,focus,exercise"));
        assert!(text.contains("\"Press, banca\""));
        assert!(text.contains("Tren Superior"));
    }

    #[test]
    fn test_json_export_respects_date_range() {
        let records = vec![record("a", 1, &[("Remo", "espalda")]), record("b", 10, &[("Sentadilla", "piernas")])];
        let range = DateRange::new(NaiveDate::from_ymd_opt(2026, 4, 5), None);
        let mut out: Vec<u8> = Vec::new();
        let count = write_history(
            &records,
            &FocusClassifier::new(&FocusKeywords::default()),
            range,
            ExportFormat::Json,
            &mut out,
        )
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(count, 1);
        assert_eq!(parsed[0]["id"], "b");
        assert_eq!(parsed[0]["focus"], "Tren Inferior");
        assert!(!parsed[0]["estimated_calories"].is_null());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("pdf".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::from_path(Path::new("out.json")), Some(ExportFormat::Json));
    }
}
