//! Training-focus classification of past workouts
//!
//! A keyword heuristic over muscle groups and exercise names. The keyword
//! lists are plain configuration ([`FocusKeywords`]) so they can be tuned
//! from the config file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{normalize_key, CompletedWorkoutRecord, ExerciseEntry, REST_LABEL};

/// Share of cardio entries at or above which a workout reads as cardio
const CARDIO_DOMINANCE: f64 = 0.5;
/// Share of upper (or lower) entries above which a workout is single-region
const REGION_DOMINANCE: f64 = 0.7;

/// Primary emphasis of a workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FocusLabel {
    #[serde(rename = "Tren Superior")]
    TrenSuperior,
    #[serde(rename = "Tren Inferior")]
    TrenInferior,
    Cardio,
    #[serde(rename = "Full Body")]
    FullBody,
    General,
    Descanso,
}

impl fmt::Display for FocusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FocusLabel::TrenSuperior => "Tren Superior",
            FocusLabel::TrenInferior => "Tren Inferior",
            FocusLabel::Cardio => "Cardio",
            FocusLabel::FullBody => "Full Body",
            FocusLabel::General => "General",
            FocusLabel::Descanso => REST_LABEL,
        };
        f.write_str(label)
    }
}

/// Keyword lists, compared after lowercasing and accent folding.
///
/// `upper`, `lower` and `cardio` are substrings of the muscle group.
/// `cardio_names` are matched against the exercise name at word starts
/// only, so "Crunch bicicleta" or "tríceps con cuerda" stay strength work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusKeywords {
    pub upper: Vec<String>,
    pub lower: Vec<String>,
    pub cardio: Vec<String>,
    pub cardio_names: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for FocusKeywords {
    fn default() -> Self {
        Self {
            upper: words(&[
                "pecho", "espalda", "hombro", "biceps", "triceps", "brazo", "dorsal", "trapecio", "antebrazo",
                "chest", "back", "shoulder", "arm", "lats",
            ]),
            lower: words(&[
                "pierna", "cuadriceps", "isquio", "gluteo", "gemelo", "pantorrilla", "femoral", "aductor",
                "legs", "quad", "hamstring", "glute", "calf", "calves",
            ]),
            cardio: words(&[
                "cardio", "aerobic", "natacion", "ciclismo", "carrera", "running", "swim", "cycling", "hiit",
            ]),
            cardio_names: words(&[
                "cardio", "correr", "carrera", "trote", "trotar", "nadar", "natacion", "ciclismo", "bicicleta estatica",
                "comba", "saltar la cuerda", "saltos de cuerda", "burpee", "futbol", "running", "swim", "cycling",
                "hiit", "jumping jack",
            ]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Upper,
    Lower,
    Cardio,
    Other,
}

/// Counts per bucket for one workout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusBreakdown {
    pub upper: usize,
    pub lower: usize,
    pub cardio: usize,
    pub other: usize,
}

impl FocusBreakdown {
    pub fn total(&self) -> usize {
        self.upper + self.lower + self.cardio + self.other
    }
}

#[derive(Debug, Clone, Default)]
pub struct FocusClassifier {
    upper: Vec<String>,
    lower: Vec<String>,
    cardio: Vec<String>,
    cardio_names: Vec<String>,
}

impl FocusClassifier {
    pub fn new(keywords: &FocusKeywords) -> Self {
        let normalize = |list: &[String]| -> Vec<String> {
            list.iter().map(|k| normalize_key(k)).filter(|k| !k.is_empty()).collect()
        };
        Self {
            upper: normalize(&keywords.upper),
            lower: normalize(&keywords.lower),
            cardio: normalize(&keywords.cardio),
            cardio_names: normalize(&keywords.cardio_names),
        }
    }

    fn matches(keywords: &[String], text: &str) -> bool {
        !text.is_empty() && keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// Keyword occurs where a word begins ("burpees" matches "burpee",
    /// "recorrer" does not match "correr")
    fn matches_word_start(keywords: &[String], text: &str) -> bool {
        keywords.iter().any(|k| {
            text.match_indices(k.as_str())
                .any(|(i, _)| !text[..i].chars().next_back().is_some_and(char::is_alphanumeric))
        })
    }

    /// Cardio is checked first, so an entry lands in exactly one bucket
    fn bucket(&self, entry: &ExerciseEntry) -> Bucket {
        let group = normalize_key(&entry.muscle_group);
        let name = normalize_key(&entry.name);
        if Self::matches(&self.cardio, &group) || Self::matches_word_start(&self.cardio_names, &name) {
            Bucket::Cardio
        } else if Self::matches(&self.upper, &group) {
            Bucket::Upper
        } else if Self::matches(&self.lower, &group) {
            Bucket::Lower
        } else {
            Bucket::Other
        }
    }

    pub fn breakdown(&self, exercises: &[ExerciseEntry]) -> FocusBreakdown {
        let mut counts = FocusBreakdown::default();
        for entry in exercises {
            match self.bucket(entry) {
                Bucket::Upper => counts.upper += 1,
                Bucket::Lower => counts.lower += 1,
                Bucket::Cardio => counts.cardio += 1,
                Bucket::Other => counts.other += 1,
            }
        }
        counts
    }

    /// Total over any list; the order of the checks is the tie-break policy
    pub fn classify(&self, exercises: &[ExerciseEntry]) -> FocusLabel {
        let counts = self.breakdown(exercises);
        let total = counts.total();
        if total == 0 {
            return FocusLabel::Descanso;
        }

        let share = |n: usize| n as f64 / total as f64;
        if share(counts.cardio) >= CARDIO_DOMINANCE {
            FocusLabel::Cardio
        } else if share(counts.upper) > REGION_DOMINANCE {
            FocusLabel::TrenSuperior
        } else if share(counts.lower) > REGION_DOMINANCE {
            FocusLabel::TrenInferior
        } else if counts.upper > 0 && counts.lower > 0 {
            FocusLabel::FullBody
        } else if counts.upper > 0 {
            FocusLabel::TrenSuperior
        } else if counts.lower > 0 {
            FocusLabel::TrenInferior
        } else {
            FocusLabel::General
        }
    }

    /// Focus per calendar day (UTC); the latest record of a day wins
    pub fn focus_calendar(&self, records: &[CompletedWorkoutRecord]) -> BTreeMap<NaiveDate, FocusLabel> {
        let mut latest: BTreeMap<NaiveDate, &CompletedWorkoutRecord> = BTreeMap::new();
        for record in records {
            let day = record.date.date_naive();
            match latest.get(&day) {
                Some(existing) if existing.date >= record.date => {}
                _ => {
                    latest.insert(day, record);
                }
            }
        }
        latest
            .into_iter()
            .map(|(day, record)| (day, self.classify(&record.exercises)))
            .collect()
    }

    /// How many workouts fall under each focus
    pub fn focus_distribution(&self, records: &[CompletedWorkoutRecord]) -> BTreeMap<FocusLabel, usize> {
        let mut distribution = BTreeMap::new();
        for record in records {
            *distribution.entry(self.classify(&record.exercises)).or_insert(0) += 1;
        }
        distribution
    }
}
