use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FitTrackError;

/// Days of the training week, keyed by their accent-free Spanish names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Lunes,
    Martes,
    Miercoles,
    Jueves,
    Viernes,
    Sabado,
    Domingo,
}

impl Weekday {
    /// Canonical week order, Monday first
    pub const ALL: [Weekday; 7] = [
        Weekday::Lunes,
        Weekday::Martes,
        Weekday::Miercoles,
        Weekday::Jueves,
        Weekday::Viernes,
        Weekday::Sabado,
        Weekday::Domingo,
    ];

    /// Map key used in stored schedules
    pub fn key(&self) -> &'static str {
        match self {
            Weekday::Lunes => "lunes",
            Weekday::Martes => "martes",
            Weekday::Miercoles => "miercoles",
            Weekday::Jueves => "jueves",
            Weekday::Viernes => "viernes",
            Weekday::Sabado => "sabado",
            Weekday::Domingo => "domingo",
        }
    }

    /// Parse a weekday from any casing/accenting of its Spanish or English
    /// name, or the three-letter Spanish abbreviation.
    pub fn from_name(name: &str) -> Option<Self> {
        match normalize_key(name).as_str() {
            "lunes" | "lun" | "monday" | "mon" => Some(Weekday::Lunes),
            "martes" | "mar" | "tuesday" | "tue" => Some(Weekday::Martes),
            "miercoles" | "mie" | "wednesday" | "wed" => Some(Weekday::Miercoles),
            "jueves" | "jue" | "thursday" | "thu" => Some(Weekday::Jueves),
            "viernes" | "vie" | "friday" | "fri" => Some(Weekday::Viernes),
            "sabado" | "sab" | "saturday" | "sat" => Some(Weekday::Sabado),
            "domingo" | "dom" | "sunday" | "sun" => Some(Weekday::Domingo),
            _ => None,
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Lunes,
            chrono::Weekday::Tue => Weekday::Martes,
            chrono::Weekday::Wed => Weekday::Miercoles,
            chrono::Weekday::Thu => Weekday::Jueves,
            chrono::Weekday::Fri => Weekday::Viernes,
            chrono::Weekday::Sat => Weekday::Sabado,
            chrono::Weekday::Sun => Weekday::Domingo,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lowercase and strip diacritics so "Miércoles" and "miercoles" compare equal.
pub fn normalize_key(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        // combining marks left over from decomposed input
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Wall-clock time of a scheduled session, stored as "HH:MM"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(ClockTime)
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl Default for ClockTime {
    /// 08:00
    fn default() -> Self {
        ClockTime(NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

impl FromStr for ClockTime {
    type Err = FitTrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(ClockTime)
            .map_err(|_| FitTrackError::Validation(format!("Invalid clock time '{}', expected HH:MM", s)))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = FitTrackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(time: ClockTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// One planned session on a weekday
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub time: ClockTime,
    pub name: String,
}

/// Label conventionally used for rest days. Rest is an empty day, never a
/// labelled entry.
pub const REST_LABEL: &str = "Descanso";

/// User-extensible list of session type labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTypeVocabulary(Vec<String>);

impl Default for SessionTypeVocabulary {
    fn default() -> Self {
        SessionTypeVocabulary(
            [
                "Natación",
                "Pesas - Tren Superior",
                "Pesas - Tren Inferior",
                "Fútbol",
                "Cardio Ligero",
                "Full Body",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }
}

impl SessionTypeVocabulary {
    /// Append a label. Returns false for blanks, the rest label, and labels
    /// already present (compared accent- and case-insensitively).
    pub fn add(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || normalize_key(label) == normalize_key(REST_LABEL) || self.contains(label) {
            return false;
        }
        self.0.push(label.to_string());
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        let key = normalize_key(label);
        self.0.iter().any(|l| normalize_key(l) == key)
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    /// First label, used when adding a fresh session to a day
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

/// Equipment an exercise is performed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Equipment {
    Dumbbell,
    Barbell,
    #[default]
    Bodyweight,
    Machine,
}

impl Equipment {
    /// Best-effort mapping of free text (Spanish or English) to equipment.
    /// Unrecognised text maps to bodyweight.
    pub fn from_text(text: &str) -> Self {
        let key = normalize_key(text);
        if key.contains("mancuerna") || key.contains("dumbbell") {
            Equipment::Dumbbell
        } else if key.contains("barra") || key.contains("barbell") {
            Equipment::Barbell
        } else if key.contains("maquina") || key.contains("machine") || key.contains("polea") {
            Equipment::Machine
        } else {
            Equipment::Bodyweight
        }
    }
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Equipment::Dumbbell => "Mancuernas",
            Equipment::Barbell => "Barra",
            Equipment::Bodyweight => "Peso corporal",
            Equipment::Machine => "Máquina",
        };
        f.write_str(label)
    }
}

/// User-editable quantity ("3", "8-10", "peso corporal") with the first
/// number found in it, when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DisplayQuantity {
    raw: String,
    value: Option<Decimal>,
}

impl DisplayQuantity {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let value = numbers_in(&raw).into_iter().next();
        Self { raw, value }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn is_numeric(&self) -> bool {
        self.value.is_some()
    }
}

impl From<String> for DisplayQuantity {
    fn from(raw: String) -> Self {
        DisplayQuantity::new(raw)
    }
}

impl From<&str> for DisplayQuantity {
    fn from(raw: &str) -> Self {
        DisplayQuantity::new(raw)
    }
}

impl From<DisplayQuantity> for String {
    fn from(quantity: DisplayQuantity) -> Self {
        quantity.raw
    }
}

impl fmt::Display for DisplayQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Extract every decimal number in a string, accepting ',' as decimal separator.
fn numbers_in(text: &str) -> Vec<Decimal> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in text.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() || ((c == '.' || c == ',') && !current.is_empty() && !current.contains('.')) {
            current.push(if c == ',' { '.' } else { c });
        } else if !current.is_empty() {
            let token = current.trim_end_matches('.');
            if let Ok(n) = Decimal::from_str(token) {
                numbers.push(n);
            }
            current.clear();
        }
    }
    numbers
}

/// Calorie figure parsed out of the free-text `caloriesBurned` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalorieEstimate {
    pub low: Decimal,
    pub high: Decimal,
}

impl CalorieEstimate {
    /// "120", "120 kcal" and "60-80" are understood; anything else is None.
    pub fn parse(text: &str) -> Option<Self> {
        let numbers = numbers_in(text);
        match numbers.as_slice() {
            [] => None,
            [single] => Some(Self { low: *single, high: *single }),
            [a, b, ..] => Some(Self { low: (*a).min(*b), high: (*a).max(*b) }),
        }
    }

    /// Values are non-negative and `low <= high`, so the half-difference
    /// form cannot overflow
    pub fn midpoint(&self) -> Decimal {
        match self.low.checked_add(self.high) {
            Some(sum) => sum / Decimal::TWO,
            None => self
                .low
                .checked_add((self.high - self.low) / Decimal::TWO)
                .unwrap_or(self.high),
        }
    }
}

/// One exercise inside a workout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseEntry {
    pub name: String,
    #[serde(default)]
    pub sets: DisplayQuantity,
    #[serde(default)]
    pub reps: DisplayQuantity,
    #[serde(default)]
    pub weight: DisplayQuantity,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub video_search_query: String,
    #[serde(default)]
    pub estimated_duration: String,
    #[serde(default)]
    pub difficulty_level: String,
    #[serde(default)]
    pub calories_burned: String,
    #[serde(default)]
    pub muscle_group: String,
    #[serde(default)]
    pub completed: bool,
}

impl ExerciseEntry {
    /// Bare entry with only a name; all other fields empty
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sets: DisplayQuantity::default(),
            reps: DisplayQuantity::default(),
            weight: DisplayQuantity::default(),
            equipment: Equipment::default(),
            video_search_query: String::new(),
            estimated_duration: String::new(),
            difficulty_level: String::new(),
            calories_burned: String::new(),
            muscle_group: String::new(),
            completed: false,
        }
    }

    pub fn calorie_estimate(&self) -> Option<CalorieEstimate> {
        CalorieEstimate::parse(&self.calories_burned)
    }

    /// YouTube search link for the exercise's tutorial query (falls back to the name)
    pub fn video_url(&self) -> String {
        let query = if self.video_search_query.trim().is_empty() {
            self.name.as_str()
        } else {
            self.video_search_query.as_str()
        };
        match reqwest::Url::parse_with_params("https://www.youtube.com/results", &[("search_query", query)]) {
            Ok(url) => url.to_string(),
            Err(_) => "https://www.youtube.com/results".to_string(),
        }
    }
}

/// Exercise pinned by the user for reuse; unique by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteExercise {
    pub name: String,
    #[serde(default)]
    pub sets: DisplayQuantity,
    #[serde(default)]
    pub reps: DisplayQuantity,
    #[serde(default)]
    pub weight: DisplayQuantity,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub video_search_query: String,
    #[serde(default)]
    pub estimated_duration: String,
    #[serde(default)]
    pub difficulty_level: String,
    #[serde(default)]
    pub calories_burned: String,
    #[serde(default)]
    pub muscle_group: String,
}

impl From<&ExerciseEntry> for FavoriteExercise {
    fn from(entry: &ExerciseEntry) -> Self {
        Self {
            name: entry.name.clone(),
            sets: entry.sets.clone(),
            reps: entry.reps.clone(),
            weight: entry.weight.clone(),
            equipment: entry.equipment,
            video_search_query: entry.video_search_query.clone(),
            estimated_duration: entry.estimated_duration.clone(),
            difficulty_level: entry.difficulty_level.clone(),
            calories_burned: entry.calories_burned.clone(),
            muscle_group: entry.muscle_group.clone(),
        }
    }
}

impl FavoriteExercise {
    /// Fresh, not-yet-completed session entry with this favorite's values
    pub fn to_entry(&self) -> ExerciseEntry {
        ExerciseEntry {
            name: self.name.clone(),
            sets: self.sets.clone(),
            reps: self.reps.clone(),
            weight: self.weight.clone(),
            equipment: self.equipment,
            video_search_query: self.video_search_query.clone(),
            estimated_duration: self.estimated_duration.clone(),
            difficulty_level: self.difficulty_level.clone(),
            calories_burned: self.calories_burned.clone(),
            muscle_group: self.muscle_group.clone(),
            completed: false,
        }
    }
}

/// How an in-progress session was populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Ai,
    Manual,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Ai => f.write_str("ai"),
            SessionKind::Manual => f.write_str("manual"),
        }
    }
}

/// History id and end time reserved by a finish attempt, so that a retried
/// finish rewrites the same record instead of appending a second one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReservation {
    pub id: String,
    pub date: DateTime<Utc>,
}

/// The single active, unsaved workout of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InProgressSession {
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub exercises: Vec<ExerciseEntry>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finishing: Option<ArchiveReservation>,
}

impl InProgressSession {
    pub fn completed_count(&self) -> usize {
        self.exercises.iter().filter(|e| e.completed).count()
    }

    pub fn all_completed(&self) -> bool {
        !self.exercises.is_empty() && self.exercises.iter().all(|e| e.completed)
    }

    pub fn estimated_calories(&self) -> Decimal {
        estimated_calories(&self.exercises)
    }
}

/// Sum of calorie midpoints over entries with a parseable estimate,
/// saturating at `Decimal::MAX`
pub fn estimated_calories(exercises: &[ExerciseEntry]) -> Decimal {
    exercises
        .iter()
        .filter_map(ExerciseEntry::calorie_estimate)
        .fold(Decimal::ZERO, |total, c| total.checked_add(c.midpoint()).unwrap_or(Decimal::MAX))
}

/// Immutable snapshot of a finished workout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedWorkoutRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub date: DateTime<Utc>,
    pub exercises: Vec<ExerciseEntry>,
}

impl CompletedWorkoutRecord {
    pub fn estimated_calories(&self) -> Decimal {
        estimated_calories(&self.exercises)
    }
}
