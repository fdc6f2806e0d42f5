//! Exercise entry edits and the favorites pool

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{FitTrackError, Result};
use crate::models::{normalize_key, DisplayQuantity, Equipment, ExerciseEntry, FavoriteExercise};

/// User-editable field of an exercise entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseField {
    Name,
    Sets,
    Reps,
    Weight,
    Equipment,
    MuscleGroup,
    CaloriesBurned,
    EstimatedDuration,
    DifficultyLevel,
    VideoSearchQuery,
}

impl FromStr for ExerciseField {
    type Err = FitTrackError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_key(s).replace(['-', '_'], "").as_str() {
            "name" | "nombre" => Ok(ExerciseField::Name),
            "sets" | "series" => Ok(ExerciseField::Sets),
            "reps" | "repeticiones" => Ok(ExerciseField::Reps),
            "weight" | "peso" => Ok(ExerciseField::Weight),
            "equipment" | "equipo" => Ok(ExerciseField::Equipment),
            "musclegroup" | "grupo" => Ok(ExerciseField::MuscleGroup),
            "calories" | "caloriesburned" | "calorias" => Ok(ExerciseField::CaloriesBurned),
            "duration" | "estimatedduration" => Ok(ExerciseField::EstimatedDuration),
            "difficulty" | "difficultylevel" => Ok(ExerciseField::DifficultyLevel),
            "video" | "videosearchquery" => Ok(ExerciseField::VideoSearchQuery),
            _ => Err(FitTrackError::Validation(format!("Unknown exercise field: {}", s))),
        }
    }
}

/// One edit to the exercise list of an active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseEdit {
    SetField { index: usize, field: ExerciseField, value: String },
    ToggleComplete { index: usize },
    Remove { index: usize },
    /// Replace the calorie estimate (result of an explicit recalculation)
    SetCalories { index: usize, calories: String },
}

impl ExerciseEdit {
    pub fn index(&self) -> usize {
        match self {
            ExerciseEdit::SetField { index, .. }
            | ExerciseEdit::ToggleComplete { index }
            | ExerciseEdit::Remove { index }
            | ExerciseEdit::SetCalories { index, .. } => *index,
        }
    }

    /// Apply the edit to `exercises`. On error the list is untouched.
    pub fn apply(&self, exercises: &mut Vec<ExerciseEntry>) -> Result<()> {
        let index = self.index();
        if index >= exercises.len() {
            return Err(FitTrackError::NotFound(format!(
                "exercise {} (session has {})",
                index,
                exercises.len()
            )));
        }

        match self {
            ExerciseEdit::SetField { field, value, .. } => set_field(&mut exercises[index], *field, value)?,
            ExerciseEdit::ToggleComplete { .. } => {
                let entry = &mut exercises[index];
                entry.completed = !entry.completed;
            }
            ExerciseEdit::Remove { .. } => {
                exercises.remove(index);
            }
            ExerciseEdit::SetCalories { calories, .. } => exercises[index].calories_burned = calories.clone(),
        }
        Ok(())
    }
}

fn set_field(entry: &mut ExerciseEntry, field: ExerciseField, value: &str) -> Result<()> {
    match field {
        ExerciseField::Name => {
            if value.trim().is_empty() {
                return Err(FitTrackError::Validation("Exercise name cannot be empty".to_string()));
            }
            entry.name = value.trim().to_string();
        }
        ExerciseField::Sets => entry.sets = DisplayQuantity::new(value),
        ExerciseField::Reps => entry.reps = DisplayQuantity::new(value),
        ExerciseField::Weight => entry.weight = DisplayQuantity::new(value),
        ExerciseField::Equipment => entry.equipment = Equipment::from_text(value),
        ExerciseField::MuscleGroup => entry.muscle_group = value.to_string(),
        ExerciseField::CaloriesBurned => entry.calories_burned = value.to_string(),
        ExerciseField::EstimatedDuration => entry.estimated_duration = value.to_string(),
        ExerciseField::DifficultyLevel => entry.difficulty_level = value.to_string(),
        ExerciseField::VideoSearchQuery => entry.video_search_query = value.to_string(),
    }
    Ok(())
}

/// Outcome of toggling a favorite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteToggle {
    Added,
    Removed,
}

/// Favorited exercises, unique by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteSet(Vec<FavoriteExercise>);

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|f| f.name == name)
    }

    pub fn as_slice(&self) -> &[FavoriteExercise] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &FavoriteExercise> {
        self.0.iter()
    }

    /// Remove the favorite with the entry's name, or pin the entry's current values
    pub fn toggle(&mut self, entry: &ExerciseEntry) -> FavoriteToggle {
        if let Some(pos) = self.0.iter().position(|f| f.name == entry.name) {
            self.0.remove(pos);
            FavoriteToggle::Removed
        } else {
            self.0.push(FavoriteExercise::from(entry));
            FavoriteToggle::Added
        }
    }

    /// Favorites whose muscle group matches, ignoring case and accents
    pub fn by_muscle_group(&self, group: &str) -> Vec<&FavoriteExercise> {
        let wanted = normalize_key(group);
        self.0
            .iter()
            .filter(|f| normalize_key(&f.muscle_group) == wanted)
            .collect()
    }

    /// Distinct muscle groups, in first-seen order
    pub fn muscle_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for favorite in &self.0 {
            let group = favorite.muscle_group.trim();
            if !group.is_empty() && !groups.iter().any(|g| normalize_key(g) == normalize_key(group)) {
                groups.push(group.to_string());
            }
        }
        groups
    }
}

impl From<Vec<FavoriteExercise>> for FavoriteSet {
    fn from(favorites: Vec<FavoriteExercise>) -> Self {
        let mut set = FavoriteSet::new();
        for favorite in favorites {
            if !set.contains(&favorite.name) {
                set.0.push(favorite);
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(name: &str, group: &str) -> ExerciseEntry {
        let mut e = ExerciseEntry::named(name);
        e.muscle_group = group.to_string();
        e
    }

    #[test]
    fn test_toggle_removes_then_readds_with_current_values() {
        let mut favorites = FavoriteSet::new();
        let mut press = entry("Press banca", "pecho");
        press.weight = DisplayQuantity::new("40 kg");

        assert_eq!(favorites.toggle(&press), FavoriteToggle::Added);
        assert_eq!(favorites.toggle(&press), FavoriteToggle::Removed);
        assert!(favorites.is_empty());

        press.weight = DisplayQuantity::new("45 kg");
        assert_eq!(favorites.toggle(&press), FavoriteToggle::Added);
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites.as_slice()[0].weight.value(), Some(dec!(45)));
    }

    #[test]
    fn test_from_vec_deduplicates_by_name() {
        let a = FavoriteExercise::from(&entry("Sentadilla", "piernas"));
        let set = FavoriteSet::from(vec![a.clone(), a]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_by_muscle_group_ignores_accents() {
        let mut favorites = FavoriteSet::new();
        favorites.toggle(&entry("Crunch", "Abdominales"));
        favorites.toggle(&entry("Curl", "Bíceps"));
        favorites.toggle(&entry("Martillo", "biceps"));

        let found: Vec<_> = favorites.by_muscle_group("BICEPS").iter().map(|f| f.name.clone()).collect();
        assert_eq!(found, vec!["Curl", "Martillo"]);
        assert_eq!(favorites.muscle_groups(), vec!["Abdominales", "Bíceps"]);
    }

    #[test]
    fn test_apply_edits() {
        let mut list = vec![entry("A", ""), entry("B", "")];

        ExerciseEdit::SetField { index: 0, field: ExerciseField::Reps, value: "12".to_string() }
            .apply(&mut list)
            .unwrap();
        assert_eq!(list[0].reps.value(), Some(dec!(12)));

        ExerciseEdit::ToggleComplete { index: 1 }.apply(&mut list).unwrap();
        assert!(list[1].completed);

        ExerciseEdit::Remove { index: 0 }.apply(&mut list).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "B");
    }

    #[test]
    fn test_invalid_edit_leaves_list_untouched() {
        let mut list = vec![entry("A", "")];
        let before = list.clone();

        assert!(ExerciseEdit::Remove { index: 3 }.apply(&mut list).is_err());
        assert!(ExerciseEdit::SetField { index: 0, field: ExerciseField::Name, value: " ".to_string() }
            .apply(&mut list)
            .is_err());
        assert_eq!(list, before);
    }

    #[test]
    fn test_field_names() {
        assert_eq!("muscle-group".parse::<ExerciseField>().unwrap(), ExerciseField::MuscleGroup);
        assert_eq!("Calorías".parse::<ExerciseField>().unwrap(), ExerciseField::CaloriesBurned);
        assert!("color".parse::<ExerciseField>().is_err());
    }
}
