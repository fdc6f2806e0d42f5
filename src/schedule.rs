//! Weekly schedule model and day resolution
//!
//! A [`Schedule`] always carries all seven weekday keys. A day with no
//! sessions is a rest day; a missing key in a stored document is read as an
//! empty day, so callers never have to tell the two apart.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{FitTrackError, Result};
use crate::models::{normalize_key, ClockTime, ScheduledSession, SessionTypeVocabulary, Weekday, REST_LABEL};

/// Time given to sessions that are added without one (new rows, legacy documents)
pub fn default_session_time() -> ClockTime {
    ClockTime::default()
}

/// Recurring weekly plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schedule {
    days: BTreeMap<Weekday, Vec<ScheduledSession>>,
}

/// Day value as it may appear in stored documents
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDay {
    Sessions(Vec<ScheduledSession>),
    /// Older documents stored one label per day
    Label(String),
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<RawDay>>::deserialize(deserializer)?;
        let mut schedule = Schedule::empty();
        for (key, day) in raw {
            let Some(weekday) = Weekday::from_name(&key) else {
                warn!(key = %key, "Ignoring unknown weekday key in schedule");
                continue;
            };
            let sessions = match day {
                None => Vec::new(),
                Some(RawDay::Sessions(sessions)) => sessions,
                Some(RawDay::Label(label)) => {
                    if label.trim().is_empty() || normalize_key(&label) == normalize_key(REST_LABEL) {
                        Vec::new()
                    } else {
                        vec![ScheduledSession { time: default_session_time(), name: label }]
                    }
                }
            };
            schedule.days.insert(weekday, sessions);
        }
        Ok(schedule)
    }
}

impl Default for Schedule {
    /// Starter plan created with a new profile
    fn default() -> Self {
        let mut schedule = Schedule::empty();
        let plan = [
            (Weekday::Lunes, "Natación"),
            (Weekday::Martes, "Pesas - Tren Superior"),
            (Weekday::Miercoles, "Pesas - Tren Inferior"),
            (Weekday::Jueves, "Fútbol"),
            (Weekday::Viernes, "Natación"),
        ];
        for (day, name) in plan {
            schedule.days.insert(
                day,
                vec![ScheduledSession { time: default_session_time(), name: name.to_string() }],
            );
        }
        schedule
    }
}

impl Schedule {
    /// All seven days present, all rest
    pub fn empty() -> Self {
        Self { days: Weekday::ALL.iter().map(|d| (*d, Vec::new())).collect() }
    }

    pub fn sessions(&self, day: Weekday) -> &[ScheduledSession] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_rest(&self, day: Weekday) -> bool {
        self.sessions(day).is_empty()
    }

    /// Days in canonical order with their sessions
    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &[ScheduledSession])> {
        Weekday::ALL.iter().map(move |d| (*d, self.sessions(*d)))
    }

    fn day_mut(&mut self, day: Weekday) -> &mut Vec<ScheduledSession> {
        self.days.entry(day).or_default()
    }
}

/// Language used to name weekdays before they are normalised into keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekdayLocale {
    #[default]
    Es,
    En,
}

impl WeekdayLocale {
    /// Long weekday name as the locale writes it, accents included
    pub fn weekday_name(&self, day: chrono::Weekday) -> &'static str {
        use chrono::Weekday::*;
        match (self, day) {
            (WeekdayLocale::Es, Mon) => "lunes",
            (WeekdayLocale::Es, Tue) => "martes",
            (WeekdayLocale::Es, Wed) => "miércoles",
            (WeekdayLocale::Es, Thu) => "jueves",
            (WeekdayLocale::Es, Fri) => "viernes",
            (WeekdayLocale::Es, Sat) => "sábado",
            (WeekdayLocale::Es, Sun) => "domingo",
            (WeekdayLocale::En, Mon) => "Monday",
            (WeekdayLocale::En, Tue) => "Tuesday",
            (WeekdayLocale::En, Wed) => "Wednesday",
            (WeekdayLocale::En, Thu) => "Thursday",
            (WeekdayLocale::En, Fri) => "Friday",
            (WeekdayLocale::En, Sat) => "Saturday",
            (WeekdayLocale::En, Sun) => "Sunday",
        }
    }

    pub fn display_name(&self, day: Weekday) -> &'static str {
        let chrono_day = match day {
            Weekday::Lunes => chrono::Weekday::Mon,
            Weekday::Martes => chrono::Weekday::Tue,
            Weekday::Miercoles => chrono::Weekday::Wed,
            Weekday::Jueves => chrono::Weekday::Thu,
            Weekday::Viernes => chrono::Weekday::Fri,
            Weekday::Sabado => chrono::Weekday::Sat,
            Weekday::Domingo => chrono::Weekday::Sun,
        };
        self.weekday_name(chrono_day)
    }
}

/// Planned sessions for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayPlan {
    pub weekday_key: Weekday,
    pub sessions: Vec<ScheduledSession>,
}

impl DayPlan {
    pub fn is_rest(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Human label for the day: session names joined, or the rest label
    pub fn label(&self) -> String {
        if self.sessions.is_empty() {
            REST_LABEL.to_string()
        } else {
            self.sessions.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(" + ")
        }
    }
}

/// Sessions planned for `date`. Never fails; rest days resolve to an empty list.
pub fn resolve_day(schedule: &Schedule, date: NaiveDate, locale: WeekdayLocale) -> DayPlan {
    let localized = locale.weekday_name(date.weekday());
    // The localized name may carry accents ("miércoles"); keys never do.
    let weekday_key = Weekday::from_name(localized).unwrap_or_else(|| Weekday::from(date.weekday()));
    DayPlan { weekday_key, sessions: schedule.sessions(weekday_key).to_vec() }
}

/// Sessions for a weekday given by name in any accenting or casing
pub fn resolve_named(schedule: &Schedule, name: &str) -> Option<DayPlan> {
    Weekday::from_name(name).map(|weekday_key| DayPlan {
        weekday_key,
        sessions: schedule.sessions(weekday_key).to_vec(),
    })
}

/// Field of a scheduled session that can be edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionField {
    Time(ClockTime),
    Name(String),
}

/// Staged schedule edits.
///
/// Edits apply to a draft copy; the confirmed schedule changes only when a
/// save succeeds, and a failed save resets the draft to it.
#[derive(Debug, Clone)]
pub struct ScheduleEditor {
    confirmed: Schedule,
    draft: Schedule,
}

impl ScheduleEditor {
    pub fn new(confirmed: Schedule) -> Self {
        let draft = confirmed.clone();
        Self { confirmed, draft }
    }

    /// Last schedule known to be persisted
    pub fn confirmed(&self) -> &Schedule {
        &self.confirmed
    }

    pub fn draft(&self) -> &Schedule {
        &self.draft
    }

    pub fn is_dirty(&self) -> bool {
        self.confirmed != self.draft
    }

    /// Append a session to `day`, labelled with the vocabulary's first entry.
    /// Returns the new session's index.
    pub fn add_session(&mut self, day: Weekday, vocabulary: &SessionTypeVocabulary) -> usize {
        let name = vocabulary.first().unwrap_or("Full Body").to_string();
        let sessions = self.draft.day_mut(day);
        sessions.push(ScheduledSession { time: default_session_time(), name });
        debug!(day = %day, index = sessions.len() - 1, "Staged new session");
        sessions.len() - 1
    }

    pub fn update_session(&mut self, day: Weekday, index: usize, field: SessionField) -> Result<()> {
        let session = self
            .draft
            .day_mut(day)
            .get_mut(index)
            .ok_or_else(|| FitTrackError::NotFound(format!("session {} on {}", index, day)))?;
        match field {
            SessionField::Time(time) => session.time = time,
            SessionField::Name(name) => {
                if name.trim().is_empty() {
                    return Err(FitTrackError::Validation("Session name cannot be empty".to_string()));
                }
                session.name = name;
            }
        }
        Ok(())
    }

    pub fn remove_session(&mut self, day: Weekday, index: usize) -> Result<ScheduledSession> {
        let sessions = self.draft.day_mut(day);
        if index >= sessions.len() {
            return Err(FitTrackError::NotFound(format!("session {} on {}", index, day)));
        }
        Ok(sessions.remove(index))
    }

    /// Drop staged edits
    pub fn discard(&mut self) {
        self.draft = self.confirmed.clone();
    }

    /// Mark the draft as persisted
    pub(crate) fn commit(&mut self) {
        self.confirmed = self.draft.clone();
    }

    /// Restore the draft to the last persisted schedule after a failed save
    pub(crate) fn rollback(&mut self) {
        warn!("Schedule save failed, reverting to last saved schedule");
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_schedule_has_all_days() {
        let schedule = Schedule::default();
        assert_eq!(schedule.iter().count(), 7);
        assert_eq!(schedule.sessions(Weekday::Lunes)[0].name, "Natación");
        assert!(schedule.is_rest(Weekday::Sabado));
        assert!(schedule.is_rest(Weekday::Domingo));
    }

    #[test]
    fn test_resolve_wednesday_with_accented_locale_name() {
        let schedule = Schedule::default();
        // 2024-01-03 was a Wednesday; the Spanish name is "miércoles"
        let plan = resolve_day(&schedule, date(2024, 1, 3), WeekdayLocale::Es);
        assert_eq!(plan.weekday_key, Weekday::Miercoles);
        assert_eq!(plan.sessions[0].name, "Pesas - Tren Inferior");

        let plan_en = resolve_day(&schedule, date(2024, 1, 3), WeekdayLocale::En);
        assert_eq!(plan, plan_en);
    }

    #[test]
    fn test_rest_day_resolves_to_empty_list() {
        let schedule = Schedule::default();
        let plan = resolve_day(&schedule, date(2024, 1, 6), WeekdayLocale::Es);
        assert_eq!(plan.weekday_key, Weekday::Sabado);
        assert!(plan.is_rest());
        assert_eq!(plan.label(), "Descanso");
    }

    #[test]
    fn test_missing_key_and_empty_list_are_both_rest() {
        let json = r#"{"lunes": [{"time": "07:00", "name": "Fútbol"}], "martes": []}"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        assert!(schedule.is_rest(Weekday::Martes));
        assert!(schedule.is_rest(Weekday::Jueves));
        assert_eq!(schedule.iter().count(), 7);
    }

    #[test]
    fn test_legacy_label_documents_are_upgraded() {
        let json = r#"{"lunes": "Natación", "sábado": "Descanso", "miércoles": "Fútbol"}"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.sessions(Weekday::Lunes)[0].name, "Natación");
        assert_eq!(schedule.sessions(Weekday::Lunes)[0].time, default_session_time());
        assert_eq!(schedule.sessions(Weekday::Miercoles)[0].name, "Fútbol");
        assert!(schedule.is_rest(Weekday::Sabado));
    }

    #[test]
    fn test_schedule_serializes_with_plain_keys() {
        let value = serde_json::to_value(Schedule::default()).unwrap();
        assert!(value.get("miercoles").is_some());
        assert!(value.get("sabado").unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn test_editor_stages_changes_on_copy() {
        let mut editor = ScheduleEditor::new(Schedule::default());
        let vocab = SessionTypeVocabulary::default();

        let idx = editor.add_session(Weekday::Sabado, &vocab);
        editor
            .update_session(Weekday::Sabado, idx, SessionField::Name("Fútbol".to_string()))
            .unwrap();
        editor
            .update_session(Weekday::Sabado, idx, SessionField::Time("10:30".parse().unwrap()))
            .unwrap();

        assert!(editor.is_dirty());
        assert!(editor.confirmed().is_rest(Weekday::Sabado));
        assert_eq!(editor.draft().sessions(Weekday::Sabado)[0].time.to_string(), "10:30");

        editor.rollback();
        assert!(!editor.is_dirty());
    }

    #[test]
    fn test_editor_rejects_bad_index() {
        let mut editor = ScheduleEditor::new(Schedule::default());
        assert!(editor.remove_session(Weekday::Domingo, 0).is_err());
        assert!(editor
            .update_session(Weekday::Lunes, 5, SessionField::Name("x".to_string()))
            .is_err());
        let removed = editor.remove_session(Weekday::Lunes, 0).unwrap();
        assert_eq!(removed.name, "Natación");
        assert!(editor.draft().is_rest(Weekday::Lunes));
    }

    proptest! {
        #[test]
        fn prop_resolution_is_total_and_locale_insensitive(days in 0i64..3650) {
            let schedule = Schedule::default();
            let d = date(2020, 1, 1) + chrono::Duration::days(days);
            let es = resolve_day(&schedule, d, WeekdayLocale::Es);
            let en = resolve_day(&schedule, d, WeekdayLocale::En);
            prop_assert_eq!(&es, &en);

            let accented = WeekdayLocale::Es.weekday_name(d.weekday());
            let by_accented = resolve_named(&schedule, accented).unwrap();
            let by_plain = resolve_named(&schedule, es.weekday_key.key()).unwrap();
            prop_assert_eq!(&by_accented, &by_plain);
            prop_assert_eq!(by_accented, es);
        }
    }
}
