//! Routine oracle: the external generative model that drafts routines and
//! estimates calories
//!
//! Whatever the model returns is free text. It is reduced to JSON, checked
//! against the expected shape and normalised into [`ExerciseEntry`] values
//! before anything else in the crate sees it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::models::{CalorieEstimate, DisplayQuantity, Equipment, ExerciseEntry};
use crate::routine::{FocusRequest, RoutineContext};

/// External routine generator
#[async_trait]
pub trait RoutineOracle: Send + Sync {
    /// Draft a routine for the given context. Entries are already validated.
    async fn generate_routine(&self, context: &RoutineContext) -> Result<Vec<ExerciseEntry>, OracleError>;

    /// Fresh calorie estimate for the entry's current sets/reps/weight
    async fn recalculate_calories(&self, entry: &ExerciseEntry) -> Result<String, OracleError>;
}

/// Exercise as the model returns it; every field may be missing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExercise {
    pub name: Option<String>,
    pub sets: Option<Value>,
    pub reps: Option<Value>,
    pub weight: Option<Value>,
    pub equipment: Option<String>,
    pub video_search_query: Option<String>,
    pub estimated_duration: Option<String>,
    pub difficulty_level: Option<String>,
    pub calories_burned: Option<Value>,
    pub muscle_group: Option<String>,
}

/// Numbers and strings are both accepted for the free-text quantity fields
fn text_of(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl RawExercise {
    /// Canonical entry with defaults filled in; `completed` is always false
    pub fn into_entry(self) -> Result<ExerciseEntry, OracleError> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| OracleError::Malformed("exercise without a name".to_string()))?;

        let mut entry = ExerciseEntry::named(name);
        entry.sets = DisplayQuantity::new(text_of(self.sets));
        entry.reps = DisplayQuantity::new(text_of(self.reps));
        entry.weight = DisplayQuantity::new(text_of(self.weight));
        entry.equipment = self.equipment.as_deref().map(Equipment::from_text).unwrap_or_default();
        entry.video_search_query = self.video_search_query.unwrap_or_default();
        entry.estimated_duration = self.estimated_duration.unwrap_or_default();
        entry.difficulty_level = self.difficulty_level.unwrap_or_default();
        entry.calories_burned = text_of(self.calories_burned);
        entry.muscle_group = self.muscle_group.unwrap_or_default();
        Ok(entry)
    }
}

#[derive(Debug, Deserialize)]
struct RoutinePayload {
    #[serde(alias = "exercises")]
    routine: Option<Vec<RawExercise>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaloriePayload {
    calories_burned: Option<Value>,
}

/// Pull a JSON object out of model text that may be wrapped in markdown fences
pub fn extract_json(text: &str) -> Result<&str, OracleError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    if let Some(start) = text.find("```") {
        let after_fence = start + 3;
        // Skip a language tag such as ```json
        let content_start = text[after_fence..]
            .find('\n')
            .map(|i| after_fence + i + 1)
            .unwrap_or(after_fence);
        if let Some(end) = text[content_start..].find("```") {
            return Ok(text[content_start..content_start + end].trim());
        }
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ if trimmed.is_empty() => Err(OracleError::EmptyResponse),
        _ => Err(OracleError::Malformed("no JSON object in response".to_string())),
    }
}

/// Validate a routine response: a non-empty list of named exercises
pub fn parse_routine(text: &str) -> Result<Vec<ExerciseEntry>, OracleError> {
    let json = extract_json(text)?;
    let payload: RoutinePayload =
        serde_json::from_str(json).map_err(|e| OracleError::Malformed(format!("{}: {}", e, json)))?;

    let raw = payload.routine.unwrap_or_default();
    if raw.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    raw.into_iter().map(RawExercise::into_entry).collect()
}

/// Validate a calorie response: a single value or range such as "60-80"
pub fn parse_calories(text: &str) -> Result<String, OracleError> {
    let json = extract_json(text)?;
    let payload: CaloriePayload =
        serde_json::from_str(json).map_err(|e| OracleError::Malformed(format!("{}: {}", e, json)))?;

    let calories = text_of(payload.calories_burned);
    if calories.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    if CalorieEstimate::parse(&calories).is_none() {
        return Err(OracleError::Malformed(format!("not a calorie estimate: {}", calories)));
    }
    Ok(calories)
}

/// Prompt for a routine request
pub fn routine_prompt(context: &RoutineContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Mi objetivo: {}. ", context.objective));
    if !context.equipment.is_empty() {
        prompt.push_str(&format!("Material disponible: {}. ", context.equipment));
    }
    prompt.push_str(&format!("Nivel de fatiga hoy: {}. ", context.fatigue));

    match context.focus_request() {
        FocusRequest::Notes { notes, scheduled } => prompt.push_str(&format!(
            "Hoy tenía planificado: {}. Pero mis notas para hoy son: \"{}\". \
             Mis notas tienen prioridad sobre el plan: si se contradicen, sigue mis notas. ",
            scheduled, notes
        )),
        FocusRequest::Scheduled(label) => prompt.push_str(&format!("Hoy me toca: {}. ", label)),
    }

    if !context.recent_history.is_empty() {
        prompt.push_str("Mis últimos entrenamientos: ");
        let lines: Vec<String> = context.recent_history.iter().map(|s| s.to_string()).collect();
        prompt.push_str(&lines.join("; "));
        prompt.push_str(". ");
    }

    if !context.favorites.is_empty() {
        let names: Vec<&str> = context.favorites.iter().map(|f| f.name.as_str()).collect();
        prompt.push_str(&format!("Ejercicios favoritos que puedes incluir: {}. ", names.join(", ")));
    }

    prompt.push_str(
        "Genera una rutina detallada para hoy. Si es descanso, sugiere recuperación activa. \
         Para cada ejercicio indica series, repeticiones, peso, equipo (dumbbell, barbell, bodyweight o machine), \
         grupo muscular, calorías estimadas y un término de búsqueda en español para un video tutorial en YouTube.",
    );
    prompt
}

/// Prompt for a calorie recalculation
pub fn calorie_prompt(entry: &ExerciseEntry) -> String {
    format!(
        "Estima las calorías quemadas en el ejercicio \"{}\" con {} series de {} repeticiones y peso {}. \
         Responde con un único valor o un rango, por ejemplo \"60-80\".",
        entry.name, entry.sets, entry.reps, entry.weight
    )
}

fn routine_schema() -> Value {
    let string = |description: &str| json!({ "type": "STRING", "description": description });
    json!({
        "type": "OBJECT",
        "properties": {
            "routine": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": string("Nombre del ejercicio."),
                        "sets": string("Número de series."),
                        "reps": string("Número de repeticiones."),
                        "weight": string("Peso a utilizar (ej. '6 kg', 'Peso Corporal')."),
                        "equipment": string("dumbbell, barbell, bodyweight o machine."),
                        "muscleGroup": string("Grupo muscular principal."),
                        "caloriesBurned": string("Calorías estimadas, ej. '60-80'."),
                        "estimatedDuration": string("Duración estimada."),
                        "difficultyLevel": string("Dificultad."),
                        "videoSearchQuery": string("Término de búsqueda en español para YouTube.")
                    },
                    "required": ["name", "sets", "reps", "weight", "videoSearchQuery"]
                }
            }
        }
    })
}

fn calorie_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": { "caloriesBurned": { "type": "STRING" } },
        "required": ["caloriesBurned"]
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
}

/// Oracle backed by the Gemini `generateContent` endpoint
pub struct GeminiOracle {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiOracle {
    pub fn new(config: &OracleConfig, api_key: impl Into<String>) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    /// Read the API key from the environment variable named in the config
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey { env_var: config.api_key_env.clone() })?;
        Self::new(config, api_key)
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    async fn generate(&self, prompt: String, schema: Value) -> Result<String, OracleError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: Some(prompt) }],
            }],
            generation_config: GenerationConfig { response_mime_type: "application/json", response_schema: schema },
        };

        debug!(model = %self.model, "Sending request to Gemini");
        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| OracleError::Request(e.to_string()))?;
        if !status.is_success() {
            error!(status = %status, "Gemini API error");
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;
        parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .filter(|t| !t.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}

/// 503 and overload replies become `Unavailable`; everything else keeps its status
fn status_error(status: u16, body: String) -> OracleError {
    let overloaded = body.contains("UNAVAILABLE") || body.to_lowercase().contains("overloaded");
    if status == 503 || (status >= 500 && overloaded) {
        OracleError::Unavailable(format!("HTTP {}: {}", status, body))
    } else {
        OracleError::Http { status, body }
    }
}

#[async_trait]
impl RoutineOracle for GeminiOracle {
    async fn generate_routine(&self, context: &RoutineContext) -> Result<Vec<ExerciseEntry>, OracleError> {
        let text = self.generate(routine_prompt(context), routine_schema()).await?;
        parse_routine(&text)
    }

    async fn recalculate_calories(&self, entry: &ExerciseEntry) -> Result<String, OracleError> {
        let text = self.generate(calorie_prompt(entry), calorie_schema()).await?;
        parse_calories(&text)
    }
}
