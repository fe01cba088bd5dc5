use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

/// Category → advice mapping as returned by the analysis backend.
pub type Recommendations = Map<String, Value>;

/// Genders accepted by the analysis form.
pub const GENDERS: [&str; 2] = ["男", "女"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// Partial update for `PUT /users/me`; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: i64,
    pub name: String,
    pub age: String,
    pub gender: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub family_history: Option<String>,
}

/// Body of patient create/update requests.
#[derive(Debug, Clone, Serialize)]
pub struct PatientInput {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub symptoms: Vec<String>,
    pub medical_history: Option<String>,
    pub family_history: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
    #[serde(default)]
    pub pages: Option<u64>,
}

/// Wire shape of a stateless analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub symptoms: Vec<String>,
    pub age: String,
    pub gender: String,
    pub medical_history: Option<String>,
    pub family_history: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyndromeType {
    Syndromic,
    NonSyndromic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub syndrome_type: SyndromeType,
    #[serde(default)]
    pub syndrome_name: Option<String>,
    pub cleft_type: String,
    pub severity: String,
    pub treatment_recommendations: Recommendations,
    #[serde(default)]
    pub specialist_recommendations: Option<Recommendations>,
    #[serde(default)]
    pub follow_up_plan: Option<Recommendations>,
}

/// A stored analysis from the patient's history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub patient_id: i64,
    #[serde(flatten)]
    pub result: AnalysisResult,
    #[serde(deserialize_with = "backend_timestamp")]
    pub analyzed_at: DateTime<Utc>,
    #[serde(deserialize_with = "backend_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// The backend emits naive UTC timestamps; offsets are accepted as well.
fn backend_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guideline {
    pub id: i64,
    pub condition_id: String,
    pub title: String,
    pub recommendations: Recommendations,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub references: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiteratureQuery {
    pub query: String,
    pub max_results: u32,
    pub sort_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<String>,
}

impl LiteratureQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: 10,
            sort_by: "relevance".to_string(),
            date_range: None,
        }
    }
}
