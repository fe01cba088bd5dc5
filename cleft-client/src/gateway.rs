//! Single outbound path to the backend API.
//!
//! Every request picks up the persisted bearer token. Every response with an
//! authorization failure clears that token and fires the revocation hooks
//! *before* the error is handed back to the caller, so callers still see the
//! failure and must handle it.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{
    AnalysisRecord, AnalysisRequest, AnalysisResult, Guideline, LiteratureQuery, LoginRequest, Page,
    PatientInput, PatientSummary, ProfileUpdate, RegisterRequest, TokenResponse, UserProfile,
};
use crate::storage::{FileTokenStore, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A request as handed to the transport, paths relative to the API root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_authorization_failure(&self) -> bool {
        self.status == 401
    }
}

/// Moves one request over the wire. Only transport-level failures are
/// errors; any HTTP status is a successful `ApiResponse`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }
}

/// Callback fired when the backend rejects the presented credential
pub type RevocationHook = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`ApiGateway::on_authorization_revoked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    revocation_hooks: RwLock<Vec<(HookId, RevocationHook)>>,
    next_hook_id: AtomicU64,
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            transport,
            tokens,
            revocation_hooks: RwLock::new(Vec::new()),
            next_hook_id: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        info!("Creating API gateway for {}", config.api_base_url);
        let transport = HttpTransport::new(&config.api_base_url, config.request_timeout)?;
        let tokens = FileTokenStore::new(config.token_path.clone());
        Ok(Self::new(Arc::new(transport), Arc::new(tokens)))
    }

    pub fn tokens(&self) -> Arc<dyn TokenStore> {
        Arc::clone(&self.tokens)
    }

    /// Register a callback for "authorization revoked". Hooks run in
    /// registration order, after the persisted token has been cleared.
    pub fn on_authorization_revoked(&self, hook: RevocationHook) -> HookId {
        let id = HookId(self.next_hook_id.fetch_add(1, Ordering::Relaxed));
        self.revocation_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, hook));
        id
    }

    /// Returns false if the hook was already removed.
    pub fn remove_revocation_hook(&self, id: HookId) -> bool {
        let mut hooks = self
            .revocation_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    pub fn revocation_hook_count(&self) -> usize {
        self.revocation_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> Result<Value> {
        let bearer = match self.tokens.load().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Could not read persisted token, sending anonymously: {}", e);
                None
            }
        };

        debug!("{} {} (authenticated: {})", method, path, bearer.is_some());

        let response = self
            .transport
            .send(ApiRequest {
                method,
                path: path.to_string(),
                query,
                body,
                bearer,
            })
            .await
            .map_err(|e| {
                error!("{} {} failed: {}", method, path, e);
                e
            })?;

        if response.is_authorization_failure() {
            warn!("{} {} rejected with 401, revoking session", method, path);
            self.revoke().await;
            return Err(ClientError::Unauthorized(extract_detail(&response.body)));
        }

        if !response.is_success() {
            let detail = extract_detail(&response.body);
            warn!("{} {} returned {}: {}", method, path, response.status, detail);
            return Err(ClientError::Api {
                status: response.status,
                detail,
            });
        }

        Ok(response.body)
    }

    /// Clear first, then notify, so no later request reuses the dead token.
    async fn revoke(&self) {
        if let Err(e) = self.tokens.clear().await {
            error!("Failed to clear persisted token: {}", e);
        }

        let hooks: Vec<RevocationHook> = self
            .revocation_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        for hook in hooks {
            hook();
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: Vec<(String, String)>) -> Result<T> {
        let body = self.request(Method::Get, path, query, None).await?;
        decode(body)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<T> {
        let body = self.request(Method::Post, path, Vec::new(), body).await?;
        decode(body)
    }

    async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let body = self.request(Method::Put, path, Vec::new(), Some(body)).await?;
        decode(body)
    }

    // Users

    pub async fn login(&self, credentials: &LoginRequest) -> Result<TokenResponse> {
        self.post("/users/login", Some(to_body(credentials)?)).await
    }

    pub async fn current_user(&self) -> Result<UserProfile> {
        self.get("/users/me", Vec::new()).await
    }

    pub async fn update_current_user(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        self.put("/users/me", to_body(update)?).await
    }

    pub async fn register(&self, registration: &RegisterRequest) -> Result<UserProfile> {
        self.post("/users/register", Some(to_body(registration)?))
            .await
    }

    // Patients

    pub async fn list_patients(&self, page: u64, size: u64) -> Result<Page<PatientSummary>> {
        self.get("/patients", page_query(page, size)).await
    }

    pub async fn get_patient(&self, patient_id: i64) -> Result<PatientSummary> {
        self.get(&format!("/patients/{}", patient_id), Vec::new())
            .await
    }

    pub async fn create_patient(&self, patient: &PatientInput) -> Result<PatientSummary> {
        self.post("/patients", Some(to_body(patient)?)).await
    }

    pub async fn update_patient(
        &self,
        patient_id: i64,
        patient: &PatientInput,
    ) -> Result<PatientSummary> {
        self.put(&format!("/patients/{}", patient_id), to_body(patient)?)
            .await
    }

    pub async fn delete_patient(&self, patient_id: i64) -> Result<()> {
        self.request(
            Method::Delete,
            &format!("/patients/{}", patient_id),
            Vec::new(),
            None,
        )
        .await?;
        Ok(())
    }

    // Analyses

    /// Stateless: nothing is persisted on the backend.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        self.post("/analyses/analyze", Some(to_body(request)?)).await
    }

    /// Computes an analysis and stores it against the patient record.
    pub async fn analyze_patient(&self, patient_id: i64) -> Result<AnalysisResult> {
        self.post(&format!("/analyses/patient/{}", patient_id), None)
            .await
    }

    /// Stored analyses, newest first, optionally for one patient only.
    pub async fn list_analyses(
        &self,
        page: u64,
        size: u64,
        patient_id: Option<i64>,
    ) -> Result<Page<AnalysisRecord>> {
        let mut query = page_query(page, size);
        if let Some(patient_id) = patient_id {
            query.push(("patient_id".to_string(), patient_id.to_string()));
        }
        self.get("/analyses", query).await
    }

    pub async fn get_analysis(&self, analysis_id: i64) -> Result<AnalysisRecord> {
        self.get(&format!("/analyses/{}", analysis_id), Vec::new())
            .await
    }

    // Guidelines and literature

    pub async fn list_guidelines(&self, page: u64, size: u64) -> Result<Page<Guideline>> {
        self.get("/guidelines", page_query(page, size)).await
    }

    pub async fn search_literature(&self, query: &LiteratureQuery) -> Result<Value> {
        let mut params = vec![
            ("query".to_string(), query.query.clone()),
            ("max_results".to_string(), query.max_results.to_string()),
            ("sort_by".to_string(), query.sort_by.clone()),
        ];
        if let Some(range) = &query.date_range {
            params.push(("date_range".to_string(), range.clone()));
        }
        self.get("/literature/search", params).await
    }
}

fn page_query(page: u64, size: u64) -> Vec<(String, String)> {
    vec![
        ("page".to_string(), page.to_string()),
        ("size".to_string(), size.to_string()),
    ]
}

fn to_body<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T> {
    Ok(serde_json::from_value(body)?)
}

/// Pulls the human-readable message out of an error body. FastAPI sends
/// either `{"detail": "..."}` or a list of validation entries with `msg`.
fn extract_detail(body: &Value) -> String {
    match body.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
        _ => match body {
            Value::String(text) => text.clone(),
            _ => String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedTransport;
    use crate::storage::InMemoryTokenStore;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn gateway_with(
        transport: Arc<ScriptedTransport>,
        tokens: Arc<InMemoryTokenStore>,
    ) -> ApiGateway {
        ApiGateway::new(transport, tokens)
    }

    #[tokio::test]
    async fn test_bearer_attached_only_when_token_persisted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/patients", 200, json!({"items": [], "total": 0, "page": 1, "size": 10}));
        let tokens = Arc::new(InMemoryTokenStore::new());
        let gateway = gateway_with(transport.clone(), tokens.clone());

        gateway.list_patients(1, 10).await.unwrap();
        tokens.save("tok-1").await.unwrap();
        gateway.list_patients(2, 10).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].bearer.is_none());
        assert_eq!(requests[1].bearer.as_deref(), Some("tok-1"));
        assert!(requests[1]
            .query
            .contains(&("page".to_string(), "2".to_string())));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_fires_hooks_then_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/users/me", 401, json!({"detail": "Could not validate credentials"}));
        let tokens = Arc::new(InMemoryTokenStore::with_token("expired"));
        let gateway = gateway_with(transport, tokens.clone());

        let fired = Arc::new(AtomicUsize::new(0));
        let observed_token = Arc::new(RwLock::new(Some("unset".to_string())));
        {
            let fired = fired.clone();
            gateway.on_authorization_revoked(Arc::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }
        {
            let tokens = tokens.clone();
            let observed = observed_token.clone();
            gateway.on_authorization_revoked(Arc::new(move || {
                // the token must already be gone when hooks run
                let current = tokens.peek();
                *observed.write().unwrap() = current;
            }));
        }

        let err = gateway.current_user().await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(err.detail(), Some("Could not validate credentials"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(observed_token.read().unwrap().is_none());
        assert!(tokens.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_auth_errors_keep_token() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(Method::Get, "/patients/9", 404, json!({"detail": "Patient not found"}));
        let tokens = Arc::new(InMemoryTokenStore::with_token("valid"));
        let gateway = gateway_with(transport, tokens.clone());

        let err = gateway.get_patient(9).await.unwrap_err();

        assert!(matches!(err, ClientError::Api { status: 404, .. }));
        assert_eq!(err.detail(), Some("Patient not found"));
        assert_eq!(tokens.load().await.unwrap().as_deref(), Some("valid"));
    }

    #[tokio::test]
    async fn test_stateless_analyze_sends_symptom_array() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Post,
            "/analyses/analyze",
            200,
            json!({
                "syndrome_type": "syndromic",
                "syndrome_name": "Van der Woude",
                "cleft_type": "bilateral cleft lip and palate",
                "severity": "severe",
                "treatment_recommendations": {"surgery": "staged repair"}
            }),
        );
        let gateway = gateway_with(transport.clone(), Arc::new(InMemoryTokenStore::new()));

        let result = gateway
            .analyze(&AnalysisRequest {
                symptoms: vec!["lip pits".to_string(), "cleft palate".to_string()],
                age: "1".to_string(),
                gender: "女".to_string(),
                medical_history: None,
                family_history: Some("mother affected".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(result.syndrome_name.as_deref(), Some("Van der Woude"));
        let sent = transport.requests().remove(0).body.unwrap();
        assert_eq!(sent["symptoms"], json!(["lip pits", "cleft palate"]));
        assert_eq!(sent["medical_history"], Value::Null);
    }

    #[tokio::test]
    async fn test_patient_records_and_literature_routes() {
        let transport = Arc::new(ScriptedTransport::new());
        let record = json!({"id": 4, "name": "B", "age": "2", "gender": "女", "symptoms": ["cleft palate"]});
        transport.respond(Method::Post, "/patients", 201, record.clone());
        transport.respond(Method::Put, "/patients/4", 200, record);
        transport.respond(Method::Delete, "/patients/4", 204, Value::Null);
        transport.respond(Method::Get, "/literature/search", 200, json!({"results": []}));
        let gateway = gateway_with(transport.clone(), Arc::new(InMemoryTokenStore::with_token("t")));

        let input = PatientInput {
            name: "B".to_string(),
            age: "2".to_string(),
            gender: "女".to_string(),
            symptoms: vec!["cleft palate".to_string()],
            medical_history: None,
            family_history: None,
        };
        assert_eq!(gateway.create_patient(&input).await.unwrap().id, 4);
        gateway.update_patient(4, &input).await.unwrap();
        gateway.delete_patient(4).await.unwrap();
        gateway
            .search_literature(&LiteratureQuery::new("alveolar bone graft"))
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[2].method, Method::Delete);
        assert!(requests[3]
            .query
            .contains(&("max_results".to_string(), "10".to_string())));
        assert!(requests[3]
            .query
            .contains(&("sort_by".to_string(), "relevance".to_string())));
    }

    #[tokio::test]
    async fn test_analysis_history_routes() {
        let transport = Arc::new(ScriptedTransport::new());
        let record = json!({
            "id": 12, "patient_id": 7,
            "syndrome_type": "non_syndromic", "cleft_type": "cleft lip", "severity": "mild",
            "treatment_recommendations": {},
            "analyzed_at": "2024-05-01T10:30:00", "created_at": "2024-05-01T10:30:00"
        });
        transport.respond(
            Method::Get,
            "/analyses",
            200,
            json!({"items": [record.clone()], "total": 1, "page": 1, "size": 5, "pages": 1}),
        );
        transport.respond(Method::Get, "/analyses/12", 200, record);
        let gateway = gateway_with(transport.clone(), Arc::new(InMemoryTokenStore::with_token("t")));

        let recent = gateway.list_analyses(1, 5, None).await.unwrap();
        let for_patient = gateway.list_analyses(1, 5, Some(7)).await.unwrap();
        let single = gateway.get_analysis(12).await.unwrap();

        assert_eq!(recent.items[0].id, 12);
        assert_eq!(for_patient.total, 1);
        assert_eq!(single.result.cleft_type, "cleft lip");
        let requests = transport.requests();
        assert!(!requests[0].query.iter().any(|(k, _)| k == "patient_id"));
        assert!(requests[1]
            .query
            .contains(&("patient_id".to_string(), "7".to_string())));
    }

    #[test]
    fn test_extract_detail_shapes() {
        assert_eq!(extract_detail(&json!({"detail": "bad"})), "bad");
        assert_eq!(
            extract_detail(&json!({"detail": [{"msg": "field required"}, {"msg": "too short"}]})),
            "field required; too short"
        );
        assert_eq!(extract_detail(&json!("Internal Server Error")), "Internal Server Error");
        assert_eq!(extract_detail(&Value::Null), "");
    }
}
