pub mod analysis;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;
pub mod navigation;
pub mod picker;
pub mod render;
pub mod session;
pub mod storage;
pub mod validation;

// Re-export commonly used types
pub use analysis::{ANALYSIS_FAILED, AnalysisDraft, AnalysisOrchestrator, AnalysisState, SubmitOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use gateway::{
    ApiGateway, ApiRequest, ApiResponse, HookId, HttpTransport, Method, RevocationHook, Transport,
};
pub use guard::{GuardOutcome, RouteGuard};
pub use models::{
    AnalysisRecord, AnalysisRequest, AnalysisResult, Guideline, LiteratureQuery, Page, PatientInput,
    PatientSummary, ProfileUpdate, RegisterRequest, SyndromeType, UserProfile,
};
pub use navigation::{Navigator, Route};
pub use picker::{PatientPicker, PickerState};
pub use render::{render_result, render_state};
pub use session::{AuthOutcome, Session, SessionStatus, SessionStore};
pub use storage::{FileTokenStore, InMemoryTokenStore, TokenStore};
pub use validation::{RegistrationForm, ValidationErrors};
