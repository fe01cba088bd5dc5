//! Patient-analysis workflow: draft → optional patient binding → submission
//! → result.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! await. The `Submitting` check and the transition into it happen under the
//! same lock, which is what keeps two submissions from one screen from ever
//! being in flight together.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::gateway::ApiGateway;
use crate::models::{AnalysisRequest, AnalysisResult, GENDERS, PatientSummary};
use crate::picker::{PatientPicker, PickerState};
use crate::validation::ValidationErrors;

pub const ANALYSIS_FAILED: &str = "Analysis failed, please retry later";

/// The analysis form as typed. Symptoms stay a single comma-delimited string
/// until submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisDraft {
    pub symptoms: String,
    pub age: String,
    pub gender: String,
    pub medical_history: String,
    pub family_history: String,
    pub bound_patient_id: Option<i64>,
}

impl AnalysisDraft {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.symptoms.trim().is_empty() {
            errors.add("symptoms", "Symptoms are required");
        }
        if self.age.trim().is_empty() {
            errors.add("age", "Age is required");
        }
        if self.gender.trim().is_empty() {
            errors.add("gender", "Gender is required");
        } else if !GENDERS.contains(&self.gender.trim()) {
            errors.add(
                "gender",
                format!("Gender must be one of {}", GENDERS.join(", ")),
            );
        }
        errors.into_result()
    }

    /// Comma split with per-entry trimming. Duplicates and empty entries
    /// pass through untouched.
    pub fn symptom_list(&self) -> Vec<String> {
        self.symptoms
            .split(',')
            .map(|s| s.trim().to_string())
            .collect()
    }

    pub fn to_request(&self) -> AnalysisRequest {
        AnalysisRequest {
            symptoms: self.symptom_list(),
            age: self.age.trim().to_string(),
            gender: self.gender.trim().to_string(),
            medical_history: non_empty(&self.medical_history),
            family_history: non_empty(&self.family_history),
        }
    }

    pub fn from_patient(patient: &PatientSummary) -> Self {
        Self {
            symptoms: patient.symptoms.join(", "),
            age: patient.age.clone(),
            gender: patient.gender.clone(),
            medical_history: patient.medical_history.clone().unwrap_or_default(),
            family_history: patient.family_history.clone().unwrap_or_default(),
            bound_patient_id: Some(patient.id),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    Idle,
    Submitting,
    Succeeded(AnalysisResult),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Succeeded(AnalysisResult),
    Failed(String),
    /// Local validation failed; nothing was sent
    Invalid(ValidationErrors),
    /// A submission from this screen is already in flight; nothing was sent
    Busy,
    /// `analyze_bound_patient` without a bound patient; nothing was sent
    NotBound,
    /// The screen was torn down before the response arrived
    Discarded,
}

struct Workflow {
    draft: AnalysisDraft,
    state: AnalysisState,
    field_errors: Option<ValidationErrors>,
    torn_down: bool,
}

enum Submission {
    Stateless(AnalysisRequest),
    BoundPatient(i64),
}

/// Returns the screen to `Idle` when a submission future is dropped before
/// its response arrived.
struct InFlight<'a> {
    orchestrator: &'a AnalysisOrchestrator,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut workflow = self.orchestrator.lock();
        if workflow.state == AnalysisState::Submitting {
            warn!(
                "Screen {} submission dropped before completion",
                self.orchestrator.id
            );
            workflow.state = AnalysisState::Idle;
        }
    }
}

/// One instance per analysis screen.
pub struct AnalysisOrchestrator {
    id: Uuid,
    gateway: Arc<ApiGateway>,
    picker: PatientPicker,
    workflow: Mutex<Workflow>,
}

impl AnalysisOrchestrator {
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        let id = Uuid::new_v4();
        debug!("Analysis screen {} opened", id);
        Self {
            id,
            picker: PatientPicker::new(Arc::clone(&gateway)),
            gateway,
            workflow: Mutex::new(Workflow {
                draft: AnalysisDraft::default(),
                state: AnalysisState::Idle,
                field_errors: None,
                torn_down: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Workflow> {
        self.workflow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn draft(&self) -> AnalysisDraft {
        self.lock().draft.clone()
    }

    /// Edit form fields. The binding is kept; use `unbind_patient` to drop it.
    pub fn edit_draft(&self, edit: impl FnOnce(&mut AnalysisDraft)) {
        let mut workflow = self.lock();
        let bound = workflow.draft.bound_patient_id;
        edit(&mut workflow.draft);
        workflow.draft.bound_patient_id = bound;
    }

    pub fn state(&self) -> AnalysisState {
        self.lock().state.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.lock().state == AnalysisState::Submitting
    }

    /// Errors from the last rejected `submit_draft`, cleared by the next
    /// valid one.
    pub fn field_errors(&self) -> Option<ValidationErrors> {
        self.lock().field_errors.clone()
    }

    pub fn picker(&self) -> &PatientPicker {
        &self.picker
    }

    pub async fn open_picker(&self) -> PickerState {
        self.picker.open().await
    }

    pub fn cancel_picker(&self) {
        self.picker.cancel();
    }

    /// Select from the open picker and bind the chosen patient.
    pub fn pick_patient(&self, patient_id: i64) -> Option<PatientSummary> {
        let patient = self.picker.select(patient_id)?;
        self.bind_patient(&patient);
        Some(patient)
    }

    /// Copies the patient into the draft and closes the picker. Does not
    /// submit.
    pub fn bind_patient(&self, patient: &PatientSummary) {
        info!("Screen {} bound patient {}", self.id, patient.id);
        self.lock().draft = AnalysisDraft::from_patient(patient);
        self.picker.cancel();
    }

    /// Drops the binding, keeps the form values.
    pub fn unbind_patient(&self) {
        self.lock().draft.bound_patient_id = None;
    }

    /// Clears the draft and any binding. Refused while submitting.
    pub fn reset(&self) -> bool {
        let mut workflow = self.lock();
        if workflow.state == AnalysisState::Submitting {
            debug!("Screen {} reset refused while submitting", self.id);
            return false;
        }
        workflow.draft = AnalysisDraft::default();
        workflow.field_errors = None;
        true
    }

    /// Stateless analysis of the current draft; nothing is persisted.
    pub async fn submit_draft(&self) -> SubmitOutcome {
        let request = {
            let mut workflow = self.lock();
            if let Some(outcome) = self.refuse(&workflow) {
                return outcome;
            }
            if let Err(errors) = workflow.draft.validate() {
                debug!("Screen {} draft invalid: {}", self.id, errors);
                workflow.field_errors = Some(errors.clone());
                return SubmitOutcome::Invalid(errors);
            }
            workflow.field_errors = None;
            workflow.state = AnalysisState::Submitting;
            workflow.draft.to_request()
        };

        self.run(Submission::Stateless(request)).await
    }

    /// Analyzes the bound patient on the backend and stores the result
    /// against that patient. The draft is not validated: the backend reads
    /// the stored patient record, not the form.
    pub async fn analyze_bound_patient(&self) -> SubmitOutcome {
        let patient_id = {
            let mut workflow = self.lock();
            if let Some(outcome) = self.refuse(&workflow) {
                return outcome;
            }
            let Some(patient_id) = workflow.draft.bound_patient_id else {
                return SubmitOutcome::NotBound;
            };
            workflow.state = AnalysisState::Submitting;
            patient_id
        };

        self.run(Submission::BoundPatient(patient_id)).await
    }

    fn refuse(&self, workflow: &Workflow) -> Option<SubmitOutcome> {
        if workflow.torn_down {
            return Some(SubmitOutcome::Discarded);
        }
        if workflow.state == AnalysisState::Submitting {
            debug!("Screen {} already submitting, ignoring request", self.id);
            return Some(SubmitOutcome::Busy);
        }
        None
    }

    async fn run(&self, submission: Submission) -> SubmitOutcome {
        let mut in_flight = InFlight {
            orchestrator: self,
            armed: true,
        };
        let response: Result<AnalysisResult> = match &submission {
            Submission::Stateless(request) => {
                info!(
                    "Screen {} submitting stateless analysis ({} symptoms)",
                    self.id,
                    request.symptoms.len()
                );
                self.gateway.analyze(request).await
            }
            Submission::BoundPatient(patient_id) => {
                info!("Screen {} analyzing patient {}", self.id, patient_id);
                self.gateway.analyze_patient(*patient_id).await
            }
        };
        in_flight.disarm();

        let mut workflow = self.lock();
        if workflow.torn_down {
            debug!("Screen {} torn down, discarding analysis response", self.id);
            return SubmitOutcome::Discarded;
        }

        match response {
            Ok(result) => {
                info!(
                    "Screen {} analysis complete: {:?}, {}",
                    self.id, result.syndrome_type, result.cleft_type
                );
                workflow.state = AnalysisState::Succeeded(result.clone());
                SubmitOutcome::Succeeded(result)
            }
            Err(e) => {
                error!("Screen {} analysis failed: {}", self.id, e);
                workflow.state = AnalysisState::Failed(ANALYSIS_FAILED.to_string());
                SubmitOutcome::Failed(ANALYSIS_FAILED.to_string())
            }
        }
    }

    /// The screen was navigated away from. Responses still in flight are
    /// dropped when they land.
    pub fn teardown(&self) {
        debug!("Analysis screen {} torn down", self.id);
        self.lock().torn_down = true;
        self.picker.teardown();
    }
}
