use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::gateway::ApiGateway;
use crate::models::PatientSummary;

/// One page sized to hold every patient of a typical caseload.
pub const PICKER_PAGE_SIZE: u64 = 100;

pub const EMPTY_STATE_MESSAGE: &str = "No patients available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerState {
    Closed,
    Loading,
    Open,
}

struct PickerInner {
    state: PickerState,
    /// `None` until the first fetch for this screen instance has finished
    patients: Option<Vec<PatientSummary>>,
    /// A list request is in flight, independent of whether the dialog is shown
    fetching: bool,
    torn_down: bool,
}

/// Clears the in-flight marker if `open` is dropped before the list arrives,
/// so a later `open` can fetch again.
struct Fetching<'a> {
    picker: &'a PatientPicker,
    armed: bool,
}

impl Drop for Fetching<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.picker.lock();
        inner.fetching = false;
        if inner.state == PickerState::Loading {
            inner.state = PickerState::Closed;
        }
    }
}

/// Selection dialog over the patient list, owned by the analysis screen.
pub struct PatientPicker {
    gateway: Arc<ApiGateway>,
    inner: Mutex<PickerInner>,
}

impl PatientPicker {
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        Self {
            gateway,
            inner: Mutex::new(PickerInner {
                state: PickerState::Closed,
                patients: None,
                fetching: false,
                torn_down: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PickerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PickerState {
        self.lock().state
    }

    /// Fetched patients; empty before the first fetch or after a failed one.
    pub fn patients(&self) -> Vec<PatientSummary> {
        self.lock().patients.clone().unwrap_or_default()
    }

    /// Whether the "select existing patient" control is enabled.
    pub fn is_available(&self) -> bool {
        let inner = self.lock();
        if inner.torn_down || inner.fetching {
            return false;
        }
        match &inner.patients {
            Some(patients) => !patients.is_empty(),
            None => true,
        }
    }

    /// Shown in place of the list when there is nothing to pick.
    pub fn empty_message(&self) -> Option<&'static str> {
        let inner = self.lock();
        match (&inner.state, &inner.patients) {
            (PickerState::Open, Some(patients)) if patients.is_empty() => {
                Some(EMPTY_STATE_MESSAGE)
            }
            _ => None,
        }
    }

    /// Opens the dialog, fetching the first page if this screen has not
    /// fetched yet. Fetch failures are logged and leave the list empty.
    pub async fn open(&self) -> PickerState {
        {
            let mut inner = self.lock();
            if inner.torn_down {
                return PickerState::Closed;
            }
            if inner.patients.is_some() {
                inner.state = PickerState::Open;
                return PickerState::Open;
            }
            inner.state = PickerState::Loading;
            if inner.fetching {
                // reopened while the first fetch is still running
                return PickerState::Loading;
            }
            inner.fetching = true;
        }
        let mut fetching = Fetching {
            picker: self,
            armed: true,
        };

        let patients = match self.gateway.list_patients(1, PICKER_PAGE_SIZE).await {
            Ok(page) => {
                info!("Loaded {} of {} patients for picker", page.items.len(), page.total);
                page.items
            }
            Err(e) => {
                warn!("Failed to load patient list: {}", e);
                Vec::new()
            }
        };
        fetching.armed = false;

        let mut inner = self.lock();
        inner.fetching = false;
        if inner.torn_down {
            debug!("Picker torn down while loading, discarding patient list");
            return PickerState::Closed;
        }
        inner.patients = Some(patients);
        if inner.state == PickerState::Loading {
            inner.state = PickerState::Open;
        }
        inner.state
    }

    /// Picks a patient from the open list and closes the dialog.
    pub fn select(&self, patient_id: i64) -> Option<PatientSummary> {
        let mut inner = self.lock();
        if inner.state != PickerState::Open {
            return None;
        }
        let chosen = inner
            .patients
            .as_ref()
            .and_then(|patients| patients.iter().find(|p| p.id == patient_id).cloned())?;
        inner.state = PickerState::Closed;
        Some(chosen)
    }

    /// Closes with no side effects. A fetch still in flight keeps its
    /// result for the next open.
    pub fn cancel(&self) {
        self.lock().state = PickerState::Closed;
    }

    pub(crate) fn teardown(&self) {
        let mut inner = self.lock();
        inner.torn_down = true;
        inner.state = PickerState::Closed;
    }
}
