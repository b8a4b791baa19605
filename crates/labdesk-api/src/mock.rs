//! Mock lab API for unit testing.
//!
//! Records all calls, serves from an in-memory dataset, and supports
//! pre-configured per-operation errors plus a hold/release gate so tests can
//! keep a call in flight while they probe concurrent behavior.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::LabApiError;
use crate::service::LabApi;
use crate::types::{
    ChildResultPatch, ChildTestResult, LabRequest, OrganismDraft, OrganismPatch, OrganismRecord,
    PatientSnapshot, PopulateCbcParams, PopulateOutcome,
};

/// A recorded call to the mock accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    GetLabRequest(i64),
    GetChildResults(i64),
    GetOrganisms(i64),
    GetPatient(i64),
    ListPendingRequests,
    ResetToDefault(i64),
    PopulateCbc(i64, PopulateCbcParams),
    ToggleResultLock(i64, bool),
    UpdateChildResult(i64, ChildResultPatch),
    AddOrganism(i64, OrganismDraft),
    UpdateOrganism(i64, OrganismPatch),
    DeleteOrganism(i64),
}

impl ApiCall {
    /// Operation name used for error configuration and the hold gate.
    pub fn op(&self) -> &'static str {
        match self {
            Self::GetLabRequest(_) => "get_lab_request",
            Self::GetChildResults(_) => "get_child_results",
            Self::GetOrganisms(_) => "get_organisms",
            Self::GetPatient(_) => "get_patient",
            Self::ListPendingRequests => "list_pending_requests",
            Self::ResetToDefault(_) => "reset_to_default",
            Self::PopulateCbc(_, _) => "populate_cbc",
            Self::ToggleResultLock(_, _) => "toggle_result_lock",
            Self::UpdateChildResult(_, _) => "update_child_result",
            Self::AddOrganism(_, _) => "add_organism",
            Self::UpdateOrganism(_, _) => "update_organism",
            Self::DeleteOrganism(_) => "delete_organism",
        }
    }
}

/// Mock implementation of `LabApi` for testing.
#[derive(Default)]
pub struct MockLabApi {
    requests: Mutex<HashMap<i64, LabRequest>>,
    patients: Mutex<HashMap<i64, PatientSnapshot>>,
    organisms: Mutex<HashMap<i64, OrganismRecord>>,
    reset_payloads: Mutex<HashMap<i64, LabRequest>>,
    populate_outcomes: Mutex<HashMap<i64, PopulateOutcome>>,
    fail_next: Mutex<HashMap<&'static str, LabApiError>>,
    held_ops: Mutex<HashSet<&'static str>>,
    release: Notify,
    calls: Mutex<Vec<ApiCall>>,
    next_organism_id: AtomicI64,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockLabApi {
    pub fn new() -> Self {
        Self {
            next_organism_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    /// Pre-populate a lab request (child results embedded).
    pub fn with_request(self, request: LabRequest) -> Self {
        guard(&self.requests).insert(request.id, request);
        self
    }

    /// Pre-populate a patient.
    pub fn with_patient(self, patient: PatientSnapshot) -> Self {
        guard(&self.patients).insert(patient.id, patient);
        self
    }

    /// Pre-populate an organism record.
    pub fn with_organism(self, organism: OrganismRecord) -> Self {
        guard(&self.organisms).insert(organism.id, organism);
        self
    }

    /// Configure the request returned by `reset_to_default` for one id.
    /// Without this, reset returns the stored request with values cleared.
    pub fn with_reset_payload(self, lab_request_id: i64, payload: LabRequest) -> Self {
        guard(&self.reset_payloads).insert(lab_request_id, payload);
        self
    }

    /// Configure the outcome of `populate_cbc` for one lab request.
    pub fn with_populate_outcome(self, lab_request_id: i64, outcome: PopulateOutcome) -> Self {
        guard(&self.populate_outcomes).insert(lab_request_id, outcome);
        self
    }

    /// Configure the next call of `op` to return an error.
    pub fn with_error(self, op: &'static str, err: LabApiError) -> Self {
        guard(&self.fail_next).insert(op, err);
        self
    }

    /// Configure the next call of `op` to return an error after the mock
    /// has been shared.
    pub fn fail_next_op(&self, op: &'static str, err: LabApiError) {
        guard(&self.fail_next).insert(op, err);
    }

    /// Hold all calls of `op` until `release_op` is invoked. The call is
    /// recorded before it parks, so tests can wait for it to be in flight.
    pub fn hold_op(&self, op: &'static str) {
        guard(&self.held_ops).insert(op);
    }

    /// Release every call parked on `op`.
    pub fn release_op(&self, op: &'static str) {
        guard(&self.held_ops).remove(op);
        self.release.notify_waiters();
    }

    /// Return all recorded calls.
    pub fn calls(&self) -> Vec<ApiCall> {
        guard(&self.calls).clone()
    }

    /// Return the number of recorded calls.
    pub fn call_count(&self) -> usize {
        guard(&self.calls).len()
    }

    /// Return the number of recorded calls for one operation.
    pub fn count_op(&self, op: &str) -> usize {
        guard(&self.calls).iter().filter(|c| c.op() == op).count()
    }

    /// Current stored lab request, for post-mutation assertions.
    pub fn stored_request(&self, id: i64) -> Option<LabRequest> {
        guard(&self.requests).get(&id).cloned()
    }

    async fn record_and_gate(&self, call: ApiCall) -> Result<(), LabApiError> {
        let op = call.op();
        guard(&self.calls).push(call);
        self.maybe_hold(op).await;
        if let Some(err) = guard(&self.fail_next).remove(op) {
            return Err(err);
        }
        Ok(())
    }

    async fn maybe_hold(&self, op: &'static str) {
        loop {
            let notified = self.release.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !guard(&self.held_ops).contains(op) {
                return;
            }
            notified.await;
        }
    }

    fn request_or_not_found(&self, id: i64) -> Result<LabRequest, LabApiError> {
        guard(&self.requests)
            .get(&id)
            .cloned()
            .ok_or(LabApiError::NotFound {
                entity: "lab request",
                id,
            })
    }
}

/// Helper to create a test lab request with one HGB row.
pub fn test_request(id: i64, patient_id: i64) -> LabRequest {
    LabRequest {
        id,
        visit_id: id + 10_000,
        patient_id,
        main_test_id: 3,
        test_name: "CBC".to_string(),
        price: 150.0,
        amount_paid: 150.0,
        discount_percent: 0.0,
        is_paid: true,
        sample_collected: true,
        sample_id: format!("S-{id}"),
        approved: false,
        result_locked: false,
        results: vec![test_child(id * 100 + 1, id, "HGB", "13.5")],
        created_at: chrono::Utc::now(),
    }
}

/// Helper to create a test child result row.
pub fn test_child(id: i64, lab_request_id: i64, name: &str, value: &str) -> ChildTestResult {
    ChildTestResult {
        id,
        lab_request_id,
        child_test_id: id % 100,
        name: name.to_string(),
        value: value.to_string(),
        unit: "g/dL".to_string(),
        normal_low: Some(12.0),
        normal_high: Some(16.0),
        range_text: String::new(),
        critical_low: Some(7.0),
        critical_high: Some(20.0),
    }
}

/// Helper to create a test patient.
pub fn test_patient(id: i64, result_locked: bool) -> PatientSnapshot {
    PatientSnapshot {
        id,
        name: format!("patient-{id}"),
        result_locked,
    }
}

/// Helper to create a test organism record.
pub fn test_organism(id: i64, lab_request_id: i64, name: &str) -> OrganismRecord {
    OrganismRecord {
        id,
        lab_request_id,
        organism: name.to_string(),
        sensitive: "ampicillin".to_string(),
        resistant: String::new(),
    }
}

#[async_trait]
impl LabApi for MockLabApi {
    async fn get_lab_request(&self, id: i64) -> Result<LabRequest, LabApiError> {
        self.record_and_gate(ApiCall::GetLabRequest(id)).await?;
        self.request_or_not_found(id)
    }

    async fn get_child_results(
        &self,
        lab_request_id: i64,
    ) -> Result<Vec<ChildTestResult>, LabApiError> {
        self.record_and_gate(ApiCall::GetChildResults(lab_request_id))
            .await?;
        Ok(self.request_or_not_found(lab_request_id)?.results)
    }

    async fn get_organisms(
        &self,
        lab_request_id: i64,
    ) -> Result<Vec<OrganismRecord>, LabApiError> {
        self.record_and_gate(ApiCall::GetOrganisms(lab_request_id))
            .await?;
        let mut found: Vec<OrganismRecord> = guard(&self.organisms)
            .values()
            .filter(|o| o.lab_request_id == lab_request_id)
            .cloned()
            .collect();
        found.sort_by_key(|o| o.id);
        Ok(found)
    }

    async fn get_patient(&self, id: i64) -> Result<PatientSnapshot, LabApiError> {
        self.record_and_gate(ApiCall::GetPatient(id)).await?;
        guard(&self.patients)
            .get(&id)
            .cloned()
            .ok_or(LabApiError::NotFound {
                entity: "patient",
                id,
            })
    }

    async fn list_pending_requests(&self) -> Result<Vec<LabRequest>, LabApiError> {
        self.record_and_gate(ApiCall::ListPendingRequests).await?;
        let mut pending: Vec<LabRequest> = guard(&self.requests).values().cloned().collect();
        pending.sort_by_key(|r| r.id);
        Ok(pending)
    }

    async fn reset_to_default(&self, lab_request_id: i64) -> Result<LabRequest, LabApiError> {
        self.record_and_gate(ApiCall::ResetToDefault(lab_request_id))
            .await?;

        let reset = match guard(&self.reset_payloads).get(&lab_request_id) {
            Some(payload) => payload.clone(),
            None => {
                let mut request = self.request_or_not_found(lab_request_id)?;
                for row in &mut request.results {
                    row.value.clear();
                }
                request
            }
        };
        guard(&self.requests).insert(lab_request_id, reset.clone());
        Ok(reset)
    }

    async fn populate_cbc(
        &self,
        lab_request_id: i64,
        params: PopulateCbcParams,
    ) -> Result<PopulateOutcome, LabApiError> {
        self.record_and_gate(ApiCall::PopulateCbc(lab_request_id, params))
            .await?;

        if let Some(outcome) = guard(&self.populate_outcomes).get(&lab_request_id) {
            if let Some(request) = outcome.request.as_ref().filter(|_| outcome.succeeded) {
                guard(&self.requests).insert(request.id, request.clone());
            }
            return Ok(outcome.clone());
        }

        let request = self.request_or_not_found(lab_request_id)?;
        Ok(PopulateOutcome {
            succeeded: true,
            message: "ok".to_string(),
            request: Some(request),
        })
    }

    async fn toggle_result_lock(
        &self,
        patient_id: i64,
        lock: bool,
    ) -> Result<PatientSnapshot, LabApiError> {
        self.record_and_gate(ApiCall::ToggleResultLock(patient_id, lock))
            .await?;

        let patient = {
            let mut patients = guard(&self.patients);
            let patient = patients.get_mut(&patient_id).ok_or(LabApiError::NotFound {
                entity: "patient",
                id: patient_id,
            })?;
            patient.result_locked = lock;
            patient.clone()
        };

        // The server cascades the flag to the patient's requests.
        for request in guard(&self.requests).values_mut() {
            if request.patient_id == patient_id {
                request.result_locked = lock;
            }
        }

        Ok(patient)
    }

    async fn update_child_result(
        &self,
        lab_request_id: i64,
        patch: ChildResultPatch,
    ) -> Result<ChildTestResult, LabApiError> {
        self.record_and_gate(ApiCall::UpdateChildResult(lab_request_id, patch.clone()))
            .await?;

        let mut requests = guard(&self.requests);
        let request = requests
            .get_mut(&lab_request_id)
            .ok_or(LabApiError::NotFound {
                entity: "lab request",
                id: lab_request_id,
            })?;
        let row = request
            .results
            .iter_mut()
            .find(|r| r.id == patch.child_result_id)
            .ok_or(LabApiError::NotFound {
                entity: "child result",
                id: patch.child_result_id,
            })?;
        row.value = patch.value;
        Ok(row.clone())
    }

    async fn add_organism(
        &self,
        lab_request_id: i64,
        draft: OrganismDraft,
    ) -> Result<OrganismRecord, LabApiError> {
        self.record_and_gate(ApiCall::AddOrganism(lab_request_id, draft.clone()))
            .await?;

        if draft.organism.trim().is_empty() {
            return Err(LabApiError::InvalidArgument {
                message: "organism name is required".into(),
            });
        }

        let record = OrganismRecord {
            id: self.next_organism_id.fetch_add(1, Ordering::Relaxed),
            lab_request_id,
            organism: draft.organism,
            sensitive: draft.sensitive,
            resistant: draft.resistant,
        };
        guard(&self.organisms).insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_organism(
        &self,
        id: i64,
        patch: OrganismPatch,
    ) -> Result<OrganismRecord, LabApiError> {
        self.record_and_gate(ApiCall::UpdateOrganism(id, patch.clone()))
            .await?;

        let mut organisms = guard(&self.organisms);
        let record = organisms.get_mut(&id).ok_or(LabApiError::NotFound {
            entity: "organism",
            id,
        })?;
        if let Some(organism) = patch.organism {
            record.organism = organism;
        }
        if let Some(sensitive) = patch.sensitive {
            record.sensitive = sensitive;
        }
        if let Some(resistant) = patch.resistant {
            record.resistant = resistant;
        }
        Ok(record.clone())
    }

    async fn delete_organism(&self, id: i64) -> Result<(), LabApiError> {
        self.record_and_gate(ApiCall::DeleteOrganism(id)).await?;

        if guard(&self.organisms).remove(&id).is_none() {
            return Err(LabApiError::NotFound {
                entity: "organism",
                id,
            });
        }
        Ok(())
    }
}
