//! Write-path coordination.
//!
//! Every mutation goes through one coordinator that (a) refuses writes on
//! locked results before touching the network, (b) keeps at most one
//! outstanding call per guard key, and (c) patches the cache only from the
//! server's settled response. Failures of any kind leave the cache exactly
//! as it was.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use labdesk_api::error::LabApiError;
use labdesk_api::service::LabApi;
use labdesk_api::types::{
    ChildResultPatch, ChildTestResult, LabRequest, OrganismDraft, OrganismPatch, OrganismRecord,
    PatientSnapshot, PopulateCbcParams, PopulateOutcome,
};

use crate::cache::{CacheKey, CacheStore, CacheValue};
use crate::event::{MutationEvent, MutationEventSink, MutationOutcome, OpKind};

/// A mutation rejected or failed. Rejections (`ResultLocked`,
/// `SelectionRequired`, `InFlight`) happen before any network call.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MutationError {
    #[error("results are locked for this patient")]
    ResultLocked,
    #[error("target is not loaded on this workstation")]
    SelectionRequired,
    #[error("an equivalent operation is already in flight")]
    InFlight,
    #[error("{0}")]
    LogicalFailure(String),
    #[error(transparent)]
    Api(#[from] LabApiError),
}

/// Guard key for the in-flight set. Organism update and delete share one
/// key per organism so a slow update cannot race a delete of the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightKey {
    Op(OpKind, i64),
    Organism(i64),
}

impl FlightKey {
    fn for_op(op: OpKind, id: i64) -> Self {
        match op {
            OpKind::UpdateOrganism | OpKind::DeleteOrganism => Self::Organism(id),
            _ => Self::Op(op, id),
        }
    }
}

/// Point-in-time copy of the in-flight set, handed to view adapters so
/// pending operations can disable their controls.
#[derive(Debug, Clone, Default)]
pub struct InFlightSnapshot {
    keys: HashSet<FlightKey>,
}

impl InFlightSnapshot {
    pub fn op_pending(&self, op: OpKind, id: i64) -> bool {
        self.keys.contains(&FlightKey::for_op(op, id))
    }

    pub fn organism_busy(&self, organism_id: i64) -> bool {
        self.keys.contains(&FlightKey::Organism(organism_id))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

type FlightSet = Arc<Mutex<HashSet<FlightKey>>>;

fn flights(set: &FlightSet) -> MutexGuard<'_, HashSet<FlightKey>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Removes its key from the in-flight set when dropped, so the guard is
/// released on every exit path including cancellation.
struct FlightToken {
    set: FlightSet,
    key: FlightKey,
}

impl Drop for FlightToken {
    fn drop(&mut self) {
        flights(&self.set).remove(&self.key);
    }
}

pub struct MutationCoordinator {
    api: Arc<dyn LabApi>,
    cache: Arc<CacheStore>,
    sink: Arc<dyn MutationEventSink>,
    in_flight: FlightSet,
}

impl MutationCoordinator {
    pub fn new(
        api: Arc<dyn LabApi>,
        cache: Arc<CacheStore>,
        sink: Arc<dyn MutationEventSink>,
    ) -> Self {
        Self {
            api,
            cache,
            sink,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn in_flight_snapshot(&self) -> InFlightSnapshot {
        InFlightSnapshot {
            keys: flights(&self.in_flight).clone(),
        }
    }

    /// Lock or unlock a patient's results. On success the lock entry and
    /// every cached lab request owned by the patient are patched in one
    /// pass. Unlocking is exempt from the lock check.
    pub async fn toggle_lock(
        &self,
        patient_id: i64,
        lock: bool,
    ) -> Result<PatientSnapshot, MutationError> {
        let _token = self.acquire(FlightKey::for_op(OpKind::ToggleLock, patient_id))?;
        let result = self.do_toggle_lock(patient_id, lock).await;
        let detail = if lock { "lock" } else { "unlock" };
        self.emit(OpKind::ToggleLock, patient_id, &result, detail);
        result
    }

    async fn do_toggle_lock(
        &self,
        patient_id: i64,
        lock: bool,
    ) -> Result<PatientSnapshot, MutationError> {
        if lock && self.cache.patient_locked(patient_id) == Some(true) {
            return Err(MutationError::ResultLocked);
        }
        let patient = self.api.toggle_result_lock(patient_id, lock).await?;
        self.cache.set(
            CacheKey::PatientLock(patient_id),
            CacheValue::PatientLock(patient.result_locked),
        );
        self.cache.patch_patient_lock(patient_id, patient.result_locked);
        Ok(patient)
    }

    /// Replace a request's results with the server-computed defaults.
    pub async fn reset_to_default(
        &self,
        lab_request_id: i64,
    ) -> Result<LabRequest, MutationError> {
        let _token = self.acquire(FlightKey::for_op(OpKind::ResetToDefault, lab_request_id))?;
        let result = self.do_reset(lab_request_id).await;
        self.emit(OpKind::ResetToDefault, lab_request_id, &result, "");
        result
    }

    async fn do_reset(&self, lab_request_id: i64) -> Result<LabRequest, MutationError> {
        self.check_unlocked(lab_request_id)?;
        let request = self.api.reset_to_default(lab_request_id).await?;
        self.cache.apply_lab_request(request.clone());
        self.cache.invalidate(CacheKey::PendingQueue);
        Ok(request)
    }

    /// Fill a CBC panel from analyzer data. A settled response with
    /// `succeeded == false` is a logical failure: nothing is cached and the
    /// server's message is surfaced.
    pub async fn populate_cbc(
        &self,
        lab_request_id: i64,
        params: PopulateCbcParams,
    ) -> Result<PopulateOutcome, MutationError> {
        let _token = self.acquire(FlightKey::for_op(OpKind::PopulateCbc, lab_request_id))?;
        let result = self.do_populate(lab_request_id, params).await;
        let detail = match &result {
            Ok(outcome) => outcome.message.clone(),
            Err(_) => String::new(),
        };
        self.emit(OpKind::PopulateCbc, lab_request_id, &result, detail);
        result
    }

    async fn do_populate(
        &self,
        lab_request_id: i64,
        params: PopulateCbcParams,
    ) -> Result<PopulateOutcome, MutationError> {
        self.check_unlocked(lab_request_id)?;
        let outcome = self.api.populate_cbc(lab_request_id, params).await?;
        if !outcome.succeeded {
            return Err(MutationError::LogicalFailure(outcome.message));
        }
        match outcome.request.clone() {
            Some(request) => self.cache.apply_lab_request(request),
            None => {
                self.cache.invalidate(CacheKey::LabRequest(lab_request_id));
                self.cache.invalidate(CacheKey::ChildResults(lab_request_id));
            }
        }
        self.cache.invalidate(CacheKey::PendingQueue);
        Ok(outcome)
    }

    /// Edit one result row.
    pub async fn update_child_result(
        &self,
        lab_request_id: i64,
        patch: ChildResultPatch,
    ) -> Result<ChildTestResult, MutationError> {
        let _token =
            self.acquire(FlightKey::for_op(OpKind::UpdateChildResult, lab_request_id))?;
        let row_id = patch.child_result_id;
        let result = self.do_update_child(lab_request_id, patch).await;
        self.emit(
            OpKind::UpdateChildResult,
            lab_request_id,
            &result,
            format!("child result {row_id}"),
        );
        result
    }

    async fn do_update_child(
        &self,
        lab_request_id: i64,
        patch: ChildResultPatch,
    ) -> Result<ChildTestResult, MutationError> {
        self.check_unlocked(lab_request_id)?;
        if !self.cache.child_belongs(lab_request_id, patch.child_result_id) {
            return Err(MutationError::SelectionRequired);
        }
        let row = self.api.update_child_result(lab_request_id, patch).await?;
        self.cache.patch_child_result(lab_request_id, row.clone());
        Ok(row)
    }

    pub async fn add_organism(
        &self,
        lab_request_id: i64,
        draft: OrganismDraft,
    ) -> Result<OrganismRecord, MutationError> {
        let _token = self.acquire(FlightKey::for_op(OpKind::AddOrganism, lab_request_id))?;
        let name = draft.organism.clone();
        let result = self.do_add_organism(lab_request_id, draft).await;
        self.emit(OpKind::AddOrganism, lab_request_id, &result, name);
        result
    }

    async fn do_add_organism(
        &self,
        lab_request_id: i64,
        draft: OrganismDraft,
    ) -> Result<OrganismRecord, MutationError> {
        self.check_unlocked(lab_request_id)?;
        let record = self.api.add_organism(lab_request_id, draft).await?;
        self.cache.upsert_organism(record.clone());
        Ok(record)
    }

    pub async fn update_organism(
        &self,
        organism_id: i64,
        patch: OrganismPatch,
    ) -> Result<OrganismRecord, MutationError> {
        let _token = self.acquire(FlightKey::Organism(organism_id))?;
        let result = self.do_update_organism(organism_id, patch).await;
        self.emit(OpKind::UpdateOrganism, organism_id, &result, "");
        result
    }

    async fn do_update_organism(
        &self,
        organism_id: i64,
        patch: OrganismPatch,
    ) -> Result<OrganismRecord, MutationError> {
        let owner = self
            .cache
            .find_organism(organism_id)
            .ok_or(MutationError::SelectionRequired)?;
        self.check_unlocked(owner.lab_request_id)?;
        let record = self.api.update_organism(organism_id, patch).await?;
        self.cache.upsert_organism(record.clone());
        Ok(record)
    }

    pub async fn delete_organism(&self, organism_id: i64) -> Result<(), MutationError> {
        let _token = self.acquire(FlightKey::Organism(organism_id))?;
        let result = self.do_delete_organism(organism_id).await;
        self.emit(OpKind::DeleteOrganism, organism_id, &result, "");
        result
    }

    async fn do_delete_organism(&self, organism_id: i64) -> Result<(), MutationError> {
        let owner = self
            .cache
            .find_organism(organism_id)
            .ok_or(MutationError::SelectionRequired)?;
        self.check_unlocked(owner.lab_request_id)?;
        self.api.delete_organism(organism_id).await?;
        self.cache.remove_organism(organism_id);
        Ok(())
    }

    /// Insert the guard key, or bounce the caller if an equivalent
    /// operation is already outstanding. Bounced duplicates make no
    /// network call and emit no event.
    fn acquire(&self, key: FlightKey) -> Result<FlightToken, MutationError> {
        let mut set = flights(&self.in_flight);
        if !set.insert(key) {
            return Err(MutationError::InFlight);
        }
        Ok(FlightToken {
            set: self.in_flight.clone(),
            key,
        })
    }

    /// Resolve the owning patient from cached state and refuse the write if
    /// the results are locked. An unknown target is refused before any
    /// network call.
    fn check_unlocked(&self, lab_request_id: i64) -> Result<LabRequest, MutationError> {
        let request = self
            .cache
            .find_lab_request(lab_request_id)
            .ok_or(MutationError::SelectionRequired)?;
        let locked = self
            .cache
            .patient_locked(request.patient_id)
            .unwrap_or(request.result_locked);
        if locked {
            return Err(MutationError::ResultLocked);
        }
        Ok(request)
    }

    fn emit<T>(
        &self,
        op: OpKind,
        target_id: i64,
        result: &Result<T, MutationError>,
        detail: impl Into<String>,
    ) {
        let outcome = match result {
            Ok(_) => MutationOutcome::Success,
            Err(err) => {
                tracing::warn!(%op, target_id, error = %err, "mutation failed");
                MutationOutcome::Error(err.to_string())
            }
        };
        self.sink
            .record(MutationEvent::new(op, target_id, outcome, detail));
    }
}
