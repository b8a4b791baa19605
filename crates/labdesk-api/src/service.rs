//! Lab API trait — the primary abstraction over the clinic backend.
//!
//! Implementations can run against the real backend (gRPC) or be mocked for
//! testing. The coordination engine never talks to a transport directly.

use async_trait::async_trait;

use crate::error::LabApiError;
use crate::types::{
    ChildResultPatch, ChildTestResult, LabRequest, OrganismDraft, OrganismPatch, OrganismRecord,
    PatientSnapshot, PopulateCbcParams, PopulateOutcome,
};

/// The remote accessor interface. Read accessors are plain fetches; write
/// accessors mutate server state and return the settled record, which the
/// engine uses to patch its cache.
#[async_trait]
pub trait LabApi: Send + Sync {
    /// Fetch one lab request by id, child results embedded.
    async fn get_lab_request(&self, id: i64) -> Result<LabRequest, LabApiError>;

    /// Fetch the panel rows of a lab request.
    async fn get_child_results(
        &self,
        lab_request_id: i64,
    ) -> Result<Vec<ChildTestResult>, LabApiError>;

    /// Fetch the organism records attached to a lab request.
    async fn get_organisms(
        &self,
        lab_request_id: i64,
    ) -> Result<Vec<OrganismRecord>, LabApiError>;

    /// Fetch the patient slice (carries the result-lock flag).
    async fn get_patient(&self, id: i64) -> Result<PatientSnapshot, LabApiError>;

    /// Fetch the pending-work queue shown in the queue list view.
    async fn list_pending_requests(&self) -> Result<Vec<LabRequest>, LabApiError>;

    /// Reset a request's panel to template defaults. The server is
    /// authoritative; the returned request embeds the recomputed rows.
    async fn reset_to_default(&self, lab_request_id: i64) -> Result<LabRequest, LabApiError>;

    /// Pull analyzer data into a CBC panel. A transport-level `Ok` may still
    /// carry a logical failure — see [`PopulateOutcome`].
    async fn populate_cbc(
        &self,
        lab_request_id: i64,
        params: PopulateCbcParams,
    ) -> Result<PopulateOutcome, LabApiError>;

    /// Lock or unlock all of a patient's results.
    async fn toggle_result_lock(
        &self,
        patient_id: i64,
        lock: bool,
    ) -> Result<PatientSnapshot, LabApiError>;

    /// Save one edited panel row.
    async fn update_child_result(
        &self,
        lab_request_id: i64,
        patch: ChildResultPatch,
    ) -> Result<ChildTestResult, LabApiError>;

    /// Attach a new organism record to a lab request.
    async fn add_organism(
        &self,
        lab_request_id: i64,
        draft: OrganismDraft,
    ) -> Result<OrganismRecord, LabApiError>;

    /// Partially update an organism record.
    async fn update_organism(
        &self,
        id: i64,
        patch: OrganismPatch,
    ) -> Result<OrganismRecord, LabApiError>;

    /// Delete an organism record.
    async fn delete_organism(&self, id: i64) -> Result<(), LabApiError>;
}
