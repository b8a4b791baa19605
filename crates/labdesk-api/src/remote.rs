//! Clinic backend transport — implements `LabApi` via gRPC calls.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tonic::transport::Endpoint;

use labdesk_rpc::labdesk::v1 as proto;
use labdesk_rpc::labdesk::v1::lab_service_client::LabServiceClient;

use crate::error::LabApiError;
use crate::service::LabApi;
use crate::types::{
    ChildResultPatch, ChildTestResult, LabRequest, OrganismDraft, OrganismPatch, OrganismRecord,
    PatientSnapshot, PopulateCbcParams, PopulateOutcome,
};

/// Configuration for the remote transport.
#[derive(Debug, Clone)]
pub struct RemoteLabApiConfig {
    pub target: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RemoteLabApiConfig {
    fn default() -> Self {
        Self {
            target: default_api_target(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// `LabApi` implementation backed by the clinic backend gRPC service.
pub struct RemoteLabApi {
    config: RemoteLabApiConfig,
}

impl RemoteLabApi {
    pub fn new(config: RemoteLabApiConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<LabServiceClient<tonic::transport::Channel>, LabApiError> {
        let endpoint = Endpoint::from_shared(self.config.target.clone())
            .map_err(|e| LabApiError::TransportUnavailable {
                message: format!("invalid target: {e}"),
            })?
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout);

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| LabApiError::TransportUnavailable {
                message: e.to_string(),
            })?;

        Ok(LabServiceClient::new(channel))
    }
}

#[async_trait]
impl LabApi for RemoteLabApi {
    async fn get_lab_request(&self, id: i64) -> Result<LabRequest, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .get_lab_request(proto::GetLabRequestRequest { id })
            .await
            .map_err(|s| map_tonic_status(s, "lab request", id))?
            .into_inner();

        Ok(lab_request_from_proto(response))
    }

    async fn get_child_results(
        &self,
        lab_request_id: i64,
    ) -> Result<Vec<ChildTestResult>, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .get_child_results(proto::GetChildResultsRequest { lab_request_id })
            .await
            .map_err(|s| map_tonic_status(s, "lab request", lab_request_id))?
            .into_inner();

        Ok(response
            .results
            .into_iter()
            .map(child_result_from_proto)
            .collect())
    }

    async fn get_organisms(
        &self,
        lab_request_id: i64,
    ) -> Result<Vec<OrganismRecord>, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .get_organisms(proto::GetOrganismsRequest { lab_request_id })
            .await
            .map_err(|s| map_tonic_status(s, "lab request", lab_request_id))?
            .into_inner();

        Ok(response
            .organisms
            .into_iter()
            .map(organism_from_proto)
            .collect())
    }

    async fn get_patient(&self, id: i64) -> Result<PatientSnapshot, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .get_patient(proto::GetPatientRequest { id })
            .await
            .map_err(|s| map_tonic_status(s, "patient", id))?
            .into_inner();

        Ok(patient_from_proto(response))
    }

    async fn list_pending_requests(&self) -> Result<Vec<LabRequest>, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .list_pending_requests(proto::ListPendingRequestsRequest {})
            .await
            .map_err(|s| map_tonic_status(s, "queue", 0))?
            .into_inner();

        Ok(response
            .requests
            .into_iter()
            .map(lab_request_from_proto)
            .collect())
    }

    async fn reset_to_default(&self, lab_request_id: i64) -> Result<LabRequest, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .reset_to_default(proto::ResetToDefaultRequest { lab_request_id })
            .await
            .map_err(|s| map_tonic_status(s, "lab request", lab_request_id))?
            .into_inner();

        Ok(lab_request_from_proto(response))
    }

    async fn populate_cbc(
        &self,
        lab_request_id: i64,
        params: PopulateCbcParams,
    ) -> Result<PopulateOutcome, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .populate_cbc(proto::PopulateCbcRequest {
                lab_request_id,
                visit_id: params.visit_id,
                main_test_id: params.main_test_id,
            })
            .await
            .map_err(|s| map_tonic_status(s, "lab request", lab_request_id))?
            .into_inner();

        Ok(PopulateOutcome {
            succeeded: response.succeeded,
            message: response.message,
            request: response.request.map(lab_request_from_proto),
        })
    }

    async fn toggle_result_lock(
        &self,
        patient_id: i64,
        lock: bool,
    ) -> Result<PatientSnapshot, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .toggle_result_lock(proto::ToggleResultLockRequest { patient_id, lock })
            .await
            .map_err(|s| map_tonic_status(s, "patient", patient_id))?
            .into_inner();

        Ok(patient_from_proto(response))
    }

    async fn update_child_result(
        &self,
        lab_request_id: i64,
        patch: ChildResultPatch,
    ) -> Result<ChildTestResult, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .update_child_result(proto::UpdateChildResultRequest {
                lab_request_id,
                child_result_id: patch.child_result_id,
                value: patch.value,
            })
            .await
            .map_err(|s| map_tonic_status(s, "child result", patch.child_result_id))?
            .into_inner();

        Ok(child_result_from_proto(response))
    }

    async fn add_organism(
        &self,
        lab_request_id: i64,
        draft: OrganismDraft,
    ) -> Result<OrganismRecord, LabApiError> {
        if draft.organism.trim().is_empty() {
            return Err(LabApiError::InvalidArgument {
                message: "organism name is required".into(),
            });
        }

        let mut client = self.connect().await?;

        let response = client
            .add_organism(proto::AddOrganismRequest {
                lab_request_id,
                organism: draft.organism,
                sensitive: draft.sensitive,
                resistant: draft.resistant,
            })
            .await
            .map_err(|s| map_tonic_status(s, "lab request", lab_request_id))?
            .into_inner();

        Ok(organism_from_proto(response))
    }

    async fn update_organism(
        &self,
        id: i64,
        patch: OrganismPatch,
    ) -> Result<OrganismRecord, LabApiError> {
        let mut client = self.connect().await?;

        let response = client
            .update_organism(proto::UpdateOrganismRequest {
                id,
                organism: patch.organism,
                sensitive: patch.sensitive,
                resistant: patch.resistant,
            })
            .await
            .map_err(|s| map_tonic_status(s, "organism", id))?
            .into_inner();

        Ok(organism_from_proto(response))
    }

    async fn delete_organism(&self, id: i64) -> Result<(), LabApiError> {
        let mut client = self.connect().await?;

        client
            .delete_organism(proto::DeleteOrganismRequest { id })
            .await
            .map_err(|s| map_tonic_status(s, "organism", id))?;

        Ok(())
    }
}

// -- helpers --

/// Default backend target; overridable via `LABDESK_API_TARGET`.
pub fn default_api_target() -> String {
    std::env::var("LABDESK_API_TARGET")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(|s| normalize_target(&s))
        .unwrap_or_else(|| "http://127.0.0.1:50061".to_string())
}

fn normalize_target(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn map_tonic_status(status: tonic::Status, entity: &'static str, id: i64) -> LabApiError {
    match status.code() {
        tonic::Code::NotFound => LabApiError::NotFound { entity, id },
        tonic::Code::InvalidArgument => LabApiError::InvalidArgument {
            message: status.message().to_string(),
        },
        tonic::Code::FailedPrecondition => LabApiError::Remote {
            message: status.message().to_string(),
        },
        tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => {
            LabApiError::TransportUnavailable {
                message: status.message().to_string(),
            }
        }
        _ => LabApiError::Internal {
            message: format!("{}: {}", status.code(), status.message()),
        },
    }
}

fn lab_request_from_proto(request: proto::LabRequest) -> LabRequest {
    LabRequest {
        id: request.id,
        visit_id: request.visit_id,
        patient_id: request.patient_id,
        main_test_id: request.main_test_id,
        test_name: request.test_name,
        price: request.price,
        amount_paid: request.amount_paid,
        discount_percent: request.discount_percent,
        is_paid: request.is_paid,
        sample_collected: request.sample_collected,
        sample_id: request.sample_id,
        approved: request.approved,
        result_locked: request.result_locked,
        results: request
            .results
            .into_iter()
            .map(child_result_from_proto)
            .collect(),
        created_at: parse_rfc3339(&request.created_at),
    }
}

fn child_result_from_proto(result: proto::ChildResult) -> ChildTestResult {
    ChildTestResult {
        id: result.id,
        lab_request_id: result.lab_request_id,
        child_test_id: result.child_test_id,
        name: result.name,
        value: result.value,
        unit: result.unit,
        normal_low: result.normal_low,
        normal_high: result.normal_high,
        range_text: result.range_text,
        critical_low: result.critical_low,
        critical_high: result.critical_high,
    }
}

fn organism_from_proto(organism: proto::Organism) -> OrganismRecord {
    OrganismRecord {
        id: organism.id,
        lab_request_id: organism.lab_request_id,
        organism: organism.organism,
        sensitive: organism.sensitive,
        resistant: organism.resistant,
    }
}

fn patient_from_proto(patient: proto::Patient) -> PatientSnapshot {
    PatientSnapshot {
        id: patient.id,
        name: patient.name,
        result_locked: patient.result_locked,
    }
}

fn parse_rfc3339(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}
