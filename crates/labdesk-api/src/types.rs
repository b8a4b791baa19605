//! Domain types for the lab workstation accessor layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ordered laboratory test instance tied to a visit.
///
/// `result_locked` is denormalized from the owning patient's lock flag so a
/// single row can be rendered without a second lookup; the engine keeps the
/// two in step when the lock is toggled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRequest {
    pub id: i64,
    pub visit_id: i64,
    pub patient_id: i64,
    pub main_test_id: i64,
    pub test_name: String,
    pub price: f64,
    pub amount_paid: f64,
    pub discount_percent: f64,
    pub is_paid: bool,
    pub sample_collected: bool,
    pub sample_id: String,
    pub approved: bool,
    pub result_locked: bool,
    /// Panel rows as the server returns them, embedded in the request.
    pub results: Vec<ChildTestResult>,
    pub created_at: DateTime<Utc>,
}

/// One measured/observed parameter within a lab request's panel.
///
/// The reference range is either numeric (`normal_low`/`normal_high`) or
/// free text (`range_text`); both may be absent for qualitative results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildTestResult {
    pub id: i64,
    pub lab_request_id: i64,
    pub child_test_id: i64,
    pub name: String,
    pub value: String,
    pub unit: String,
    pub normal_low: Option<f64>,
    pub normal_high: Option<f64>,
    pub range_text: String,
    pub critical_low: Option<f64>,
    pub critical_high: Option<f64>,
}

impl ChildTestResult {
    /// Human-readable reference range: free text wins, numeric bounds next.
    pub fn range_label(&self) -> String {
        if !self.range_text.trim().is_empty() {
            return self.range_text.clone();
        }
        match (self.normal_low, self.normal_high) {
            (Some(low), Some(high)) => format!("{low} - {high}"),
            (Some(low), None) => format!("> {low}"),
            (None, Some(high)) => format!("< {high}"),
            (None, None) => String::new(),
        }
    }
}

/// A culture/sensitivity finding attached to a lab request. The antibiotic
/// lists are free text, matching the paper antibiogram they transcribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganismRecord {
    pub id: i64,
    pub lab_request_id: i64,
    pub organism: String,
    pub sensitive: String,
    pub resistant: String,
}

/// The slice of the patient record the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSnapshot {
    pub id: i64,
    pub name: String,
    pub result_locked: bool,
}

/// Parameters for the CBC auto-population call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulateCbcParams {
    pub visit_id: i64,
    pub main_test_id: i64,
}

/// Outcome of a CBC auto-population call.
///
/// `succeeded == false` is a logical failure carried over a successful
/// transport call (for example "no analyzer data found"); callers must not
/// treat it as a success with empty data.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateOutcome {
    pub succeeded: bool,
    pub message: String,
    pub request: Option<LabRequest>,
}

/// A single-row result edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildResultPatch {
    pub child_result_id: i64,
    pub value: String,
}

/// Fields for a new organism record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrganismDraft {
    pub organism: String,
    pub sensitive: String,
    pub resistant: String,
}

/// Partial update of an organism record; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrganismPatch {
    pub organism: Option<String>,
    pub sensitive: Option<String>,
    pub resistant: Option<String>,
}
