//! Status/info panel for the selected lab request.
//!
//! Shows the request summary and its result rows with derived range flags.
//! Flags are computed from the numeric value against critical then normal
//! bounds; free-text results carry no flag.

use crate::cache::{CacheKey, CacheStatus, CacheValue};
use crate::coordinator::InFlightSnapshot;
use crate::event::OpKind;
use crate::selection::SelectionSnapshot;
use labdesk_api::types::ChildTestResult;

use super::{CacheView, ViewAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFlag {
    Normal,
    Low,
    High,
    CriticalLow,
    CriticalHigh,
    /// Free-text result or no reference bounds.
    Unflagged,
}

pub fn flag_for(row: &ChildTestResult) -> ResultFlag {
    let value: f64 = match row.value.trim().parse() {
        Ok(v) => v,
        Err(_) => return ResultFlag::Unflagged,
    };
    if matches!(row.critical_low, Some(bound) if value < bound) {
        return ResultFlag::CriticalLow;
    }
    if matches!(row.critical_high, Some(bound) if value > bound) {
        return ResultFlag::CriticalHigh;
    }
    if matches!(row.normal_low, Some(bound) if value < bound) {
        return ResultFlag::Low;
    }
    if matches!(row.normal_high, Some(bound) if value > bound) {
        return ResultFlag::High;
    }
    if row.normal_low.is_some() || row.normal_high.is_some() {
        ResultFlag::Normal
    } else {
        ResultFlag::Unflagged
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRowModel {
    pub child_result_id: i64,
    pub name: String,
    pub value: String,
    pub unit: String,
    pub range: String,
    pub flag: ResultFlag,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    pub lab_request_id: i64,
    pub test_name: String,
    pub sample_id: String,
    pub locked: bool,
    pub approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusModel {
    pub summary: Option<RequestSummary>,
    pub rows: Vec<ResultRowModel>,
    pub loading: bool,
    pub stale: bool,
    /// Last refresh failed; summary and rows carry the previous data.
    pub refresh_failed: bool,
}

pub struct StatusPanel;

impl ViewAdapter for StatusPanel {
    type Model = StatusModel;

    fn subscriptions(&self, selection: &SelectionSnapshot) -> Vec<CacheKey> {
        match selection.lab_request_id {
            Some(id) => vec![CacheKey::LabRequest(id), CacheKey::ChildResults(id)],
            None => Vec::new(),
        }
    }

    fn project(&self, view: &CacheView, _in_flight: &InFlightSnapshot) -> StatusModel {
        let selection = view.selection();
        let Some(lab_request_id) = selection.lab_request_id else {
            return StatusModel::default();
        };

        let request_key = CacheKey::LabRequest(lab_request_id);
        let results_key = CacheKey::ChildResults(lab_request_id);

        let summary = match view.value(request_key) {
            Some(CacheValue::LabRequest(request)) => Some(RequestSummary {
                lab_request_id: request.id,
                test_name: request.test_name.clone(),
                sample_id: request.sample_id.clone(),
                locked: request.result_locked,
                approved: request.approved,
            }),
            _ => None,
        };

        let rows = match view.value(results_key) {
            Some(CacheValue::ChildResults(rows)) => rows
                .iter()
                .map(|row| ResultRowModel {
                    child_result_id: row.id,
                    name: row.name.clone(),
                    value: row.value.clone(),
                    unit: row.unit.clone(),
                    range: row.range_label(),
                    flag: flag_for(row),
                    selected: selection.child_test_id == Some(row.id),
                })
                .collect(),
            _ => Vec::new(),
        };

        let statuses = [view.status(request_key), view.status(results_key)];
        StatusModel {
            summary,
            rows,
            loading: statuses.contains(&CacheStatus::Loading),
            stale: statuses.contains(&CacheStatus::Stale),
            refresh_failed: statuses.contains(&CacheStatus::Error),
        }
    }

    fn operations(&self) -> &'static [OpKind] {
        &[]
    }
}
