//! Pending-work queue list.

use crate::cache::{CacheKey, CacheStatus, CacheValue};
use crate::coordinator::InFlightSnapshot;
use crate::event::OpKind;
use crate::selection::SelectionSnapshot;

use super::{CacheView, ViewAdapter};

#[derive(Debug, Clone, PartialEq)]
pub struct QueueRow {
    pub lab_request_id: i64,
    pub patient_id: i64,
    pub test_name: String,
    pub sample_id: String,
    pub locked: bool,
    pub paid: bool,
    pub sample_collected: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueModel {
    pub rows: Vec<QueueRow>,
    pub loading: bool,
    /// Last refresh failed; `rows` still carries the previous data.
    pub refresh_failed: bool,
}

/// The queue is a global view: it subscribes to the same key regardless of
/// selection, and highlights the selected request if any.
pub struct QueueList;

impl ViewAdapter for QueueList {
    type Model = QueueModel;

    fn subscriptions(&self, _selection: &SelectionSnapshot) -> Vec<CacheKey> {
        vec![CacheKey::PendingQueue]
    }

    fn project(&self, view: &CacheView, _in_flight: &InFlightSnapshot) -> QueueModel {
        let selected = view.selection().lab_request_id;
        let status = view.status(CacheKey::PendingQueue);
        let rows = match view.value(CacheKey::PendingQueue) {
            Some(CacheValue::PendingQueue(requests)) => requests
                .iter()
                .map(|request| QueueRow {
                    lab_request_id: request.id,
                    patient_id: request.patient_id,
                    test_name: request.test_name.clone(),
                    sample_id: request.sample_id.clone(),
                    locked: request.result_locked,
                    paid: request.is_paid,
                    sample_collected: request.sample_collected,
                    selected: selected == Some(request.id),
                })
                .collect(),
            _ => Vec::new(),
        };

        QueueModel {
            rows,
            loading: status == CacheStatus::Loading,
            refresh_failed: status == CacheStatus::Error,
        }
    }

    fn operations(&self) -> &'static [OpKind] {
        &[]
    }
}
