//! Organism/sensitivity table for culture requests.

use crate::cache::{CacheKey, CacheStatus, CacheValue};
use crate::coordinator::InFlightSnapshot;
use crate::event::OpKind;
use crate::selection::SelectionSnapshot;

use super::{CacheView, ViewAdapter};

#[derive(Debug, Clone, PartialEq)]
pub struct OrganismRow {
    pub organism_id: i64,
    pub organism: String,
    pub sensitive: String,
    pub resistant: String,
    /// An update or delete for this row is still in flight.
    pub busy: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganismModel {
    pub rows: Vec<OrganismRow>,
    pub can_add: bool,
    pub loading: bool,
    pub refresh_failed: bool,
}

pub struct OrganismTable;

impl ViewAdapter for OrganismTable {
    type Model = OrganismModel;

    fn subscriptions(&self, selection: &SelectionSnapshot) -> Vec<CacheKey> {
        let mut keys = Vec::new();
        if let Some(lab_request_id) = selection.lab_request_id {
            keys.push(CacheKey::Organisms(lab_request_id));
            keys.push(CacheKey::LabRequest(lab_request_id));
        }
        keys
    }

    fn project(&self, view: &CacheView, in_flight: &InFlightSnapshot) -> OrganismModel {
        let Some(lab_request_id) = view.selection().lab_request_id else {
            return OrganismModel::default();
        };

        let organisms_key = CacheKey::Organisms(lab_request_id);
        let rows = match view.value(organisms_key) {
            Some(CacheValue::Organisms(records)) => records
                .iter()
                .map(|record| OrganismRow {
                    organism_id: record.id,
                    organism: record.organism.clone(),
                    sensitive: record.sensitive.clone(),
                    resistant: record.resistant.clone(),
                    busy: in_flight.organism_busy(record.id),
                })
                .collect(),
            _ => Vec::new(),
        };

        let locked = match view.value(CacheKey::LabRequest(lab_request_id)) {
            Some(CacheValue::LabRequest(request)) => Some(request.result_locked),
            _ => None,
        };
        let status = view.status(organisms_key);

        OrganismModel {
            rows,
            can_add: locked == Some(false)
                && !in_flight.op_pending(OpKind::AddOrganism, lab_request_id),
            loading: status == CacheStatus::Loading,
            refresh_failed: status == CacheStatus::Error,
        }
    }

    fn operations(&self) -> &'static [OpKind] {
        &[
            OpKind::AddOrganism,
            OpKind::UpdateOrganism,
            OpKind::DeleteOrganism,
        ]
    }
}
