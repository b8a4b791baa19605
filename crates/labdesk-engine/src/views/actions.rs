//! Actions pane: button enablement and label settings.
//!
//! Enablement derives from the selection, the lock state, and the
//! in-flight snapshot. An operation with a pending call has its button
//! disabled until the call settles. Unknown lock state disables writes
//! (fail closed); unlocking stays available on a locked patient.

use crate::cache::{CacheKey, CacheValue};
use crate::coordinator::InFlightSnapshot;
use crate::event::OpKind;
use crate::label_prefs::LabelDimensions;
use crate::selection::SelectionSnapshot;

use super::{CacheView, ViewAdapter};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionsModel {
    pub can_toggle_lock: bool,
    /// Whether the toggle button would lock (`true`) or unlock (`false`).
    pub lock_action_locks: bool,
    pub can_reset: bool,
    pub can_populate_cbc: bool,
    pub can_edit_result: bool,
    pub label_dimensions: LabelDimensions,
}

pub struct ActionsPane {
    label_dimensions: LabelDimensions,
}

impl ActionsPane {
    pub fn new(label_dimensions: LabelDimensions) -> Self {
        Self { label_dimensions }
    }
}

impl ViewAdapter for ActionsPane {
    type Model = ActionsModel;

    fn subscriptions(&self, selection: &SelectionSnapshot) -> Vec<CacheKey> {
        let mut keys = Vec::new();
        if let Some(patient_id) = selection.patient_id {
            keys.push(CacheKey::PatientLock(patient_id));
        }
        if let Some(lab_request_id) = selection.lab_request_id {
            keys.push(CacheKey::LabRequest(lab_request_id));
        }
        keys
    }

    fn project(&self, view: &CacheView, in_flight: &InFlightSnapshot) -> ActionsModel {
        let selection = view.selection();
        let locked = lock_state(view, &selection);

        let can_toggle_lock = match selection.patient_id {
            Some(patient_id) => !in_flight.op_pending(OpKind::ToggleLock, patient_id),
            None => false,
        };

        let writable = |op: OpKind| -> bool {
            match (selection.lab_request_id, locked) {
                (Some(lab_request_id), Some(false)) => !in_flight.op_pending(op, lab_request_id),
                _ => false,
            }
        };

        ActionsModel {
            can_toggle_lock,
            lock_action_locks: locked != Some(true),
            can_reset: writable(OpKind::ResetToDefault),
            can_populate_cbc: writable(OpKind::PopulateCbc),
            can_edit_result: selection.child_test_id.is_some()
                && writable(OpKind::UpdateChildResult),
            label_dimensions: self.label_dimensions,
        }
    }

    fn operations(&self) -> &'static [OpKind] {
        &[
            OpKind::ToggleLock,
            OpKind::ResetToDefault,
            OpKind::PopulateCbc,
            OpKind::UpdateChildResult,
        ]
    }
}

/// `Some(locked)` when cached state answers the question, `None` when the
/// lock state has not been loaded yet.
fn lock_state(view: &CacheView, selection: &SelectionSnapshot) -> Option<bool> {
    if let Some(patient_id) = selection.patient_id {
        if let Some(CacheValue::PatientLock(locked)) = view.value(CacheKey::PatientLock(patient_id))
        {
            return Some(*locked);
        }
    }
    if let Some(lab_request_id) = selection.lab_request_id {
        if let Some(CacheValue::LabRequest(request)) = view.value(CacheKey::LabRequest(lab_request_id))
        {
            return Some(request.result_locked);
        }
    }
    None
}
