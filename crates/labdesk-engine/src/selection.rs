//! The patient / lab-request / child-test selection triad.
//!
//! All three ids live behind one mutex and change together, so a reader
//! can never observe a child-test selection pointing outside the selected
//! request. Transitions validate against cached state and fail closed:
//! a rejected transition leaves the previous selection intact.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::CacheStore;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no patient is selected")]
    NoPatient,
    #[error("no lab request is selected")]
    NoLabRequest,
    #[error("target is not loaded on this workstation")]
    NotLoaded,
    #[error("lab request belongs to a different patient")]
    WrongPatient,
    #[error("child test does not belong to the selected lab request")]
    WrongLabRequest,
}

/// Consistent copy of the triad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub patient_id: Option<i64>,
    pub lab_request_id: Option<i64>,
    pub child_test_id: Option<i64>,
}

pub struct SelectionState {
    cache: Arc<CacheStore>,
    triad: Mutex<SelectionSnapshot>,
}

impl SelectionState {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            cache,
            triad: Mutex::new(SelectionSnapshot::default()),
        }
    }

    fn triad(&self) -> MutexGuard<'_, SelectionSnapshot> {
        match self.triad.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        *self.triad()
    }

    /// Select a patient. Request and child selections are cleared in the
    /// same transition.
    pub fn select_patient(&self, patient_id: i64) {
        let mut triad = self.triad();
        *triad = SelectionSnapshot {
            patient_id: Some(patient_id),
            lab_request_id: None,
            child_test_id: None,
        };
    }

    /// Select a lab request under the current patient. The request must be
    /// known to the cache and owned by that patient. Clears the child
    /// selection.
    pub fn select_lab_request(&self, lab_request_id: i64) -> Result<(), SelectionError> {
        let mut triad = self.triad();
        let patient_id = triad.patient_id.ok_or(SelectionError::NoPatient)?;
        let request = self
            .cache
            .find_lab_request(lab_request_id)
            .ok_or(SelectionError::NotLoaded)?;
        if request.patient_id != patient_id {
            return Err(SelectionError::WrongPatient);
        }
        triad.lab_request_id = Some(lab_request_id);
        triad.child_test_id = None;
        Ok(())
    }

    /// Select a child test under the current request, or clear the child
    /// selection with `None`. A child id not present in the cached panel is
    /// rejected and the previous selection is kept.
    pub fn select_child_test(&self, child_test_id: Option<i64>) -> Result<(), SelectionError> {
        let mut triad = self.triad();
        let lab_request_id = triad.lab_request_id.ok_or(SelectionError::NoLabRequest)?;
        if let Some(id) = child_test_id {
            if !self.cache.child_belongs(lab_request_id, id) {
                return Err(SelectionError::WrongLabRequest);
            }
        }
        triad.child_test_id = child_test_id;
        Ok(())
    }

    /// Logout teardown.
    pub fn clear(&self) {
        *self.triad() = SelectionSnapshot::default();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheValue};
    use labdesk_api::mock::{test_request, MockLabApi};

    fn fixture() -> (Arc<CacheStore>, SelectionState) {
        let cache = Arc::new(CacheStore::new(Arc::new(MockLabApi::new())));
        cache.set(
            CacheKey::LabRequest(500),
            CacheValue::LabRequest(test_request(500, 7)),
        );
        let selection = SelectionState::new(cache.clone());
        (cache, selection)
    }

    #[test]
    fn select_patient_clears_deeper_levels() {
        let (_cache, selection) = fixture();
        selection.select_patient(7);
        selection.select_lab_request(500).unwrap();

        selection.select_patient(8);
        assert_eq!(
            selection.snapshot(),
            SelectionSnapshot {
                patient_id: Some(8),
                lab_request_id: None,
                child_test_id: None,
            }
        );
    }

    #[test]
    fn select_lab_request_requires_patient() {
        let (_cache, selection) = fixture();
        assert_eq!(
            selection.select_lab_request(500),
            Err(SelectionError::NoPatient)
        );
    }

    #[test]
    fn select_lab_request_rejects_unknown_and_foreign_requests() {
        let (_cache, selection) = fixture();
        selection.select_patient(7);
        assert_eq!(
            selection.select_lab_request(999),
            Err(SelectionError::NotLoaded)
        );

        selection.select_patient(8);
        assert_eq!(
            selection.select_lab_request(500),
            Err(SelectionError::WrongPatient)
        );
    }

    #[test]
    fn select_child_test_validates_against_cached_panel() {
        let (cache, selection) = fixture();
        let row_id = cache.find_lab_request(500).unwrap().results[0].id;
        selection.select_patient(7);
        selection.select_lab_request(500).unwrap();

        selection.select_child_test(Some(row_id)).unwrap();
        assert_eq!(selection.snapshot().child_test_id, Some(row_id));

        // A stale id from an older panel is rejected and the previous
        // selection survives.
        assert_eq!(
            selection.select_child_test(Some(999)),
            Err(SelectionError::WrongLabRequest)
        );
        assert_eq!(selection.snapshot().child_test_id, Some(row_id));

        selection.select_child_test(None).unwrap();
        assert_eq!(selection.snapshot().child_test_id, None);
    }

    #[test]
    fn clear_resets_the_triad() {
        let (_cache, selection) = fixture();
        selection.select_patient(7);
        selection.select_lab_request(500).unwrap();
        selection.clear();
        assert_eq!(selection.snapshot(), SelectionSnapshot::default());
    }
}
