//! Read-only view adapters.
//!
//! Each screen region implements `ViewAdapter`: it declares which cache
//! keys it reads for the current selection, projects a render model from
//! those entries plus the in-flight snapshot, and names the operations its
//! controls dispatch. Projection is pure; adapters never mutate the cache
//! or issue network calls.
//!
//! The engine hands adapters a `CacheView` containing only the declared
//! subscription set. A lookup outside that set comes back `Absent`, so an
//! undeclared read cannot silently work in tests and break in production.

use std::collections::HashMap;

use crate::cache::{CacheEntry, CacheKey, CacheStatus, CacheValue};
use crate::coordinator::InFlightSnapshot;
use crate::event::OpKind;
use crate::selection::SelectionSnapshot;

pub mod actions;
pub mod organisms;
pub mod queue;
pub mod status_panel;

pub use actions::ActionsPane;
pub use organisms::OrganismTable;
pub use queue::QueueList;
pub use status_panel::StatusPanel;

/// Cache snapshots restricted to one adapter's declared subscriptions.
pub struct CacheView {
    selection: SelectionSnapshot,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl CacheView {
    pub fn new(selection: SelectionSnapshot, entries: HashMap<CacheKey, CacheEntry>) -> Self {
        Self { selection, entries }
    }

    pub fn selection(&self) -> SelectionSnapshot {
        self.selection
    }

    /// Entry for a subscribed key. Unsubscribed keys yield `None`.
    pub fn entry(&self, key: CacheKey) -> Option<&CacheEntry> {
        self.entries.get(&key)
    }

    pub fn value(&self, key: CacheKey) -> Option<&CacheValue> {
        self.entries.get(&key).and_then(|entry| entry.value.as_ref())
    }

    pub fn status(&self, key: CacheKey) -> CacheStatus {
        self.entries
            .get(&key)
            .map(|entry| entry.status)
            .unwrap_or(CacheStatus::Absent)
    }
}

/// A screen region fed from cached state.
pub trait ViewAdapter {
    type Model;

    /// Cache keys this adapter reads under the given selection.
    fn subscriptions(&self, selection: &SelectionSnapshot) -> Vec<CacheKey>;

    /// Build the render model. Pure: same inputs, same model.
    fn project(&self, view: &CacheView, in_flight: &InFlightSnapshot) -> Self::Model;

    /// Operations this adapter's controls dispatch.
    fn operations(&self) -> &'static [OpKind];
}
