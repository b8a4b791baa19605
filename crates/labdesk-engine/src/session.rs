//! Workstation session wiring.
//!
//! One `Workstation` is built per login and owns the cache, the mutation
//! coordinator, and the selection triad. `logout` tears cached and
//! selected state down explicitly; a later login builds a new session.

use std::collections::HashMap;
use std::sync::Arc;

use labdesk_api::remote::RemoteLabApi;
use labdesk_api::service::LabApi;

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::coordinator::MutationCoordinator;
use crate::event::MutationEventSink;
use crate::label_prefs::{
    load_label_dimensions, store_label_dimensions, LabelDimensions,
};
use crate::selection::SelectionState;
use crate::views::{CacheView, ViewAdapter};

pub struct Workstation {
    config: EngineConfig,
    cache: Arc<CacheStore>,
    coordinator: MutationCoordinator,
    selection: SelectionState,
}

impl Workstation {
    pub fn new(
        api: Arc<dyn LabApi>,
        mut config: EngineConfig,
        sink: Arc<dyn MutationEventSink>,
    ) -> Result<Self, String> {
        config.expand_paths();
        config.validate()?;
        let cache = Arc::new(CacheStore::new(api.clone()));
        let coordinator = MutationCoordinator::new(api, cache.clone(), sink);
        let selection = SelectionState::new(cache.clone());
        Ok(Self {
            config,
            cache,
            coordinator,
            selection,
        })
    }

    /// Build a session against the configured backend endpoint.
    pub fn connect(
        config: EngineConfig,
        sink: Arc<dyn MutationEventSink>,
    ) -> Result<Self, String> {
        let api = Arc::new(RemoteLabApi::new(config.remote_config()));
        Self::new(api, config, sink)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve the adapter's subscriptions (fetching whatever is missing or
    /// stale), then project its model.
    pub async fn render<A: ViewAdapter>(&self, adapter: &A) -> A::Model {
        let selection = self.selection.snapshot();
        let mut entries = HashMap::new();
        for key in adapter.subscriptions(&selection) {
            let entry = self.cache.read(key).await;
            entries.insert(key, entry);
        }
        let view = CacheView::new(selection, entries);
        adapter.project(&view, &self.coordinator.in_flight_snapshot())
    }

    /// Project from cached state only, without triggering fetches.
    pub fn render_cached<A: ViewAdapter>(&self, adapter: &A) -> A::Model {
        let selection = self.selection.snapshot();
        let mut entries = HashMap::new();
        for key in adapter.subscriptions(&selection) {
            entries.insert(key, self.cache.snapshot(key));
        }
        let view = CacheView::new(selection, entries);
        adapter.project(&view, &self.coordinator.in_flight_snapshot())
    }

    pub fn label_dimensions(&self) -> Result<LabelDimensions, String> {
        load_label_dimensions(&self.config.data_dir_path())
    }

    pub fn set_label_dimensions(&self, dimensions: LabelDimensions) -> Result<(), String> {
        store_label_dimensions(&self.config.data_dir_path(), dimensions)
    }

    /// Drop all cached state and the selection. The session object itself
    /// stays usable only for a subsequent login flow; callers normally drop
    /// it after this.
    pub fn logout(&self) {
        self.cache.clear();
        self.selection.clear();
    }
}
