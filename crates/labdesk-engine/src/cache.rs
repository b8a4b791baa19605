//! Keyed store of last-known server state.
//!
//! One entry per query key. Readers get consistent snapshots; the async
//! `read` path triggers at most one in-flight fetch per key, concurrent
//! readers of a loading key await the same settlement, and a superseded
//! fetch result is discarded (last fetch wins). A failed fetch preserves
//! the last good value so views can keep rendering it with an error
//! indicator instead of blanking.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use labdesk_api::error::LabApiError;
use labdesk_api::service::LabApi;
use labdesk_api::types::{ChildTestResult, LabRequest, OrganismRecord};

/// A query key: entity kind plus identifying parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    LabRequest(i64),
    ChildResults(i64),
    Organisms(i64),
    PatientLock(i64),
    PendingQueue,
}

impl CacheKey {
    pub fn kind(self) -> CacheKind {
        match self {
            Self::LabRequest(_) => CacheKind::LabRequest,
            Self::ChildResults(_) => CacheKind::ChildResults,
            Self::Organisms(_) => CacheKind::Organisms,
            Self::PatientLock(_) => CacheKind::PatientLock,
            Self::PendingQueue => CacheKind::PendingQueue,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabRequest(id) => write!(f, "lab_request/{id}"),
            Self::ChildResults(id) => write!(f, "child_results/{id}"),
            Self::Organisms(id) => write!(f, "organisms/{id}"),
            Self::PatientLock(id) => write!(f, "patient_lock/{id}"),
            Self::PendingQueue => f.write_str("pending_queue"),
        }
    }
}

/// Entity kind prefix, used for bulk invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    LabRequest,
    ChildResults,
    Organisms,
    PatientLock,
    PendingQueue,
}

/// The cached server value for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    LabRequest(LabRequest),
    ChildResults(Vec<ChildTestResult>),
    Organisms(Vec<OrganismRecord>),
    PatientLock(bool),
    PendingQueue(Vec<LabRequest>),
}

impl CacheValue {
    pub fn kind(&self) -> CacheKind {
        match self {
            Self::LabRequest(_) => CacheKind::LabRequest,
            Self::ChildResults(_) => CacheKind::ChildResults,
            Self::Organisms(_) => CacheKind::Organisms,
            Self::PatientLock(_) => CacheKind::PatientLock,
            Self::PendingQueue(_) => CacheKind::PendingQueue,
        }
    }
}

/// Freshness state of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Absent,
    Loading,
    Fresh,
    Stale,
    Error,
}

/// One cache entry snapshot. `value` survives `Stale` and `Error` so the
/// last known-good data stays renderable.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Option<CacheValue>,
    pub status: CacheStatus,
    pub last_write: Option<DateTime<Utc>>,
    pub fetch_seq: u64,
}

impl CacheEntry {
    fn absent() -> Self {
        Self {
            value: None,
            status: CacheStatus::Absent,
            last_write: None,
            fetch_seq: 0,
        }
    }
}

struct Slot {
    entry: CacheEntry,
    notify: Arc<Notify>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            entry: CacheEntry::absent(),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// The shared keyed store. Mutated only by background fetch completion and
/// by the mutation coordinator's settled-success patches; view adapters
/// read through snapshots.
pub struct CacheStore {
    api: Arc<dyn LabApi>,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl CacheStore {
    pub fn new(api: Arc<dyn LabApi>) -> Self {
        Self {
            api,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current entry for `key` without triggering a fetch.
    pub fn snapshot(&self, key: CacheKey) -> CacheEntry {
        self.slots()
            .get(&key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_else(CacheEntry::absent)
    }

    /// Resolve `key`, fetching if the entry is absent, stale, or errored.
    ///
    /// Concurrent readers of the same key share one in-flight fetch: the
    /// first caller becomes the fetcher, later callers await its settlement.
    /// The returned entry may carry `Error` status with the last good value.
    pub async fn read(&self, key: CacheKey) -> CacheEntry {
        enum Plan {
            Ready(CacheEntry),
            Wait(Arc<Notify>),
            Fetch(u64, Arc<Notify>),
        }

        loop {
            let plan = {
                let mut slots = self.slots();
                let slot = slots.entry(key).or_default();
                match slot.entry.status {
                    CacheStatus::Fresh => Plan::Ready(slot.entry.clone()),
                    CacheStatus::Loading => Plan::Wait(slot.notify.clone()),
                    CacheStatus::Absent | CacheStatus::Stale | CacheStatus::Error => {
                        slot.entry.status = CacheStatus::Loading;
                        slot.entry.fetch_seq += 1;
                        Plan::Fetch(slot.entry.fetch_seq, slot.notify.clone())
                    }
                }
            };

            match plan {
                Plan::Ready(entry) => return entry,
                Plan::Wait(notify) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    // The fetch may have settled between unlock and enable.
                    if self.snapshot(key).status != CacheStatus::Loading {
                        continue;
                    }
                    notified.await;
                }
                Plan::Fetch(seq, notify) => {
                    let outcome = self.fetch_value(key).await;
                    let entry = self.settle_fetch(key, seq, outcome);
                    notify.notify_waiters();
                    return entry;
                }
            }
        }
    }

    /// Overwrite an entry with settled server truth.
    pub fn set(&self, key: CacheKey, value: CacheValue) {
        debug_assert_eq!(key.kind(), value.kind());
        let mut slots = self.slots();
        write_slot(slots.entry(key).or_default(), value);
    }

    /// Mark an entry stale without clearing its value. An in-flight fetch
    /// for the key is superseded (its result will be discarded).
    pub fn invalidate(&self, key: CacheKey) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(&key) {
            slot.entry.status = if slot.entry.value.is_some() {
                CacheStatus::Stale
            } else {
                CacheStatus::Absent
            };
            slot.entry.fetch_seq += 1;
            slot.notify.notify_waiters();
        }
    }

    /// Mark every entry of `kind` stale (bulk server writes touch many
    /// child keys with one call).
    pub fn invalidate_kind(&self, kind: CacheKind) {
        let mut slots = self.slots();
        for (key, slot) in slots.iter_mut() {
            if key.kind() != kind {
                continue;
            }
            slot.entry.status = if slot.entry.value.is_some() {
                CacheStatus::Stale
            } else {
                CacheStatus::Absent
            };
            slot.entry.fetch_seq += 1;
            slot.notify.notify_waiters();
        }
    }

    /// Drop everything. Logout teardown; parked readers re-resolve.
    pub fn clear(&self) {
        let mut slots = self.slots();
        for slot in slots.values_mut() {
            slot.notify.notify_waiters();
        }
        slots.clear();
    }

    // -- settled-mutation patch helpers (coordinator only) --

    /// Store a server-returned lab request and its embedded panel rows as
    /// one atomic write across both keys.
    pub fn apply_lab_request(&self, request: LabRequest) {
        let mut slots = self.slots();
        let rows = request.results.clone();
        let id = request.id;
        write_slot(
            slots.entry(CacheKey::LabRequest(id)).or_default(),
            CacheValue::LabRequest(request),
        );
        write_slot(
            slots.entry(CacheKey::ChildResults(id)).or_default(),
            CacheValue::ChildResults(rows),
        );
    }

    /// Flip the denormalized lock flag on every cached lab request owned by
    /// `patient_id` — standalone entries and queue rows — so dependent views
    /// update in the same render pass.
    pub fn patch_patient_lock(&self, patient_id: i64, locked: bool) {
        let mut slots = self.slots();
        for slot in slots.values_mut() {
            let changed = match slot.entry.value.as_mut() {
                Some(CacheValue::LabRequest(request)) if request.patient_id == patient_id => {
                    request.result_locked = locked;
                    true
                }
                Some(CacheValue::PendingQueue(rows)) => {
                    let mut any = false;
                    for row in rows.iter_mut().filter(|r| r.patient_id == patient_id) {
                        row.result_locked = locked;
                        any = true;
                    }
                    any
                }
                _ => false,
            };
            if changed {
                touch_patched(slot);
            }
        }
    }

    /// Replace one panel row wherever it is cached (panel entry, standalone
    /// request, queue rows).
    pub fn patch_child_result(&self, lab_request_id: i64, updated: ChildTestResult) {
        let mut slots = self.slots();
        for slot in slots.values_mut() {
            let changed = match slot.entry.value.as_mut() {
                Some(CacheValue::ChildResults(rows)) => replace_row(rows, &updated),
                Some(CacheValue::LabRequest(request)) if request.id == lab_request_id => {
                    replace_row(&mut request.results, &updated)
                }
                Some(CacheValue::PendingQueue(queue)) => {
                    let mut any = false;
                    for row in queue.iter_mut().filter(|r| r.id == lab_request_id) {
                        any |= replace_row(&mut row.results, &updated);
                    }
                    any
                }
                _ => false,
            };
            if changed {
                touch_patched(slot);
            }
        }
    }

    /// Insert or replace an organism row in its request's cached list. A
    /// list that was never fetched is left alone (the next read fetches it).
    pub fn upsert_organism(&self, record: OrganismRecord) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(&CacheKey::Organisms(record.lab_request_id)) {
            if let Some(CacheValue::Organisms(rows)) = slot.entry.value.as_mut() {
                match rows.iter_mut().find(|r| r.id == record.id) {
                    Some(row) => *row = record,
                    None => rows.push(record),
                }
                touch_patched(slot);
            }
        }
    }

    /// Remove an organism row from any cached list.
    pub fn remove_organism(&self, id: i64) {
        let mut slots = self.slots();
        for slot in slots.values_mut() {
            if let Some(CacheValue::Organisms(rows)) = slot.entry.value.as_mut() {
                let before = rows.len();
                rows.retain(|r| r.id != id);
                if rows.len() != before {
                    touch_patched(slot);
                }
            }
        }
    }

    // -- cached-ownership lookups (selection and lock checks) --

    /// Locate a lab request in cached state: standalone entry first, then
    /// queue rows.
    pub fn find_lab_request(&self, id: i64) -> Option<LabRequest> {
        let slots = self.slots();
        if let Some(slot) = slots.get(&CacheKey::LabRequest(id)) {
            if let Some(CacheValue::LabRequest(request)) = slot.entry.value.as_ref() {
                return Some(request.clone());
            }
        }
        if let Some(slot) = slots.get(&CacheKey::PendingQueue) {
            if let Some(CacheValue::PendingQueue(rows)) = slot.entry.value.as_ref() {
                return rows.iter().find(|r| r.id == id).cloned();
            }
        }
        None
    }

    /// Locate an organism record in any cached list.
    pub fn find_organism(&self, id: i64) -> Option<OrganismRecord> {
        let slots = self.slots();
        for slot in slots.values() {
            if let Some(CacheValue::Organisms(rows)) = slot.entry.value.as_ref() {
                if let Some(record) = rows.iter().find(|r| r.id == id) {
                    return Some(record.clone());
                }
            }
        }
        None
    }

    /// Cached lock flag for a patient, if the lock entry has been loaded.
    pub fn patient_locked(&self, patient_id: i64) -> Option<bool> {
        let slots = self.slots();
        let slot = slots.get(&CacheKey::PatientLock(patient_id))?;
        match slot.entry.value.as_ref() {
            Some(CacheValue::PatientLock(locked)) => Some(*locked),
            _ => None,
        }
    }

    /// Whether a child result id belongs to a lab request, judged from
    /// cached state only (the panel entry, else the embedded rows).
    pub fn child_belongs(&self, lab_request_id: i64, child_result_id: i64) -> bool {
        {
            let slots = self.slots();
            if let Some(slot) = slots.get(&CacheKey::ChildResults(lab_request_id)) {
                if let Some(CacheValue::ChildResults(rows)) = slot.entry.value.as_ref() {
                    return rows.iter().any(|r| r.id == child_result_id);
                }
            }
        }
        self.find_lab_request(lab_request_id)
            .map(|request| request.results.iter().any(|r| r.id == child_result_id))
            .unwrap_or(false)
    }

    // -- fetch plumbing --

    async fn fetch_value(&self, key: CacheKey) -> Result<CacheValue, LabApiError> {
        match key {
            CacheKey::LabRequest(id) => self
                .api
                .get_lab_request(id)
                .await
                .map(CacheValue::LabRequest),
            CacheKey::ChildResults(id) => self
                .api
                .get_child_results(id)
                .await
                .map(CacheValue::ChildResults),
            CacheKey::Organisms(id) => {
                self.api.get_organisms(id).await.map(CacheValue::Organisms)
            }
            CacheKey::PatientLock(id) => self
                .api
                .get_patient(id)
                .await
                .map(|p| CacheValue::PatientLock(p.result_locked)),
            CacheKey::PendingQueue => self
                .api
                .list_pending_requests()
                .await
                .map(CacheValue::PendingQueue),
        }
    }

    /// Apply a fetch completion. A sequence mismatch means the fetch was
    /// superseded (newer fetch, mutation overwrite, or invalidation) and
    /// its result is dropped.
    fn settle_fetch(
        &self,
        key: CacheKey,
        seq: u64,
        outcome: Result<CacheValue, LabApiError>,
    ) -> CacheEntry {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_default();

        if slot.entry.fetch_seq != seq {
            tracing::debug!(%key, "discarding superseded fetch result");
            return slot.entry.clone();
        }

        match outcome {
            Ok(value) => {
                slot.entry.value = Some(value);
                slot.entry.status = CacheStatus::Fresh;
                slot.entry.last_write = Some(Utc::now());
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "background fetch failed");
                slot.entry.status = CacheStatus::Error;
            }
        }
        slot.entry.clone()
    }

    #[cfg(test)]
    fn begin_fetch(&self, key: CacheKey) -> u64 {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_default();
        slot.entry.status = CacheStatus::Loading;
        slot.entry.fetch_seq += 1;
        slot.entry.fetch_seq
    }
}

fn write_slot(slot: &mut Slot, value: CacheValue) {
    slot.entry.value = Some(value);
    slot.entry.status = CacheStatus::Fresh;
    slot.entry.last_write = Some(Utc::now());
    slot.entry.fetch_seq += 1;
    slot.notify.notify_waiters();
}

/// Stamp a slot whose value was patched in place. A `Loading` slot drops to
/// `Stale` so the superseded fetch gets reissued instead of leaving waiters
/// parked; other statuses are preserved.
fn touch_patched(slot: &mut Slot) {
    if slot.entry.status == CacheStatus::Loading {
        slot.entry.status = CacheStatus::Stale;
    }
    slot.entry.last_write = Some(Utc::now());
    slot.entry.fetch_seq += 1;
    slot.notify.notify_waiters();
}

fn replace_row(rows: &mut [ChildTestResult], updated: &ChildTestResult) -> bool {
    match rows.iter_mut().find(|r| r.id == updated.id) {
        Some(row) => {
            *row = updated.clone();
            true
        }
        None => false,
    }
}
