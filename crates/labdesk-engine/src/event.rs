//! Mutation event recording for audit and debugging.
//!
//! Each mutation attempt that reaches the coordinator emits exactly one
//! event: success or failure, with the rejection reason or server message.
//! Duplicate submissions bounced by the in-flight guard are not attempts
//! and emit nothing.

use chrono::{DateTime, Utc};

/// The kind of write operation, also the first half of the in-flight
/// guard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    ToggleLock,
    ResetToDefault,
    PopulateCbc,
    UpdateChildResult,
    AddOrganism,
    UpdateOrganism,
    DeleteOrganism,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ToggleLock => "toggle_lock",
            Self::ResetToDefault => "reset_to_default",
            Self::PopulateCbc => "populate_cbc",
            Self::UpdateChildResult => "update_child_result",
            Self::AddOrganism => "add_organism",
            Self::UpdateOrganism => "update_organism",
            Self::DeleteOrganism => "delete_organism",
        };
        f.write_str(s)
    }
}

/// Outcome of one mutation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Success,
    Error(String),
}

impl std::fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// An event emitted by the mutation coordinator for each attempt.
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub timestamp: DateTime<Utc>,
    pub op: OpKind,
    pub target_id: i64,
    pub outcome: MutationOutcome,
    pub detail: String,
}

impl MutationEvent {
    pub fn new(
        op: OpKind,
        target_id: i64,
        outcome: MutationOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            op,
            target_id,
            outcome,
            detail: detail.into(),
        }
    }
}

/// Trait for sinks that receive mutation events.
///
/// Implementations can log events, persist them, or feed a status bar.
pub trait MutationEventSink: Send + Sync {
    fn record(&self, event: MutationEvent);
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<MutationEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MutationEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl MutationEventSink for InMemoryEventSink {
    fn record(&self, event: MutationEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// No-op sink that discards all events.
pub struct NullEventSink;

impl MutationEventSink for NullEventSink {
    fn record(&self, _event: MutationEvent) {}
}
