//! labdesk-engine: result-coordination core of the lab workstation console.
//!
//! Keeps the current lab-request selection, its child-test results, the
//! per-patient result lock, and the independent list/detail views consistent
//! with each other and with the backend:
//!
//! - `cache`: keyed store of last-known server state with single-flight
//!   fetch deduplication, last-fetch-wins supersede, and stale-while-error.
//! - `coordinator`: executes writes behind per-(operation, id) in-flight
//!   guards, patches the cache only on settled success, and emits one event
//!   per attempt.
//! - `selection`: the atomic patient / lab-request / child-test triad.
//! - `views`: read-only view-adapter contracts with declared subscriptions.
//! - `session`: once-per-login wiring with explicit logout teardown.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod event;
pub mod label_prefs;
pub mod selection;
pub mod session;
pub mod views;
