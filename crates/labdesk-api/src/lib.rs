//! labdesk-api: remote accessor layer for the lab workstation console.
//!
//! Provides a transport-agnostic `LabApi` trait with implementations for:
//! - `RemoteLabApi`: gRPC-backed accessor using the clinic backend
//! - `MockLabApi`: configurable mock for unit testing
//!
//! The coordination engine (`labdesk-engine`) consumes only the trait; the
//! backend is an opaque collaborator behind documented request/response
//! contracts.

pub mod error;
pub mod mock;
pub mod remote;
pub mod service;
pub mod types;
