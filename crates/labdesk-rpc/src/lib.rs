//! labdesk-rpc: generated protobuf/gRPC bindings for the clinic lab backend.
//!
//! The `.proto` contract under `proto/labdesk/v1/` is the single source of
//! truth for the wire shapes; this crate only re-exports the tonic/prost
//! generated code.

pub mod labdesk {
    pub mod v1 {
        tonic::include_proto!("labdesk.v1");
    }
}
