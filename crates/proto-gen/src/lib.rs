//! Generated Protocol Buffer code for the gateway RPC surface.
//!
//! The source of truth is `proto/gateway.proto` at the workspace root. The
//! generated module is checked in under `src/generated/` so that building the
//! workspace does not require a `protoc` toolchain; regenerate with
//! `tonic-build` when the proto changes and commit the result.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)] // Generated code has various doc formatting

// Re-export prost traits for convenience
pub use prost::Message;

// Generated protobuf module
pub mod gateway {
    //! Business and admin services plus their messages
    include!("generated/gateway.rs");
}
