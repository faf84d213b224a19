//! Access-controlled gRPC gateway.
//!
//! A tonic server fronting two services, `Biz` and `Admin`, behind a
//! per-consumer ACL enforced by a Tower layer. Authorized calls are fanned
//! out to live administrative streams:
//!
//! - `Admin/Logging` tails an audit event per authorized call
//! - `Admin/Statistics` emits windowed per-method and per-consumer counts
//!
//! # Architecture
//!
//! - [`acl`]: immutable consumer authorization table
//! - [`grpc::auth_layer`]: per-call identification, authorization, audit
//! - [`bus`]: message-routed broadcast hubs (one dispatcher task each)
//! - [`stats`]: windowed counters behind the statistics stream
//! - [`server`]: bind/serve/drain lifecycle

pub mod acl;
pub mod bus;
pub mod config;
pub mod context;
pub mod errors;
pub mod grpc;
pub mod server;
pub mod stats;

pub use errors::GatewayError;
pub use server::{start, Gateway, LifecycleState};
