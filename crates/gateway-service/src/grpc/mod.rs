//! gRPC surface: authorization layer and service implementations.

pub mod admin_service;
pub mod auth_layer;
pub mod biz_service;

pub use admin_service::AdminGrpcService;
pub use auth_layer::{AuthLayer, CONSUMER_METADATA_KEY};
pub use biz_service::BizGrpcService;
