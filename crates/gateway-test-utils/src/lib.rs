//! # Gateway Test Utilities
//!
//! Shared test utilities for the gateway service:
//! - `TestGateway`: spawns a real gateway on a random port
//! - `ConsumerInterceptor`: stamps consumer identity onto client calls
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::TestGateway;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestGateway::spawn(r#"{"svc_a": ["/gateway.Biz/*"]}"#).await?;
//!     let mut client = server.biz_client("svc_a").await?;
//!     client.check(proto_gen::gateway::Nothing::default()).await?;
//!     server.shutdown().await
//! }
//! ```

pub mod server_harness;

pub use server_harness::*;
