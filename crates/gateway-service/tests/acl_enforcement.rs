//! End-to-end ACL enforcement through a real gateway.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gateway_test_utils::{ConsumerInterceptor, TestGateway};
use proto_gen::gateway::biz_client::BizClient;
use proto_gen::gateway::Nothing;

const ACL: &str = r#"{
    "svc_a": ["/gateway.Biz/Check", "/gateway.Admin/*"],
    "svc_all": ["/gateway.Biz/*"]
}"#;

#[tokio::test]
async fn test_authorized_call_succeeds() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn(ACL).await?;
    let mut client = server.biz_client("svc_a").await?;

    let response = client.check(Nothing::default()).await?;
    assert!(response.into_inner().dummy);

    server.shutdown().await
}

#[tokio::test]
async fn test_wildcard_covers_whole_service() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn(ACL).await?;
    let mut client = server.biz_client("svc_all").await?;

    client.check(Nothing::default()).await?;
    client.add(Nothing::default()).await?;
    client.test(Nothing::default()).await?;

    server.shutdown().await
}

#[tokio::test]
async fn test_method_outside_acl_is_permission_denied() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn(ACL).await?;
    let mut client = server.biz_client("svc_a").await?;

    // svc_a has Check but not Add.
    let status = client.add(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::PermissionDenied);

    server.shutdown().await
}

#[tokio::test]
async fn test_unknown_consumer_is_permission_denied() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn(ACL).await?;
    let mut client = server.biz_client("svc_unknown").await?;

    let status = client.check(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::PermissionDenied);

    server.shutdown().await
}

#[tokio::test]
async fn test_missing_consumer_metadata_is_unauthenticated() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn(ACL).await?;
    // A bare client with no consumer interceptor at all.
    let mut client = BizClient::new(server.channel().await?);

    let status = client.check(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);

    server.shutdown().await
}

#[tokio::test]
async fn test_duplicated_consumer_metadata_is_unauthenticated() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn(ACL).await?;
    let mut client = BizClient::with_interceptor(
        server.channel().await?,
        ConsumerInterceptor::repeated("svc_a", 2)?,
    );

    // Even a valid consumer name is rejected when sent twice.
    let status = client.check(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);

    server.shutdown().await
}

#[tokio::test]
async fn test_admin_surface_is_gated_too() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn(ACL).await?;

    // svc_all has the business wildcard but no admin access.
    let mut denied = server.admin_client("svc_all").await?;
    let status = denied.logging(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::PermissionDenied);

    // svc_a's admin wildcard covers both streams.
    let mut allowed = server.admin_client("svc_a").await?;
    allowed.logging(Nothing::default()).await?;

    server.shutdown().await
}

#[tokio::test]
async fn test_malformed_acl_fails_spawn() {
    let result = TestGateway::spawn(r#"{"svc_a": 42}"#).await;
    assert!(result.is_err());
}
