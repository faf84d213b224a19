//! Consumer authorization layer.
//!
//! Every call entering the server passes through here before any handler
//! runs. The layer identifies the consumer from the `consumer` metadata,
//! checks the ACL for the requested method path, and on success publishes
//! one audit event and one invocation record before forwarding the call.
//!
//! # Security
//!
//! - Missing, duplicated, or unreadable consumer metadata returns
//!   UNAUTHENTICATED
//! - A known consumer calling a method outside its ACL entry returns
//!   PERMISSION_DENIED
//! - Rejected calls never reach a handler and are never audited or counted
//!
//! tonic's `Interceptor` trait is synchronous and cannot see the request
//! URI, so this is a Tower layer over the whole router instead; publishing
//! to the buses awaits the dispatcher, which an interceptor could not do.

use crate::context::GatewayContext;
use crate::stats::{unix_nanos, InvocationRecord};
use proto_gen::gateway::Event;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::transport::server::TcpConnectInfo;
use tonic::Status;
use tower::{Layer, Service};
use tracing::debug;

/// Metadata key carrying the consumer identity.
pub const CONSUMER_METADATA_KEY: &str = "consumer";

/// Tower layer wrapping the tonic router with consumer authorization.
#[derive(Clone)]
pub struct AuthLayer {
    context: GatewayContext,
}

impl AuthLayer {
    #[must_use]
    pub fn new(context: GatewayContext) -> Self {
        Self { context }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            context: self.context.clone(),
        }
    }
}

/// Tower service performing the per-call authorization check.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    context: GatewayContext,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for AuthService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        let context = self.context.clone();

        Box::pin(async move {
            let method = req.uri().path().to_string();

            let consumer = match extract_consumer(req.headers()) {
                Ok(c) => c,
                Err(status) => {
                    debug!(
                        target: "gateway.auth",
                        method = %method,
                        reason = status.message(),
                        "Rejecting unidentified call"
                    );
                    return Ok(status.into_http());
                }
            };

            if !context.acl.allows(&consumer, &method) {
                debug!(
                    target: "gateway.auth",
                    consumer = %consumer,
                    method = %method,
                    "Rejecting unauthorized call"
                );
                let status = Status::permission_denied(format!(
                    "consumer {consumer} is not allowed to call {method}"
                ));
                return Ok(status.into_http());
            }

            let host = req
                .extensions()
                .get::<TcpConnectInfo>()
                .and_then(TcpConnectInfo::remote_addr)
                .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
            let timestamp = unix_nanos();

            // Publish exactly once per authorized call, before the handler,
            // so admin subscribers observe the call regardless of its
            // outcome. Publish failure means the buses are shutting down;
            // the call itself still goes through.
            let event = Event {
                timestamp,
                consumer: consumer.clone(),
                method: method.clone(),
                host,
            };
            if let Err(e) = context.log_bus.publish(event).await {
                debug!(target: "gateway.auth", error = %e, "Audit event dropped");
            }
            let record = InvocationRecord {
                consumer,
                method,
                timestamp,
            };
            if let Err(e) = context.stat_bus.publish(record).await {
                debug!(target: "gateway.auth", error = %e, "Invocation record dropped");
            }

            inner.call(req).await
        })
    }
}

/// Pull the consumer identity out of the request metadata.
///
/// Exactly one readable `consumer` value is required; anything else is an
/// identification failure, distinct from an authorization failure.
fn extract_consumer(headers: &http::HeaderMap) -> Result<String, Status> {
    let mut values = headers.get_all(CONSUMER_METADATA_KEY).iter();
    let first = values
        .next()
        .ok_or_else(|| Status::unauthenticated("missing consumer metadata"))?;
    if values.next().is_some() {
        return Err(Status::unauthenticated("ambiguous consumer metadata"));
    }
    let consumer = first
        .to_str()
        .map_err(|_| Status::unauthenticated("unreadable consumer metadata"))?;
    Ok(consumer.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::acl::AccessControlTable;
    use http::{Request, Response};
    use std::convert::Infallible;
    use std::time::Duration;

    /// Header marking that the inner service ran.
    const INNER_SERVICE_REACHED: &str = "x-inner-service-reached";

    /// Mock inner service returning OK with a marker header.
    #[derive(Clone)]
    struct MockInnerService;

    impl<ReqBody> Service<Request<ReqBody>> for MockInnerService
    where
        ReqBody: Send + 'static,
    {
        type Response = Response<BoxBody>;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<ReqBody>) -> Self::Future {
            Box::pin(async move {
                Ok(Response::builder()
                    .status(200)
                    .header(INNER_SERVICE_REACHED, "true")
                    .body(BoxBody::default())
                    .expect("failed to build response"))
            })
        }
    }

    /// Mock inner service whose handler fails with INTERNAL.
    #[derive(Clone)]
    struct FailingInnerService;

    impl<ReqBody> Service<Request<ReqBody>> for FailingInnerService
    where
        ReqBody: Send + 'static,
    {
        type Response = Response<BoxBody>;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<ReqBody>) -> Self::Future {
            Box::pin(async move {
                Ok(Response::builder()
                    .status(200)
                    .header(INNER_SERVICE_REACHED, "true")
                    .header("grpc-status", "13")
                    .body(BoxBody::default())
                    .expect("failed to build response"))
            })
        }
    }

    fn test_context() -> GatewayContext {
        let acl = AccessControlTable::from_json(
            r#"{"svc_a": ["/gateway.Biz/Check", "/gateway.Admin/*"]}"#,
        )
        .unwrap();
        GatewayContext::new(acl)
    }

    fn auth_service<S>(context: &GatewayContext, inner: S) -> AuthService<S> {
        AuthLayer::new(context.clone()).layer(inner)
    }

    fn request(path: &str, consumers: &[&str]) -> Request<()> {
        let mut req = Request::builder().uri(path).body(()).unwrap();
        for consumer in consumers {
            req.headers_mut()
                .append(CONSUMER_METADATA_KEY, consumer.parse().unwrap());
        }
        req
    }

    fn inner_reached(response: &Response<BoxBody>) -> bool {
        response.headers().get(INNER_SERVICE_REACHED).is_some()
    }

    fn grpc_status(response: &Response<BoxBody>) -> Option<&str> {
        response
            .headers()
            .get("grpc-status")
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_authorized_call_reaches_inner_service() {
        let context = test_context();
        let mut service = auth_service(&context, MockInnerService);

        let response = service
            .call(request("/gateway.Biz/Check", &["svc_a"]))
            .await
            .unwrap();

        assert!(inner_reached(&response));
    }

    #[tokio::test]
    async fn test_missing_consumer_is_unauthenticated() {
        let context = test_context();
        let mut service = auth_service(&context, MockInnerService);

        let response = service.call(request("/gateway.Biz/Check", &[])).await.unwrap();

        assert!(!inner_reached(&response));
        // UNAUTHENTICATED
        assert_eq!(grpc_status(&response), Some("16"));
    }

    #[tokio::test]
    async fn test_duplicated_consumer_is_unauthenticated() {
        let context = test_context();
        let mut service = auth_service(&context, MockInnerService);

        let response = service
            .call(request("/gateway.Biz/Check", &["svc_a", "svc_a"]))
            .await
            .unwrap();

        assert!(!inner_reached(&response));
        assert_eq!(grpc_status(&response), Some("16"));
    }

    #[tokio::test]
    async fn test_unauthorized_method_is_permission_denied() {
        let context = test_context();
        let mut service = auth_service(&context, MockInnerService);

        // svc_a has Check but not Add.
        let response = service
            .call(request("/gateway.Biz/Add", &["svc_a"]))
            .await
            .unwrap();

        assert!(!inner_reached(&response));
        // PERMISSION_DENIED
        assert_eq!(grpc_status(&response), Some("7"));
    }

    #[tokio::test]
    async fn test_unknown_consumer_is_permission_denied() {
        let context = test_context();
        let mut service = auth_service(&context, MockInnerService);

        let response = service
            .call(request("/gateway.Biz/Check", &["svc_z"]))
            .await
            .unwrap();

        assert!(!inner_reached(&response));
        assert_eq!(grpc_status(&response), Some("7"));
    }

    #[tokio::test]
    async fn test_authorized_call_publishes_audit_event_and_record() {
        let context = test_context();
        let mut log_sub = context.log_bus.subscribe().await.unwrap();
        let mut stat_sub = context.stat_bus.subscribe().await.unwrap();
        let mut service = auth_service(&context, MockInnerService);

        service
            .call(request("/gateway.Biz/Check", &["svc_a"]))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), log_sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.consumer, "svc_a");
        assert_eq!(event.method, "/gateway.Biz/Check");
        assert!(event.timestamp > 0);
        // No connection info in a direct service call.
        assert_eq!(event.host, "unknown");

        let record = tokio::time::timeout(Duration::from_secs(1), stat_sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.consumer, "svc_a");
        assert_eq!(record.method, "/gateway.Biz/Check");
        assert_eq!(record.timestamp, event.timestamp);
    }

    #[tokio::test]
    async fn test_audit_published_even_when_handler_fails() {
        let context = test_context();
        let mut log_sub = context.log_bus.subscribe().await.unwrap();
        let mut service = auth_service(&context, FailingInnerService);

        let response = service
            .call(request("/gateway.Biz/Check", &["svc_a"]))
            .await
            .unwrap();
        assert_eq!(grpc_status(&response), Some("13"));

        // The event was published before the handler ran, so the handler
        // outcome does not matter.
        let event = tokio::time::timeout(Duration::from_secs(1), log_sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.method, "/gateway.Biz/Check");
    }

    #[tokio::test]
    async fn test_rejected_call_is_not_audited_or_counted() {
        let context = test_context();
        let mut log_sub = context.log_bus.subscribe().await.unwrap();
        let mut stat_sub = context.stat_bus.subscribe().await.unwrap();
        let mut service = auth_service(&context, MockInnerService);

        service
            .call(request("/gateway.Biz/Add", &["svc_a"]))
            .await
            .unwrap();
        service.call(request("/gateway.Biz/Check", &[])).await.unwrap();

        // Publish sentinels; if the rejections had been audited they would
        // arrive first.
        context
            .log_bus
            .publish(Event {
                timestamp: 1,
                consumer: "sentinel".to_string(),
                method: String::new(),
                host: String::new(),
            })
            .await
            .unwrap();
        context
            .stat_bus
            .publish(InvocationRecord {
                consumer: "sentinel".to_string(),
                method: String::new(),
                timestamp: 1,
            })
            .await
            .unwrap();

        assert_eq!(log_sub.recv().await.unwrap().consumer, "sentinel");
        assert_eq!(stat_sub.recv().await.unwrap().consumer, "sentinel");
    }

    #[tokio::test]
    async fn test_call_forwarded_when_buses_are_shut_down() {
        let context = test_context();
        context.shutdown_buses().await;
        let mut service = auth_service(&context, MockInnerService);

        // Publishing fails but the call itself still goes through.
        let response = service
            .call(request("/gateway.Biz/Check", &["svc_a"]))
            .await
            .unwrap();
        assert!(inner_reached(&response));
    }
}
