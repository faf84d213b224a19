//! Test server harness for end-to-end gateway tests.
//!
//! Spawns a real gateway on a random port and hands out clients whose calls
//! carry a chosen consumer identity.

use gateway_service::server::Gateway;
use proto_gen::gateway::admin_client::AdminClient;
use proto_gen::gateway::biz_client::BizClient;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

/// A `Biz` client whose calls carry a consumer identity.
pub type BizTestClient = BizClient<InterceptedService<Channel, ConsumerInterceptor>>;

/// An `Admin` client whose calls carry a consumer identity.
pub type AdminTestClient = AdminClient<InterceptedService<Channel, ConsumerInterceptor>>;

/// Client interceptor stamping the `consumer` metadata onto every call.
///
/// Holds one value per stamp so tests can send the metadata zero, one, or
/// several times.
#[derive(Clone)]
pub struct ConsumerInterceptor {
    values: Vec<AsciiMetadataValue>,
}

impl ConsumerInterceptor {
    /// Stamp `consumer` exactly once, as a well-behaved client would.
    pub fn new(consumer: &str) -> Result<Self, anyhow::Error> {
        Ok(Self {
            values: vec![consumer.parse()?],
        })
    }

    /// Stamp `consumer` `count` times, for metadata-multiplicity tests.
    pub fn repeated(consumer: &str, count: usize) -> Result<Self, anyhow::Error> {
        let value: AsciiMetadataValue = consumer.parse()?;
        Ok(Self {
            values: vec![value; count],
        })
    }
}

impl Interceptor for ConsumerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        for value in &self.values {
            request.metadata_mut().append("consumer", value.clone());
        }
        Ok(request)
    }
}

/// Test harness wrapping a running gateway.
///
/// # Example
/// ```rust,ignore
/// let server = TestGateway::spawn(r#"{"svc_a": ["/gateway.Biz/Check"]}"#).await?;
/// let mut client = server.biz_client("svc_a").await?;
/// client.check(Nothing::default()).await?;
/// server.shutdown().await?;
/// ```
pub struct TestGateway {
    addr: SocketAddr,
    cancel: CancellationToken,
    gateway: Option<Gateway>,
}

impl TestGateway {
    /// Spawn a gateway with the given ACL document on a random port.
    pub async fn spawn(acl_document: &str) -> Result<Self, anyhow::Error> {
        let cancel = CancellationToken::new();
        let gateway = Gateway::bind("127.0.0.1:0", acl_document, cancel.clone()).await?;
        let addr = gateway.local_addr();
        Ok(Self {
            addr,
            cancel,
            gateway: Some(gateway),
        })
    }

    /// The gateway's base URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The gateway's socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// A raw channel to the gateway, for clients that manage their own
    /// metadata.
    pub async fn channel(&self) -> Result<Channel, anyhow::Error> {
        Ok(Channel::from_shared(self.url())?.connect().await?)
    }

    /// A `Biz` client identifying as `consumer`.
    pub async fn biz_client(&self, consumer: &str) -> Result<BizTestClient, anyhow::Error> {
        let channel = self.channel().await?;
        Ok(BizClient::with_interceptor(
            channel,
            ConsumerInterceptor::new(consumer)?,
        ))
    }

    /// An `Admin` client identifying as `consumer`.
    pub async fn admin_client(&self, consumer: &str) -> Result<AdminTestClient, anyhow::Error> {
        let channel = self.channel().await?;
        Ok(AdminClient::with_interceptor(
            channel,
            ConsumerInterceptor::new(consumer)?,
        ))
    }

    /// Gracefully stop the gateway and wait for it to drain.
    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        self.cancel.cancel();
        if let Some(gateway) = self.gateway.take() {
            gateway.wait_until_stopped().await?;
        }
        Ok(())
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        // Stop the server task when a test forgets to shut down explicitly.
        self.cancel.cancel();
    }
}
