//! Server lifecycle: bind, serve, drain, stop.
//!
//! Startup is fail-fast: the ACL is parsed and the listen socket bound
//! before a [`Gateway`] exists, so configuration and bind failures surface
//! as errors from [`Gateway::bind`] rather than from inside a running task.
//! Shutdown is driven by a `CancellationToken`: on cancel the buses shut
//! down first, ending every admin stream, then the transport drains and the
//! lifecycle reaches `Stopped`.

use crate::acl::AccessControlTable;
use crate::context::GatewayContext;
use crate::errors::GatewayError;
use crate::grpc::{AdminGrpcService, AuthLayer, BizGrpcService};
use proto_gen::gateway::admin_server::AdminServer;
use proto_gen::gateway::biz_server::BizServer;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, info};

/// Observable server lifecycle states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

/// A bound, serving gateway.
#[derive(Debug)]
pub struct Gateway {
    local_addr: SocketAddr,
    state: watch::Receiver<LifecycleState>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl Gateway {
    /// Parse the ACL, bind the listen socket and start serving.
    ///
    /// Returns once the socket is bound; clients connecting to
    /// [`local_addr`](Self::local_addr) from then on will be served.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Config`] for a malformed ACL document or listen
    /// address, [`GatewayError::Bind`] when the socket cannot be bound.
    pub async fn bind(
        listen_address: &str,
        acl_document: &str,
        cancel: CancellationToken,
    ) -> Result<Self, GatewayError> {
        let acl = AccessControlTable::from_json(acl_document)?;

        let addr: SocketAddr = listen_address.parse().map_err(|e| {
            GatewayError::Config(format!("invalid listen address {listen_address}: {e}"))
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: listen_address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            addr: listen_address.to_string(),
            source,
        })?;

        info!(
            target: "gateway.server",
            addr = %local_addr,
            consumers = acl.consumer_count(),
            "Gateway listening"
        );

        let context = GatewayContext::new(acl);
        let (state_tx, state_rx) = watch::channel(LifecycleState::Starting);

        let router = Server::builder()
            .layer(AuthLayer::new(context.clone()))
            .add_service(BizServer::new(BizGrpcService))
            .add_service(AdminServer::new(AdminGrpcService::new(context.clone())));

        let shutdown_signal = {
            let context = context.clone();
            let state_tx = state_tx.clone();
            async move {
                cancel.cancelled().await;
                info!(target: "gateway.server", "Shutdown requested, draining");
                let _ = state_tx.send(LifecycleState::ShuttingDown);
                // End the admin streams first so draining does not wait on
                // open subscriptions.
                context.shutdown_buses().await;
            }
        };

        let task = tokio::spawn(async move {
            let incoming = TcpListenerStream::new(listener);
            let _ = state_tx.send(LifecycleState::Serving);
            let result = router
                .serve_with_incoming_shutdown(incoming, shutdown_signal)
                .await;
            // On the graceful path the buses are already down; this covers
            // transport failure, where the signal never completed.
            context.shutdown_buses().await;
            let _ = state_tx.send(LifecycleState::Stopped);
            debug!(target: "gateway.server", "Gateway stopped");
            result
        });

        Ok(Self {
            local_addr,
            state: state_rx,
            task,
        })
    }

    /// The bound address; with port 0 in the listen address this is where
    /// the gateway actually listens.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// A watch on the lifecycle, for callers waiting on a transition.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Wait for the serving task to finish.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Transport`] when the transport failed,
    /// [`GatewayError::Internal`] when the serving task panicked.
    pub async fn wait_until_stopped(self) -> Result<(), GatewayError> {
        self.task
            .await
            .map_err(|e| GatewayError::internal(format!("server task failed: {e}")))?
            .map_err(GatewayError::Transport)
    }
}

/// Bind and serve until `cancel` fires, then drain and return.
///
/// # Errors
///
/// Setup errors from [`Gateway::bind`], runtime errors from
/// [`Gateway::wait_until_stopped`].
pub async fn start(
    cancel: CancellationToken,
    listen_address: &str,
    acl_document: &str,
) -> Result<(), GatewayError> {
    let gateway = Gateway::bind(listen_address, acl_document, cancel).await?;
    gateway.wait_until_stopped().await
}
