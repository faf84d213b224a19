//! Shared per-server state handed to the auth layer and the admin service.

use crate::acl::AccessControlTable;
use crate::bus::BusHandle;
use crate::stats::InvocationRecord;
use proto_gen::gateway::Event;
use std::sync::Arc;

/// Immutable server-wide context.
///
/// Built once at startup and shared by `Arc` clone; the ACL is read-only
/// and the bus handles are clone-cheap mailbox senders, so there is no
/// interior mutability here.
#[derive(Clone)]
pub struct GatewayContext {
    /// Consumer authorization table.
    pub acl: Arc<AccessControlTable>,
    /// Audit-event hub feeding `Admin/Logging` streams.
    pub log_bus: BusHandle<Event>,
    /// Invocation-record hub feeding `Admin/Statistics` streams.
    pub stat_bus: BusHandle<InvocationRecord>,
}

impl GatewayContext {
    #[must_use]
    pub fn new(acl: AccessControlTable) -> Self {
        Self {
            acl: Arc::new(acl),
            log_bus: BusHandle::spawn("log"),
            stat_bus: BusHandle::spawn("stat"),
        }
    }

    /// Shut both hubs down, ending every admin stream. Idempotent.
    pub async fn shutdown_buses(&self) {
        self.log_bus.shutdown().await;
        self.stat_bus.shutdown().await;
    }
}
