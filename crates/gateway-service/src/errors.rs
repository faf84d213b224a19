//! Gateway error types.
//!
//! Setup failures (`Config`, `Bind`) are returned synchronously from
//! [`crate::server::start`] and never reach the serving state. Authorization
//! failures are not represented here: they are produced inside the auth layer
//! as tonic `Status` responses and returned directly to the caller.

use thiserror::Error;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed ACL configuration; fatal to startup.
    #[error("ACL configuration error: {0}")]
    Config(String),

    /// Listen address unavailable; fatal to startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The tonic server failed while serving.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Operation attempted on a bus that has already shut down.
    #[error("broadcast bus is shut down")]
    BusClosed,

    /// Actor mailbox or response channel failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }
}
