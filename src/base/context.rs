//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into `NetError` variants and tracing the cause.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Map a read or write failure on the engine connection.
    ///
    /// # Example
    /// ```ignore
    /// use turbonet::base::context::IoResultExt;
    ///
    /// writer.write_all(&frame).await.transport_context("send")?;
    /// // Error: NetError::TransportClosed
    /// ```
    fn transport_context(self, op: &str) -> Result<T, NetError>;

    /// Map a failure to start the engine executable.
    fn spawn_context(self, program: &str) -> Result<T, NetError>;

    /// Map a failure to bind the local listening endpoint.
    fn bind_context(self, addr: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn transport_context(self, op: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(op = op, error = %e, "engine transport failed");
            NetError::TransportClosed
        })
    }

    fn spawn_context(self, program: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::error!(program = program, error = %e, "failed to start request engine");
            NetError::EngineUnavailable
        })
    }

    fn bind_context(self, addr: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::error!(addr = addr, error = %e, "failed to bind engine listener");
            match e.kind() {
                io::ErrorKind::AddrInUse => NetError::AddressInUse,
                _ => NetError::ConnectionFailed,
            }
        })
    }
}
