//! Ergonomic error context helpers.
//!
//! Converts IO errors into [`NetError::Network`] values carrying the
//! operation and target, so the classifier can inspect them without
//! looking at message text.

use crate::base::neterror::{NetError, NetOpError};
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use mimicnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 443)?;
    /// // Error: "dial example.com:443: connection refused"
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Add DNS resolution context to an IO error.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;

    /// Add read/write context to an IO error on an established socket.
    fn io_context(self, op: &'static str, target: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| NetOpError::syscall("dial", format!("{}:{}", host, port), e).into())
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| NetOpError::dns(domain, e.to_string()).into())
    }

    fn io_context(self, op: &'static str, target: &str) -> Result<T, NetError> {
        self.map_err(|e| NetOpError::syscall(op, target, e).into())
    }
}
