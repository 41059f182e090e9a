//! Transport seam between the matrix controller and the device.
//!
//! The controller depends only on this minimal contract: open a connection,
//! exchange one command string for one reply string, close. Framing lives in
//! the concrete transports.

mod memory;
mod tcp;

pub use memory::{MemoryConnector, MemoryTransport};
pub use tcp::{TcpConnector, TcpTransport};

#[cfg(test)]
pub(crate) use tcp::fake_matrix;

use crate::error::{MatrixError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A connected command channel to one matrix.
///
/// Implementations must serialize exchanges: the wire protocol has no request
/// IDs, so only one command may be in flight at a time.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one command and return the raw reply text.
    ///
    /// `timeout` bounds the exchange itself. The clock starts once this caller
    /// owns the link, so time queued behind other commands is not charged.
    async fn send(&self, command: &str, timeout: Duration) -> Result<String>;

    /// Close the connection. Never fails; errors are logged.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Opens transports from a `socket://host:port` URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str, timeout: Duration) -> Result<Arc<dyn Transport>>;
}

/// Build the connection URL for a host and port.
pub fn socket_url(host: &str, port: u16) -> String {
    format!("socket://{}:{}", host, port)
}

/// Split a `socket://host:port` URL into its address part.
pub fn parse_socket_url(url: &str) -> Result<(String, u16)> {
    let invalid = |reason: &str| MatrixError::Connection {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let rest = url
        .strip_prefix("socket://")
        .ok_or_else(|| invalid("URL must start with socket://"))?;
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| invalid("URL is missing a port"))?;
    if host.is_empty() {
        return Err(invalid("URL is missing a host"));
    }
    let port = port.parse().map_err(|_| invalid("port is not a number"))?;

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_roundtrip() {
        let url = socket_url("10.0.0.50", 4001);
        assert_eq!(url, "socket://10.0.0.50:4001");
        let (host, port) = parse_socket_url(&url).unwrap();
        assert_eq!(host, "10.0.0.50");
        assert_eq!(port, 4001);
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        assert!(parse_socket_url("tcp://10.0.0.50:4001").is_err());
        assert!(parse_socket_url("socket://10.0.0.50").is_err());
        assert!(parse_socket_url("socket://:4001").is_err());
        assert!(parse_socket_url("socket://host:http").is_err());
    }
}
