//! Network capability token.
//!
//! Every primitive in this crate that can touch the network (raw TCP
//! connect, DNS resolution, HTTP client construction) is a method on
//! [`NetworkCapability`]. The only way to obtain one is
//! [`SecurityContext::network_capability`](super::SecurityContext::network_capability),
//! which refuses in offline mode. Offline enforcement is therefore a
//! type-level dependency rather than a patched global.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Proof that the issuing context permits outbound network access.
///
/// Cannot be constructed outside the security module.
#[derive(Debug, Clone)]
pub struct NetworkCapability {
    purpose: String,
}

impl NetworkCapability {
    pub(super) fn issue(purpose: &str) -> Self {
        Self {
            purpose: purpose.to_string(),
        }
    }

    /// What the capability was requested for (for diagnostics).
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// Open a TCP connection.
    pub fn connect_tcp(&self, addr: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
        debug!("TCP connect to {} ({})", addr, self.purpose);
        TcpStream::connect_timeout(&addr, timeout)
    }

    /// Resolve a host name.
    pub fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        debug!("DNS lookup for {} ({})", host, self.purpose);
        Ok((host, port).to_socket_addrs()?.collect())
    }

    /// Finish building an HTTP client.
    ///
    /// Taking the builder here keeps `reqwest::Client` construction behind
    /// the gate: callers configure it, the capability finishes it.
    pub fn http_client(&self, builder: reqwest::ClientBuilder) -> reqwest::Result<reqwest::Client> {
        debug!("Building HTTP client ({})", self.purpose);
        builder.build()
    }
}
