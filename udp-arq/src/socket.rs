//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks raw
//! datagrams; decoding lives in [`crate::packet`] so each loop can decide how
//! to treat a malformed frame.  Bind failures become
//! [`ArqError::TransportUnavailable`], everything else [`ArqError::Io`].

use std::net::SocketAddr;

use tokio::net::{lookup_host, UdpSocket};

use crate::error::ArqError;

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self`; each socket is nonetheless owned by exactly one
/// loop for the lifetime of a transfer.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, ArqError> {
        let inner = UdpSocket::bind(local_addr)
            .await
            .map_err(|source| ArqError::TransportUnavailable {
                addr: local_addr,
                source,
            })?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `bytes` as a single datagram to `dest`.
    pub async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), ArqError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram into `buf`.
    ///
    /// Returns `(len, sender_address)`.  Datagrams longer than `buf` are
    /// truncated by the OS.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), ArqError> {
        Ok(self.inner.recv_from(buf).await?)
    }
}

/// Resolve `host:port` to the first address the resolver returns.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ArqError> {
    lookup_host((host, port))
        .await
        .map_err(|_| ArqError::HostUnresolvable(host.to_string()))?
        .next()
        .ok_or_else(|| ArqError::HostUnresolvable(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_datagram_arrives_intact() {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        a.send_to(b"ping", b.local_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a.local_addr);
    }

    #[tokio::test]
    async fn binding_a_taken_port_is_transport_unavailable() {
        let a = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let err = Socket::bind(a.local_addr).await.unwrap_err();
        assert!(matches!(err, ArqError::TransportUnavailable { .. }));
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let addr = resolve("localhost", 4000).await.unwrap();
        assert_eq!(addr.port(), 4000);
    }

    #[tokio::test]
    async fn unresolvable_host_is_reported() {
        let err = resolve("no-such-host.invalid", 4000).await.unwrap_err();
        assert!(matches!(err, ArqError::HostUnresolvable(h) if h == "no-such-host.invalid"));
    }
}
