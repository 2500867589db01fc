//! UDP endpoint for the tunnel.
//!
//! The tunnel speaks to exactly one peer. In client mode the peer is fixed at
//! startup by [`TunnelSocket::connect`]; in server mode the socket starts
//! unconnected and adopts the sender of the first received datagram
//! (peer-learning). The peer cell is written at most once, so both relay
//! loops can read it without further synchronization.

use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::net::UdpSocket;

/// A UDP socket bound to one tunnel peer.
pub struct TunnelSocket {
    socket: UdpSocket,
    peer: OnceLock<SocketAddr>,
}

impl TunnelSocket {
    /// Bind to `addr` without a peer (server mode).
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!(local = %socket.local_addr()?, "UDP socket bound");
        Ok(Self {
            socket,
            peer: OnceLock::new(),
        })
    }

    /// Bind an ephemeral socket and fix `peer` as the remote end (client
    /// mode).
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let sock = Self::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
        sock.socket.connect(peer).await?;
        let _ = sock.peer.set(peer);
        tracing::info!(%peer, "UDP socket connected");
        Ok(sock)
    }

    /// The established peer, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.get().copied()
    }

    /// Whether a peer has been established by connect or peer-learning.
    pub fn is_connected(&self) -> bool {
        self.peer.get().is_some()
    }

    /// Adopt `addr` as the peer if none is established yet.
    ///
    /// Returns `true` when the peer was adopted by this call.
    pub fn learn_peer(&self, addr: SocketAddr) -> bool {
        self.peer.set(addr).is_ok()
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    pub async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.socket.send_to(buf, addr).await.map(|_| ())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn bound_socket_has_no_peer_until_learned() {
        let sock = TunnelSocket::bind(localhost()).await.unwrap();
        assert!(!sock.is_connected());
        assert_eq!(sock.peer(), None);

        let first: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let second: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert!(sock.learn_peer(first));
        assert!(sock.is_connected());
        assert_eq!(sock.peer(), Some(first));

        // The peer is adopted exactly once.
        assert!(!sock.learn_peer(second));
        assert_eq!(sock.peer(), Some(first));
    }

    #[tokio::test]
    async fn connected_socket_has_fixed_peer() {
        let remote = TunnelSocket::bind(localhost()).await.unwrap();
        let remote_addr = remote.local_addr().unwrap();

        let sock = TunnelSocket::connect(remote_addr).await.unwrap();
        assert!(sock.is_connected());
        assert_eq!(sock.peer(), Some(remote_addr));
        assert!(!sock.learn_peer("127.0.0.1:4000".parse().unwrap()));
    }

    #[tokio::test]
    async fn datagrams_travel_both_ways() {
        let server = TunnelSocket::bind(localhost()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = TunnelSocket::connect(server_addr).await.unwrap();

        client.send_to(b"ping", server_addr).await.unwrap();
        let mut buf = [0u8; 64];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(server.learn_peer(from));

        server.send_to(b"pong", from).await.unwrap();
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }
}
