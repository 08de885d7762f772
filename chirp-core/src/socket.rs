//! UDP broadcast sockets: sender toward the broadcast address, shared-port receiver.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

// CHIRP datagrams are 42 bytes; anything longer is foreign and only needs to
// arrive untruncated so the codec can reject it by length.
const RECV_BUFFER_LEN: usize = 1024;

/// One raw datagram and its IPv4 source address.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub content: Vec<u8>,
    pub source: Ipv4Addr,
}

/// Sender half: ephemeral-port UDP socket with `SO_BROADCAST` and
/// `SO_REUSEADDR`, aimed at one broadcast endpoint.
pub struct BroadcastSender {
    socket: UdpSocket,
    target: SocketAddrV4,
}

impl BroadcastSender {
    /// Open a socket permitted to send to broadcast destinations.
    ///
    /// `255.255.255.255` needs a configured interface on most stacks; a
    /// subnet-directed address is the portable choice, and `0.0.0.0` reaches
    /// only the local host.
    pub async fn new(brd_address: Ipv4Addr, port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
        let socket = UdpSocket::from_std(socket.into())?;
        Ok(Self {
            socket,
            target: SocketAddrV4::new(brd_address, port),
        })
    }

    /// Transmit one datagram to the broadcast endpoint.
    pub async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.socket.send_to(bytes, SocketAddr::V4(self.target)).await?;
        Ok(())
    }
}

/// Receiver half: bound to the any-address on the shared CHIRP port.
/// `SO_REUSEADDR` lets several CHIRP processes on one host bind the port.
pub struct BroadcastReceiver {
    socket: UdpSocket,
}

impl BroadcastReceiver {
    pub async fn bind(any_address: Ipv4Addr, port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddrV4::new(any_address, port).into())?;
        let socket = UdpSocket::from_std(socket.into())?;
        Ok(Self { socket })
    }

    /// Local address after binding (the OS picks the port when bound to 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Block until one datagram arrives. Cancel-safe: dropping the future
    /// between datagrams loses nothing.
    pub async fn recv(&self) -> io::Result<Datagram> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        loop {
            let (len, addr) = self.socket.recv_from(&mut buf).await?;
            match addr {
                SocketAddr::V4(v4) => {
                    buf.truncate(len);
                    return Ok(Datagram {
                        content: buf,
                        source: *v4.ip(),
                    });
                }
                // Cannot happen on an AF_INET socket; drop and keep waiting.
                SocketAddr::V6(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_pair() -> (BroadcastSender, BroadcastReceiver, u16) {
        let receiver = BroadcastReceiver::bind(Ipv4Addr::LOCALHOST, 0).await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let sender = BroadcastSender::new(Ipv4Addr::LOCALHOST, port).await.unwrap();
        (sender, receiver, port)
    }

    #[tokio::test]
    async fn send_and_receive_on_loopback() {
        let (sender, receiver, _) = loopback_pair().await;
        sender.send(b"chirp test datagram").await.unwrap();
        let datagram = receiver.recv().await.unwrap();
        assert_eq!(datagram.content, b"chirp test datagram");
        assert_eq!(datagram.source, Ipv4Addr::LOCALHOST);
    }

    #[tokio::test]
    async fn receivers_share_a_port() {
        let (_, first, port) = loopback_pair().await;
        // SO_REUSEADDR must allow a second bind of the same address and port.
        let second = BroadcastReceiver::bind(Ipv4Addr::LOCALHOST, port).await;
        assert!(second.is_ok(), "second bind failed: {:?}", second.err());
        drop(first);
    }

    #[tokio::test]
    async fn recv_preserves_payload_length() {
        let (sender, receiver, _) = loopback_pair().await;
        sender.send(&[0xAB; 42]).await.unwrap();
        let datagram = receiver.recv().await.unwrap();
        assert_eq!(datagram.content.len(), 42);
    }
}
