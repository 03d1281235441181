use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("blaster {addr}: {source}")]
pub struct TransportError {
    pub addr: String,
    #[source]
    pub source: io::Error,
}

/// An infrared transmitter. Commands are fire-and-forget: a successful
/// send says nothing about whether the unit heard it.
pub trait Blaster: Send + Sync {
    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn describe(&self) -> String {
        String::from("blaster")
    }
}

/// Sends each payload as one datagram. The address is resolved and the
/// socket bound once, up front, so a send never waits on name lookup.
pub struct UdpBlaster {
    addr: String,
    target: SocketAddr,
    socket: UdpSocket,
}

impl UdpBlaster {
    pub fn new(addr: &str) -> Result<Self, TransportError> {
        let wrap = |source| TransportError { addr: addr.to_owned(), source };
        let target = addr
            .to_socket_addrs()
            .map_err(wrap)?
            .next()
            .ok_or_else(|| wrap(io::Error::new(io::ErrorKind::NotFound, "no address for host")))?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(wrap)?;
        Ok(Self { addr: addr.to_owned(), target, socket })
    }
}

impl Blaster for UdpBlaster {
    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(data, self.target)
            .map_err(|source| TransportError { addr: self.addr.clone(), source })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.addr, self.target)
    }
}
