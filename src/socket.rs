//! TCP listener and dialer factories.
//!
//! Thin wrappers that pair `std::net` sockets with connection state; all
//! protocol work happens in [`Conn`].

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use crate::conn::Conn;
use crate::crypto::Keypair;
use crate::error::Result;

/// Accepts incoming TCP connections and wraps each as a server-side
/// [`Conn`].
///
/// Every accepted connection shares the listener's identity keypair and
/// handshake payload. Handshakes run lazily, on each connection's first
/// I/O, so `accept` never blocks on a slow client's handshake.
pub struct Listener {
    inner: TcpListener,
    keys: Keypair,
    payload: Vec<u8>,
}

impl Listener {
    /// Bind a listener on `addr` with the given identity.
    pub fn bind(
        addr: impl ToSocketAddrs,
        keys: Keypair,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let inner = TcpListener::bind(addr)?;
        tracing::debug!("listening on {}", inner.local_addr()?);
        Ok(Listener {
            inner,
            keys,
            payload: payload.into(),
        })
    }

    /// Wait for and return the next incoming connection.
    pub fn accept(&self) -> Result<Conn<TcpStream>> {
        let (stream, peer) = self.inner.accept()?;
        tracing::debug!("accepted connection from {}", peer);
        Ok(Conn::server(stream, self.keys.clone(), self.payload.clone()))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}

/// Connect to `addr` and wrap the stream as a client-side [`Conn`].
///
/// Passing the responder's public key as `peer_static` lets the handshake
/// offer IK in addition to XX, completing in two flights instead of
/// three; `None` offers XX only. `payload` is delivered to the peer
/// during the handshake.
pub fn dial(
    addr: impl ToSocketAddrs,
    keys: Keypair,
    peer_static: Option<&[u8]>,
    payload: impl Into<Vec<u8>>,
) -> Result<Conn<TcpStream>> {
    let stream = TcpStream::connect(addr)?;
    tracing::debug!("connected to {}", stream.peer_addr()?);
    Ok(Conn::client(stream, keys, peer_static, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_reports_local_addr() {
        let listener = Listener::bind("127.0.0.1:0", Keypair::generate(), "").unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_ne!(addr.port(), 0);
    }
}
