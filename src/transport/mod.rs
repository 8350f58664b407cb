//! Record layer over a reliable byte stream.
//!
//! This module provides the framed, per-direction transport machinery:
//!
//! 1. **Byte-stream contract**: the [`Transport`] trait, the minimal
//!    surface a connection needs from its underlying stream (TCP in
//!    practice)
//!
//! 2. **Blocks**: pooled, growable I/O buffers with a read cursor
//!
//! 3. **Half-connections**: one direction's cipher state, sticky error,
//!    padding configuration, and block free list
//!
//! 4. **Inner messages**: the typed TLV stream carried inside each
//!    encrypted record
//!
//! ## Wire shape
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ u16 length │ payload (ciphertext once keyed)    │
//! ├─────────────────────────────────────────────────┤
//! │ plaintext = sequence of inner messages:         │
//! │   u16 innerLen │ u16 type │ data                │
//! └─────────────────────────────────────────────────┘
//! ```

mod block;
mod half_conn;

pub mod message;

#[cfg(test)]
pub(crate) mod pipe;

pub(crate) use block::Block;
pub(crate) use half_conn::HalfConn;

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// The contract a NoiseSocket connection requires from its underlying
/// byte stream.
///
/// Methods take `&self` so one reader and one writer can drive the same
/// stream concurrently, mirroring what TCP sockets allow natively.
pub trait Transport {
    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer closed.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some prefix of `buf`, returning how much was accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Tear the stream down, unblocking any pending reads and writes.
    fn shutdown(&self) -> io::Result<()>;

    /// The local endpoint address.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// The remote endpoint address.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Bound the time a single read may block. `None` blocks forever.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Bound the time a single write may block. `None` blocks forever.
    ///
    /// A write that times out may leave a partial record on the wire; the
    /// outbound direction latches the error and refuses further writes.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self;
        io::Read::read(&mut stream, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = self;
        io::Write::write(&mut stream, buf)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}
