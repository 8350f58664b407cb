//! # NoiseSocket Transport
//!
//! Mutually-authenticated, encrypted, length-framed streams over any
//! reliable byte transport (typically TCP), built on Noise XX and IK
//! handshakes over curve25519.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Application Layer                      │
//! ├─────────────────────────────────────────────────────────┤
//! │  Conn (lazy handshake, full-duplex locking, framing)    │
//! ├─────────────────────────────────────────────────────────┤
//! │  Handshake Multiplexer (multi-suite offer, prologue)    │
//! ├─────────────────────────────────────────────────────────┤
//! │  Record Layer (blocks, half-connections, padding, TLV)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Noise Engine + AEAD (snow, AES-GCM, ChaCha20-Poly1305) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Goals
//!
//! 1. **No downgrade**: every offered cipher suite is bound into the
//!    handshake transcript through a shared prologue
//! 2. **Forward secrecy**: per-connection ephemeral keys via the Noise
//!    handshake
//! 3. **Traffic shaping**: encrypted records padded to a configurable
//!    granularity (128 bytes by default)
//! 4. **Drop-in I/O**: connections implement `std::io::Read`/`Write`
//!
//! ## Example
//!
//! ```no_run
//! use noisesocket::{dial, Keypair, Listener};
//!
//! let server_keys = Keypair::generate();
//! let listener = Listener::bind("127.0.0.1:0", server_keys.clone(), "srv")?;
//! let addr = listener.local_addr()?;
//!
//! std::thread::spawn(move || {
//!     let conn = listener.accept().unwrap();
//!     let mut buf = [0u8; 4];
//!     conn.read(&mut buf).unwrap();
//!     conn.write(b"pong").unwrap();
//! });
//!
//! // Pinning the server key upgrades the handshake to IK.
//! let conn = dial(addr, Keypair::generate(), Some(server_keys.public()), "cli")?;
//! conn.write(b"ping")?;
//! # Ok::<(), noisesocket::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod conn;
pub mod crypto;
pub mod error;
pub mod socket;
pub mod suite;
pub mod transport;

mod handshake;

pub use conn::Conn;
pub use crypto::Keypair;
pub use error::{Error, Result};
pub use socket::{dial, Listener};
pub use transport::message::MessageType;
pub use transport::Transport;

/// Maximum payload carried by one record (the u16 framing limit).
pub const MAX_PAYLOAD_SIZE: usize = 65535;

/// Default padding granularity for encrypted records, in bytes.
pub const DEFAULT_PADDING: u16 = 128;
