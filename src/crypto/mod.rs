//! Cryptographic state for established connections.
//!
//! This module provides:
//! - X25519 static identity keypairs handed to the Noise engine
//! - Per-direction AEAD cipher states built from the engine's split keys
//!
//! The Noise handshake itself (DH, HKDF, transcript hashing) lives in the
//! `snow` engine; only the material that outlives the handshake is managed
//! here. All secret material is zeroized when it goes out of scope.

mod cipher;
mod keys;

pub use keys::Keypair;

pub(crate) use cipher::{CipherChoice, CipherState};

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of AEAD authentication tags in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
