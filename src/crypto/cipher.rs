//! Per-direction AEAD cipher state.
//!
//! At handshake completion the Noise engine yields one 256-bit key per
//! direction. Each direction then runs an independent AEAD instance with a
//! monotonically increasing 64-bit nonce counter, following the Noise
//! nonce conventions: the 96-bit nonce is four zero bytes followed by the
//! counter, big-endian for AES-GCM and little-endian for ChaCha20-Poly1305.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;

use crate::crypto::{KEY_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// Which AEAD a negotiated suite uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CipherChoice {
    /// AES-256-GCM
    AesGcm,
    /// ChaCha20-Poly1305
    ChaChaPoly,
}

enum Aead {
    AesGcm(Aes256Gcm),
    ChaChaPoly(ChaCha20Poly1305),
}

/// One direction's cipher state: an AEAD key plus a nonce counter.
///
/// Nonces must never repeat under the same key, so encryption and
/// decryption each advance the counter exactly once, success or failure.
pub(crate) struct CipherState {
    aead: Aead,
    nonce: u64,
}

impl CipherState {
    /// Build a cipher state from one of the Noise engine's split keys.
    pub(crate) fn new(choice: CipherChoice, key: &[u8; KEY_SIZE]) -> Self {
        let aead = match choice {
            CipherChoice::AesGcm => Aead::AesGcm(Aes256Gcm::new(GenericArray::from_slice(key))),
            CipherChoice::ChaChaPoly => {
                Aead::ChaChaPoly(ChaCha20Poly1305::new(GenericArray::from_slice(key)))
            }
        };
        Self { aead, nonce: 0 }
    }

    fn next_nonce(&mut self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        match self.aead {
            Aead::AesGcm(_) => nonce[4..].copy_from_slice(&self.nonce.to_be_bytes()),
            Aead::ChaChaPoly(_) => nonce[4..].copy_from_slice(&self.nonce.to_le_bytes()),
        }
        self.nonce += 1;
        nonce
    }

    /// Encrypt `buf` in place, returning the detached authentication tag.
    ///
    /// Panics if the plaintext exceeds the AEAD's limits; record framing
    /// keeps payloads under 64 KiB so this is unreachable from the wire.
    pub(crate) fn seal(&mut self, buf: &mut [u8]) -> [u8; TAG_SIZE] {
        let nonce = self.next_nonce();
        let nonce = GenericArray::from_slice(&nonce);
        let tag = match &self.aead {
            Aead::AesGcm(aead) => aead.encrypt_in_place_detached(nonce, &[], buf),
            Aead::ChaChaPoly(aead) => aead.encrypt_in_place_detached(nonce, &[], buf),
        }
        .expect("plaintext within AEAD limits");
        let mut out = [0u8; TAG_SIZE];
        out.copy_from_slice(&tag);
        out
    }

    /// Decrypt `buf` in place, verifying the detached tag.
    pub(crate) fn open(&mut self, buf: &mut [u8], tag: &[u8]) -> Result<()> {
        let nonce = self.next_nonce();
        let nonce = GenericArray::from_slice(&nonce);
        let tag = GenericArray::from_slice(tag);
        match &self.aead {
            Aead::AesGcm(aead) => aead.decrypt_in_place_detached(nonce, &[], buf, tag),
            Aead::ChaChaPoly(aead) => aead.decrypt_in_place_detached(nonce, &[], buf, tag),
        }
        .map_err(|_| Error::AuthenticationFailure)
    }
}
