//! X25519 static identity keys.
//!
//! Provides a type-safe keypair wrapper around X25519 with automatic
//! zeroization of secret material on drop. The raw secret bytes are only
//! exposed crate-internally, for handing to the Noise engine.

use x25519_dalek::{PublicKey as DalekPublic, StaticSecret as DalekStatic};
use zeroize::Zeroize;

use crate::crypto::PUBLIC_KEY_SIZE;

/// A long-term X25519 identity keypair.
///
/// One keypair identifies one endpoint; servers typically persist theirs
/// so clients can pin the public half and dial with the IK pattern.
/// The secret half is zeroized when the keypair is dropped.
#[derive(Clone)]
pub struct Keypair {
    secret: DalekStatic,
    public: DalekPublic,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = DalekStatic::random_from_rng(rand::thread_rng());
        let public = DalekPublic::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a keypair from stored secret bytes.
    ///
    /// # Security
    ///
    /// The input bytes should come from a cryptographically secure source
    /// and be erased by the caller once the keypair is built.
    pub fn from_secret_bytes(mut bytes: [u8; 32]) -> Self {
        let secret = DalekStatic::from(bytes);
        let public = DalekPublic::from(&secret);
        bytes.zeroize();
        Self { secret, public }
    }

    /// Get the public half of this keypair.
    pub fn public(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.public.as_bytes()
    }

    /// Export the secret key bytes.
    ///
    /// Crate-internal: the only consumer is the Noise engine builder.
    /// Callers must zeroize the returned array when done.
    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keypairs_differ() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        assert_ne!(a.public(), b.public());
    }

    #[test]
    fn test_secret_bytes_round_trip() {
        let a = Keypair::generate();
        let b = Keypair::from_secret_bytes(a.secret_bytes());
        assert_eq!(a.public(), b.public());
    }

    #[test]
    fn test_debug_hides_secret() {
        let keys = Keypair::generate();
        let rendered = format!("{keys:?}");
        assert!(!rendered.contains(&format!("{:?}", keys.secret_bytes())));
    }
}
