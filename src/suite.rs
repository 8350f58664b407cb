//! Cipher-suite registry and negotiation priorities.
//!
//! The registry holds the full matrix of supported Noise protocol names:
//! each handshake pattern crossed with every DH, cipher, and hash function.
//! It is built once, in a fixed iteration order that doubles as the wire
//! priority order, and is immutable afterwards. Both peers bind the
//! registry contents into the handshake transcript through per-pattern
//! prologues, so the matrix itself is downgrade-protected.

use std::collections::HashMap;
use std::sync::OnceLock;

use snow::params::NoiseParams;

use crate::crypto::CipherChoice;

/// Supported Noise handshake patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Mutual authentication with no prior key knowledge (three messages)
    Xx,
    /// Initiator knows the responder's static key up front (two messages)
    Ik,
}

impl Pattern {
    /// The pattern's token as it appears in protocol names.
    pub fn token(self) -> &'static str {
        match self {
            Pattern::Xx => "XX",
            Pattern::Ik => "IK",
        }
    }

    /// Whether the initiator must supply the responder's static key.
    pub(crate) fn use_remote_static(self) -> bool {
        matches!(self, Pattern::Ik)
    }

    /// Whether handshake message `index` carries an `s` (static key) token.
    ///
    /// An application payload rides along with a static key: that is the
    /// earliest message the pattern can bind it to.
    pub(crate) fn message_has_static(self, index: usize) -> bool {
        let table: &[bool] = match self {
            // XX: e | e, ee, s, es | s, se
            Pattern::Xx => &[false, true, true],
            // IK: e, es, s, ss | e, ee, se
            Pattern::Ik => &[true, false],
        };
        table.get(index).copied().unwrap_or(false)
    }
}

/// Patterns in the order the initiator offers them.
pub(crate) const OFFER_ORDER: [Pattern; 2] = [Pattern::Xx, Pattern::Ik];

/// Patterns in the order the responder prefers them. IK wins when offered:
/// it authenticates in two messages instead of three.
pub(crate) const RESPONDER_PREFERENCE: [Pattern; 2] = [Pattern::Ik, Pattern::Xx];

const DH_FUNCS: [&str; 1] = ["25519"];
const CIPHER_FUNCS: [(&str, CipherChoice); 2] = [
    ("AESGCM", CipherChoice::AesGcm),
    ("ChaChaPoly", CipherChoice::ChaChaPoly),
];
const HASH_FUNCS: [&str; 4] = ["SHA256", "BLAKE2b", "SHA512", "BLAKE2s"];

/// One entry of the suite matrix. Immutable after registry construction.
pub struct SuiteConfig {
    pattern: Pattern,
    name: String,
    params: NoiseParams,
    cipher: CipherChoice,
}

impl SuiteConfig {
    /// Full protocol name, e.g. `Noise_XX_25519_AESGCM_SHA256`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handshake pattern this suite uses.
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub(crate) fn params(&self) -> NoiseParams {
        self.params.clone()
    }

    pub(crate) fn cipher(&self) -> CipherChoice {
        self.cipher
    }
}

/// Process-wide table of supported suites, priorities, and prologues.
pub struct SuiteRegistry {
    suites: Vec<SuiteConfig>,
    by_name: HashMap<String, usize>,
    priorities: HashMap<Pattern, Vec<usize>>,
    prologues: HashMap<Pattern, Vec<u8>>,
}

impl SuiteRegistry {
    fn build() -> Self {
        let mut registry = SuiteRegistry {
            suites: Vec::new(),
            by_name: HashMap::new(),
            priorities: HashMap::new(),
            prologues: HashMap::new(),
        };

        for pattern in OFFER_ORDER {
            let mut priority = Vec::new();
            let mut prologue = Vec::new();
            for dh in DH_FUNCS {
                for (cipher_name, cipher) in CIPHER_FUNCS {
                    for hash in HASH_FUNCS {
                        let name =
                            format!("Noise_{}_{}_{}_{}", pattern.token(), dh, cipher_name, hash);
                        assert!(
                            name.len() <= u8::MAX as usize,
                            "protocol name exceeds 255 bytes: {name}"
                        );
                        let params: NoiseParams = name
                            .parse()
                            .unwrap_or_else(|e| panic!("unparseable protocol name {name}: {e}"));

                        let index = registry.suites.len();
                        let previous = registry.by_name.insert(name.clone(), index);
                        assert!(previous.is_none(), "duplicate protocol name: {name}");

                        prologue.push(name.len() as u8);
                        prologue.extend_from_slice(name.as_bytes());
                        priority.push(index);

                        registry.suites.push(SuiteConfig {
                            pattern,
                            name,
                            params,
                            cipher,
                        });
                    }
                }
            }
            assert!(
                priority.len() <= u8::MAX as usize,
                "too many suites for one pattern"
            );
            registry.priorities.insert(pattern, priority);
            registry.prologues.insert(pattern, prologue);
        }

        registry
    }

    /// Look up a suite by its full protocol name.
    pub fn get(&self, name: &str) -> Option<&SuiteConfig> {
        self.by_name.get(name).map(|&index| &self.suites[index])
    }

    /// Number of registered suites across all patterns.
    pub fn len(&self) -> usize {
        self.suites.len()
    }

    /// True if the registry holds no suites. Never the case in practice.
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    pub(crate) fn suite(&self, index: usize) -> &SuiteConfig {
        &self.suites[index]
    }

    /// Suite indices for a pattern, in wire priority order.
    pub(crate) fn priority(&self, pattern: Pattern) -> &[usize] {
        self.priorities
            .get(&pattern)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Prologue fragment for a pattern: each suite's
    /// `u8 name-length || name bytes`, concatenated in priority order.
    pub(crate) fn prologue(&self, pattern: Pattern) -> &[u8] {
        self.prologues
            .get(&pattern)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The process-wide suite registry, built on first use.
pub fn registry() -> &'static SuiteRegistry {
    static REGISTRY: OnceLock<SuiteRegistry> = OnceLock::new();
    REGISTRY.get_or_init(SuiteRegistry::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_holds_full_matrix() {
        let reg = registry();
        assert_eq!(reg.len(), 16);
        assert_eq!(reg.priority(Pattern::Xx).len(), 8);
        assert_eq!(reg.priority(Pattern::Ik).len(), 8);
    }

    #[test]
    fn test_priority_order_is_fixed() {
        let reg = registry();
        let xx_names: Vec<&str> = reg
            .priority(Pattern::Xx)
            .iter()
            .map(|&i| reg.suite(i).name())
            .collect();
        assert_eq!(
            xx_names,
            [
                "Noise_XX_25519_AESGCM_SHA256",
                "Noise_XX_25519_AESGCM_BLAKE2b",
                "Noise_XX_25519_AESGCM_SHA512",
                "Noise_XX_25519_AESGCM_BLAKE2s",
                "Noise_XX_25519_ChaChaPoly_SHA256",
                "Noise_XX_25519_ChaChaPoly_BLAKE2b",
                "Noise_XX_25519_ChaChaPoly_SHA512",
                "Noise_XX_25519_ChaChaPoly_BLAKE2s",
            ]
        );
    }

    #[test]
    fn test_lookup_by_name() {
        let reg = registry();
        let suite = reg.get("Noise_IK_25519_ChaChaPoly_BLAKE2b").unwrap();
        assert_eq!(suite.pattern(), Pattern::Ik);
        assert_eq!(suite.cipher(), CipherChoice::ChaChaPoly);
        assert!(reg.get("Noise_NN_25519_AESGCM_SHA256").is_none());
    }

    #[test]
    fn test_prologue_layout() {
        let reg = registry();
        let prologue = reg.prologue(Pattern::Ik);

        // Walk the length-prefixed names and confirm they cover the
        // fragment exactly, in priority order.
        let mut rest = prologue;
        let mut seen = Vec::new();
        while !rest.is_empty() {
            let len = rest[0] as usize;
            seen.push(std::str::from_utf8(&rest[1..1 + len]).unwrap().to_string());
            rest = &rest[1 + len..];
        }
        assert_eq!(seen.len(), 8);
        assert_eq!(seen[0], "Noise_IK_25519_AESGCM_SHA256");
        assert!(seen.iter().all(|name| reg.get(name).is_some()));
    }

    #[test]
    fn test_message_static_tokens() {
        assert!(!Pattern::Xx.message_has_static(0));
        assert!(Pattern::Xx.message_has_static(1));
        assert!(Pattern::Xx.message_has_static(2));

        assert!(Pattern::Ik.message_has_static(0));
        assert!(!Pattern::Ik.message_has_static(1));
        assert!(!Pattern::Ik.message_has_static(5));
    }
}
