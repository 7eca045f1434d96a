//! Passphrase custody
//!
//! The passphrase is held for the lifetime of a document so that `save`
//! can re-derive the key schedule. No cross-platform per-user protection
//! facility is available, so the passphrase is obfuscated at rest with a
//! fresh random XOR mask. This protects against accidental disclosure
//! (core dumps, debug output), not against an attacker who can read both
//! the masked bytes and the mask out of process memory.

use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

/// Minimum mask entropy in bytes, used even for shorter passphrases.
const MIN_MASK_LEN: usize = 16;

/// An obfuscated in-memory copy of the document passphrase.
///
/// Both the masked bytes and the mask are zeroized on drop.
pub(crate) struct PassphraseGuard {
    masked: Vec<u8>,
    mask: Vec<u8>,
}

impl PassphraseGuard {
    /// Capture a passphrase, masking it under fresh CSPRNG entropy.
    pub(crate) fn new(plaintext: &[u8]) -> Self {
        let mut mask = vec![0u8; plaintext.len().max(MIN_MASK_LEN)];
        rand::thread_rng().fill_bytes(&mut mask);

        let masked = plaintext
            .iter()
            .zip(mask.iter())
            .map(|(p, m)| p ^ m)
            .collect();

        Self { masked, mask }
    }

    /// Recover the plaintext passphrase into a buffer that zeroizes itself.
    pub(crate) fn reveal(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(
            self.masked
                .iter()
                .zip(self.mask.iter())
                .map(|(c, m)| c ^ m)
                .collect(),
        )
    }
}

impl Drop for PassphraseGuard {
    fn drop(&mut self) {
        self.masked.zeroize();
        self.mask.zeroize();
    }
}

impl std::fmt::Debug for PassphraseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PassphraseGuard(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveal_roundtrips() {
        let guard = PassphraseGuard::new(b"hunter2");
        assert_eq!(guard.reveal().as_slice(), b"hunter2");
    }

    #[test]
    fn empty_passphrase_is_allowed() {
        let guard = PassphraseGuard::new(b"");
        assert!(guard.reveal().is_empty());
        assert!(guard.mask.len() >= MIN_MASK_LEN);
    }

    #[test]
    fn masked_bytes_are_not_plaintext() {
        let guard = PassphraseGuard::new(b"correct horse battery staple");
        assert_ne!(guard.masked.as_slice(), b"correct horse battery staple");
    }

    #[test]
    fn masks_are_fresh_per_capture() {
        let a = PassphraseGuard::new(b"same passphrase");
        let b = PassphraseGuard::new(b"same passphrase");
        assert_ne!(a.mask, b.mask);
    }
}
