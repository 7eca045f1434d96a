//! Key schedule: passphrase stretching, verifier, and TwoFish key wrapping
//!
//! The stretched key is a plain iterated SHA-256 over `SHA256(passphrase || salt)`,
//! not PBKDF2. K and L are independent random 256-bit keys wrapped as two
//! TwoFish-256-ECB blocks each under the stretched key.

use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use twofish::Twofish;
use zeroize::Zeroize;

use crate::error::{FormatError, Result};

/// Size of the stretched key, K, and L in bytes (256 bits).
pub(crate) const KEY_SIZE: usize = 32;

/// TwoFish block size in bytes.
pub(crate) const CIPHER_BLOCK: usize = 16;

/// Minimum iteration count written to a container.
pub const MIN_ITERATIONS: u32 = 2048;

/// A 256-bit secret key. Zeroized on drop, never printed.
pub(crate) struct KeyMaterial {
    bytes: [u8; KEY_SIZE],
}

impl KeyMaterial {
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random key from the process CSPRNG.
    pub(crate) fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Stretch a passphrase into the master ECB key.
///
/// `h0 = SHA256(passphrase || salt)`, then `iterations` further SHA-256
/// rounds over the running digest.
pub(crate) fn stretch_passphrase(passphrase: &[u8], salt: &[u8], iterations: u32) -> KeyMaterial {
    let mut hasher = Sha256::new();
    hasher.update(passphrase);
    hasher.update(salt);
    let mut digest = hasher.finalize();

    for _ in 0..iterations {
        digest = Sha256::digest(digest);
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(digest.as_slice());
    digest.as_mut_slice().zeroize();
    KeyMaterial::from_bytes(bytes)
}

/// The stored passphrase check value: `SHA256(stretched)`.
pub(crate) fn verifier(stretched: &KeyMaterial) -> [u8; KEY_SIZE] {
    Sha256::digest(stretched.as_bytes()).into()
}

/// Wrap a 256-bit key as two independent TwoFish-ECB blocks under the
/// stretched key.
pub(crate) fn wrap_key(stretched: &KeyMaterial, key: &KeyMaterial) -> Result<[u8; KEY_SIZE]> {
    let cipher = Twofish::new_from_slice(stretched.as_bytes())
        .map_err(|_| FormatError::UnrecognizedFormat)?;

    let mut out = *key.as_bytes();
    for block in out.chunks_exact_mut(CIPHER_BLOCK) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(out)
}

/// Unwrap a key previously wrapped by [`wrap_key`].
pub(crate) fn unwrap_key(stretched: &KeyMaterial, wrapped: &[u8]) -> Result<KeyMaterial> {
    if wrapped.len() != KEY_SIZE {
        return Err(FormatError::UnrecognizedFormat.into());
    }
    let cipher = Twofish::new_from_slice(stretched.as_bytes())
        .map_err(|_| FormatError::UnrecognizedFormat)?;

    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(wrapped);
    for block in out.chunks_exact_mut(CIPHER_BLOCK) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(KeyMaterial::from_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretch_is_deterministic() {
        let a = stretch_passphrase(b"hunter2", &[7u8; 32], 2048);
        let b = stretch_passphrase(b"hunter2", &[7u8; 32], 2048);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn stretch_depends_on_salt_and_iterations() {
        let base = stretch_passphrase(b"hunter2", &[7u8; 32], 2048);
        let other_salt = stretch_passphrase(b"hunter2", &[8u8; 32], 2048);
        let other_iter = stretch_passphrase(b"hunter2", &[7u8; 32], 2049);
        assert_ne!(base.as_bytes(), other_salt.as_bytes());
        assert_ne!(base.as_bytes(), other_iter.as_bytes());
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let stretched = stretch_passphrase(b"secret", &[1u8; 32], 2048);
        let key = KeyMaterial::random();

        let wrapped = wrap_key(&stretched, &key).unwrap();
        assert_ne!(&wrapped, key.as_bytes(), "wrap must not be identity");

        let unwrapped = unwrap_key(&stretched, &wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn unwrap_with_wrong_stretched_key_differs() {
        let right = stretch_passphrase(b"secret", &[1u8; 32], 2048);
        let wrong = stretch_passphrase(b"secret!", &[1u8; 32], 2048);
        let key = KeyMaterial::random();

        let wrapped = wrap_key(&right, &key).unwrap();
        let unwrapped = unwrap_key(&wrong, &wrapped).unwrap();
        assert_ne!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn random_keys_differ() {
        let a = KeyMaterial::random();
        let b = KeyMaterial::random();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn verifier_matches_stretched_key_only() {
        let a = stretch_passphrase(b"pw", &[0u8; 32], 2048);
        let b = stretch_passphrase(b"pw2", &[0u8; 32], 2048);
        assert_ne!(verifier(&a), verifier(&b));
    }
}
