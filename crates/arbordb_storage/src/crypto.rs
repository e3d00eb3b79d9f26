//! Log frame sealing with AES-256-GCM.
//!
//! The user supplies secret bytes of any length. The actual cipher key is
//! derived with HKDF-SHA256 from that secret and a random per-log salt, so
//! rekeying also rotates the salt.
//!
//! Sealed payload layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use crate::error::{StorageError, StorageResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a derived AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of the per-log HKDF salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Secret material used to seal a commit log.
///
/// The bytes are zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    secret: Vec<u8>,
}

impl EncryptionKey {
    /// Creates a key from secret bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `secret` is empty.
    pub fn from_bytes(secret: &[u8]) -> StorageResult<Self> {
        if secret.is_empty() {
            return Err(StorageError::encryption("encryption key is empty"));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// Returns the secret bytes.
    ///
    /// # Security
    ///
    /// Don't log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Generates a fresh random salt.
#[cfg(feature = "encryption")]
pub(crate) fn random_salt() -> [u8; SALT_SIZE] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(not(feature = "encryption"))]
pub(crate) fn random_salt() -> [u8; SALT_SIZE] {
    [0u8; SALT_SIZE]
}

/// Seals and opens log frame payloads.
#[cfg(feature = "encryption")]
pub struct LogCipher {
    cipher: aes_gcm::Aes256Gcm,
}

#[cfg(feature = "encryption")]
impl LogCipher {
    /// Derives the frame key from `key` and `salt`.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation fails.
    pub fn new(key: &EncryptionKey, salt: &[u8]) -> StorageResult<Self> {
        use aes_gcm::aead::{generic_array::GenericArray, KeyInit};
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), key.as_bytes());
        let mut derived = [0u8; KEY_SIZE];
        hk.expand(b"arbordb-log-key-v1", &mut derived)
            .map_err(|_| StorageError::encryption("HKDF expand failed"))?;
        let cipher = aes_gcm::Aes256Gcm::new(GenericArray::from_slice(&derived));
        derived.zeroize();
        Ok(Self { cipher })
    }

    /// Encrypts a payload under a random nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn seal(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        use aes_gcm::aead::Aead;
        use aes_gcm::Nonce;
        use rand::RngCore;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| StorageError::encryption("encryption error"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Decrypts a payload produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns an error for a wrong key or tampered data.
    pub fn open(&self, sealed: &[u8]) -> StorageResult<Vec<u8>> {
        use aes_gcm::aead::Aead;
        use aes_gcm::Nonce;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StorageError::encryption("sealed frame too short"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::encryption("wrong encryption key or corrupted frame"))
    }
}

/// Placeholder used when the crate is built without encryption support.
#[cfg(not(feature = "encryption"))]
pub struct LogCipher {
    _private: (),
}

#[cfg(not(feature = "encryption"))]
impl LogCipher {
    /// Always fails: encryption support is compiled out.
    ///
    /// # Errors
    ///
    /// Always returns an encryption error.
    pub fn new(_key: &EncryptionKey, _salt: &[u8]) -> StorageResult<Self> {
        Err(StorageError::encryption(
            "arbordb_storage was built without the `encryption` feature",
        ))
    }

    /// Unreachable without a constructed cipher.
    ///
    /// # Errors
    ///
    /// Always returns an encryption error.
    pub fn seal(&self, _plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        Err(StorageError::encryption("encryption not supported"))
    }

    /// Unreachable without a constructed cipher.
    ///
    /// # Errors
    ///
    /// Always returns an encryption error.
    pub fn open(&self, _sealed: &[u8]) -> StorageResult<Vec<u8>> {
        Err(StorageError::encryption("encryption not supported"))
    }
}

impl std::fmt::Debug for LogCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LogCipher([REDACTED])")
    }
}

#[cfg(all(test, feature = "encryption"))]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = EncryptionKey::from_bytes(b"correct horse").unwrap();
        let cipher = LogCipher::new(&key, &[1u8; SALT_SIZE]).unwrap();
        let sealed = cipher.seal(b"payload").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 7 + TAG_SIZE);
        assert_eq!(cipher.open(&sealed).unwrap(), b"payload");
    }

    #[test]
    fn nonces_differ() {
        let key = EncryptionKey::from_bytes(b"k").unwrap();
        let cipher = LogCipher::new(&key, &[0u8; SALT_SIZE]).unwrap();
        assert_ne!(cipher.seal(b"same").unwrap(), cipher.seal(b"same").unwrap());
    }

    #[test]
    fn wrong_key_or_salt_fails() {
        let key = EncryptionKey::from_bytes(b"one").unwrap();
        let other = EncryptionKey::from_bytes(b"two").unwrap();
        let sealed = LogCipher::new(&key, &[0u8; SALT_SIZE]).unwrap().seal(b"x").unwrap();

        assert!(LogCipher::new(&other, &[0u8; SALT_SIZE]).unwrap().open(&sealed).is_err());
        assert!(LogCipher::new(&key, &[9u8; SALT_SIZE]).unwrap().open(&sealed).is_err());
    }

    #[test]
    fn tampering_is_detected() {
        let key = EncryptionKey::from_bytes(b"k").unwrap();
        let cipher = LogCipher::new(&key, &[0u8; SALT_SIZE]).unwrap();
        let mut sealed = cipher.seal(b"data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(cipher.open(&sealed).is_err());
        assert!(cipher.open(&[0u8; 4]).is_err());
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes(b"secret").unwrap();
        assert!(!format!("{key:?}").contains("secret\""));
        assert!(format!("{key:?}").contains("REDACTED"));
        assert!(EncryptionKey::from_bytes(b"").is_err());
    }
}
