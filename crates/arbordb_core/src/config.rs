//! Database configuration.

use crate::error::{CoreError, CoreResult};
use arbordb_storage::{EncryptionKey, FileEngineOptions};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Encryption applied to the commit log.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionAlgorithm {
    /// Stored in the clear.
    #[default]
    None = 0,
    /// AES-256-GCM sealed frames.
    Aes256Gcm = 1,
}

impl EncryptionAlgorithm {
    /// Converts a raw algorithm value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Aes256Gcm),
            _ => None,
        }
    }
}

/// Algorithm plus key material.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionConfig {
    #[zeroize(skip)]
    algorithm: EncryptionAlgorithm,
    key: Vec<u8>,
}

impl EncryptionConfig {
    /// No encryption.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// AES-256-GCM with the given secret.
    pub fn aes256_gcm(key: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm: EncryptionAlgorithm::Aes256Gcm,
            key: key.into(),
        }
    }

    /// The configured algorithm.
    #[must_use]
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Converts into a storage key, or `None` when encryption is off.
    ///
    /// # Errors
    ///
    /// Returns an error if an algorithm is selected without a key, or a key
    /// is given without an algorithm.
    pub fn storage_key(&self) -> CoreResult<Option<EncryptionKey>> {
        match self.algorithm {
            EncryptionAlgorithm::None if self.key.is_empty() => Ok(None),
            EncryptionAlgorithm::None => Err(CoreError::invalid_parameter(
                "encryption key given without an algorithm",
            )),
            EncryptionAlgorithm::Aes256Gcm => Ok(Some(EncryptionKey::from_bytes(&self.key)?)),
        }
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("algorithm", &self.algorithm)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to refuse every write.
    pub read_only: bool,

    /// Whether to sync the log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Log encryption.
    pub encryption: EncryptionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            read_only: false,
            sync_on_commit: true,
            encryption: EncryptionConfig::none(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether the database is opened read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets log encryption.
    #[must_use]
    pub fn encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = encryption;
        self
    }

    pub(crate) fn engine_options(&self) -> CoreResult<FileEngineOptions> {
        Ok(FileEngineOptions {
            create_if_missing: self.create_if_missing,
            read_only: self.read_only,
            sync_on_commit: self.sync_on_commit,
            encryption_key: self.encryption.storage_key()?,
        })
    }
}
