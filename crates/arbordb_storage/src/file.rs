//! File-backed storage engine.
//!
//! Directory layout:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK        # Advisory lock for single-process access
//! └─ data.log    # Header followed by CRC-framed commit entries
//! ```
//!
//! Every commit appends one frame holding the batch. Compaction and rekeying
//! rewrite the log as a single snapshot frame through write-then-rename. On
//! open the log is replayed into a [`MemoryEngine`]; a torn final frame is
//! truncated away.

use crate::batch::{WriteBatch, WriteOp};
use crate::crypto::{random_salt, EncryptionKey, LogCipher, SALT_SIZE};
use crate::engine::{KeyRange, Record, StorageEngine};
use crate::error::{StorageError, StorageResult};
use crate::frame::{encode_frame, read_frame, FrameRead, LogHeader, FLAG_ENCRYPTED, HEADER_SIZE};
use crate::memory::MemoryEngine;
use bytes::Bytes;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "data.log";
const LOG_TEMP: &str = "data.log.tmp";

/// Options for [`FileEngine::open`].
#[derive(Debug, Clone)]
pub struct FileEngineOptions {
    /// Create the directory if it does not exist.
    pub create_if_missing: bool,
    /// Refuse every write.
    pub read_only: bool,
    /// `fsync` the log after every commit.
    pub sync_on_commit: bool,
    /// Secret used to seal log frames.
    pub encryption_key: Option<EncryptionKey>,
}

impl Default for FileEngineOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            read_only: false,
            sync_on_commit: true,
            encryption_key: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum LogEntry {
    Commit {
        ops: Vec<LogOp>,
    },
    Snapshot {
        last_sequence: u64,
        records: Vec<LogRecord>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
enum LogOp {
    Put {
        key: Vec<u8>,
        meta: Vec<u8>,
        body: Vec<u8>,
    },
    Purge {
        key: Vec<u8>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    key: Vec<u8>,
    meta: Vec<u8>,
    body: Vec<u8>,
    sequence: u64,
    tombstone: bool,
}

impl From<&Record> for LogRecord {
    fn from(r: &Record) -> Self {
        Self {
            key: r.key.to_vec(),
            meta: r.meta.to_vec(),
            body: r.body.to_vec(),
            sequence: r.sequence,
            tombstone: r.tombstone,
        }
    }
}

impl From<LogRecord> for Record {
    fn from(r: LogRecord) -> Self {
        Self {
            key: Bytes::from(r.key),
            meta: Bytes::from(r.meta),
            body: Bytes::from(r.body),
            sequence: r.sequence,
            tombstone: r.tombstone,
        }
    }
}

/// A persistent storage engine over an append-only commit log.
///
/// # Example
///
/// ```no_run
/// use arbordb_storage::{FileEngine, FileEngineOptions, StorageEngine};
/// use std::path::Path;
///
/// let mut engine = FileEngine::open(Path::new("my_db"), FileEngineOptions::default()).unwrap();
/// let mut batch = engine.begin_tx().unwrap();
/// batch.put(&b"key"[..], &b"meta"[..], &b"body"[..]);
/// engine.commit_tx(batch).unwrap();
/// engine.close().unwrap();
/// ```
#[derive(Debug)]
pub struct FileEngine {
    dir: PathBuf,
    lock: Option<File>,
    log: Option<File>,
    header: LogHeader,
    cipher: Option<LogCipher>,
    state: MemoryEngine,
    read_only: bool,
    sync_on_commit: bool,
}

impl FileEngine {
    /// Opens or creates a database directory and replays its log.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory is missing and `create_if_missing` is false
    /// - Another process holds the lock (`Locked`)
    /// - The log is encrypted and no key, or the wrong key, was given
    /// - An entry in the middle of the log is unreadable
    pub fn open(path: &Path, options: FileEngineOptions) -> StorageResult<Self> {
        if !path.exists() {
            if options.create_if_missing && !options.read_only {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::NotFound(path.display().to_string()));
            }
        }
        if !path.is_dir() {
            return Err(StorageError::NotFound(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut engine = Self {
            dir: path.to_path_buf(),
            lock: Some(lock),
            log: None,
            header: LogHeader {
                flags: 0,
                salt: [0u8; SALT_SIZE],
            },
            cipher: None,
            state: MemoryEngine::new(),
            read_only: options.read_only,
            sync_on_commit: options.sync_on_commit,
        };

        let log_path = engine.log_path();
        let existing = if log_path.exists() {
            let mut data = Vec::new();
            File::open(&log_path)?.read_to_end(&mut data)?;
            data
        } else {
            Vec::new()
        };

        if existing.is_empty() {
            if !options.read_only {
                engine.write_fresh_log(options.encryption_key.as_ref())?;
            }
        } else {
            engine.replay(&existing, options.encryption_key.as_ref())?;
            if !options.read_only {
                engine.log = Some(OpenOptions::new().append(true).open(&log_path)?);
            }
        }

        engine.state.set_read_only(options.read_only);
        info!(
            path = %path.display(),
            records = engine.state.count()?,
            last_sequence = engine.state.last_sequence(),
            "opened file engine"
        );
        Ok(engine)
    }

    /// Returns the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    fn make_cipher(
        key: Option<&EncryptionKey>,
    ) -> StorageResult<(LogHeader, Option<LogCipher>)> {
        let salt = random_salt();
        match key {
            Some(key) => {
                let cipher = LogCipher::new(key, &salt)?;
                Ok((
                    LogHeader {
                        flags: FLAG_ENCRYPTED,
                        salt,
                    },
                    Some(cipher),
                ))
            }
            None => Ok((LogHeader { flags: 0, salt }, None)),
        }
    }

    fn write_fresh_log(&mut self, key: Option<&EncryptionKey>) -> StorageResult<()> {
        let (header, cipher) = Self::make_cipher(key)?;
        let mut file = File::create(self.log_path())?;
        file.write_all(&header.encode())?;
        file.sync_all()?;
        self.log = Some(OpenOptions::new().append(true).open(self.log_path())?);
        self.header = header;
        self.cipher = cipher;
        Ok(())
    }

    fn replay(&mut self, data: &[u8], key: Option<&EncryptionKey>) -> StorageResult<()> {
        let header = LogHeader::decode(data)?;
        self.cipher = match (header.is_encrypted(), key) {
            (true, Some(key)) => Some(LogCipher::new(key, &header.salt)?),
            (true, None) => {
                return Err(StorageError::encryption(
                    "database is encrypted and no key was given",
                ))
            }
            (false, Some(_)) => {
                return Err(StorageError::encryption(
                    "database is not encrypted; open without a key and rekey",
                ))
            }
            (false, None) => None,
        };
        self.header = header;

        let mut offset = HEADER_SIZE;
        let mut frames = 0usize;
        loop {
            match read_frame(data, offset) {
                FrameRead::Frame { payload, next } => {
                    let entry = self.decode_entry(payload)?;
                    self.apply_entry(entry);
                    offset = next;
                    frames += 1;
                }
                FrameRead::End => break,
                FrameRead::Torn => {
                    warn!(
                        offset,
                        dropped = data.len() - offset,
                        "truncating torn tail of commit log"
                    );
                    if !self.read_only {
                        let file = OpenOptions::new().write(true).open(self.log_path())?;
                        file.set_len(offset as u64)?;
                        file.sync_all()?;
                    }
                    break;
                }
            }
        }
        debug!(frames, "replayed commit log");
        Ok(())
    }

    fn decode_entry(&self, payload: &[u8]) -> StorageResult<LogEntry> {
        let plain = match &self.cipher {
            Some(cipher) => cipher.open(payload)?,
            None => payload.to_vec(),
        };
        ciborium::from_reader(plain.as_slice())
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn encode_entry(&self, entry: &LogEntry) -> StorageResult<Vec<u8>> {
        let mut plain = Vec::new();
        ciborium::into_writer(entry, &mut plain)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let payload = match &self.cipher {
            Some(cipher) => cipher.seal(&plain)?,
            None => plain,
        };
        Ok(encode_frame(&payload))
    }

    fn apply_entry(&mut self, entry: LogEntry) {
        match entry {
            LogEntry::Commit { ops } => {
                let ops: BTreeMap<Bytes, WriteOp> = ops
                    .into_iter()
                    .map(|op| match op {
                        LogOp::Put { key, meta, body } => (
                            Bytes::from(key),
                            WriteOp::Put {
                                meta: Bytes::from(meta),
                                body: Bytes::from(body),
                            },
                        ),
                        LogOp::Purge { key } => (Bytes::from(key), WriteOp::Purge),
                    })
                    .collect();
                self.state.apply(ops);
            }
            LogEntry::Snapshot {
                last_sequence,
                records,
            } => {
                self.state
                    .load(records.into_iter().map(Record::from).collect(), last_sequence);
            }
        }
    }

    /// Rewrites the log as one snapshot frame under `cipher`.
    fn rewrite(&mut self, header: LogHeader, cipher: Option<LogCipher>) -> StorageResult<()> {
        let previous = std::mem::replace(&mut self.cipher, cipher);
        let snapshot = LogEntry::Snapshot {
            last_sequence: self.state.last_sequence(),
            records: self.state.snapshot().iter().map(LogRecord::from).collect(),
        };
        let frame = match self.encode_entry(&snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                self.cipher = previous;
                return Err(e);
            }
        };

        let temp_path = self.dir.join(LOG_TEMP);
        let written = (|| -> StorageResult<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(&header.encode())?;
            file.write_all(&frame)?;
            file.sync_all()?;
            Ok(())
        })();
        if let Err(e) = written {
            self.cipher = previous;
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        self.log = None;
        fs::rename(&temp_path, self.log_path())?;
        self.log = Some(OpenOptions::new().append(true).open(self.log_path())?);
        self.header = header;
        Ok(())
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.lock.is_none() {
            return Err(StorageError::Closed);
        }
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }
}

impl StorageEngine for FileEngine {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Record>> {
        self.state.get(key)
    }

    fn scan(&self, range: &KeyRange, include_tombstones: bool) -> StorageResult<Vec<Record>> {
        self.state.scan(range, include_tombstones)
    }

    fn changes_since(&self, since: u64) -> StorageResult<Vec<Record>> {
        self.state.changes_since(since)
    }

    fn count(&self) -> StorageResult<usize> {
        self.state.count()
    }

    fn last_sequence(&self) -> u64 {
        self.state.last_sequence()
    }

    fn begin_tx(&mut self) -> StorageResult<WriteBatch> {
        self.state.begin_tx()
    }

    fn commit_tx(&mut self, batch: WriteBatch) -> StorageResult<u64> {
        self.ensure_writable()?;
        self.state.take_open_tx(&batch)?;
        if batch.is_empty() {
            return Ok(self.state.last_sequence());
        }

        let entry = LogEntry::Commit {
            ops: batch
                .iter()
                .map(|(key, op)| match op {
                    WriteOp::Put { meta, body } => LogOp::Put {
                        key: key.to_vec(),
                        meta: meta.to_vec(),
                        body: body.to_vec(),
                    },
                    WriteOp::Purge => LogOp::Purge { key: key.to_vec() },
                })
                .collect(),
        };
        let frame = self.encode_entry(&entry)?;

        let log = self.log.as_mut().ok_or(StorageError::Closed)?;
        let before = log.metadata()?.len();
        let written = log.write_all(&frame).and_then(|()| {
            if self.sync_on_commit {
                log.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            // Leave no partial frame behind
            let _ = log.set_len(before);
            return Err(e.into());
        }

        Ok(self.state.apply(batch.into_ops()))
    }

    fn abort_tx(&mut self, batch: WriteBatch) -> StorageResult<()> {
        self.state.abort_tx(batch)
    }

    fn compact(&mut self) -> StorageResult<usize> {
        self.ensure_writable()?;
        self.state.ensure_no_tx()?;
        let dropped = self.state.drop_tombstones();
        let cipher = self.cipher.take();
        self.rewrite(self.header, cipher)?;
        info!(dropped, "compacted commit log");
        Ok(dropped)
    }

    fn rekey(&mut self, key: Option<&EncryptionKey>) -> StorageResult<()> {
        self.ensure_writable()?;
        self.state.ensure_no_tx()?;
        let (header, cipher) = Self::make_cipher(key)?;
        self.rewrite(header, cipher)?;
        info!(encrypted = key.is_some(), "rekeyed commit log");
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(log) = self.log.take() {
            if !self.read_only {
                log.sync_all()?;
            }
        }
        if let Some(lock) = self.lock.take() {
            let _ = lock.unlock();
        }
        self.state.close()
    }

    fn destroy(&mut self) -> StorageResult<()> {
        self.close()?;
        for name in [LOG_FILE, LOG_TEMP, LOCK_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        if let Err(e) = fs::remove_dir(&self.dir) {
            warn!(path = %self.dir.display(), error = %e, "database directory not removed");
        }
        Ok(())
    }
}

impl Drop for FileEngine {
    fn drop(&mut self) {
        if self.lock.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "error closing file engine on drop");
            }
        }
    }
}
