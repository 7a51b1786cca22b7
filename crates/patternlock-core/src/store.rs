//! Credential store
//!
//! Owns the single credential file. The file is either empty (no credential)
//! or holds exactly one digest; any other length reads as "no credential".
//!
//! `exists()` answers from an in-memory flag so the hot path never touches
//! the disk. The flag is primed on open, updated after every successful write,
//! and recomputed when the host forwards a change notification for the file
//! through [`CredentialStore::on_external_change`].

use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::codec::{self, Cell, DigestAlgorithm};
use crate::config::LockConfig;
use crate::error::{PatternLockError, Result};

/// Default credential file name inside the data directory
pub const DEFAULT_FILE_NAME: &str = "gesture.key";

/// File-system events a host watcher may forward to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    CloseWrite,
    MovedTo,
    Deleted,
}

/// Result of comparing an attempt against the stored credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Stored digest equals the attempt's digest
    Match,
    /// A credential is stored and the attempt does not match it
    Mismatch,
    /// File absent, empty, or of a length no digest can have
    NoCredential,
    /// The file exists but could not be read
    Unreadable(io::ErrorKind),
}

impl VerifyOutcome {
    pub fn is_match(self) -> bool {
        matches!(self, Self::Match)
    }

    /// Legacy reading: anything except a definite mismatch passes
    pub fn fail_open(self) -> bool {
        !matches!(self, Self::Mismatch)
    }

    /// Only a definite match passes
    pub fn fail_closed(self) -> bool {
        self.is_match()
    }
}

/// Persistent store for one pattern credential
#[derive(Debug)]
pub struct CredentialStore {
    dir: PathBuf,
    file_name: String,
    path: PathBuf,
    algorithm: DigestAlgorithm,

    /// Cached "a credential is set" flag
    has_credential: AtomicBool,

    /// Serializes writers
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    ///
    /// The credential path is resolved once here and never changes.
    pub fn open(dir: impl AsRef<Path>, config: &LockConfig) -> Result<Self> {
        config.validate()?;

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            PatternLockError::from(e).context(format!("Creating data directory '{}'", dir.display()))
        })?;

        let path = dir.join(&config.file_name);
        let store = Self {
            dir,
            file_name: config.file_name.clone(),
            path,
            algorithm: config.algorithm,
            has_credential: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        };
        store.refresh();

        tracing::debug!(
            "Credential store opened at {} ({}, credential set: {})",
            store.path.display(),
            store.algorithm,
            store.exists()
        );
        Ok(store)
    }

    /// Open with the default configuration
    pub fn open_default(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(dir, &LockConfig::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Whether a credential is set, from the cache only
    pub fn exists(&self) -> bool {
        self.has_credential.load(Ordering::Acquire)
    }

    /// Current on-disk length, `None` when the file cannot be stat'ed
    pub fn stored_len(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    /// Recompute the cached flag from the file length
    pub fn refresh(&self) -> bool {
        let expected = self.algorithm.digest_len() as u64;
        let present = self.stored_len() == Some(expected);
        self.has_credential.store(present, Ordering::Release);
        present
    }

    /// Feed a change notification from the host's directory watcher.
    ///
    /// Events for other file names are ignored. Returns whether the event
    /// concerned the credential file.
    pub fn on_external_change(&self, kind: ChangeKind, file_name: &str) -> bool {
        if file_name != self.file_name {
            return false;
        }
        let present = self.refresh();
        tracing::debug!(?kind, present, "Lock pattern file changed");
        true
    }

    /// Compare an attempt against the stored credential
    pub fn verify_detailed(&self, pattern: &[Cell]) -> VerifyOutcome {
        let stored = match self.read_digest() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return VerifyOutcome::NoCredential,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return VerifyOutcome::NoCredential,
            Err(e) => {
                tracing::warn!("Unable to read lock pattern from {}: {}", self.path.display(), e);
                return VerifyOutcome::Unreadable(e.kind());
            }
        };

        match codec::digest(Some(pattern), self.algorithm) {
            Some(attempt) if attempt.ct_eq(&stored) => VerifyOutcome::Match,
            _ => VerifyOutcome::Mismatch,
        }
    }

    /// Read the stored digest, `None` when the file is empty or mis-sized.
    ///
    /// The length is checked before any content is read, and at most one
    /// digest's worth of bytes is ever pulled into memory.
    fn read_digest(&self) -> io::Result<Option<Vec<u8>>> {
        let expected = self.algorithm.digest_len();
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(None);
        }
        if len != expected as u64 {
            tracing::warn!(
                "Ignoring lock pattern file of {} bytes (expected {})",
                len,
                expected
            );
            return Ok(None);
        }

        let mut stored = Vec::with_capacity(expected + 1);
        file.take(expected as u64 + 1).read_to_end(&mut stored)?;
        // Changed size between stat and read
        if stored.len() != expected {
            return Ok(None);
        }
        Ok(Some(stored))
    }

    /// Fail-open verification: true unless a stored credential is contradicted
    pub fn verify(&self, pattern: &[Cell]) -> bool {
        self.verify_detailed(pattern).fail_open()
    }

    /// Fail-closed verification: true only on a definite match
    pub fn verify_strict(&self, pattern: &[Cell]) -> bool {
        self.verify_detailed(pattern).fail_closed()
    }

    /// Save a pattern, or clear the credential when it is absent or empty.
    ///
    /// The cache only changes once the write has succeeded.
    pub fn save(&self, pattern: Option<&[Cell]>) -> Result<()> {
        let _guard = self.write_lock.lock();

        match codec::digest(pattern, self.algorithm) {
            None => {
                self.truncate().map_err(|e| self.persist_error(e))?;
                self.has_credential.store(false, Ordering::Release);
                tracing::info!("Lock pattern cleared");
            }
            Some(digest) => {
                self.replace_contents(digest.as_bytes())
                    .map_err(|e| self.persist_error(e))?;
                self.has_credential.store(true, Ordering::Release);
                tracing::info!("Lock pattern saved to {}", self.path.display());
            }
        }
        Ok(())
    }

    /// Remove the credential, leaving an empty file behind
    pub fn clear(&self) -> Result<()> {
        self.save(None)
    }

    fn truncate(&self) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?
            .sync_all()
    }

    /// Whole-file replace through a sibling temp file
    fn replace_contents(&self, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn persist_error(&self, source: io::Error) -> PatternLockError {
        tracing::error!("Unable to save lock pattern to {}: {}", self.path.display(), source);
        PatternLockError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}
