/*!
Single-file store adapter.
*/

use super::fault::{FaultPlan, FaultPoint};
use super::tables::{TableTransaction, Tables};
use super::{Store, Transaction};
use crate::compression::{decode_any, CompressionAdapter, GzipCompressor, NoCompression};
use crate::{FolioError, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Current layout version of the database file
pub const STORE_FORMAT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    format_version: u8,
    tables: Tables,
}

/// Store persisting every table to one JSON document on disk
///
/// Transactions are serialized through an exclusive OS lock on a sidecar
/// `<path>.lock` file, so separate handles and separate processes on the same
/// path never interleave. Each transaction loads the file under the lock, runs
/// against the loaded tables and, only if it wrote something, replaces the
/// file atomically through a temp file in the same directory. A missing file
/// reads as an empty store.
///
/// # Example
/// ```rust
/// use folio_core::{FileStore, Store};
///
/// # let dir = tempfile::tempdir()?;
/// let store = FileStore::new(dir.path().join("folio.json"));
/// let projects = store.transaction(|tx| tx.list_projects())?;
/// assert!(projects.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct FileStore {
    path: PathBuf,
    compressor: Box<dyn CompressionAdapter>,
    faults: FaultPlan,
}

impl FileStore {
    /// Plain JSON store at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_compressor(path, Box::new(NoCompression))
    }

    /// Gzip-compressed store at `path`
    pub fn compressed<P: AsRef<Path>>(path: P) -> Self {
        Self::with_compressor(path, Box::new(GzipCompressor::new()))
    }

    /// # Arguments
    /// * `path` - Database file; parent directories are created on first write
    /// * `compressor` - Encoding used when writing; reads detect gzip themselves
    pub fn with_compressor<P: AsRef<Path>>(path: P, compressor: Box<dyn CompressionAdapter>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            compressor,
            faults: FaultPlan::default(),
        }
    }

    /// Share `faults` with this store; used by tests to inject failures
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    fn parent_dir(&self) -> Result<PathBuf> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.exists() {
            fs::create_dir_all(&parent).map_err(|e| {
                FolioError::storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(parent)
    }

    /// Block until this process holds the store's exclusive lock
    ///
    /// The lock is released when the returned file is dropped.
    fn acquire(&self) -> Result<File> {
        self.parent_dir()?;
        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                FolioError::storage(format!("Failed to open {}: {}", lock_path.display(), e))
            })?;
        FileExt::lock_exclusive(&lock).map_err(|e| {
            FolioError::storage(format!("Failed to lock {}: {}", lock_path.display(), e))
        })?;
        Ok(lock)
    }

    fn load(&self) -> Result<Tables> {
        if !self.path.exists() {
            return Ok(Tables::default());
        }

        let raw = fs::read(&self.path).map_err(|e| {
            FolioError::storage(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let decoded = decode_any(&raw)?;
        let file: StoreFile = serde_json::from_slice(&decoded)?;

        if file.format_version > STORE_FORMAT_VERSION {
            return Err(FolioError::invalid_format(format!(
                "{} was written by store format {} (supported: <= {})",
                self.path.display(),
                file.format_version,
                STORE_FORMAT_VERSION
            )));
        }
        Ok(file.tables)
    }

    fn save(&self, tables: Tables) -> Result<()> {
        let file = StoreFile {
            format_version: STORE_FORMAT_VERSION,
            tables,
        };
        let encoded = self.compressor.compress(&serde_json::to_vec_pretty(&file)?)?;

        let parent = self.parent_dir()?;
        let mut staged = NamedTempFile::new_in(&parent)?;
        staged.write_all(&encoded)?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| {
            FolioError::storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        debug!(path = %self.path.display(), bytes = encoded.len(), "Store file written");
        Ok(())
    }
}

impl Store for FileStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let _lock = self.acquire()?;

        let mut working = self.load()?;
        let mut tx = TableTransaction::new(&mut working, Some(&self.faults));
        let value = f(&mut tx)?;
        let writes = tx.into_log().len();

        if writes > 0 {
            self.faults.trip(FaultPoint::Commit)?;
            self.save(working)?;
            info!(path = %self.path.display(), writes, "Committed file transaction");
        }
        Ok(value)
    }

    fn describe(&self) -> String {
        format!(
            "file {} ({})",
            self.path.display(),
            self.compressor.algorithm_name()
        )
    }
}
