//! # Snapshots
//!
//! [`SnapshotWriter`] persists a minidump of the current process for a
//! [`FailureRecord`]. It is meant to be called from inside a failure callback,
//! but works just as well for an on-demand ("cold") snapshot.
//!
//! ## What is captured
//!
//! - private read/write memory and data segments
//! - the handle (file descriptor) table
//! - full memory-region metadata
//! - per-thread information
//! - the exception record and CPU context, when the record carries a fault
//!   context
//!
//! ## Errors
//!
//! [`SnapshotWriter::write`] never panics and never retries. It returns
//! `false` and records the cause for [`SnapshotWriter::last_error`] on the
//! calling thread. [`SnapshotWriter::try_write`] returns the
//! [`FaultlineError`] directly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::failure::FailureRecord;
//! use faultline_core::snapshot::SnapshotWriter;
//! use faultline_core::types::FaultCode;
//!
//! let mut writer = SnapshotWriter::new();
//! writer.set_directory("/tmp/dumps");
//! if !writer.write(&FailureRecord::from_code(FaultCode::NONE)) {
//!     eprintln!("snapshot failed: {:?}", SnapshotWriter::last_error());
//! }
//! ```

mod target;

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
pub use target::{SnapshotTarget, DEFAULT_SUBDIRECTORY, SNAPSHOT_EXTENSION};
use tracing::{info, warn};

use crate::error::{FaultlineError, FaultlineResult, PlatformError};
use crate::failure::FailureRecord;
use crate::platform;

thread_local! {
    static LAST_ERROR: RefCell<Option<PlatformError>> = const { RefCell::new(None) };
}

/// Writes snapshot artifacts into a [`SnapshotTarget`]
#[derive(Debug, Clone)]
pub struct SnapshotWriter
{
    target: SnapshotTarget,
}

impl SnapshotWriter
{
    /// Writer for `<executable directory>/crash`
    pub fn new() -> Self
    {
        Self::with_target(SnapshotTarget::from_current_exe())
    }

    pub fn with_target(target: SnapshotTarget) -> Self
    {
        Self { target }
    }

    pub fn target(&self) -> &SnapshotTarget
    {
        &self.target
    }

    /// Directory artifacts are written to
    pub fn directory(&self) -> &Path
    {
        self.target.directory()
    }

    /// Change the directory artifacts are written to
    ///
    /// The directory is created on the next write, not here.
    pub fn set_directory(&mut self, directory: impl Into<PathBuf>)
    {
        self.target.set_directory(directory);
    }

    /// Write a snapshot for `record`
    ///
    /// Returns `true` when the artifact was written. On failure the cause is
    /// available from [`SnapshotWriter::last_error`] on this thread.
    pub fn write(&self, record: &FailureRecord<'_>) -> bool
    {
        match self.try_write(record) {
            Ok(_) => true,
            Err(e) => {
                warn!("{e}");
                LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(e.platform_error()));
                false
            }
        }
    }

    /// Write a snapshot for `record`, timestamped now
    ///
    /// ## Errors
    ///
    /// See [`try_write_at`](Self::try_write_at).
    pub fn try_write(&self, record: &FailureRecord<'_>) -> FaultlineResult<PathBuf>
    {
        self.try_write_at(record, Utc::now())
    }

    /// Write a snapshot for `record` named after `timestamp`
    ///
    /// Creates the target directory if needed, then creates or truncates the
    /// artifact and fills it.
    ///
    /// ## Errors
    ///
    /// - [`FaultlineError::DirectoryCreation`] when the directory cannot be
    ///   created
    /// - [`FaultlineError::SnapshotOpen`] when the artifact cannot be opened
    /// - [`FaultlineError::SnapshotWrite`] when filling it fails; the file may
    ///   be left truncated
    pub fn try_write_at(&self, record: &FailureRecord<'_>, timestamp: DateTime<Utc>) -> FaultlineResult<PathBuf>
    {
        let directory = self.target.directory();
        fs::create_dir_all(directory).map_err(|source| FaultlineError::DirectoryCreation {
            path: directory.to_path_buf(),
            source,
        })?;

        let path = self.target.artifact_path_at(timestamp);
        let file = open_artifact(&path).map_err(|source| FaultlineError::SnapshotOpen {
            path: path.clone(),
            source,
        })?;

        platform::write_snapshot(&file, record).map_err(|source| FaultlineError::SnapshotWrite {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), code = %record.code(), "snapshot written");
        Ok(path)
    }

    /// Most recent [`write`](Self::write) failure on the calling thread
    pub fn last_error() -> Option<PlatformError>
    {
        LAST_ERROR.with(|slot| slot.borrow().clone())
    }
}

impl Default for SnapshotWriter
{
    fn default() -> Self
    {
        Self::new()
    }
}

#[cfg(windows)]
fn open_artifact(path: &Path) -> std::io::Result<File>
{
    use std::os::windows::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .share_mode(0)
        .open(path)
}

#[cfg(not(windows))]
fn open_artifact(path: &Path) -> std::io::Result<File>
{
    OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)
}
