//! # Error Types
//!
//! Errors produced while installing hooks and writing snapshots.
//!
//! Fault *reports* are not errors: a captured fault is delivered to the
//! registered callback as a [`FailureRecord`](crate::failure::FailureRecord).
//! The types here cover the things that can go wrong around that, mostly
//! file system work done by the [`SnapshotWriter`](crate::snapshot::SnapshotWriter).
//!
//! We use `thiserror` to generate the `Error` implementations.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for faultline operations
///
/// ## Error Categories
///
/// 1. **Snapshot I/O**: DirectoryCreation, SnapshotOpen, SnapshotWrite
/// 2. **Platform errors**: Platform (a raw OS error code plus its message)
/// 3. **Input errors**: InvalidArgument
/// 4. **I/O errors**: Io (anything else coming from `std::io`)
#[derive(Error, Debug)]
pub enum FaultlineError
{
    /// The snapshot directory could not be created
    ///
    /// Usually a permission problem, or a regular file sitting where a
    /// directory component is expected.
    #[error("Failed to create snapshot directory {}: {source}", path.display())]
    DirectoryCreation
    {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// The snapshot artifact could not be opened for writing
    #[error("Failed to open snapshot file {}: {source}", path.display())]
    SnapshotOpen
    {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Writing the snapshot contents failed part way
    ///
    /// The artifact may exist on disk in a truncated state.
    #[error("Failed to write snapshot {}: {source}", path.display())]
    SnapshotWrite
    {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// An OS API reported failure
    ///
    /// On Windows the code is the `GetLastError()` value, on Unix it is `errno`.
    #[error("Platform error: {0}")]
    Platform(PlatformError),

    /// Invalid argument passed to a faultline function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error not covered by a more specific variant
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FaultlineError
{
    /// OS-level view of this error, suitable for the last-error side channel
    pub fn platform_error(&self) -> PlatformError
    {
        match self {
            FaultlineError::DirectoryCreation { source, .. }
            | FaultlineError::SnapshotOpen { source, .. }
            | FaultlineError::SnapshotWrite { source, .. }
            | FaultlineError::Io(source) => PlatformError::from(source),
            FaultlineError::Platform(err) => err.clone(),
            FaultlineError::InvalidArgument(message) => PlatformError {
                code: 0,
                message: message.clone(),
            },
        }
    }
}

/// Raw OS error code with a readable message
///
/// `code` is `GetLastError()` on Windows and `errno` elsewhere. It is `0` when
/// the failure did not originate from the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError
{
    /// OS error number
    pub code: i32,
    /// Human readable description
    pub message: String,
}

impl PlatformError
{
    /// Capture the calling thread's last OS error
    pub fn last_os_error() -> Self
    {
        Self::from(&io::Error::last_os_error())
    }
}

impl From<&io::Error> for PlatformError
{
    fn from(err: &io::Error) -> Self
    {
        Self {
            code: err.raw_os_error().unwrap_or(0),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for PlatformError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} (os error {})", self.message, self.code)
    }
}

impl std::error::Error for PlatformError {}

/// Convenience type alias for `Result<T, FaultlineError>`
///
/// ```rust
/// use faultline_core::error::FaultlineResult;
/// fn foo() -> FaultlineResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type FaultlineResult<T> = std::result::Result<T, FaultlineError>;
