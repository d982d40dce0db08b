//! Where snapshots go and what they are called.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

/// Directory created next to the executable when none is configured
pub const DEFAULT_SUBDIRECTORY: &str = "crash";

/// Extension of every snapshot artifact
pub const SNAPSHOT_EXTENSION: &str = "dmp";

const FALLBACK_STEM: &str = "process";
const TIMESTAMP_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

/// Target directory plus the naming rule for artifacts
///
/// Artifacts are named `<stem>-YYYY_MM_DD-hh_mm_ss.dmp` with a UTC
/// timestamp at second granularity. Two snapshots taken within the same
/// second share a name; the second one overwrites the first.
///
/// ## Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use faultline_core::snapshot::SnapshotTarget;
///
/// let target = SnapshotTarget::new("/var/crash", "server");
/// let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
/// assert_eq!(target.file_name_at(at), "server-2024_03_09-07_05_01.dmp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTarget
{
    directory: PathBuf,
    executable_stem: String,
}

impl SnapshotTarget
{
    pub fn new(directory: impl Into<PathBuf>, executable_stem: impl Into<String>) -> Self
    {
        Self {
            directory: directory.into(),
            executable_stem: executable_stem.into(),
        }
    }

    /// `<dir of executable>/crash`, stem taken from the executable's file name
    pub fn for_executable(executable: &Path) -> Self
    {
        let directory = executable
            .parent()
            .map_or_else(|| PathBuf::from(DEFAULT_SUBDIRECTORY), |dir| dir.join(DEFAULT_SUBDIRECTORY));
        let executable_stem = executable
            .file_stem()
            .map_or_else(|| FALLBACK_STEM.to_string(), |stem| stem.to_string_lossy().into_owned());
        Self::new(directory, executable_stem)
    }

    /// Target for the running executable
    ///
    /// Falls back to `./crash` and the stem `process` when the executable
    /// path cannot be determined.
    pub fn from_current_exe() -> Self
    {
        match std::env::current_exe() {
            Ok(path) => Self::for_executable(&path),
            Err(e) => {
                warn!("Cannot locate the current executable, using ./{DEFAULT_SUBDIRECTORY}: {e}");
                Self::new(DEFAULT_SUBDIRECTORY, FALLBACK_STEM)
            }
        }
    }

    pub fn directory(&self) -> &Path
    {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>)
    {
        self.directory = directory.into();
    }

    pub fn executable_stem(&self) -> &str
    {
        &self.executable_stem
    }

    /// Artifact file name for a snapshot taken at `timestamp`
    pub fn file_name_at(&self, timestamp: DateTime<Utc>) -> String
    {
        format!(
            "{}-{}.{SNAPSHOT_EXTENSION}",
            self.executable_stem,
            timestamp.format(TIMESTAMP_FORMAT)
        )
    }

    /// Full artifact path for a snapshot taken at `timestamp`
    pub fn artifact_path_at(&self, timestamp: DateTime<Utc>) -> PathBuf
    {
        self.directory.join(self.file_name_at(timestamp))
    }
}

impl Default for SnapshotTarget
{
    fn default() -> Self
    {
        Self::from_current_exe()
    }
}

#[cfg(test)]
mod tests
{
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_for_executable()
    {
        let target = SnapshotTarget::for_executable(Path::new("/opt/app/bin/server.exe"));
        assert_eq!(target.directory(), Path::new("/opt/app/bin/crash"));
        assert_eq!(target.executable_stem(), "server");
    }

    #[test]
    fn test_names_differ_by_second()
    {
        let target = SnapshotTarget::new("dumps", "demo");
        let first = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 58).unwrap();
        let second = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();

        assert_eq!(target.file_name_at(first), "demo-2023_12_31-23_59_58.dmp");
        assert_ne!(target.file_name_at(first), target.file_name_at(second));
    }

    #[test]
    fn test_same_second_same_name()
    {
        let target = SnapshotTarget::new("dumps", "demo");
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let later = base + chrono::Duration::milliseconds(900);

        assert_eq!(target.artifact_path_at(base), target.artifact_path_at(later));
        assert_eq!(target.artifact_path_at(base), Path::new("dumps/demo-2024_01_02-03_04_05.dmp"));
    }

    #[test]
    fn test_set_directory()
    {
        let mut target = SnapshotTarget::new("a", "demo");
        target.set_directory("b");
        assert_eq!(target.directory(), Path::new("b"));
    }
}
