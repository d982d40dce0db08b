//! Tests for error handling

use std::io;
use std::path::PathBuf;

use faultline_core::error::{FaultlineError, FaultlineResult, PlatformError};

#[test]
fn test_directory_creation_message()
{
    let error = FaultlineError::DirectoryCreation {
        path: PathBuf::from("/readonly/crash"),
        source: io::Error::from(io::ErrorKind::PermissionDenied),
    };
    let message = error.to_string();
    assert!(message.contains("/readonly/crash"));
    assert!(message.starts_with("Failed to create snapshot directory"));
}

#[test]
fn test_platform_error_from_os_code()
{
    let error = PlatformError::from(&io::Error::from_raw_os_error(2));
    assert_eq!(error.code, 2);
    assert!(error.to_string().ends_with("(os error 2)"));
}

#[test]
fn test_platform_error_of_each_variant()
{
    let io_backed = FaultlineError::SnapshotOpen {
        path: PathBuf::from("x.dmp"),
        source: io::Error::from_raw_os_error(13),
    };
    assert_eq!(io_backed.platform_error().code, 13);

    let platform = FaultlineError::Platform(PlatformError {
        code: 5,
        message: "denied".to_string(),
    });
    assert_eq!(platform.platform_error().message, "denied");

    let invalid = FaultlineError::InvalidArgument("bad code".to_string());
    assert_eq!(invalid.platform_error().code, 0);
}

#[test]
fn test_io_error_conversion()
{
    fn fails() -> FaultlineResult<()>
    {
        Err(io::Error::new(io::ErrorKind::Other, "disk gone"))?;
        Ok(())
    }

    let error = fails().unwrap_err();
    assert!(matches!(error, FaultlineError::Io(_)));
    assert_eq!(error.to_string(), "IO error: disk gone");
}
