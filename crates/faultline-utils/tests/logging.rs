//! Tests for subscriber installation
//!
//! Only one global subscriber can exist per process, so the whole lifecycle
//! is one test.

use faultline_utils::{LogConfig, LogFormat, LogLevel, LoggingError, init_logging_with};

#[test]
fn test_second_initialization_fails()
{
    let scratch = std::env::temp_dir().join(format!("faultline-utils-log-{}", std::process::id()));
    let config = LogConfig::default()
        .with_level(LogLevel::Debug)
        .with_format(LogFormat::Json)
        .with_file(scratch.join("test.log"));

    init_logging_with(&config).unwrap();
    tracing::info!("logging initialized");

    let err = init_logging_with(&LogConfig::default()).unwrap_err();
    assert!(matches!(err, LoggingError::InitializationFailed(_)));

    assert!(scratch.is_dir());
    let _ = std::fs::remove_dir_all(&scratch);
}
