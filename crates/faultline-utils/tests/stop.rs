//! Tests for the stop flag
//!
//! The flag is process-global and one-way, so the transitions are checked
//! in a single test.

use faultline_utils::StopRequest;

#[test]
fn test_flag_transitions()
{
    assert!(!StopRequest::signaled());
    assert!(!StopRequest::is_processed());

    StopRequest::signal();
    assert!(StopRequest::signaled());
    assert!(!StopRequest::is_processed());

    StopRequest::processed();
    assert!(StopRequest::is_processed());
    assert!(StopRequest::signaled());
}

#[test]
fn test_take_care_is_idempotent()
{
    StopRequest::take_care().unwrap();
    StopRequest::take_care().unwrap();
}
