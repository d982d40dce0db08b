//! Tests for fault codes and failure records

use faultline_core::failure::{FailureRecord, FaultContext, ModuleName};
use faultline_core::types::{Address, FaultCode, MemoryRegion, MemoryRegionId};

#[test]
fn test_title_table()
{
    let table = [
        (FaultCode::NONE, "None"),
        (FaultCode::INVALID_PARAMETER, "Invalid parameter"),
        (FaultCode::ACCESS_VIOLATION, "Access violation"),
        (FaultCode::DATATYPE_MISALIGNMENT, "Datatype misalignment"),
        (FaultCode::BREAKPOINT, "Breakpoint"),
        (FaultCode::SINGLE_STEP, "Single step"),
        (FaultCode::ARRAY_BOUNDS_EXCEEDED, "Array bounds exceeded"),
        (FaultCode::FLOAT_DENORMAL_OPERAND, "Float denormal operand"),
        (FaultCode::FLOAT_DIVIDE_BY_ZERO, "Float divide by zero"),
        (FaultCode::FLOAT_INEXACT_RESULT, "Float inexact result"),
        (FaultCode::FLOAT_INVALID_OPERATION, "Float invalid operation"),
        (FaultCode::FLOAT_OVERFLOW, "Float overflow"),
        (FaultCode::FLOAT_STACK_CHECK, "Float stack check"),
        (FaultCode::FLOAT_UNDERFLOW, "Float underflow"),
        (FaultCode::INTEGER_DIVIDE_BY_ZERO, "Integer divide by zero"),
        (FaultCode::INTEGER_OVERFLOW, "Integer overflow"),
        (FaultCode::PRIVILEGED_INSTRUCTION, "Privileged instruction"),
        (FaultCode::IN_PAGE_ERROR, "In page error"),
        (FaultCode::ILLEGAL_INSTRUCTION, "Illegal instruction"),
        (FaultCode::NONCONTINUABLE_EXCEPTION, "Noncontinuable exception"),
        (FaultCode::STACK_OVERFLOW, "Stack overflow"),
        (FaultCode::INVALID_DISPOSITION, "Invalid disposition"),
        (FaultCode::GUARD_PAGE_VIOLATION, "Guard page violation"),
        (FaultCode::INVALID_HANDLE, "Invalid handle"),
    ];

    for (code, title) in table {
        assert_eq!(code.title(), title, "title of {code}");
        assert_eq!(FailureRecord::from_code(code).title(), title);
    }
}

#[test]
fn test_unknown_codes()
{
    assert_eq!(FaultCode::new(0x1234_5678).title(), "Unknown");
    assert_eq!(FaultCode::new(11).title(), "Unknown");
}

#[test]
fn test_raw_values()
{
    assert_eq!(FaultCode::ACCESS_VIOLATION.value(), 0xC000_0005);
    assert_eq!(FaultCode::STACK_OVERFLOW.value(), 0xC000_00FD);
    assert_eq!(FaultCode::BREAKPOINT.value(), 0x8000_0003);
    assert_eq!(u32::from(FaultCode::INVALID_PARAMETER), 0xC000_000D);
}

#[test]
fn test_context_free_record()
{
    let record = FailureRecord::from_code(FaultCode::ILLEGAL_INSTRUCTION);
    assert_eq!(record.code(), FaultCode::ILLEGAL_INSTRUCTION);
    assert_eq!(*record.module_name(), ModuleName::EMPTY);
    assert!(record.context().is_none());
}

#[test]
fn test_record_resolves_module_once()
{
    let ctx = FaultContext::synthetic(FaultCode::ACCESS_VIOLATION, Address::from_ptr(test_record_resolves_module_once as *const ()));
    let record = FailureRecord::from_context(&ctx).unwrap();

    assert_eq!(record.title(), "Access violation");
    assert!(!record.module_name().is_empty());
    assert_eq!(record.context().unwrap().code(), FaultCode::ACCESS_VIOLATION);
}

#[test]
fn test_address_arithmetic()
{
    let addr = Address::new(0x1000);
    assert_eq!((addr + 0x100).value(), 0x1100);
    assert_eq!(Address::from(0x1000u64), addr);
    assert_eq!(Address::from(0x1000usize), addr);
}

#[test]
fn test_memory_region_permissions()
{
    let heap = MemoryRegion::new(
        MemoryRegionId(1),
        Address::new(0x2000),
        Address::new(0x3000),
        "rw-p".to_string(),
        Some("[heap]".to_string()),
    );
    assert!(heap.is_writable());
    assert!(heap.is_private());
    assert!(!heap.is_executable());
    assert_eq!(heap.size(), 0x1000);
    assert!(heap.contains(Address::new(0x2fff)));
    assert!(!heap.contains(Address::new(0x3000)));
}
