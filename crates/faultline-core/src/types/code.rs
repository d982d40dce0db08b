//! Fault classification codes.

use std::fmt;
use std::str::FromStr;

use crate::error::FaultlineError;

/// Numeric fault classification
///
/// Values are NT status numbers. Windows delivers them as-is in
/// `EXCEPTION_RECORD::ExceptionCode`; on Linux the signal backend translates
/// `(signal, si_code)` pairs into the same space so callers see one
/// vocabulary on every platform.
///
/// [`FaultCode::title`] is a pure function of the value.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::FaultCode;
///
/// assert_eq!(FaultCode::ACCESS_VIOLATION.title(), "Access violation");
/// assert_eq!(FaultCode::new(0x1234).title(), "Unknown");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FaultCode(pub u32);

impl FaultCode
{
    /// No fault (used for on-demand snapshots)
    pub const NONE: Self = FaultCode(0);
    /// Contract violation: a function received an argument it rejects
    pub const INVALID_PARAMETER: Self = FaultCode(0xC000_000D);
    /// Read, write or execute of an address without the needed access
    pub const ACCESS_VIOLATION: Self = FaultCode(0xC000_0005);
    /// Misaligned data access on hardware that traps on it
    pub const DATATYPE_MISALIGNMENT: Self = FaultCode(0x8000_0002);
    /// Breakpoint instruction
    pub const BREAKPOINT: Self = FaultCode(0x8000_0003);
    /// Trace trap after a single instruction
    pub const SINGLE_STEP: Self = FaultCode(0x8000_0004);
    /// Hardware-checked array bounds exceeded
    pub const ARRAY_BOUNDS_EXCEEDED: Self = FaultCode(0xC000_008C);
    /// Floating-point operand is denormal
    pub const FLOAT_DENORMAL_OPERAND: Self = FaultCode(0xC000_008D);
    /// Floating-point divide by zero
    pub const FLOAT_DIVIDE_BY_ZERO: Self = FaultCode(0xC000_008E);
    /// Floating-point result cannot be represented exactly
    pub const FLOAT_INEXACT_RESULT: Self = FaultCode(0xC000_008F);
    /// Floating-point invalid operation
    pub const FLOAT_INVALID_OPERATION: Self = FaultCode(0xC000_0090);
    /// Floating-point overflow
    pub const FLOAT_OVERFLOW: Self = FaultCode(0xC000_0091);
    /// x87 register stack over- or underflow
    pub const FLOAT_STACK_CHECK: Self = FaultCode(0xC000_0092);
    /// Floating-point underflow
    pub const FLOAT_UNDERFLOW: Self = FaultCode(0xC000_0093);
    /// Integer divide by zero
    pub const INTEGER_DIVIDE_BY_ZERO: Self = FaultCode(0xC000_0094);
    /// Integer overflow (trapping arithmetic)
    pub const INTEGER_OVERFLOW: Self = FaultCode(0xC000_0095);
    /// Instruction not allowed in the current privilege level
    pub const PRIVILEGED_INSTRUCTION: Self = FaultCode(0xC000_0096);
    /// Page of a mapped file could not be brought in
    pub const IN_PAGE_ERROR: Self = FaultCode(0xC000_0006);
    /// Undefined or malformed instruction
    pub const ILLEGAL_INSTRUCTION: Self = FaultCode(0xC000_001D);
    /// Execution continued after a non-continuable exception
    pub const NONCONTINUABLE_EXCEPTION: Self = FaultCode(0xC000_0025);
    /// Thread stack exhausted
    pub const STACK_OVERFLOW: Self = FaultCode(0xC000_00FD);
    /// Exception handler returned an invalid disposition
    pub const INVALID_DISPOSITION: Self = FaultCode(0xC000_0026);
    /// Access to a guard page
    pub const GUARD_PAGE_VIOLATION: Self = FaultCode(0x8000_0001);
    /// Operation on an invalid handle
    pub const INVALID_HANDLE: Self = FaultCode(0xC000_0008);

    /// Marker under which MSVC C++ exceptions and Rust panics on
    /// `*-windows-msvc` unwind through structured exception handling.
    ///
    /// The structured-fault hook lets these pass untouched so ordinary
    /// unwinding keeps working.
    pub const UNWIND_PASS_THROUGH: Self = FaultCode(0xE06D_7363);

    /// Create a code from its raw value
    pub const fn new(value: u32) -> Self
    {
        FaultCode(value)
    }

    /// Raw numeric value
    pub const fn value(self) -> u32
    {
        self.0
    }

    /// Whether the structured-fault hook must let this code propagate
    /// without building a record
    pub const fn is_pass_through(self) -> bool
    {
        self.0 == Self::UNWIND_PASS_THROUGH.0
    }

    /// Human readable title
    ///
    /// Unknown codes map to `"Unknown"`.
    pub const fn title(self) -> &'static str
    {
        match self {
            Self::NONE => "None",
            Self::INVALID_PARAMETER => "Invalid parameter",
            Self::ACCESS_VIOLATION => "Access violation",
            Self::DATATYPE_MISALIGNMENT => "Datatype misalignment",
            Self::BREAKPOINT => "Breakpoint",
            Self::SINGLE_STEP => "Single step",
            Self::ARRAY_BOUNDS_EXCEEDED => "Array bounds exceeded",
            Self::FLOAT_DENORMAL_OPERAND => "Float denormal operand",
            Self::FLOAT_DIVIDE_BY_ZERO => "Float divide by zero",
            Self::FLOAT_INEXACT_RESULT => "Float inexact result",
            Self::FLOAT_INVALID_OPERATION => "Float invalid operation",
            Self::FLOAT_OVERFLOW => "Float overflow",
            Self::FLOAT_STACK_CHECK => "Float stack check",
            Self::FLOAT_UNDERFLOW => "Float underflow",
            Self::INTEGER_DIVIDE_BY_ZERO => "Integer divide by zero",
            Self::INTEGER_OVERFLOW => "Integer overflow",
            Self::PRIVILEGED_INSTRUCTION => "Privileged instruction",
            Self::IN_PAGE_ERROR => "In page error",
            Self::ILLEGAL_INSTRUCTION => "Illegal instruction",
            Self::NONCONTINUABLE_EXCEPTION => "Noncontinuable exception",
            Self::STACK_OVERFLOW => "Stack overflow",
            Self::INVALID_DISPOSITION => "Invalid disposition",
            Self::GUARD_PAGE_VIOLATION => "Guard page violation",
            Self::INVALID_HANDLE => "Invalid handle",
            _ => "Unknown",
        }
    }
}

impl From<u32> for FaultCode
{
    fn from(value: u32) -> Self
    {
        FaultCode(value)
    }
}

impl From<FaultCode> for u32
{
    fn from(code: FaultCode) -> Self
    {
        code.0
    }
}

impl fmt::Display for FaultCode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:08X}", self.0)
    }
}

impl FromStr for FaultCode
{
    type Err = FaultlineError;

    /// Parse `0x`-prefixed hexadecimal or plain decimal
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
            None => s.replace('_', "").parse::<u32>(),
        };
        parsed
            .map(FaultCode)
            .map_err(|e| FaultlineError::InvalidArgument(format!("'{s}' is not a fault code: {e}")))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_hex_and_decimal()
    {
        assert_eq!("0xC0000005".parse::<FaultCode>().unwrap(), FaultCode::ACCESS_VIOLATION);
        assert_eq!("0xc000_00fd".parse::<FaultCode>().unwrap(), FaultCode::STACK_OVERFLOW);
        assert_eq!("3221225477".parse::<FaultCode>().unwrap(), FaultCode::ACCESS_VIOLATION);
        assert!("access".parse::<FaultCode>().is_err());
        assert!("0x1_0000_0000".parse::<FaultCode>().is_err());
    }

    #[test]
    fn test_display_is_hex()
    {
        assert_eq!(FaultCode::INVALID_PARAMETER.to_string(), "0xC000000D");
        assert_eq!(FaultCode::NONE.to_string(), "0x00000000");
    }

    #[test]
    fn test_pass_through_marker()
    {
        assert!(FaultCode::UNWIND_PASS_THROUGH.is_pass_through());
        assert!(!FaultCode::ACCESS_VIOLATION.is_pass_through());
        assert_eq!(FaultCode::UNWIND_PASS_THROUGH.title(), "Unknown");
    }
}
