//! Signal-to-fault translation.
//!
//! Turns the `(signal, siginfo_t, ucontext_t)` triple delivered to an
//! `SA_SIGINFO` handler into a portable [`FaultContext`].

use libc::{c_int, siginfo_t, ucontext_t};

use super::constants::{bus, fpe, ill, trap, STACK_OVERFLOW_WINDOW};
use crate::failure::{FaultContext, RawContext};
use crate::types::{Address, FaultCode};

/// Build the portable context for a delivered signal
pub(crate) fn from_signal<'a>(
    signal: c_int,
    info: &'a siginfo_t,
    ucontext: Option<&'a ucontext_t>,
) -> FaultContext<'a>
{
    let (pc, sp) = ucontext.map_or((Address::ZERO, Address::ZERO), registers);

    // SAFETY: si_addr is valid to read for every fault signal we handle
    let fault_address = match signal {
        libc::SIGSEGV | libc::SIGBUS | libc::SIGILL | libc::SIGFPE | libc::SIGTRAP => {
            Some(Address::from_ptr(unsafe { info.si_addr() }))
        }
        _ => None,
    };

    let code = classify(signal, info.si_code, fault_address, sp);

    // An instruction pointer is always better than nothing; fall back to the
    // fault address (execution of an unmapped page reports both equal)
    let pc = if pc.is_null() { fault_address.unwrap_or(Address::ZERO) } else { pc };

    FaultContext::new(
        code,
        pc,
        sp,
        fault_address,
        RawContext::Signal {
            signal,
            info,
            ucontext,
        },
    )
}

/// Map a signal and its `si_code` onto the fault code table
pub(crate) fn classify(signal: c_int, si_code: c_int, fault_address: Option<Address>, sp: Address) -> FaultCode
{
    match signal {
        libc::SIGSEGV => match fault_address {
            Some(addr) if !sp.is_null() && addr.distance(sp) <= STACK_OVERFLOW_WINDOW => FaultCode::STACK_OVERFLOW,
            _ => FaultCode::ACCESS_VIOLATION,
        },
        libc::SIGBUS if si_code == bus::BUS_ADRALN => FaultCode::DATATYPE_MISALIGNMENT,
        libc::SIGBUS => FaultCode::IN_PAGE_ERROR,
        libc::SIGILL if si_code == ill::ILL_PRVOPC || si_code == ill::ILL_PRVREG => FaultCode::PRIVILEGED_INSTRUCTION,
        libc::SIGILL => FaultCode::ILLEGAL_INSTRUCTION,
        libc::SIGFPE => match si_code {
            fpe::FPE_INTDIV => FaultCode::INTEGER_DIVIDE_BY_ZERO,
            fpe::FPE_INTOVF => FaultCode::INTEGER_OVERFLOW,
            fpe::FPE_FLTDIV => FaultCode::FLOAT_DIVIDE_BY_ZERO,
            fpe::FPE_FLTOVF => FaultCode::FLOAT_OVERFLOW,
            fpe::FPE_FLTUND => FaultCode::FLOAT_UNDERFLOW,
            fpe::FPE_FLTRES => FaultCode::FLOAT_INEXACT_RESULT,
            fpe::FPE_FLTSUB => FaultCode::ARRAY_BOUNDS_EXCEEDED,
            _ => FaultCode::FLOAT_INVALID_OPERATION,
        },
        libc::SIGTRAP if si_code == trap::TRAP_TRACE => FaultCode::SINGLE_STEP,
        libc::SIGTRAP => FaultCode::BREAKPOINT,
        // Outside the table on purpose; titles as "Unknown"
        other => FaultCode::new(other as u32),
    }
}

/// Instruction and stack pointer of the interrupted thread
#[cfg(target_arch = "x86_64")]
pub(crate) fn registers(uc: &ucontext_t) -> (Address, Address)
{
    use super::constants::greg::{REG_RIP, REG_RSP};

    let gregs = &uc.uc_mcontext.gregs;
    (Address::new(gregs[REG_RIP] as u64), Address::new(gregs[REG_RSP] as u64))
}

/// Instruction and stack pointer of the interrupted thread
#[cfg(target_arch = "aarch64")]
pub(crate) fn registers(uc: &ucontext_t) -> (Address, Address)
{
    (Address::new(uc.uc_mcontext.pc), Address::new(uc.uc_mcontext.sp))
}

/// Instruction and stack pointer of the interrupted thread
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) fn registers(_uc: &ucontext_t) -> (Address, Address)
{
    (Address::ZERO, Address::ZERO)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_classify_segv()
    {
        let sp = Address::new(0x7fff_0000_0000);
        assert_eq!(classify(libc::SIGSEGV, 1, Some(Address::new(0x10)), sp), FaultCode::ACCESS_VIOLATION);
        assert_eq!(classify(libc::SIGSEGV, 1, None, sp), FaultCode::ACCESS_VIOLATION);
        assert_eq!(classify(libc::SIGSEGV, 2, Some(sp - 0x100), sp), FaultCode::STACK_OVERFLOW);
        // Unknown stack pointer never counts as an overflow
        assert_eq!(classify(libc::SIGSEGV, 2, Some(Address::new(0x10)), Address::ZERO), FaultCode::ACCESS_VIOLATION);
    }

    #[test]
    fn test_classify_by_si_code()
    {
        assert_eq!(classify(libc::SIGBUS, bus::BUS_ADRALN, None, Address::ZERO), FaultCode::DATATYPE_MISALIGNMENT);
        assert_eq!(classify(libc::SIGBUS, 2, None, Address::ZERO), FaultCode::IN_PAGE_ERROR);
        assert_eq!(classify(libc::SIGILL, ill::ILL_ILLOPC, None, Address::ZERO), FaultCode::ILLEGAL_INSTRUCTION);
        assert_eq!(classify(libc::SIGILL, ill::ILL_PRVOPC, None, Address::ZERO), FaultCode::PRIVILEGED_INSTRUCTION);
        assert_eq!(classify(libc::SIGFPE, fpe::FPE_INTDIV, None, Address::ZERO), FaultCode::INTEGER_DIVIDE_BY_ZERO);
        assert_eq!(classify(libc::SIGFPE, fpe::FPE_FLTUND, None, Address::ZERO), FaultCode::FLOAT_UNDERFLOW);
        assert_eq!(classify(libc::SIGFPE, -6, None, Address::ZERO), FaultCode::FLOAT_INVALID_OPERATION);
        assert_eq!(classify(libc::SIGTRAP, trap::TRAP_BRKPT, None, Address::ZERO), FaultCode::BREAKPOINT);
        assert_eq!(classify(libc::SIGTRAP, trap::TRAP_TRACE, None, Address::ZERO), FaultCode::SINGLE_STEP);
    }

    #[test]
    fn test_unhandled_signal_is_unknown()
    {
        assert_eq!(classify(libc::SIGUSR1, 0, None, Address::ZERO).title(), "Unknown");
    }
}
