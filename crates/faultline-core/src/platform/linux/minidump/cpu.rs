//! CPU context serialization.
//!
//! Writes the interrupted thread's registers in the Windows `CONTEXT`
//! layout minidump readers expect: `CONTEXT_AMD64` on x86_64 and
//! `CONTEXT_ARM64` on aarch64. Without a `ucontext_t` (on-demand snapshots,
//! contract violations) only the control registers are known.

use std::io;

use scroll::{IOwrite, LE};

use super::buffer::{DumpBuf, Location, PutExt};
use crate::failure::{FaultContext, RawContext};
use crate::types::Address;

/// Registers recovered for the faulting thread
pub(super) struct CpuState
{
    /// Stack pointer, used to pick the stack memory to capture
    pub stack_pointer: Address,
    /// Where the serialized context landed, empty if none was written
    pub location: Location,
}

/// Serialize the context of the faulting (or calling) thread
pub(super) fn write_context(buf: &mut DumpBuf, context: Option<&FaultContext<'_>>) -> io::Result<CpuState>
{
    let marker = 0u8;
    let here = Address::from_ptr(&marker);

    let ucontext = context.and_then(|ctx| match ctx.raw() {
        RawContext::Signal { ucontext, .. } => *ucontext,
        _ => None,
    });
    let pc = context
        .map(FaultContext::instruction_address)
        .filter(|pc| !pc.is_null())
        .unwrap_or_else(|| Address::new(write_context as usize as u64));
    let sp = context
        .map(FaultContext::stack_pointer)
        .filter(|sp| !sp.is_null())
        .unwrap_or(here);

    let rva = buf.position();
    let written = arch::write(buf, ucontext, pc, sp)?;
    let location = if written { buf.location_since(rva) } else { Location::default() };

    Ok(CpuState {
        stack_pointer: sp,
        location,
    })
}

#[cfg(target_arch = "x86_64")]
mod arch
{
    use minidump_common::format::ContextFlagsCpu;

    use super::*;
    use crate::platform::linux::constants::greg::*;

    const CONTEXT_CONTROL: u32 = 0x1;
    const CONTEXT_INTEGER: u32 = 0x2;
    const CONTEXT_SEGMENTS: u32 = 0x4;
    const CONTEXT_FLOATING_POINT: u32 = 0x8;

    const FXSAVE_SIZE: usize = 512;
    const MXCSR_OFFSET: usize = 24;

    pub(super) fn write(buf: &mut DumpBuf, uc: Option<&libc::ucontext_t>, pc: Address, sp: Address) -> io::Result<bool>
    {
        let cpu = ContextFlagsCpu::CONTEXT_AMD64.bits();

        let (flags, gregs, fxsave) = match uc {
            Some(uc) => {
                let gregs: [u64; 23] = uc.uc_mcontext.gregs.map(|r| r as u64);
                let fxsave = float_state(uc);
                let mut flags = cpu | CONTEXT_CONTROL | CONTEXT_INTEGER | CONTEXT_SEGMENTS;
                if fxsave.is_some() {
                    flags |= CONTEXT_FLOATING_POINT;
                }
                (flags, gregs, fxsave)
            }
            None => {
                let mut gregs = [0u64; 23];
                gregs[REG_RIP] = pc.value();
                gregs[REG_RSP] = sp.value();
                (cpu | CONTEXT_CONTROL, gregs, None)
            }
        };

        let mxcsr = fxsave.as_ref().map_or(0, |area| {
            u32::from_le_bytes([
                area[MXCSR_OFFSET],
                area[MXCSR_OFFSET + 1],
                area[MXCSR_OFFSET + 2],
                area[MXCSR_OFFSET + 3],
            ])
        });
        let segments = gregs[REG_CSGSFS];

        // p1_home ..= p6_home
        buf.put_u64s(&[0; 6])?;
        buf.iowrite_with(flags, LE)?;
        buf.iowrite_with(mxcsr, LE)?;

        // cs, ds, es, fs, gs, ss
        buf.iowrite_with(segments as u16, LE)?;
        buf.iowrite_with(0u16, LE)?;
        buf.iowrite_with(0u16, LE)?;
        buf.iowrite_with((segments >> 32) as u16, LE)?;
        buf.iowrite_with((segments >> 16) as u16, LE)?;
        buf.iowrite_with((segments >> 48) as u16, LE)?;

        buf.iowrite_with(gregs[REG_EFL] as u32, LE)?;

        // dr0 ..= dr3, dr6, dr7
        buf.put_u64s(&[0; 6])?;

        buf.put_u64s(&[
            gregs[REG_RAX],
            gregs[REG_RCX],
            gregs[REG_RDX],
            gregs[REG_RBX],
            gregs[REG_RSP],
            gregs[REG_RBP],
            gregs[REG_RSI],
            gregs[REG_RDI],
            gregs[REG_R8],
            gregs[REG_R9],
            gregs[REG_R10],
            gregs[REG_R11],
            gregs[REG_R12],
            gregs[REG_R13],
            gregs[REG_R14],
            gregs[REG_R15],
            gregs[REG_RIP],
        ])?;

        match fxsave {
            Some(area) => buf.put_blob(&area).map(drop)?,
            None => buf.put_zeros(FXSAVE_SIZE)?,
        }

        // vector_register[26], then vector_control, debug_control and the
        // four last-branch/exception addresses
        buf.put_zeros(26 * 16)?;
        buf.put_u64s(&[0; 6])?;
        Ok(true)
    }

    #[cfg(target_env = "gnu")]
    fn float_state(uc: &libc::ucontext_t) -> Option<[u8; FXSAVE_SIZE]>
    {
        let fpregs = uc.uc_mcontext.fpregs;
        if fpregs.is_null() {
            return None;
        }
        // SAFETY: the kernel points fpregs at the saved FXSAVE image inside
        // the signal frame, which outlives this call
        Some(unsafe { std::ptr::read_unaligned(fpregs.cast::<[u8; FXSAVE_SIZE]>()) })
    }

    #[cfg(not(target_env = "gnu"))]
    fn float_state(_uc: &libc::ucontext_t) -> Option<[u8; FXSAVE_SIZE]>
    {
        None
    }
}

#[cfg(target_arch = "aarch64")]
mod arch
{
    use minidump_common::format::ContextFlagsCpu;

    use super::*;

    const CONTEXT_CONTROL: u32 = 0x1;
    const CONTEXT_INTEGER: u32 = 0x2;

    pub(super) fn write(buf: &mut DumpBuf, uc: Option<&libc::ucontext_t>, pc: Address, sp: Address) -> io::Result<bool>
    {
        let cpu = ContextFlagsCpu::CONTEXT_ARM64.bits();

        // x0 ..= x30, then sp
        let mut iregs = [0u64; 32];
        let (flags, cpsr, pc) = match uc {
            Some(uc) => {
                let mc = &uc.uc_mcontext;
                iregs[..31].copy_from_slice(&mc.regs);
                iregs[31] = mc.sp;
                (cpu | CONTEXT_CONTROL | CONTEXT_INTEGER, mc.pstate as u32, mc.pc)
            }
            None => {
                iregs[31] = sp.value();
                (cpu | CONTEXT_CONTROL, 0, pc.value())
            }
        };

        buf.iowrite_with(flags, LE)?;
        buf.iowrite_with(cpsr, LE)?;
        buf.put_u64s(&iregs)?;
        buf.iowrite_with(pc, LE)?;

        // FP/SIMD state lives in the signal frame's reserved area, which libc
        // does not expose; written as zeros (v0 ..= v31, fpsr, fpcr)
        buf.put_zeros(32 * 16 + 8)?;

        // bcr[8], bvr[8], wcr[2], wvr[2]
        buf.put_zeros(8 * 4 + 8 * 8 + 2 * 4 + 2 * 8)?;
        Ok(true)
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod arch
{
    use super::*;

    pub(super) fn write(_buf: &mut DumpBuf, _uc: Option<&libc::ucontext_t>, _pc: Address, _sp: Address) -> io::Result<bool>
    {
        Ok(false)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::FaultCode;

    #[test]
    fn test_synthetic_context_layout()
    {
        let mut buf = DumpBuf::new();
        let ctx = FaultContext::synthetic(FaultCode::BREAKPOINT, Address::new(0x1234));
        let state = write_context(&mut buf, Some(&ctx)).unwrap();

        let expected = if cfg!(target_arch = "x86_64") {
            1232
        } else if cfg!(target_arch = "aarch64") {
            912
        } else {
            0
        };
        assert_eq!(state.location.data_size, expected);
        assert_eq!(buf.as_bytes().len(), expected as usize);
        assert!(!state.stack_pointer.is_null());
    }
}
