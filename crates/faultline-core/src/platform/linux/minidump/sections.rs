//! Stream writers.
//!
//! Each function appends one stream to the [`DumpBuf`] and returns its
//! directory entry. Layouts are the Microsoft `minidumpapiset.h` structs,
//! plus the Breakpad `Linux*` text streams.

use std::ffi::CStr;
use std::fs;
use std::io;
use std::path::Path;

use minidump_common::format::{
    MemoryProtection, MemoryState, MemoryType, MiscInfoFlags, PlatformId, ProcessorArchitecture,
    MINIDUMP_DIRECTORY, MINIDUMP_MEMORY_DESCRIPTOR, MINIDUMP_STREAM_TYPE,
};
use scroll::{IOwrite, LE};

use super::buffer::{DumpBuf, Location, PutExt};
use crate::failure::{FailureRecord, RawContext};
use crate::platform::linux::constants::{MAX_STACK_CAPTURE, RED_ZONE};
use crate::platform::linux::procfs::{self, SelfMemory};
use crate::resolver::ModuleResolver;
use crate::types::{Address, Architecture, MemoryRegion, ProcessId, ThreadId};

const SYSTEM_INFO_SIZE: usize = 56;
const MISC_INFO_SIZE: u32 = 24;
const EXCEPTION_STREAM_SIZE: usize = 168;
const THREAD_SIZE: usize = 48;
const THREAD_INFO_HEADER_SIZE: u32 = 12;
const THREAD_INFO_SIZE: u32 = 64;
const MODULE_SIZE: usize = 108;
const VS_FIXEDFILEINFO_SIZE: usize = 52;
const MEMORY_INFO_HEADER_SIZE: u32 = 16;
const MEMORY_INFO_SIZE: u32 = 48;
const HANDLE_DATA_HEADER_SIZE: u32 = 16;
const HANDLE_DESCRIPTOR_SIZE: u32 = 32;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

fn directory(stream_type: MINIDUMP_STREAM_TYPE, location: Location) -> MINIDUMP_DIRECTORY
{
    MINIDUMP_DIRECTORY {
        stream_type: stream_type as u32,
        location,
    }
}

/// Operating system and CPU description
pub(super) fn system_info(buf: &mut DumpBuf) -> io::Result<MINIDUMP_DIRECTORY>
{
    let section = buf.alloc(SYSTEM_INFO_SIZE)?;

    let uname = Uname::current();
    let csd_version = buf.put_string(&uname.describe())?;
    let (major, minor, build) = uname.kernel_version();

    let architecture = match Architecture::current() {
        Architecture::X86_64 => ProcessorArchitecture::PROCESSOR_ARCHITECTURE_AMD64,
        Architecture::Arm64 => ProcessorArchitecture::PROCESSOR_ARCHITECTURE_ARM64,
        Architecture::Unknown(_) => ProcessorArchitecture::PROCESSOR_ARCHITECTURE_UNKNOWN,
    };
    let processors = std::thread::available_parallelism().map_or(1, |n| n.get().min(usize::from(u8::MAX)));

    let mut raw = Vec::with_capacity(SYSTEM_INFO_SIZE);
    raw.iowrite_with(architecture as u16, LE)?;
    // processor_level, processor_revision
    raw.iowrite_with(0u16, LE)?;
    raw.iowrite_with(0u16, LE)?;
    raw.iowrite_with(processors as u8, LE)?;
    // product_type
    raw.iowrite_with(0u8, LE)?;
    raw.iowrite_with(major, LE)?;
    raw.iowrite_with(minor, LE)?;
    raw.iowrite_with(build, LE)?;
    raw.iowrite_with(PlatformId::Linux as u32, LE)?;
    raw.iowrite_with(csd_version.rva, LE)?;
    // suite_mask, reserved2
    raw.iowrite_with(0u16, LE)?;
    raw.iowrite_with(0u16, LE)?;
    // CPU_INFORMATION
    raw.extend_from_slice(&[0u8; 24]);

    buf.fill(section, &raw)?;
    Ok(directory(MINIDUMP_STREAM_TYPE::SystemInfoStream, section))
}

/// Process ID and CPU times (`MINIDUMP_MISC_INFO`)
pub(super) fn misc_info(buf: &mut DumpBuf) -> io::Result<MINIDUMP_DIRECTORY>
{
    let rva = buf.position();
    let times = procfs::process_times();
    let mut flags = MiscInfoFlags::MINIDUMP_MISC1_PROCESS_ID;
    let (created, user, kernel) = match (times, procfs::boot_time()) {
        (Some(times), Some(boot)) => {
            flags |= MiscInfoFlags::MINIDUMP_MISC1_PROCESS_TIMES;
            let created = boot + times.started / 10_000_000;
            (created as u32, (times.user / 10_000_000) as u32, (times.kernel / 10_000_000) as u32)
        }
        _ => (0, 0, 0),
    };

    buf.iowrite_with(MISC_INFO_SIZE, LE)?;
    buf.iowrite_with(flags.bits(), LE)?;
    buf.iowrite_with(ProcessId::current().0, LE)?;
    buf.iowrite_with(created, LE)?;
    buf.iowrite_with(user, LE)?;
    buf.iowrite_with(kernel, LE)?;

    Ok(directory(MINIDUMP_STREAM_TYPE::MiscInfoStream, buf.location_since(rva)))
}

/// The failure that triggered the snapshot
///
/// Signal faults follow the Breakpad convention: the code is the signal
/// number, the flags are `si_code` and the address is `si_addr`. Failures
/// without a signal record the portable fault code instead.
pub(super) fn exception(
    buf: &mut DumpBuf,
    record: &FailureRecord<'_>,
    thread: ThreadId,
    context: Location,
) -> io::Result<MINIDUMP_DIRECTORY>
{
    let section = buf.alloc(EXCEPTION_STREAM_SIZE)?;

    let (code, flags, address) = match record.context() {
        Some(ctx) => match ctx.raw() {
            RawContext::Signal { signal, info, .. } => (
                *signal as u32,
                info.si_code as u32,
                ctx.fault_address().unwrap_or(ctx.instruction_address()),
            ),
            _ => (record.code().value(), 0, ctx.instruction_address()),
        },
        None => (record.code().value(), 0, Address::ZERO),
    };

    let mut raw = Vec::with_capacity(EXCEPTION_STREAM_SIZE);
    raw.iowrite_with(thread.as_u32(), LE)?;
    raw.iowrite_with(0u32, LE)?;
    raw.iowrite_with(code, LE)?;
    raw.iowrite_with(flags, LE)?;
    // exception_record (nested record pointer)
    raw.iowrite_with(0u64, LE)?;
    raw.iowrite_with(address.value(), LE)?;
    // number_parameters, alignment, exception_information[15]
    raw.iowrite_with(0u32, LE)?;
    raw.iowrite_with(0u32, LE)?;
    raw.put_u64s(&[0; 15])?;
    raw.put_location(context)?;

    buf.fill(section, &raw)?;
    Ok(directory(MINIDUMP_STREAM_TYPE::ExceptionStream, section))
}

/// Copy the faulting thread's stack, starting just below its stack pointer
pub(super) fn crash_stack(
    buf: &mut DumpBuf,
    regions: &[MemoryRegion],
    memory: &SelfMemory,
    stack_pointer: Address,
) -> io::Result<MINIDUMP_MEMORY_DESCRIPTOR>
{
    let Some(region) = regions.iter().find(|region| region.contains(stack_pointer)) else {
        return Ok(MINIDUMP_MEMORY_DESCRIPTOR::default());
    };

    let start = Address::new(stack_pointer.value().saturating_sub(RED_ZONE).max(region.start.value()));
    let len = region.end.distance(start).min(MAX_STACK_CAPTURE) as usize;

    let mut bytes = vec![0u8; len];
    memory.read_into(start, &mut bytes);
    let location = buf.put_blob(&bytes)?;

    Ok(MINIDUMP_MEMORY_DESCRIPTOR {
        start_of_memory_range: start.value(),
        memory: location,
    })
}

/// Every thread of the process; only the faulting one has a context and stack
pub(super) fn thread_list(
    buf: &mut DumpBuf,
    threads: &[ThreadId],
    crashed: ThreadId,
    context: Location,
    stack: MINIDUMP_MEMORY_DESCRIPTOR,
) -> io::Result<MINIDUMP_DIRECTORY>
{
    let rva = buf.position();
    let others = threads.iter().copied().filter(|thread| *thread != crashed);
    let count = 1 + others.clone().count();

    buf.iowrite_with(count as u32, LE)?;
    for thread in std::iter::once(crashed).chain(others) {
        let (stack, context) = if thread == crashed {
            (stack, context)
        } else {
            (MINIDUMP_MEMORY_DESCRIPTOR::default(), Location::default())
        };

        buf.iowrite_with(thread.as_u32(), LE)?;
        // suspend_count, priority_class, priority
        buf.iowrite_with(0u32, LE)?;
        buf.iowrite_with(0u32, LE)?;
        buf.iowrite_with(0u32, LE)?;
        // teb
        buf.iowrite_with(0u64, LE)?;
        buf.iowrite_with(stack.start_of_memory_range, LE)?;
        buf.put_location(stack.memory)?;
        buf.put_location(context)?;
    }

    let location = buf.location_since(rva);
    debug_assert_eq!(location.data_size as usize, 4 + count * THREAD_SIZE);
    Ok(directory(MINIDUMP_STREAM_TYPE::ThreadListStream, location))
}

/// Per-thread CPU times (`MINIDUMP_THREAD_INFO_LIST`)
pub(super) fn thread_info_list(buf: &mut DumpBuf, threads: &[ThreadId]) -> io::Result<MINIDUMP_DIRECTORY>
{
    let rva = buf.position();
    let boot = procfs::boot_time().unwrap_or(0);

    buf.iowrite_with(THREAD_INFO_HEADER_SIZE, LE)?;
    buf.iowrite_with(THREAD_INFO_SIZE, LE)?;
    buf.iowrite_with(threads.len() as u32, LE)?;

    for thread in threads {
        let times = procfs::thread_times(*thread).unwrap_or_default();
        let created = if boot == 0 {
            0
        } else {
            (boot + FILETIME_EPOCH_OFFSET) * 10_000_000 + times.started
        };

        buf.iowrite_with(thread.as_u32(), LE)?;
        // dump_flags, dump_error, exit_status
        buf.iowrite_with(0u32, LE)?;
        buf.iowrite_with(0u32, LE)?;
        buf.iowrite_with(0u32, LE)?;
        // create, exit, kernel, user, start_address, affinity
        buf.put_u64s(&[created, 0, times.kernel, times.user, 0, 0])?;
    }

    Ok(directory(MINIDUMP_STREAM_TYPE::ThreadInfoListStream, buf.location_since(rva)))
}

/// Loaded modules with their full paths
pub(super) fn module_list(buf: &mut DumpBuf) -> io::Result<MINIDUMP_DIRECTORY>
{
    let modules = ModuleResolver::loaded_modules();
    let modules: Vec<_> = modules.iter().filter(|module| module.size > 0).collect();

    let section = buf.alloc(4 + modules.len() * MODULE_SIZE)?;
    let mut names = Vec::with_capacity(modules.len());
    for module in &modules {
        names.push(buf.put_string(&module.path.to_string_lossy())?);
    }

    let mut raw = Vec::with_capacity(section.data_size as usize);
    raw.iowrite_with(modules.len() as u32, LE)?;
    for (module, name) in modules.iter().zip(&names) {
        raw.iowrite_with(module.base.value(), LE)?;
        raw.iowrite_with(module.size.min(u64::from(u32::MAX)) as u32, LE)?;
        // checksum, time_date_stamp
        raw.iowrite_with(0u32, LE)?;
        raw.iowrite_with(0u32, LE)?;
        raw.iowrite_with(name.rva, LE)?;
        raw.extend_from_slice(&[0u8; VS_FIXEDFILEINFO_SIZE]);
        // cv_record, misc_record
        raw.put_location(Location::default())?;
        raw.put_location(Location::default())?;
        // reserved0, reserved1
        raw.put_u64s(&[0, 0])?;
    }

    buf.fill(section, &raw)?;
    Ok(directory(MINIDUMP_STREAM_TYPE::ModuleListStream, section))
}

/// Address space layout (`MINIDUMP_MEMORY_INFO_LIST`)
pub(super) fn memory_info_list(buf: &mut DumpBuf, regions: &[MemoryRegion]) -> io::Result<MINIDUMP_DIRECTORY>
{
    let rva = buf.position();

    buf.iowrite_with(MEMORY_INFO_HEADER_SIZE, LE)?;
    buf.iowrite_with(MEMORY_INFO_SIZE, LE)?;
    buf.iowrite_with(regions.len() as u64, LE)?;

    for region in regions {
        let protection = protection(region).bits();
        buf.iowrite_with(region.start.value(), LE)?;
        // allocation_base, allocation_protection, alignment
        buf.iowrite_with(region.start.value(), LE)?;
        buf.iowrite_with(protection, LE)?;
        buf.iowrite_with(0u32, LE)?;
        buf.iowrite_with(region.size(), LE)?;
        buf.iowrite_with(MemoryState::MEM_COMMIT.bits(), LE)?;
        buf.iowrite_with(protection, LE)?;
        buf.iowrite_with(memory_type(region).bits(), LE)?;
        buf.iowrite_with(0u32, LE)?;
    }

    Ok(directory(MINIDUMP_STREAM_TYPE::MemoryInfoListStream, buf.location_since(rva)))
}

pub(crate) fn protection(region: &MemoryRegion) -> MemoryProtection
{
    match (region.is_readable(), region.is_writable(), region.is_executable()) {
        (_, true, true) => MemoryProtection::PAGE_EXECUTE_READWRITE,
        (true, false, true) => MemoryProtection::PAGE_EXECUTE_READ,
        (false, false, true) => MemoryProtection::PAGE_EXECUTE,
        (_, true, false) => MemoryProtection::PAGE_READWRITE,
        (true, false, false) => MemoryProtection::PAGE_READONLY,
        (false, false, false) => MemoryProtection::PAGE_NOACCESS,
    }
}

pub(crate) fn memory_type(region: &MemoryRegion) -> MemoryType
{
    if !region.is_private() {
        MemoryType::MEM_MAPPED
    } else if region.is_file_backed() {
        MemoryType::MEM_IMAGE
    } else {
        MemoryType::MEM_PRIVATE
    }
}

/// Open file descriptors (`MINIDUMP_HANDLE_DATA_STREAM`)
///
/// The handle value is the descriptor number, the type name is derived from
/// the link target and the object name is the target itself.
pub(super) fn handle_data(buf: &mut DumpBuf) -> io::Result<MINIDUMP_DIRECTORY>
{
    let descriptors = procfs::open_descriptors();

    let section = buf.alloc((HANDLE_DATA_HEADER_SIZE + descriptors.len() as u32 * HANDLE_DESCRIPTOR_SIZE) as usize)?;
    let mut strings = Vec::with_capacity(descriptors.len());
    for (_, target) in &descriptors {
        let type_name = buf.put_string(handle_type(target))?;
        let object_name = buf.put_string(&target.to_string_lossy())?;
        strings.push((type_name, object_name));
    }

    let mut raw = Vec::with_capacity(section.data_size as usize);
    raw.iowrite_with(HANDLE_DATA_HEADER_SIZE, LE)?;
    raw.iowrite_with(HANDLE_DESCRIPTOR_SIZE, LE)?;
    raw.iowrite_with(descriptors.len() as u32, LE)?;
    raw.iowrite_with(0u32, LE)?;
    for ((fd, _), (type_name, object_name)) in descriptors.iter().zip(&strings) {
        raw.iowrite_with(*fd as u64, LE)?;
        raw.iowrite_with(type_name.rva, LE)?;
        raw.iowrite_with(object_name.rva, LE)?;
        // attributes, granted_access, handle_count, pointer_count
        raw.iowrite_with(0u32, LE)?;
        raw.iowrite_with(0u32, LE)?;
        raw.iowrite_with(1u32, LE)?;
        raw.iowrite_with(0u32, LE)?;
    }

    buf.fill(section, &raw)?;
    Ok(directory(MINIDUMP_STREAM_TYPE::HandleDataStream, section))
}

pub(crate) fn handle_type(target: &Path) -> &'static str
{
    let target = target.as_os_str().to_string_lossy();
    if target.starts_with("socket:") {
        "Socket"
    } else if target.starts_with("pipe:") {
        "Pipe"
    } else if target.starts_with("anon_inode:") {
        "AnonInode"
    } else if target.starts_with("/dev/") {
        "Device"
    } else {
        "File"
    }
}

/// A procfs file stored verbatim (Breakpad `Linux*` streams)
///
/// An unreadable file produces an empty stream.
pub(super) fn proc_file(buf: &mut DumpBuf, stream_type: MINIDUMP_STREAM_TYPE, path: &str) -> io::Result<MINIDUMP_DIRECTORY>
{
    let bytes = fs::read(path).unwrap_or_default();
    let location = buf.put_blob(&bytes)?;
    Ok(directory(stream_type, location))
}

/// Descriptor table for the memory appended after the buffer
///
/// Must be the last stream: the region bytes start right where it ends, in
/// the order given.
pub(super) fn memory64_list(buf: &mut DumpBuf, regions: &[&MemoryRegion]) -> io::Result<MINIDUMP_DIRECTORY>
{
    let rva = buf.position();
    let base_rva = u64::from(rva) + 16 + 16 * regions.len() as u64;

    buf.iowrite_with(regions.len() as u64, LE)?;
    buf.iowrite_with(base_rva, LE)?;
    for region in regions {
        buf.iowrite_with(region.start.value(), LE)?;
        buf.iowrite_with(region.size(), LE)?;
    }

    let location = buf.location_since(rva);
    debug_assert_eq!(u64::from(location.rva + location.data_size), base_rva);
    Ok(directory(MINIDUMP_STREAM_TYPE::Memory64ListStream, location))
}

/// Regions whose contents go into the snapshot: private, readable and
/// writable memory (heap, stacks, data segments)
pub(super) fn is_captured(region: &MemoryRegion) -> bool
{
    region.is_readable() && region.is_writable() && region.is_private() && region.size() > 0
}

/// `uname(2)` fields
struct Uname
{
    sysname: String,
    release: String,
    version: String,
    machine: String,
}

impl Uname
{
    fn current() -> Self
    {
        // SAFETY: utsname is plain data; uname fills it with NUL-terminated
        // strings on success
        let mut raw: libc::utsname = unsafe { std::mem::zeroed() };
        if unsafe { libc::uname(&mut raw) } != 0 {
            return Self {
                sysname: "Linux".to_string(),
                release: String::new(),
                version: String::new(),
                machine: std::env::consts::ARCH.to_string(),
            };
        }

        let field = |chars: &[libc::c_char]| {
            // SAFETY: NUL-terminated by uname; zeroed beforehand
            unsafe { CStr::from_ptr(chars.as_ptr()) }.to_string_lossy().into_owned()
        };
        Self {
            sysname: field(&raw.sysname),
            release: field(&raw.release),
            version: field(&raw.version),
            machine: field(&raw.machine),
        }
    }

    /// `"Linux 6.1.0-18-amd64 #1 SMP ... x86_64"`
    fn describe(&self) -> String
    {
        format!("{} {} {} {}", self.sysname, self.release, self.version, self.machine)
    }

    /// Leading numeric components of the release, e.g. `6.1.0-18` -> (6, 1, 0)
    fn kernel_version(&self) -> (u32, u32, u32)
    {
        parse_kernel_version(&self.release)
    }
}

fn parse_kernel_version(release: &str) -> (u32, u32, u32)
{
    let mut parts = release.split(|c: char| !c.is_ascii_digit()).map(|part| part.parse::<u32>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;

    use super::*;
    use crate::types::MemoryRegionId;

    fn region(permissions: &str, name: Option<&str>) -> MemoryRegion
    {
        MemoryRegion::new(
            MemoryRegionId(0),
            Address::new(0x1000),
            Address::new(0x3000),
            permissions.to_string(),
            name.map(str::to_string),
        )
    }

    #[test]
    fn test_kernel_version()
    {
        assert_eq!(parse_kernel_version("6.1.0-18-amd64"), (6, 1, 0));
        assert_eq!(parse_kernel_version("5.15.153.1-microsoft-standard-WSL2"), (5, 15, 153));
        assert_eq!(parse_kernel_version(""), (0, 0, 0));
    }

    #[test]
    fn test_protection_mapping()
    {
        assert_eq!(protection(&region("r-xp", None)).bits(), MemoryProtection::PAGE_EXECUTE_READ.bits());
        assert_eq!(protection(&region("rw-p", None)).bits(), MemoryProtection::PAGE_READWRITE.bits());
        assert_eq!(protection(&region("r--p", None)).bits(), MemoryProtection::PAGE_READONLY.bits());
        assert_eq!(protection(&region("---p", None)).bits(), MemoryProtection::PAGE_NOACCESS.bits());
        assert_eq!(protection(&region("rwxp", None)).bits(), MemoryProtection::PAGE_EXECUTE_READWRITE.bits());
    }

    #[test]
    fn test_memory_type()
    {
        assert_eq!(memory_type(&region("r-xp", Some("/usr/lib/libc.so.6"))), MemoryType::MEM_IMAGE);
        assert_eq!(memory_type(&region("rw-s", Some("/dev/shm/x"))), MemoryType::MEM_MAPPED);
        assert_eq!(memory_type(&region("rw-p", Some("[heap]"))), MemoryType::MEM_PRIVATE);
    }

    #[test]
    fn test_capture_selection()
    {
        assert!(is_captured(&region("rw-p", Some("[stack]"))));
        assert!(!is_captured(&region("r--p", None)));
        assert!(!is_captured(&region("rw-s", None)));
    }

    #[test]
    fn test_handle_type()
    {
        assert_eq!(handle_type(&PathBuf::from("socket:[4711]")), "Socket");
        assert_eq!(handle_type(&PathBuf::from("pipe:[12]")), "Pipe");
        assert_eq!(handle_type(&PathBuf::from("anon_inode:[eventfd]")), "AnonInode");
        assert_eq!(handle_type(&PathBuf::from("/dev/null")), "Device");
        assert_eq!(handle_type(&PathBuf::from("/tmp/log.txt")), "File");
    }
}
