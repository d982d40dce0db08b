//! # Linux Minidump Writer
//!
//! Writes a snapshot of the running process in the minidump format, from
//! inside the process (there is no separate monitor to ptrace us).
//!
//! ## File Layout
//!
//! ```text
//! header | directory | system info | misc info | CPU context | stack copy
//!        | exception | thread list | thread info | modules | memory info
//!        | handles | maps | status | cmdline | memory64 list | memory bytes
//! ```
//!
//! Everything up to and including the `Memory64ListStream` descriptor table
//! is assembled in memory; the captured memory itself (private writable
//! regions) is then streamed straight from `/proc/self/mem` to the file so
//! the heap is never copied into a second buffer.
//!
//! ## Streams
//!
//! | Stream | Contents |
//! |--------|----------|
//! | `SystemInfoStream` | architecture, CPU count, kernel version, `uname` |
//! | `MiscInfoStream` | process ID and CPU times |
//! | `ExceptionStream` | signal, `si_code`, fault address, faulting thread |
//! | `ThreadListStream` | every thread; context and stack for the faulting one |
//! | `ThreadInfoListStream` | per-thread CPU times |
//! | `ModuleListStream` | loaded modules |
//! | `MemoryInfoListStream` | `/proc/self/maps` as protection and type records |
//! | `HandleDataStream` | open file descriptors |
//! | `LinuxMaps`, `LinuxProcStatus`, `LinuxCmdLine` | procfs files verbatim |
//! | `Memory64ListStream` | private writable memory |

mod buffer;
mod cpu;
mod sections;

use std::fs::File;
use std::io::{self, BufWriter, Write};

use minidump_common::format::{MINIDUMP_DIRECTORY, MINIDUMP_SIGNATURE, MINIDUMP_STREAM_TYPE, MINIDUMP_VERSION};
use scroll::{IOwrite, LE};
use smallvec::SmallVec;
use tracing::debug;

use self::buffer::{DumpBuf, PutExt};
use super::procfs::{self, SelfMemory};
use crate::failure::{FailureRecord, FaultContext};
use crate::types::ThreadId;

const HEADER_SIZE: usize = 32;
const DIRECTORY_ENTRY_SIZE: usize = 12;
const MAX_STREAMS: usize = 16;

/// Write a minidump describing `record` (and the whole process) to `file`
///
/// ## Errors
///
/// Returns the first I/O error from writing the file. Failing to read any
/// particular piece of process state is not an error; that part of the
/// snapshot is left empty.
pub(crate) fn write_snapshot(file: &File, record: &FailureRecord<'_>) -> io::Result<()>
{
    let context = record.context();
    let crashed = context.map_or_else(ThreadId::current, FaultContext::thread_id);

    let regions = procfs::memory_regions().unwrap_or_default();
    let threads = procfs::thread_ids();
    let memory = SelfMemory::open();

    let mut buf = DumpBuf::new();
    let header = buf.alloc(HEADER_SIZE)?;
    let directory = buf.alloc(MAX_STREAMS * DIRECTORY_ENTRY_SIZE)?;

    let mut streams: SmallVec<[MINIDUMP_DIRECTORY; MAX_STREAMS]> = SmallVec::new();
    streams.push(sections::system_info(&mut buf)?);
    streams.push(sections::misc_info(&mut buf)?);

    let cpu = cpu::write_context(&mut buf, context)?;
    let stack = sections::crash_stack(&mut buf, &regions, &memory, cpu.stack_pointer)?;

    streams.push(sections::exception(&mut buf, record, crashed, cpu.location)?);
    streams.push(sections::thread_list(&mut buf, &threads, crashed, cpu.location, stack)?);
    streams.push(sections::thread_info_list(&mut buf, &threads)?);
    streams.push(sections::module_list(&mut buf)?);
    streams.push(sections::memory_info_list(&mut buf, &regions)?);
    streams.push(sections::handle_data(&mut buf)?);
    streams.push(sections::proc_file(&mut buf, MINIDUMP_STREAM_TYPE::LinuxMaps, "/proc/self/maps")?);
    streams.push(sections::proc_file(&mut buf, MINIDUMP_STREAM_TYPE::LinuxProcStatus, "/proc/self/status")?);
    streams.push(sections::proc_file(&mut buf, MINIDUMP_STREAM_TYPE::LinuxCmdLine, "/proc/self/cmdline")?);

    let captured: Vec<_> = regions.iter().filter(|region| sections::is_captured(region)).collect();
    streams.push(sections::memory64_list(&mut buf, &captured)?);

    let mut entries = Vec::with_capacity(directory.data_size as usize);
    for stream in &streams {
        entries.iowrite_with(stream.stream_type, LE)?;
        entries.put_location(stream.location)?;
    }
    entries.resize(directory.data_size as usize, 0);
    buf.fill(directory, &entries)?;

    let mut raw = Vec::with_capacity(HEADER_SIZE);
    raw.iowrite_with(MINIDUMP_SIGNATURE, LE)?;
    raw.iowrite_with(MINIDUMP_VERSION, LE)?;
    raw.iowrite_with(streams.len() as u32, LE)?;
    raw.iowrite_with(directory.rva, LE)?;
    // checksum
    raw.iowrite_with(0u32, LE)?;
    raw.iowrite_with(chrono::Utc::now().timestamp() as u32, LE)?;
    // flags
    raw.iowrite_with(0u64, LE)?;
    buf.fill(header, &raw)?;

    let mut out = BufWriter::new(file);
    out.write_all(buf.as_bytes())?;
    let mut captured_bytes = 0u64;
    for region in &captured {
        memory.copy_range(region.start, region.size(), &mut out)?;
        captured_bytes += region.size();
    }
    out.flush()?;

    debug!(
        streams = streams.len(),
        threads = threads.len(),
        regions = captured.len(),
        bytes = buf.as_bytes().len() as u64 + captured_bytes,
        "minidump written"
    );
    Ok(())
}
