//! # procfs Readers
//!
//! Everything a snapshot needs to know about the running process that the
//! loader and `libc` do not provide: the memory map, the thread list,
//! per-thread CPU times, open descriptors, and the memory itself.
//!
//! See: [proc(5) man page](https://man7.org/linux/man-pages/man5/proc.5.html)

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::types::{Address, MemoryRegion, MemoryRegionId, ThreadId};

/// Clock ticks per second, for the times in `/proc/<pid>/stat`
static CLOCK_TICKS: Lazy<u64> = Lazy::new(|| {
    // SAFETY: sysconf has no preconditions
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks <= 0 { 100 } else { ticks as u64 }
});

/// Parse `/proc/self/maps`
///
/// ## Errors
///
/// Returns the error from reading the file; unparseable lines are skipped.
pub fn memory_regions() -> io::Result<Vec<MemoryRegion>>
{
    let maps = fs::read_to_string("/proc/self/maps")?;
    Ok(parse_maps(&maps))
}

/// Parse the text of a `maps` file
pub fn parse_maps(maps: &str) -> Vec<MemoryRegion>
{
    maps.lines()
        .filter_map(parse_maps_line)
        .enumerate()
        .map(|(index, mut region)| {
            region.id = MemoryRegionId(index);
            region
        })
        .collect()
}

/// Parse one `maps` line:
/// `start-end perms offset dev inode [name]`
fn parse_maps_line(line: &str) -> Option<MemoryRegion>
{
    let mut fields = line.splitn(6, ' ');
    let range = fields.next()?;
    let permissions = fields.next()?;
    let _offset = fields.next()?;
    let _device = fields.next()?;
    let _inode = fields.next()?;
    let name = fields.next().map(str::trim).filter(|name| !name.is_empty());

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    Some(MemoryRegion::new(
        MemoryRegionId(0),
        Address::new(start),
        Address::new(end),
        permissions.to_string(),
        name.map(str::to_string),
    ))
}

/// Kernel IDs of every thread in the process
pub fn thread_ids() -> Vec<ThreadId>
{
    let Ok(entries) = fs::read_dir("/proc/self/task") else {
        return vec![ThreadId::current()];
    };

    let mut ids: Vec<ThreadId> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u64>().ok())
        .map(ThreadId)
        .collect();
    ids.sort_unstable_by_key(|id| id.0);
    ids
}

/// CPU accounting for one thread, in 100-nanosecond units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadTimes
{
    /// Time spent in user mode
    pub user: u64,
    /// Time spent in the kernel on behalf of the thread
    pub kernel: u64,
    /// Start time, since boot
    pub started: u64,
}

/// Read `/proc/self/task/<tid>/stat`
pub fn thread_times(thread: ThreadId) -> Option<ThreadTimes>
{
    let stat = fs::read_to_string(format!("/proc/self/task/{}/stat", thread.0)).ok()?;
    parse_stat_times(&stat, *CLOCK_TICKS)
}

/// Read `/proc/self/stat` (whole-process totals)
pub fn process_times() -> Option<ThreadTimes>
{
    let stat = fs::read_to_string("/proc/self/stat").ok()?;
    parse_stat_times(&stat, *CLOCK_TICKS)
}

fn parse_stat_times(stat: &str, ticks_per_second: u64) -> Option<ThreadTimes>
{
    // The command name may contain spaces and parentheses; fields resume after
    // the last ')'. Index 0 below is field 3 (state).
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |index: usize| fields.get(index)?.parse::<u64>().ok();

    let to_filetime = |ticks: u64| ticks.saturating_mul(10_000_000) / ticks_per_second.max(1);
    Some(ThreadTimes {
        user: to_filetime(field(11)?),
        kernel: to_filetime(field(12)?),
        started: to_filetime(field(19)?),
    })
}

/// System boot time in seconds since the Unix epoch (`btime` in `/proc/stat`)
pub fn boot_time() -> Option<u64>
{
    let stat = fs::read_to_string("/proc/stat").ok()?;
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|value| value.trim().parse().ok())
}

/// Open file descriptors and what they refer to
pub fn open_descriptors() -> Vec<(i32, PathBuf)>
{
    let Ok(entries) = fs::read_dir("/proc/self/fd") else {
        return Vec::new();
    };

    let mut descriptors: Vec<(i32, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let fd = entry.file_name().to_str()?.parse::<i32>().ok()?;
            let target = fs::read_link(entry.path()).ok()?;
            Some((fd, target))
        })
        .collect();
    descriptors.sort_unstable_by_key(|(fd, _)| *fd);
    descriptors
}

/// Reader for the process's own address space via `/proc/self/mem`
///
/// Unlike dereferencing pointers, reading through the file never faults:
/// unmapped or unreadable ranges produce an error, which the copy helpers
/// turn into zero bytes.
#[derive(Debug)]
pub struct SelfMemory
{
    file: Option<File>,
}

impl SelfMemory
{
    const CHUNK: usize = 64 * 1024;

    /// Open `/proc/self/mem`; reads yield zeros if it cannot be opened
    pub fn open() -> Self
    {
        Self {
            file: File::open("/proc/self/mem").ok(),
        }
    }

    /// Fill `buf` from `address`, zeroing whatever could not be read
    pub fn read_into(&self, address: Address, buf: &mut [u8])
    {
        let mut done = 0;
        if let Some(file) = &self.file {
            while done < buf.len() {
                match file.read_at(&mut buf[done..], address.value() + done as u64) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => done += n,
                }
            }
        }
        buf[done..].fill(0);
    }

    /// Copy `[start, start + len)` into `out`
    ///
    /// Always writes exactly `len` bytes.
    ///
    /// ## Errors
    ///
    /// Only errors from `out` are returned.
    pub fn copy_range<W: Write>(&self, start: Address, len: u64, out: &mut W) -> io::Result<()>
    {
        let mut chunk = vec![0u8; Self::CHUNK];
        let mut offset = 0u64;
        while offset < len {
            let n = (len - offset).min(Self::CHUNK as u64) as usize;
            self.read_into(start + offset, &mut chunk[..n]);
            out.write_all(&chunk[..n])?;
            offset += n as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    const MAPS: &str = "\
55d0c0a00000-55d0c0a21000 r--p 00000000 fd:01 1312   /usr/bin/app
55d0c0a21000-55d0c0b00000 r-xp 00021000 fd:01 1312   /usr/bin/app
55d0c1e00000-55d0c1e21000 rw-p 00000000 00:00 0      [heap]
7f31f8000000-7f31f8021000 rw-p 00000000 00:00 0
7ffd4d5e0000-7ffd4d601000 rw-p 00000000 00:00 0      [stack]
";

    #[test]
    fn test_parse_maps()
    {
        let regions = parse_maps(MAPS);
        assert_eq!(regions.len(), 5);

        assert_eq!(regions[0].start, Address::new(0x55d0_c0a0_0000));
        assert_eq!(regions[0].size(), 0x21000);
        assert_eq!(regions[0].name.as_deref(), Some("/usr/bin/app"));
        assert!(regions[1].is_executable());
        assert!(regions[1].is_file_backed());

        assert_eq!(regions[2].name.as_deref(), Some("[heap]"));
        assert!(regions[3].name.is_none());
        assert!(regions[4].is_writable() && regions[4].is_private());
        assert_eq!(regions[4].id, MemoryRegionId(4));
    }

    #[test]
    fn test_parse_stat_times()
    {
        let stat = "4242 (my (odd) prog) S 1 4242 4242 0 -1 4194560 100 0 0 0 250 50 0 0 20 0 1 0 1234 0";
        let times = parse_stat_times(stat, 100).unwrap();
        assert_eq!(times.user, 25_000_000);
        assert_eq!(times.kernel, 5_000_000);
        assert_eq!(times.started, 123_400_000);
        assert!(parse_stat_times("garbage", 100).is_none());
    }

    #[test]
    fn test_self_memory_reads_and_zero_fills()
    {
        let memory = SelfMemory::open();
        let value: u64 = 0x1122_3344_5566_7788;
        let mut buf = [0u8; 8];
        memory.read_into(Address::from_ptr(&value), &mut buf);
        assert_eq!(u64::from_ne_bytes(buf), value);

        let mut buf = [0xffu8; 16];
        memory.read_into(Address::ZERO, &mut buf);
        assert_eq!(buf, [0u8; 16]);

        let mut out = Vec::new();
        memory.copy_range(Address::ZERO, 100_000, &mut out).unwrap();
        assert_eq!(out.len(), 100_000);
    }

    #[test]
    fn test_current_thread_listed()
    {
        assert!(thread_ids().contains(&ThreadId::current()));
        assert!(thread_times(ThreadId::current()).is_some());
    }
}
