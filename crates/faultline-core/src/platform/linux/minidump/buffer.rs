//! In-memory minidump image.
//!
//! Streams are appended in order; fixed-size sections whose contents depend
//! on data written after them (the header, the directory, lists that point
//! at strings) are allocated first and filled in once that data exists.

use std::io::{self, Cursor, Write};

use minidump_common::format::MINIDUMP_LOCATION_DESCRIPTOR;
use scroll::{IOwrite, Pwrite, LE};

pub(super) type Location = MINIDUMP_LOCATION_DESCRIPTOR;

#[derive(Debug, Default)]
pub(super) struct DumpBuf
{
    cursor: Cursor<Vec<u8>>,
}

impl DumpBuf
{
    pub fn new() -> Self
    {
        Self {
            cursor: Cursor::new(Vec::with_capacity(64 * 1024)),
        }
    }

    /// Offset the next write lands at
    pub fn position(&self) -> u32
    {
        self.cursor.get_ref().len() as u32
    }

    /// Append `len` zero bytes to be filled in later
    pub fn alloc(&mut self, len: usize) -> io::Result<Location>
    {
        let rva = self.position();
        self.put_zeros(len)?;
        Ok(Location {
            data_size: len as u32,
            rva,
        })
    }

    /// Overwrite a section returned by [`alloc`](Self::alloc)
    pub fn fill(&mut self, section: Location, bytes: &[u8]) -> io::Result<()>
    {
        if bytes.len() != section.data_size as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("section is {} bytes, got {}", section.data_size, bytes.len()),
            ));
        }
        let start = section.rva as usize;
        self.cursor.get_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrite one little-endian `u32` already in the buffer
    pub fn patch_u32(&mut self, offset: u32, value: u32) -> io::Result<()>
    {
        let result: Result<usize, scroll::Error> =
            self.cursor.get_mut().as_mut_slice().pwrite_with(value, offset as usize, LE);
        result.map(drop).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Location covering everything written since `rva`
    pub fn location_since(&self, rva: u32) -> Location
    {
        Location {
            data_size: self.position() - rva,
            rva,
        }
    }

    pub fn put_zeros(&mut self, len: usize) -> io::Result<()>
    {
        const ZEROS: [u8; 512] = [0; 512];
        let mut left = len;
        while left > 0 {
            let n = left.min(ZEROS.len());
            self.cursor.write_all(&ZEROS[..n])?;
            left -= n;
        }
        Ok(())
    }

    /// Append raw bytes and return their location
    pub fn put_blob(&mut self, bytes: &[u8]) -> io::Result<Location>
    {
        let rva = self.position();
        self.cursor.write_all(bytes)?;
        Ok(self.location_since(rva))
    }

    /// Append a `MINIDUMP_STRING`: byte length, UTF-16LE text, NUL
    pub fn put_string(&mut self, text: &str) -> io::Result<Location>
    {
        let rva = self.position();
        let units: Vec<u16> = text.encode_utf16().collect();
        self.cursor.iowrite_with((units.len() * 2) as u32, LE)?;
        for unit in units.iter().copied().chain(std::iter::once(0)) {
            self.cursor.iowrite_with(unit, LE)?;
        }
        Ok(self.location_since(rva))
    }

    pub fn as_bytes(&self) -> &[u8]
    {
        self.cursor.get_ref()
    }
}

impl Write for DumpBuf
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()>
    {
        Ok(())
    }
}

/// Writers for the small fixed-layout structs streams are built from
pub(super) trait PutExt: Write + Sized
{
    fn put_location(&mut self, location: Location) -> io::Result<()>
    {
        self.iowrite_with(location.data_size, LE)?;
        self.iowrite_with(location.rva, LE)
    }

    fn put_u64s(&mut self, values: &[u64]) -> io::Result<()>
    {
        for value in values {
            self.iowrite_with(*value, LE)?;
        }
        Ok(())
    }
}

impl<W: Write> PutExt for W {}
