//! In-memory byte store every format handler reads from and writes to.

use std::fmt::{self, Debug};
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::source::DataSource;

/// A seekable, bounds-checked byte buffer.
///
/// Reads and writes happen at an internal cursor and never go past the logical end of the
/// buffer. The only way to grow it is [`ByteBuffer::resize`], which keeps format handlers honest
/// about the sizes they compute before serializing.
///
/// The buffer also implements [`Read`], [`Write`] and [`Seek`] so `binrw` records and the
/// `byteorder` extension traits can be used on it directly.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
}

impl Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("size", &self.data.len())
            .field("position", &self.position)
            .finish()
    }
}

impl ByteBuffer {
    /// Creates an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zero-filled buffer of `size` bytes
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0; size],
            position: 0,
        }
    }

    /// Logical size of the buffer in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// The whole content of the buffer
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Unwrap the buffer into its bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Move the cursor. Positions before the start or past the end fail with
    /// [`Error::OutOfRange`].
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<usize> {
        let size = self.data.len() as i128;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(offset) => size + offset as i128,
            SeekFrom::Current(offset) => self.position as i128 + offset as i128,
        };

        if target < 0 || target > size {
            return Err(Error::out_of_range(target.max(0) as u64, 0, size as u64));
        }

        self.position = target as usize;
        Ok(self.position)
    }

    /// Advance the cursor by `length` bytes
    pub fn skip(&mut self, length: usize) -> Result<()> {
        let end = self.checked_end(length)?;
        self.position = end;
        Ok(())
    }

    /// Fill `dst` from the cursor
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let end = self.checked_end(dst.len())?;
        dst.copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(())
    }

    /// Read `length` bytes from the cursor into a new vector
    pub fn read_vec(&mut self, length: usize) -> Result<Vec<u8>> {
        let end = self.checked_end(length)?;
        let out = self.data[self.position..end].to_vec();
        self.position = end;
        Ok(out)
    }

    /// Copy `src` into the buffer at the cursor without growing it
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        let end = self.checked_end(src.len())?;
        self.data[self.position..end].copy_from_slice(src);
        self.position = end;
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.read_bytes(&mut out)?;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(&self.read_array::<2>()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(&self.read_array::<4>()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(&self.read_array::<4>()?))
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        let mut raw = [0u8; 2];
        LittleEndian::write_u16(&mut raw, value);
        self.write_bytes(&raw)
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        let mut raw = [0u8; 4];
        LittleEndian::write_u32(&mut raw, value);
        self.write_bytes(&raw)
    }

    /// Change the logical size of the buffer.
    ///
    /// With `preserve` the existing bytes are kept (and new bytes zeroed), otherwise the whole
    /// buffer is zeroed. The cursor is clamped to the new size.
    pub fn resize(&mut self, size: usize, preserve: bool) {
        if !preserve {
            self.data.clear();
        }
        self.data.resize(size, 0);
        self.position = self.position.min(size);
    }

    /// Empty the buffer and rewind the cursor
    pub fn clear(&mut self) {
        self.data.clear();
        self.position = 0;
    }

    /// Borrow a bounded range of the buffer
    pub fn slice(&self, offset: usize, length: usize) -> Result<&[u8]> {
        offset
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .map(|end| &self.data[offset..end])
            .ok_or_else(|| Error::out_of_range(offset as u64, length as u64, self.size() as u64))
    }

    /// Replace the content of `dst` with a copy of `length` bytes starting at `offset`
    pub fn export_range(&self, dst: &mut ByteBuffer, offset: usize, length: usize) -> Result<()> {
        let range = self.slice(offset, length)?;
        dst.data.clear();
        dst.data.extend_from_slice(range);
        dst.position = 0;
        Ok(())
    }

    /// Overwrite bytes at `offset` with `src`; the range must already exist
    pub fn import_range(&mut self, src: &[u8], offset: usize) -> Result<()> {
        let size = self.data.len();
        let end = offset
            .checked_add(src.len())
            .filter(|end| *end <= size)
            .ok_or_else(|| Error::out_of_range(offset as u64, src.len() as u64, size as u64))?;
        self.data[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn checked_end(&self, length: usize) -> Result<usize> {
        self.position
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::out_of_range(self.position as u64, length as u64, self.size() as u64)
            })
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Read for ByteBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.remaining());
        buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}

impl Write for ByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let count = buf.len().min(self.remaining());
        if count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("write past the end of a {} byte buffer", self.size()),
            ));
        }

        self.data[self.position..self.position + count].copy_from_slice(&buf[..count]);
        self.position += count;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ByteBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_to(pos)
            .map(|p| p as u64)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
    }
}

impl DataSource for ByteBuffer {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let offset = usize::try_from(offset)
            .map_err(|_| Error::out_of_range(offset, buf.len() as u64, self.size() as u64))?;
        buf.copy_from_slice(self.slice(offset, buf.len())?);
        Ok(())
    }
}
