//! Positional access to the bytes an archive was opened from.

use std::fmt::Debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// A read-only store that can hand out byte ranges by offset.
///
/// Format sniffers only ever see a `DataSource`, so the same check works on a fully loaded
/// [`crate::ByteBuffer`] and on a file that has not been read yet. Archives keep their source
/// around to resolve deferred entry content.
pub trait DataSource: Send + Sync + Debug {
    /// Total size of the source in bytes
    fn size(&self) -> u64;

    /// Fill `buf` with the bytes starting at `offset`
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Read `length` bytes starting at `offset`
    fn read_vec(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let length = usize::try_from(length)
            .map_err(|_| Error::out_of_range(offset, length, self.size()))?;
        let mut out = vec![0u8; length];
        self.read_at(offset, &mut out)?;
        Ok(out)
    }
}

/// A file on disk read on demand
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
    file: Mutex<File>,
}

impl FileSource {
    /// Open a file without reading its content
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            size,
            file: Mutex::new(file),
        })
    }

    /// Path the source was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let length = buf.len() as u64;
        if offset.checked_add(length).map_or(true, |end| end > self.size) {
            return Err(Error::out_of_range(offset, length, self.size));
        }

        let mut file = self.file.lock().map_err(|_| {
            Error::SourceUnavailable(format!("{} is poisoned", self.path.display()))
        })?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}

/// Read `N` bytes at `offset`, or `None` when they are not there.
pub(crate) fn probe_bytes<const N: usize>(src: &dyn DataSource, offset: u64) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    src.read_at(offset, &mut out).ok()?;
    Some(out)
}

pub(crate) fn probe_u16_le(src: &dyn DataSource, offset: u64) -> Option<u16> {
    probe_bytes::<2>(src, offset).map(|raw| LittleEndian::read_u16(&raw))
}

pub(crate) fn probe_u32_le(src: &dyn DataSource, offset: u64) -> Option<u32> {
    probe_bytes::<4>(src, offset).map(|raw| LittleEndian::read_u32(&raw))
}
