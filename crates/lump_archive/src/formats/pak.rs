//! Quake PAK archives, and the SiN variant with longer names.
//!
//! | Offset | Field            | Description                        |
//! |--------|------------------|------------------------------------|
//! | 0x00   | Identification   | `PACK` (Quake) or `SPAK` (SiN)     |
//! | 0x04   | Directory Offset | Position of the directory          |
//! | 0x08   | Directory Size   | Size of the directory in bytes     |
//!
//! Directory records hold a NUL padded path (56 bytes for Quake, 120 for SiN) followed by the
//! offset and size of the file. Paths use `/` and describe the tree.

use std::io::SeekFrom;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::directory::split_path;
use crate::error::{Error, Result, Warning};
use crate::formats::layout;
use crate::handler::{
    entries_for_write, read_name, table_entry, to_u32, Capabilities, FormatHandler, FormatId,
    NameFitter,
};
use crate::source::{probe_bytes, probe_u32_le, DataSource};

const HEADER_SIZE: u64 = 12;

#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct PakHeader {
    pub magic: [u8; 4],
    pub dir_offset: u32,
    pub dir_size: u32,
}

/// PAK layout, shared by Quake and SiN
#[derive(Debug, Clone, Copy)]
pub struct PakHandler {
    id: FormatId,
    magic: [u8; 4],
    name_size: usize,
}

impl PakHandler {
    pub const QUAKE: PakHandler = PakHandler {
        id: FormatId::Pak,
        magic: *b"PACK",
        name_size: 56,
    };

    pub const SIN: PakHandler = PakHandler {
        id: FormatId::Sin,
        magic: *b"SPAK",
        name_size: 120,
    };

    fn record_size(&self) -> u64 {
        self.name_size as u64 + 8
    }
}

impl FormatHandler for PakHandler {
    fn id(&self) -> FormatId {
        self.id
    }

    fn capabilities(&self) -> Capabilities {
        // One byte is kept for the terminator
        Capabilities::tree(self.name_size - 1)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        let Some(magic) = probe_bytes::<4>(src, 0) else {
            return false;
        };
        let (Some(dir_offset), Some(dir_size)) = (probe_u32_le(src, 4), probe_u32_le(src, 8))
        else {
            return false;
        };

        magic == self.magic
            && u64::from(dir_offset) >= HEADER_SIZE
            && u64::from(dir_size) % self.record_size() == 0
            && u64::from(dir_offset) + u64::from(dir_size) <= src.size()
    }

    #[instrument(skip_all, fields(format = %self.id), err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if mc.size() < HEADER_SIZE as usize {
            return Err(Error::MalformedHeader("pak header is truncated".into()));
        }

        let header = PakHeader::read(mc)?;
        if header.magic != self.magic {
            return Err(Error::MalformedHeader(format!(
                "expected {} signature",
                String::from_utf8_lossy(&self.magic)
            )));
        }

        if u64::from(header.dir_size) % self.record_size() != 0
            || u64::from(header.dir_offset) + u64::from(header.dir_size) > mc.size() as u64
        {
            return Err(Error::CorruptDirectory(format!(
                "directory of {} bytes at {} does not fit the file",
                header.dir_size, header.dir_offset
            )));
        }

        let total = (u64::from(header.dir_size) / self.record_size()) as usize;
        mc.seek_to(SeekFrom::Start(header.dir_offset.into()))?;
        for index in 0..total {
            archive.report_progress(index, total, "Reading pak directory");

            let path = read_name(&mc.read_vec(self.name_size)?);
            let offset = mc.read_u32_le()?;
            let size = mc.read_u32_le()?;
            debug!(path, offset, size, "file");

            let (dir, name) = split_path(&path);
            if name.is_empty() {
                return Err(Error::CorruptDirectory(format!(
                    "record {index} has no file name"
                )));
            }

            let entry = table_entry(archive, mc, name, offset.into(), size.into())?;
            archive.insert_parsed(dir, entry);
        }
        archive.report_progress(total, total, "Reading pak directory");

        Ok(())
    }

    #[instrument(skip_all, fields(format = %self.id), err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let mut names = NameFitter::new(self.capabilities());

        let (offsets, dir_offset) = layout(HEADER_SIZE, &entries);
        let dir_size = entries.len() as u64 * self.record_size();

        mc.resize((dir_offset + dir_size) as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;

        PakHeader {
            magic: self.magic,
            dir_offset: to_u32(dir_offset, "directory offset")?,
            dir_size: to_u32(dir_size, "directory")?,
        }
        .write(mc)?;

        for (_, entry) in &entries {
            mc.write_bytes(entry.loaded_data()?)?;
        }

        for ((path, entry), offset) in entries.iter().zip(offsets) {
            let path = names.fit(path)?;
            let mut field = vec![0u8; self.name_size];
            field[..path.len()].copy_from_slice(path.as_bytes());

            mc.write_bytes(&field)?;
            mc.write_u32_le(to_u32(offset, "file offset")?)?;
            mc.write_u32_le(to_u32(entry.size(), "file")?)?;
        }

        Ok(names.into_warnings())
    }
}
