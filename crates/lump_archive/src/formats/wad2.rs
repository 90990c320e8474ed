//! Quake WAD2 and Half-Life WAD3 texture archives.
//!
//! The header matches Doom's WAD (`WAD2`/`WAD3`, count, directory offset), but directory
//! records are 32 bytes:
//!
//! | Offset | Field       | Description                                  |
//! |--------|-------------|----------------------------------------------|
//! | 0x00   | offset      | Position of the lump data                    |
//! | 0x04   | dsize       | Size of the lump on disk                     |
//! | 0x08   | size        | Size of the lump once uncompressed           |
//! | 0x0C   | type        | Lump type (palette, miptex, qpic...)         |
//! | 0x0D   | compression | Compression flag, 0 when stored              |
//! | 0x0E   | padding     | 2 unused bytes                               |
//! | 0x10   | name        | 16 bytes, NUL padded                         |

use std::io::SeekFrom;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::entry::{Entry, EntryState};
use crate::error::{Error, Result, Warning};
use crate::formats::layout;
use crate::handler::{
    entries_for_write, name_field, read_name, table_entry, to_u32, Capabilities, FormatHandler,
    FormatId, NameFitter,
};
use crate::source::{probe_bytes, probe_u32_le, DataSource};

const HEADER_SIZE: u64 = 12;
const RECORD_SIZE: u64 = 32;

/// Archive property holding `WAD2` or `WAD3`
pub const VERSION_PROPERTY: &str = "wad2.version";
/// Entry property holding the lump type byte
pub const TYPE_PROPERTY: &str = "wad2.type";
/// Entry property holding the compression flag
pub const COMPRESSION_PROPERTY: &str = "wad2.compression";
/// Entry property holding the uncompressed size, kept only when it differs from the size on disk
pub const SIZE_PROPERTY: &str = "wad2.size";

#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct Wad2Header {
    pub version: [u8; 4],
    pub lumps: u32,
    pub dir_offset: u32,
}

#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct Wad2Record {
    pub offset: u32,
    pub disk_size: u32,
    pub size: u32,
    pub kind: u8,
    pub compression: u8,
    pub padding: u16,
    pub name: [u8; 16],
}

fn is_wad2_version(version: &[u8; 4]) -> bool {
    version == b"WAD2" || version == b"WAD3"
}

fn byte_property(entry: &Entry, key: &str) -> u8 {
    entry
        .property(key)
        .and_then(|p| p.as_u64())
        .and_then(|v| u8::try_from(v).ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Wad2Handler;

impl FormatHandler for Wad2Handler {
    fn id(&self) -> FormatId {
        FormatId::Wad2
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::flat(15, true)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        let Some(version) = probe_bytes::<4>(src, 0) else {
            return false;
        };
        let (Some(lumps), Some(dir_offset)) = (probe_u32_le(src, 4), probe_u32_le(src, 8)) else {
            return false;
        };

        is_wad2_version(&version)
            && u64::from(dir_offset) >= HEADER_SIZE
            && u64::from(dir_offset) + u64::from(lumps) * RECORD_SIZE <= src.size()
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if mc.size() < HEADER_SIZE as usize {
            return Err(Error::MalformedHeader("wad2 header is truncated".into()));
        }

        let header = Wad2Header::read(mc)?;
        if !is_wad2_version(&header.version) {
            return Err(Error::MalformedHeader("not a WAD2 or WAD3 file".into()));
        }

        let dir_end = u64::from(header.dir_offset) + u64::from(header.lumps) * RECORD_SIZE;
        if dir_end > mc.size() as u64 {
            return Err(Error::CorruptDirectory(format!(
                "directory of {} lumps at {} runs past the end of the file",
                header.lumps, header.dir_offset
            )));
        }

        archive.insert_property(
            VERSION_PROPERTY,
            String::from_utf8_lossy(&header.version).into_owned(),
        );

        let total = header.lumps as usize;
        mc.seek_to(SeekFrom::Start(header.dir_offset.into()))?;
        for index in 0..total {
            archive.report_progress(index, total, "Reading wad2 directory");

            let record = Wad2Record::read(mc)?;
            let name = read_name(&record.name);
            debug!(
                name,
                offset = record.offset,
                disk_size = record.disk_size,
                kind = record.kind,
                "lump"
            );

            let mut entry = table_entry(
                archive,
                mc,
                name,
                record.offset.into(),
                record.disk_size.into(),
            )?
            .with_property(TYPE_PROPERTY, record.kind)
            .with_property(COMPRESSION_PROPERTY, record.compression);
            if record.size != record.disk_size {
                entry = entry.with_property(SIZE_PROPERTY, record.size);
            }

            archive.insert_parsed("", entry);
        }
        archive.report_progress(total, total, "Reading wad2 directory");

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let mut names = NameFitter::new(self.capabilities());

        let (offsets, dir_offset) = layout(HEADER_SIZE, &entries);
        let total = dir_offset + entries.len() as u64 * RECORD_SIZE;

        let version = match archive.property(VERSION_PROPERTY).and_then(|p| p.as_str()) {
            Some("WAD3") => *b"WAD3",
            _ => *b"WAD2",
        };

        mc.resize(total as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;

        Wad2Header {
            version,
            lumps: to_u32(entries.len() as u64, "lump count")?,
            dir_offset: to_u32(dir_offset, "directory offset")?,
        }
        .write(mc)?;

        for (_, entry) in &entries {
            mc.write_bytes(entry.loaded_data()?)?;
        }

        for ((_, entry), offset) in entries.iter().zip(offsets) {
            let disk_size = to_u32(entry.size(), "lump")?;

            // A stored uncompressed size only holds while the payload is the one it came with
            let size = match entry.property(SIZE_PROPERTY).and_then(|p| p.as_u64()) {
                Some(size) if entry.state() == EntryState::Unmodified => to_u32(size, "lump")?,
                _ => disk_size,
            };

            let name = names.fit(entry.name())?;
            Wad2Record {
                offset: to_u32(offset, "lump offset")?,
                disk_size,
                size,
                kind: byte_property(entry, TYPE_PROPERTY),
                compression: byte_property(entry, COMPRESSION_PROPERTY),
                padding: 0,
                name: name_field(&name),
            }
            .write(mc)?;
        }

        Ok(names.into_warnings())
    }

    fn entry_written(&self, entry: &mut Entry) {
        // The stored size described the old content
        entry.remove_property(SIZE_PROPERTY);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::archive::Archive;
    use crate::buffer::ByteBuffer;
    use crate::entry::{Entry, PropertyValue};
    use crate::error::{Error, Result};
    use crate::formats::wad2::{
        Wad2Handler, COMPRESSION_PROPERTY, SIZE_PROPERTY, TYPE_PROPERTY, VERSION_PROPERTY,
    };
    use crate::handler::{FormatHandler, FormatId};

    #[rustfmt::skip]
    fn one_texture() -> Vec<u8> {
        vec![
            // Header
            0x57, 0x41, 0x44, 0x32,
            0x01, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            // Data
            0x01, 0x02, 0x03, 0x04,
            // Directory
            0x0C, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00,
            0x44, 0x01, 0x00, 0x00,
            0x57, 0x41, 0x4C, 0x4C, 0x31, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]
    }

    #[test]
    fn open_keeps_record_fields() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad2);
        wad.open(ByteBuffer::from(one_texture()))?;

        assert_eq!(
            wad.property(VERSION_PROPERTY).and_then(|p| p.as_str()),
            Some("WAD2")
        );
        let wall = wad.entry("WALL1").unwrap();
        assert_eq!(wall.property(TYPE_PROPERTY), Some(&PropertyValue::UInt(0x44)));
        assert_eq!(wall.property(COMPRESSION_PROPERTY), Some(&PropertyValue::UInt(1)));
        assert_eq!(wall.property(SIZE_PROPERTY), Some(&PropertyValue::UInt(8)));
        assert_eq!(wad.entry_data("WALL1")?, &[1, 2, 3, 4]);

        Ok(())
    }

    #[test]
    fn unmodified_archive_writes_back_identically() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad2);
        wad.open(ByteBuffer::from(one_texture()))?;
        assert_eq!(wad.write()?.into_inner(), one_texture());
        Ok(())
    }

    #[test]
    fn edited_lump_drops_stale_size() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad2);
        wad.open(ByteBuffer::from(one_texture()))?;
        wad.set_entry_data("WALL1", vec![9; 6])?;

        let out = wad.write()?;
        // size field of the only record
        assert_eq!(&out.data()[26..30], &[6, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn edited_lump_writes_the_same_twice() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad2);
        wad.open(ByteBuffer::from(one_texture()))?;
        wad.set_entry_data("WALL1", vec![9; 6])?;

        let first = wad.write()?;
        let second = wad.write()?;
        assert_eq!(first.data(), second.data());
        assert_eq!(wad.entry("WALL1").unwrap().property(SIZE_PROPERTY), None);
        Ok(())
    }

    #[test]
    fn texture_outside_the_file_is_corrupt() {
        #[rustfmt::skip]
        let mut input = vec![
            // Header
            0x57, 0x41, 0x44, 0x33,
            0x01, 0x00, 0x00, 0x00,
            0x0C, 0x00, 0x00, 0x00,
            // Directory
            0x14, 0x00, 0x00, 0x00,
            0x64, 0x00, 0x00, 0x00,
            0x64, 0x00, 0x00, 0x00,
            0x43, 0x00, 0x00, 0x00,
            0x47, 0x4C, 0x4F, 0x57, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        input.resize(50, 0);

        assert!(Wad2Handler.is_this_format(&ByteBuffer::from(input.clone())));

        let mut wad = Archive::new(FormatId::Wad2);
        assert!(matches!(
            wad.open(ByteBuffer::from(input)),
            Err(Error::CorruptDirectory(_))
        ));
        assert_eq!(wad.num_entries(), 0);
    }

    #[test]
    fn names_are_unique() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad2);
        wad.add_entry("", Entry::with_data("SKY", vec![1]), None)?;
        assert!(matches!(
            wad.add_entry("", Entry::with_data("sky", vec![2]), None),
            Err(Error::UnsupportedMutation(_))
        ));
        Ok(())
    }
}
