//! Doom WAD archives.
//!
//! | Offset (bytes) | Field            | Description                                  |
//! |----------------|------------------|----------------------------------------------|
//! | 0x0000         | Identification   | 4 bytes: `IWAD` or `PWAD`                    |
//! | 0x0004         | Lump Count       | 4 bytes: Number of lumps                     |
//! | 0x0008         | Directory Offset | 4 bytes: Offset to the directory             |
//!
//! Each directory record is 16 bytes: lump offset, lump size and an 8 byte, NUL padded name.
//! Lump names are not unique; map lumps such as `THINGS` repeat once per map.

use std::io::SeekFrom;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::entry::Entry;
use crate::error::{Error, Result, Warning};
use crate::formats::layout;
use crate::handler::{
    entries_for_write, name_field, read_name, table_entry, to_u32, Capabilities, FormatHandler,
    FormatId, NameFitter,
};
use crate::source::{probe_bytes, probe_u32_le, DataSource};

const HEADER_SIZE: u64 = 12;
const RECORD_SIZE: u64 = 16;

/// Archive property holding `IWAD` or `PWAD`
pub const KIND_PROPERTY: &str = "wad.kind";

/// WAD file header
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct WadHeader {
    /// `IWAD` for game data, `PWAD` for patches
    pub kind: [u8; 4],

    /// The number of lumps in the directory
    pub lumps: u32,

    /// The offset from the beginning of the file where the directory starts
    pub dir_offset: u32,
}

/// WAD directory record
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct WadRecord {
    pub offset: u32,
    pub size: u32,
    pub name: [u8; 8],
}

fn is_wad_kind(kind: &[u8; 4]) -> bool {
    kind == b"IWAD" || kind == b"PWAD"
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WadHandler;

impl FormatHandler for WadHandler {
    fn id(&self) -> FormatId {
        FormatId::Wad
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::flat(8, false)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        let Some(kind) = probe_bytes::<4>(src, 0) else {
            return false;
        };
        let (Some(lumps), Some(dir_offset)) = (probe_u32_le(src, 4), probe_u32_le(src, 8)) else {
            return false;
        };

        is_wad_kind(&kind)
            && u64::from(dir_offset) >= HEADER_SIZE
            && u64::from(dir_offset) + u64::from(lumps) * RECORD_SIZE <= src.size()
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if mc.size() < HEADER_SIZE as usize {
            return Err(Error::MalformedHeader("wad header is truncated".into()));
        }

        let header = WadHeader::read(mc)?;
        if !is_wad_kind(&header.kind) {
            return Err(Error::MalformedHeader("not an IWAD or PWAD".into()));
        }

        let dir_end = u64::from(header.dir_offset) + u64::from(header.lumps) * RECORD_SIZE;
        if dir_end > mc.size() as u64 {
            return Err(Error::CorruptDirectory(format!(
                "directory of {} lumps at {} runs past the end of the file",
                header.lumps, header.dir_offset
            )));
        }

        archive.insert_property(
            KIND_PROPERTY,
            String::from_utf8_lossy(&header.kind).into_owned(),
        );

        let total = header.lumps as usize;
        mc.seek_to(SeekFrom::Start(header.dir_offset.into()))?;
        for index in 0..total {
            archive.report_progress(index, total, "Reading wad directory");

            let record = WadRecord::read(mc)?;
            let name = read_name(&record.name);
            debug!(name, offset = record.offset, size = record.size, "lump");

            // Markers have no data and often carry a meaningless offset
            let entry = if record.size == 0 {
                Entry::parsed(name, Vec::new(), None)
            } else {
                table_entry(archive, mc, name, record.offset.into(), record.size.into())?
            };
            archive.insert_parsed("", entry);
        }
        archive.report_progress(total, total, "Reading wad directory");

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let caps = self.capabilities();
        let entries = entries_for_write(archive, caps)?;
        let mut names = NameFitter::new(self.capabilities());

        let (offsets, dir_offset) = layout(HEADER_SIZE, &entries);
        let total = dir_offset + entries.len() as u64 * RECORD_SIZE;

        let kind = match archive.property(KIND_PROPERTY).and_then(|p| p.as_str()) {
            Some("IWAD") => *b"IWAD",
            _ => *b"PWAD",
        };

        mc.resize(total as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;

        WadHeader {
            kind,
            lumps: to_u32(entries.len() as u64, "lump count")?,
            dir_offset: to_u32(dir_offset, "directory offset")?,
        }
        .write(mc)?;

        for (index, (_, entry)) in entries.iter().enumerate() {
            archive.report_progress(index, entries.len(), "Writing wad data");
            mc.write_bytes(entry.loaded_data()?)?;
        }

        for ((_, entry), offset) in entries.iter().zip(offsets) {
            let name = names.fit(entry.name())?;
            WadRecord {
                offset: to_u32(offset, "lump offset")?,
                size: to_u32(entry.size(), "lump")?,
                name: name_field(&name),
            }
            .write(mc)?;
        }

        Ok(names.into_warnings())
    }
}

#[cfg(test)]
mod test {
    use binrw::BinRead;
    use pretty_assertions::assert_eq;

    use crate::archive::Archive;
    use crate::buffer::ByteBuffer;
    use crate::entry::{Content, Entry};
    use crate::error::{Error, Result};
    use crate::formats::wad::{WadHandler, WadHeader, KIND_PROPERTY};
    use crate::handler::{FormatHandler, FormatId};
    use crate::options::OpenOptions;

    #[rustfmt::skip]
    fn two_lumps() -> Vec<u8> {
        vec![
            // Header
            0x50, 0x57, 0x41, 0x44,
            0x02, 0x00, 0x00, 0x00,
            0x11, 0x00, 0x00, 0x00,
            // Data
            0x48, 0x65, 0x6C, 0x6C, 0x6F,
            // Directory
            0x0C, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00,
            0x48, 0x45, 0x4C, 0x4C, 0x4F, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x4D, 0x41, 0x50, 0x30, 0x31, 0x00, 0x00, 0x00,
        ]
    }

    #[test]
    fn read_header() -> Result<()> {
        let mut mc = ByteBuffer::from(two_lumps());
        let header = WadHeader::read(&mut mc)?;
        assert_eq!(
            header,
            WadHeader {
                kind: *b"PWAD",
                lumps: 2,
                dir_offset: 17
            }
        );
        Ok(())
    }

    #[test]
    fn detect() {
        assert!(WadHandler.is_this_format(&ByteBuffer::from(two_lumps())));

        let mut bad_magic = two_lumps();
        bad_magic[0] = b'X';
        assert!(!WadHandler.is_this_format(&ByteBuffer::from(bad_magic)));

        let mut truncated = two_lumps();
        truncated.truncate(40);
        assert!(!WadHandler.is_this_format(&ByteBuffer::from(truncated)));
    }

    #[test]
    fn open_defers_content() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad);
        wad.open(ByteBuffer::from(two_lumps()))?;

        assert_eq!(wad.num_entries(), 2);
        assert_eq!(
            wad.property(KIND_PROPERTY).and_then(|p| p.as_str()),
            Some("PWAD")
        );

        let hello = wad.entry("HELLO").unwrap();
        assert_eq!(hello.content(), &Content::Deferred { offset: 12, size: 5 });
        assert_eq!(wad.entry_data("HELLO")?, b"Hello");

        let marker = wad.entry("MAP01").unwrap();
        assert_eq!(marker.size(), 0);
        assert!(marker.is_loaded());

        Ok(())
    }

    #[test]
    fn open_eagerly() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad)
            .with_options(OpenOptions::builder().eager_load(true).build());
        wad.open(ByteBuffer::from(two_lumps()))?;
        assert_eq!(wad.entry("HELLO").and_then(|e| e.data()), Some(&b"Hello"[..]));
        Ok(())
    }

    #[test]
    fn lump_outside_the_file_is_corrupt() {
        let mut input = two_lumps();
        // Lump size 5 -> 50
        input[21] = 50;

        let mut wad = Archive::new(FormatId::Wad);
        assert!(matches!(
            wad.open(ByteBuffer::from(input)),
            Err(Error::CorruptDirectory(_))
        ));
        assert_eq!(wad.num_entries(), 0);
    }

    #[test]
    fn write_matches_layout() -> Result<()> {
        let mut wad = Archive::new(FormatId::Wad);
        wad.add_entry("", Entry::with_data("HELLO", b"Hello".to_vec()), None)?;
        wad.add_entry("", Entry::new("MAP01"), None)?;

        let out = wad.write()?;
        let mut expected = two_lumps();
        // Markers are written at the offset where they sit
        expected[33] = 0x11;
        assert_eq!(
            format!("{:02X?}", out.data()),
            format!("{:02X?}", expected)
        );
        assert!(!wad.is_modified());

        Ok(())
    }
}
