//! Dark Forces GOB archives.
//!
//! The 8 byte header holds `GOB\x0A` and the directory offset. The directory starts with a file
//! count, followed by 21 byte records: offset, size and a 13 byte name.

use std::io::SeekFrom;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result, Warning};
use crate::formats::layout;
use crate::handler::{
    entries_for_write, name_field, read_name, table_entry, to_u32, Capabilities, FormatHandler,
    FormatId, NameFitter,
};
use crate::source::{probe_bytes, probe_u32_le, DataSource};

const MAGIC: [u8; 4] = *b"GOB\x0A";
const HEADER_SIZE: u64 = 8;
const RECORD_SIZE: u64 = 21;

#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little, magic = b"GOB\x0A")]
pub struct GobHeader {
    pub dir_offset: u32,
}

#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct GobRecord {
    pub offset: u32,
    pub size: u32,
    pub name: [u8; 13],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GobHandler;

impl FormatHandler for GobHandler {
    fn id(&self) -> FormatId {
        FormatId::Gob
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::flat(12, true)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        if probe_bytes::<4>(src, 0) != Some(MAGIC) {
            return false;
        }
        let Some(dir_offset) = probe_u32_le(src, 4).map(u64::from) else {
            return false;
        };
        let Some(files) = probe_u32_le(src, dir_offset).map(u64::from) else {
            return false;
        };

        dir_offset >= HEADER_SIZE && dir_offset + 4 + files * RECORD_SIZE <= src.size()
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if mc.size() < HEADER_SIZE as usize || mc.slice(0, 4)? != MAGIC {
            return Err(Error::MalformedHeader("missing GOB signature".into()));
        }

        let header = GobHeader::read(mc)?;
        let dir_offset = u64::from(header.dir_offset);
        if dir_offset + 4 > mc.size() as u64 {
            return Err(Error::CorruptDirectory(format!(
                "directory offset {dir_offset} is beyond the end of the file"
            )));
        }

        mc.seek_to(SeekFrom::Start(dir_offset))?;
        let files = mc.read_u32_le()?;
        if dir_offset + 4 + u64::from(files) * RECORD_SIZE > mc.size() as u64 {
            return Err(Error::CorruptDirectory(format!(
                "directory of {files} files runs past the end of the file"
            )));
        }

        let total = files as usize;
        for index in 0..total {
            archive.report_progress(index, total, "Reading gob directory");

            let record = GobRecord::read(mc)?;
            let name = read_name(&record.name);
            debug!(name, offset = record.offset, size = record.size, "file");

            let entry = table_entry(archive, mc, name, record.offset.into(), record.size.into())?;
            archive.insert_parsed("", entry);
        }
        archive.report_progress(total, total, "Reading gob directory");

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let mut names = NameFitter::new(self.capabilities());

        let (offsets, dir_offset) = layout(HEADER_SIZE, &entries);
        let total = dir_offset + 4 + entries.len() as u64 * RECORD_SIZE;

        mc.resize(total as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;

        GobHeader {
            dir_offset: to_u32(dir_offset, "directory offset")?,
        }
        .write(mc)?;

        for (_, entry) in &entries {
            mc.write_bytes(entry.loaded_data()?)?;
        }

        mc.write_u32_le(to_u32(entries.len() as u64, "file count")?)?;
        for ((_, entry), offset) in entries.iter().zip(offsets) {
            let name = names.fit(entry.name())?;
            GobRecord {
                offset: to_u32(offset, "file offset")?,
                size: to_u32(entry.size(), "file")?,
                name: name_field(&name),
            }
            .write(mc)?;
        }

        Ok(names.into_warnings())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::archive::Archive;
    use crate::buffer::ByteBuffer;
    use crate::entry::Entry;
    use crate::error::{Error, Result};
    use crate::formats::gob::GobHandler;
    use crate::handler::{FormatHandler, FormatId};

    #[rustfmt::skip]
    fn one_file() -> Vec<u8> {
        vec![
            // Header
            0x47, 0x4F, 0x42, 0x0A,
            0x0B, 0x00, 0x00, 0x00,
            // Data
            0x01, 0x02, 0x03,
            // Directory
            0x01, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00,
            0x53, 0x45, 0x43, 0x42, 0x41, 0x53, 0x45, 0x2E, 0x4C, 0x45, 0x56, 0x00, 0x00,
        ]
    }

    #[test]
    fn open_and_write_back() -> Result<()> {
        assert!(GobHandler.is_this_format(&ByteBuffer::from(one_file())));

        let mut gob = Archive::new(FormatId::Gob);
        gob.open(ByteBuffer::from(one_file()))?;
        assert_eq!(gob.entry_data("SECBASE.LEV")?, &[1, 2, 3]);
        assert_eq!(gob.write()?.into_inner(), one_file());

        Ok(())
    }

    #[test]
    fn directory_outside_the_file() {
        let mut input = one_file();
        input[4] = 0x40;
        assert!(!GobHandler.is_this_format(&ByteBuffer::from(input.clone())));

        let mut gob = Archive::new(FormatId::Gob);
        assert!(matches!(
            gob.open(ByteBuffer::from(input)),
            Err(Error::CorruptDirectory(_))
        ));
    }

    #[test]
    fn flat_only() {
        let mut gob = Archive::new(FormatId::Gob);
        assert!(matches!(
            gob.add_entry("sub", Entry::new("A"), None),
            Err(Error::UnsupportedMutation(_))
        ));
        assert!(matches!(
            gob.create_dir("sub"),
            Err(Error::UnsupportedMutation(_))
        ));
    }
}
