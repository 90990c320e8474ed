//! Chasm: The Rift `.bin` resource archives.
//!
//! A 6 byte header (`CSid` and a 16 bit file count) is followed by a fixed table of 2048
//! slots, used or not. Each 21 byte slot holds a length-prefixed name of up to 12 characters,
//! the file size and its offset. File data follows the table.

use std::io::SeekFrom;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result, Warning};
use crate::formats::layout;
use crate::handler::{
    entries_for_write, table_entry, to_u32, Capabilities, FormatHandler, FormatId, NameFitter,
};
use crate::source::{probe_bytes, probe_u16_le, DataSource};

const MAGIC: [u8; 4] = *b"CSid";
const HEADER_SIZE: u64 = 6;
const RECORD_SIZE: u64 = 21;
const NAME_SIZE: usize = 12;

/// Number of slots in the table, and so the most files an archive can hold
pub const MAX_ENTRIES: usize = 2048;

const TABLE_SIZE: u64 = MAX_ENTRIES as u64 * RECORD_SIZE;
const DATA_START: u64 = HEADER_SIZE + TABLE_SIZE;

#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little, magic = b"CSid")]
pub struct ChasmHeader {
    pub files: u16,
}

#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct ChasmRecord {
    pub name_length: u8,
    pub name: [u8; NAME_SIZE],
    pub size: u32,
    pub offset: u32,
}

impl ChasmRecord {
    fn name(&self) -> String {
        let length = usize::from(self.name_length).min(NAME_SIZE);
        String::from_utf8_lossy(&self.name[..length]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChasmBinHandler;

impl FormatHandler for ChasmBinHandler {
    fn id(&self) -> FormatId {
        FormatId::ChasmBin
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::flat(NAME_SIZE, true)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        if src.size() < DATA_START || probe_bytes::<4>(src, 0) != Some(MAGIC) {
            return false;
        }
        probe_u16_le(src, 4).is_some_and(|files| usize::from(files) <= MAX_ENTRIES)
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if (mc.size() as u64) < DATA_START || mc.slice(0, 4)? != MAGIC {
            return Err(Error::MalformedHeader(
                "missing CSid signature or file table".into(),
            ));
        }

        let header = ChasmHeader::read(mc)?;
        let total = usize::from(header.files);
        if total > MAX_ENTRIES {
            return Err(Error::CorruptDirectory(format!(
                "{total} files do not fit the {MAX_ENTRIES} slot table"
            )));
        }

        for index in 0..total {
            archive.report_progress(index, total, "Reading bin table");

            let record = ChasmRecord::read(mc)?;
            let name = record.name();
            debug!(name, offset = record.offset, size = record.size, "file");

            let entry = table_entry(archive, mc, name, record.offset.into(), record.size.into())?;
            archive.insert_parsed("", entry);
        }
        archive.report_progress(total, total, "Reading bin table");

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        if entries.len() > MAX_ENTRIES {
            return Err(Error::UnsupportedMutation(format!(
                "{} files do not fit the {MAX_ENTRIES} slot table",
                entries.len()
            )));
        }
        let mut names = NameFitter::new(self.capabilities());

        let (offsets, total) = layout(DATA_START, &entries);

        // Unused slots stay zeroed
        mc.resize(total as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;

        ChasmHeader {
            files: entries.len() as u16,
        }
        .write(mc)?;

        for ((_, entry), offset) in entries.iter().zip(&offsets) {
            let name = names.fit(entry.name())?;
            let mut field = [0u8; NAME_SIZE];
            field[..name.len()].copy_from_slice(name.as_bytes());

            ChasmRecord {
                name_length: name.len() as u8,
                name: field,
                size: to_u32(entry.size(), "file")?,
                offset: to_u32(*offset, "file offset")?,
            }
            .write(mc)?;
        }

        for ((_, entry), offset) in entries.iter().zip(offsets) {
            mc.seek_to(SeekFrom::Start(offset))?;
            mc.write_bytes(entry.loaded_data()?)?;
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
    use crate::error::{Error, Result, Warning};
    use crate::formats::chasm::{ChasmBinHandler, DATA_START};
    use crate::handler::{FormatHandler, FormatId};

    #[test]
    fn short_file_is_not_a_bin() {
        #[rustfmt::skip]
        let input = vec![
            0x43, 0x53, 0x69, 0x64,
            0x00, 0x00,
        ];
        assert!(!ChasmBinHandler.is_this_format(&ByteBuffer::from(input)));
    }

    #[test]
    fn too_many_files_is_not_a_bin() {
        let mut input = vec![0u8; DATA_START as usize];
        input[..4].copy_from_slice(b"CSid");
        input[4..6].copy_from_slice(&2049u16.to_le_bytes());
        assert!(!ChasmBinHandler.is_this_format(&ByteBuffer::from(input.clone())));

        let mut bin = Archive::new(FormatId::ChasmBin);
        assert!(matches!(
            bin.open(ByteBuffer::from(input)),
            Err(Error::CorruptDirectory(_))
        ));
    }

    #[test]
    fn long_names_are_cut_to_twelve() -> Result<()> {
        let mut bin = Archive::new(FormatId::ChasmBin);
        bin.add_entry(
            "",
            Entry::with_data("TWENTY_CHARACTERS.CE", vec![7; 4]),
            None,
        )?;

        let mc = bin.write()?;
        assert_eq!(
            bin.warnings(),
            &[Warning::NameTooLong {
                name: "TWENTY_CHARACTERS.CE".into(),
                truncated: "TWENTY_CHARA".into(),
                limit: 12
            }]
        );

        let mut reopened = Archive::new(FormatId::ChasmBin);
        reopened.open(mc)?;
        assert_eq!(reopened.entry_data("TWENTY_CHARA")?, &[7; 4]);

        Ok(())
    }

    #[test]
    fn table_has_fixed_size() -> Result<()> {
        let mut bin = Archive::new(FormatId::ChasmBin);
        bin.add_entry("", Entry::with_data("PAL.PAL", vec![1, 2]), None)?;
        bin.add_entry("", Entry::with_data("FONT.CEL", vec![3]), None)?;

        let mc = bin.write()?;
        assert_eq!(mc.size() as u64, DATA_START + 3);
        assert_eq!(&mc.data()[4..6], &[2, 0]);
        // Pascal style name in the first slot
        assert_eq!(mc.data()[6], 7);
        assert_eq!(&mc.data()[7..14], b"PAL.PAL");
        assert_eq!(&mc.data()[DATA_START as usize..], &[1, 2, 3]);

        Ok(())
    }
}
