//! Descent HOG archives.
//!
//! After the `DHF` signature, every file is stored inline as a 13 byte name, a 4 byte size and
//! the data itself. There is no directory; the archive is walked record by record.

use std::io::SeekFrom;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result, Warning};
use crate::handler::{
    entries_for_write, name_field, read_name, table_entry, to_u32, Capabilities, FormatHandler,
    FormatId, NameFitter,
};
use crate::source::{probe_bytes, probe_u32_le, DataSource};

const MAGIC: [u8; 3] = *b"DHF";
const RECORD_SIZE: u64 = 17;

#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct HogRecord {
    pub name: [u8; 13],
    pub size: u32,
}

/// Number of records, if they end exactly at the end of the file
fn count_records(src: &dyn DataSource) -> Option<usize> {
    let total = src.size();
    let mut pos = MAGIC.len() as u64;
    let mut count = 0;
    while pos < total {
        let size = probe_u32_le(src, pos + 13)?;
        pos += RECORD_SIZE + u64::from(size);
        count += 1;
    }
    (pos == total).then_some(count)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HogHandler;

impl FormatHandler for HogHandler {
    fn id(&self) -> FormatId {
        FormatId::Hog
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::flat(12, true)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        if probe_bytes::<3>(src, 0) != Some(MAGIC) {
            return false;
        }

        count_records(src).is_some()
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if mc.size() < MAGIC.len() || mc.slice(0, 3)? != MAGIC {
            return Err(Error::MalformedHeader("missing DHF signature".into()));
        }

        let total = count_records(&*mc).ok_or_else(|| {
            Error::CorruptDirectory("records do not line up with the end of the file".into())
        })?;

        let mut pos = mc.seek_to(SeekFrom::Start(3))? as u64;
        for index in 0..total {
            archive.report_progress(index, total, "Reading hog records");

            let record = HogRecord::read(mc)?;
            let name = read_name(&record.name);
            let offset = pos + RECORD_SIZE;
            debug!(name, offset, size = record.size, "file");

            let entry = table_entry(archive, mc, name, offset, record.size.into())?;
            archive.insert_parsed("", entry);

            pos = offset + u64::from(record.size);
            mc.seek_to(SeekFrom::Start(pos))?;
        }
        archive.report_progress(total, total, "Reading hog records");

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let mut names = NameFitter::new(self.capabilities());

        let total = MAGIC.len() as u64
            + entries
                .iter()
                .map(|(_, e)| RECORD_SIZE + e.size())
                .sum::<u64>();

        mc.resize(total as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;
        mc.write_bytes(&MAGIC)?;

        for (index, (_, entry)) in entries.iter().enumerate() {
            archive.report_progress(index, entries.len(), "Writing hog data");

            let name = names.fit(entry.name())?;
            HogRecord {
                name: name_field(&name),
                size: to_u32(entry.size(), "file")?,
            }
            .write(mc)?;
            mc.write_bytes(entry.loaded_data()?)?;
        }

        Ok(names.into_warnings())
    }
}
