//! Build engine GRP archives (Duke Nukem 3D, Shadow Warrior, Blood).
//!
//! A 16 byte header (`KenSilverman` and a file count) is followed by one 16 byte record per
//! file: a 12 byte name and the file size. File data follows the directory in record order,
//! so offsets are implied.

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

const MAGIC: &[u8; 12] = b"KenSilverman";
const HEADER_SIZE: u64 = 16;
const RECORD_SIZE: u64 = 16;

#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little, magic = b"KenSilverman")]
pub struct GrpHeader {
    pub files: u32,
}

#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct GrpRecord {
    pub name: [u8; 12],
    pub size: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GrpHandler;

impl FormatHandler for GrpHandler {
    fn id(&self) -> FormatId {
        FormatId::Grp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::flat(12, true)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        if probe_bytes::<12>(src, 0).as_ref() != Some(MAGIC) {
            return false;
        }
        let Some(files) = probe_u32_le(src, 12) else {
            return false;
        };

        let mut end = HEADER_SIZE + u64::from(files) * RECORD_SIZE;
        if end > src.size() {
            return false;
        }
        for index in 0..u64::from(files) {
            let Some(size) = probe_u32_le(src, HEADER_SIZE + index * RECORD_SIZE + 12) else {
                return false;
            };
            end += u64::from(size);
        }
        end <= src.size()
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if mc.size() < HEADER_SIZE as usize || mc.slice(0, 12)? != MAGIC {
            return Err(Error::MalformedHeader("missing KenSilverman signature".into()));
        }

        let header = GrpHeader::read(mc)?;
        let mut offset = HEADER_SIZE + u64::from(header.files) * RECORD_SIZE;
        if offset > mc.size() as u64 {
            return Err(Error::CorruptDirectory(format!(
                "directory of {} files runs past the end of the file",
                header.files
            )));
        }

        let total = header.files as usize;
        for index in 0..total {
            archive.report_progress(index, total, "Reading grp directory");

            let record = GrpRecord::read(mc)?;
            let name = read_name(&record.name);
            debug!(name, offset, size = record.size, "file");

            let entry = table_entry(archive, mc, name, offset, record.size.into())?;
            archive.insert_parsed("", entry);
            offset += u64::from(record.size);
        }
        archive.report_progress(total, total, "Reading grp directory");

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let mut names = NameFitter::new(self.capabilities());

        let data_start = HEADER_SIZE + entries.len() as u64 * RECORD_SIZE;
        let total = data_start + entries.iter().map(|(_, e)| e.size()).sum::<u64>();

        mc.resize(total as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;

        GrpHeader {
            files: to_u32(entries.len() as u64, "file count")?,
        }
        .write(mc)?;

        for (_, entry) in &entries {
            let name = names.fit(entry.name())?;
            GrpRecord {
                name: name_field(&name),
                size: to_u32(entry.size(), "file")?,
            }
            .write(mc)?;
        }

        for (_, entry) in &entries {
            mc.write_bytes(entry.loaded_data()?)?;
        }

        Ok(names.into_warnings())
    }
}
