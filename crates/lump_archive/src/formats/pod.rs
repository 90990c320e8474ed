//! Terminal Velocity POD archives.
//!
//! | Offset | Field   | Description                             |
//! |--------|---------|-----------------------------------------|
//! | 0x00   | count   | Number of files                         |
//! | 0x04   | id      | 80 byte description, NUL padded         |
//! | 0x54   | records | 40 bytes each: name[32], size, offset   |
//!
//! Names are full paths separated by `\`. POD has no signature, so detection relies on the
//! table making sense and the format is tried last.

use std::io::SeekFrom;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::directory::split_path;
use crate::error::{Error, Result, Warning};
use crate::formats::layout;
use crate::handler::{
    entries_for_write, name_field, read_name, table_entry, to_u32, Capabilities, FormatHandler,
    FormatId, NameFitter,
};
use crate::source::{probe_bytes, probe_u32_le, DataSource};

const HEADER_SIZE: u64 = 84;
const RECORD_SIZE: u64 = 40;
const NAME_SIZE: usize = 32;

/// Archive property holding the description from the header
pub const ID_PROPERTY: &str = "pod.id";

#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct PodHeader {
    pub files: u32,
    pub id: [u8; 80],
}

#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct PodRecord {
    pub name: [u8; NAME_SIZE],
    pub size: u32,
    pub offset: u32,
}

fn is_text(raw: &[u8]) -> bool {
    raw.iter().all(|b| *b == 0 || (0x20..0x7F).contains(b))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PodHandler;

impl FormatHandler for PodHandler {
    fn id(&self) -> FormatId {
        FormatId::Pod
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::tree(NAME_SIZE - 1)
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        let Some(files) = probe_u32_le(src, 0).map(u64::from) else {
            return false;
        };
        let Some(id) = probe_bytes::<80>(src, 4) else {
            return false;
        };
        if !is_text(&id) || HEADER_SIZE + files * RECORD_SIZE > src.size() {
            return false;
        }

        (0..files).all(|index| {
            let at = HEADER_SIZE + index * RECORD_SIZE;
            let (Some(name), Some(size), Some(offset)) = (
                probe_bytes::<NAME_SIZE>(src, at),
                probe_u32_le(src, at + 32),
                probe_u32_le(src, at + 36),
            ) else {
                return false;
            };
            name[0] != 0 && is_text(&name) && u64::from(offset) + u64::from(size) <= src.size()
        })
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        mc.seek_to(SeekFrom::Start(0))?;
        if mc.size() < HEADER_SIZE as usize {
            return Err(Error::MalformedHeader("pod header is truncated".into()));
        }

        let header = PodHeader::read(mc)?;
        if HEADER_SIZE + u64::from(header.files) * RECORD_SIZE > mc.size() as u64 {
            return Err(Error::CorruptDirectory(format!(
                "directory of {} files runs past the end of the file",
                header.files
            )));
        }

        archive.insert_property(ID_PROPERTY, read_name(&header.id));

        let total = header.files as usize;
        for index in 0..total {
            archive.report_progress(index, total, "Reading pod directory");

            let record = PodRecord::read(mc)?;
            let path = read_name(&record.name).replace('\\', "/");
            debug!(path, offset = record.offset, size = record.size, "file");

            let (dir, name) = split_path(&path);
            if name.is_empty() {
                return Err(Error::CorruptDirectory(format!(
                    "record {index} has no file name"
                )));
            }

            let entry = table_entry(archive, mc, name, record.offset.into(), record.size.into())?;
            archive.insert_parsed(dir, entry);
        }
        archive.report_progress(total, total, "Reading pod directory");

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let mut names = NameFitter::new(self.capabilities());

        let data_start = HEADER_SIZE + entries.len() as u64 * RECORD_SIZE;
        let (offsets, total) = layout(data_start, &entries);

        let id = archive
            .property(ID_PROPERTY)
            .and_then(|p| p.as_str())
            .unwrap_or_default();

        mc.resize(total as usize, false);
        mc.seek_to(SeekFrom::Start(0))?;

        PodHeader {
            files: to_u32(entries.len() as u64, "file count")?,
            id: name_field(id),
        }
        .write(mc)?;

        for ((path, entry), offset) in entries.iter().zip(offsets) {
            let path = names.fit(&path.replace('/', "\\"))?;
            PodRecord {
                name: name_field(&path),
                size: to_u32(entry.size(), "file")?,
                offset: to_u32(offset, "file offset")?,
            }
            .write(mc)?;
        }

        for (_, entry) in &entries {
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
    use crate::entry::{Entry, TypeTag};
    use crate::error::Result;
    use crate::formats::pod::{PodHandler, ID_PROPERTY};
    use crate::handler::{FormatHandler, FormatId};

    fn pod_with_tree() -> Result<ByteBuffer> {
        let mut pod = Archive::new(FormatId::Pod);
        pod.set_property(ID_PROPERTY, "Startup pod");
        pod.add_entry("", Entry::with_data("STARTUP.CFG", b"x".to_vec()), None)?;
        pod.add_entry("ART", Entry::with_data("LOGO.RAW", vec![5; 6]), None)?;
        pod.add_entry("ART/FONTS", Entry::with_data("BIG.FNT", vec![6; 2]), None)?;
        pod.write()
    }

    #[test]
    fn backslash_paths_build_the_tree() -> Result<()> {
        let mc = pod_with_tree()?;
        assert!(PodHandler.is_this_format(&mc));
        assert_eq!(&mc.data()[124..136], b"ART\\LOGO.RAW");

        let mut pod = Archive::new(FormatId::Pod);
        pod.open(mc)?;

        assert_eq!(
            pod.property(ID_PROPERTY).and_then(|p| p.as_str()),
            Some("Startup pod")
        );
        assert_eq!(pod.num_entries(), 3);
        assert_eq!(pod.entry_data("ART/FONTS/BIG.FNT")?, &[6, 6]);
        assert!(pod.dir("ART/FONTS").is_some());

        Ok(())
    }

    #[test]
    fn folder_markers_are_not_written() -> Result<()> {
        let mut pod = Archive::new(FormatId::Pod);
        let mut marker = Entry::new("EMPTY");
        marker.set_type_tag(TypeTag::folder());
        pod.add_entry("SOUNDS", marker, None)?;
        pod.add_entry("", Entry::with_data("A.TXT", b"a".to_vec()), None)?;

        let mc = pod.write()?;
        assert_eq!(&mc.data()[0..4], &[1, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn binary_noise_is_not_a_pod() {
        let mut input = vec![0xFFu8; 200];
        input[0..4].copy_from_slice(&1u32.to_le_bytes());
        assert!(!PodHandler.is_this_format(&ByteBuffer::from(input)));
    }
}
