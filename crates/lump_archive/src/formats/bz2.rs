//! BZip2 streams, presented as an archive holding the one decompressed file.

use std::io::{Read, Write};

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::entry::Entry;
use crate::error::{Error, Result, Warning};
use crate::formats::stream_entry_name;
use crate::handler::{entries_for_write, Capabilities, FormatHandler, FormatId};
use crate::source::{probe_bytes, DataSource};

const BLOCK_MAGIC: [u8; 6] = [0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
const END_OF_STREAM_MAGIC: [u8; 6] = [0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
const DEFAULT_LEVEL: u32 = 9;

/// Archive property holding the block size digit (1 to 9) of the stream
pub const LEVEL_PROPERTY: &str = "bz2.level";

#[derive(Debug, Clone, Copy, Default)]
pub struct Bz2Handler;

impl FormatHandler for Bz2Handler {
    fn id(&self) -> FormatId {
        FormatId::Bz2
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::single()
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        let Some(head) = probe_bytes::<10>(src, 0) else {
            return false;
        };

        &head[..3] == b"BZh"
            && (b'1'..=b'9').contains(&head[3])
            && (head[4..] == BLOCK_MAGIC || head[4..] == END_OF_STREAM_MAGIC)
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        if !self.is_this_format(&*mc) {
            return Err(Error::MalformedHeader("not a bzip2 stream".into()));
        }

        let mut data = Vec::new();
        MultiBzDecoder::new(mc.data())
            .read_to_end(&mut data)
            .map_err(|e| Error::CorruptDirectory(format!("bzip2 stream is damaged: {e}")))?;
        debug!(packed = mc.size(), unpacked = data.len(), "decompressed");

        archive.insert_property(LEVEL_PROPERTY, u32::from(mc.data()[3] - b'0'));

        let name = stream_entry_name(
            archive,
            &[("bz2", None), ("tbz", Some("tar")), ("tbz2", Some("tar"))],
        );
        archive.insert_parsed("", Entry::parsed(name, data, None));

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let level = archive
            .property(LEVEL_PROPERTY)
            .and_then(|p| p.as_u64())
            .and_then(|l| u32::try_from(l).ok())
            .filter(|l| (1..=9).contains(l))
            .unwrap_or(DEFAULT_LEVEL);

        let mut encoder = BzEncoder::new(Vec::new(), Compression::new(level));
        for (_, entry) in &entries {
            encoder.write_all(entry.loaded_data()?)?;
        }

        *mc = ByteBuffer::from(encoder.finish()?);
        Ok(Vec::new())
    }
}
