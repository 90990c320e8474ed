//! GZip streams, presented as an archive holding the one decompressed file.
//!
//! The member header's file name, modification time, operating system and comment are kept
//! as archive properties so a rewrite carries them over.

use std::io::{Read, Write};

use flate2::read::{GzDecoder, MultiGzDecoder};
use flate2::{Compression, GzBuilder};
use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::entry::Entry;
use crate::error::{Error, Result, Warning};
use crate::formats::stream_entry_name;
use crate::handler::{entries_for_write, Capabilities, FormatHandler, FormatId};
use crate::source::{probe_bytes, DataSource};

const MIN_SIZE: u64 = 18;
const DEFLATE: u8 = 8;
const RESERVED_FLAGS: u8 = 0xE0;
/// Operating system byte for "unknown"
const OS_UNKNOWN: u8 = 255;

pub const MTIME_PROPERTY: &str = "gz.mtime";
pub const OS_PROPERTY: &str = "gz.os";
pub const COMMENT_PROPERTY: &str = "gz.comment";
/// Whether the member header stores the file name
pub const NAME_STORED_PROPERTY: &str = "gz.name_stored";

#[derive(Debug, Clone, Copy, Default)]
pub struct GzHandler;

impl FormatHandler for GzHandler {
    fn id(&self) -> FormatId {
        FormatId::Gz
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::single()
    }

    fn is_this_format(&self, src: &dyn DataSource) -> bool {
        if src.size() < MIN_SIZE {
            return false;
        }
        probe_bytes::<4>(src, 0).is_some_and(|head| {
            head[..3] == [0x1F, 0x8B, DEFLATE] && head[3] & RESERVED_FLAGS == 0
        })
    }

    #[instrument(skip_all, err)]
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()> {
        if !self.is_this_format(&*mc) {
            return Err(Error::MalformedHeader("not a gzip stream".into()));
        }

        let mut decoder = MultiGzDecoder::new(mc.data());
        let mut data = Vec::new();
        decoder
            .read_to_end(&mut data)
            .map_err(|e| Error::CorruptDirectory(format!("gzip stream is damaged: {e}")))?;
        debug!(packed = mc.size(), unpacked = data.len(), "decompressed");

        // Metadata comes from the first member only
        let mut stored_name = None;
        if let Some(header) = GzDecoder::new(mc.data()).header() {
            archive.insert_property(MTIME_PROPERTY, header.mtime());
            archive.insert_property(OS_PROPERTY, header.operating_system());
            if let Some(comment) = header.comment() {
                archive.insert_property(
                    COMMENT_PROPERTY,
                    String::from_utf8_lossy(comment).into_owned(),
                );
            }
            stored_name = header
                .filename()
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .filter(|n| !n.is_empty() && !n.contains('/'));
        }
        archive.insert_property(NAME_STORED_PROPERTY, stored_name.is_some());

        let name = stored_name
            .unwrap_or_else(|| stream_entry_name(archive, &[("gz", None), ("tgz", Some("tar"))]));
        archive.insert_parsed("", Entry::parsed(name, data, None));

        Ok(())
    }

    #[instrument(skip_all, err)]
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>> {
        let entries = entries_for_write(archive, self.capabilities())?;
        let property = |key: &str| archive.property(key);

        let mtime = property(MTIME_PROPERTY)
            .and_then(|p| p.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        let os = property(OS_PROPERTY)
            .and_then(|p| p.as_u64())
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(OS_UNKNOWN);
        let store_name = property(NAME_STORED_PROPERTY)
            .and_then(|p| p.as_u64())
            .map_or(true, |v| v != 0);

        let mut builder = GzBuilder::new().mtime(mtime).operating_system(os);
        if let Some((_, entry)) = entries.first().filter(|_| store_name) {
            // Header strings are NUL terminated
            let name: Vec<u8> = entry.name().bytes().filter(|b| *b != 0).collect();
            builder = builder.filename(name);
        }
        if let Some(comment) = property(COMMENT_PROPERTY).and_then(|p| p.as_str()) {
            builder = builder.comment(comment.replace('\0', ""));
        }

        let mut encoder = builder.write(Vec::new(), Compression::best());
        for (_, entry) in &entries {
            encoder.write_all(entry.loaded_data()?)?;
        }

        *mc = ByteBuffer::from(encoder.finish()?);
        Ok(Vec::new())
    }
}
