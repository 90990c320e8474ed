//! Format detection over an ordered list of handlers.

use std::path::Path;

use tracing::{debug, instrument};

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::handler::{FormatHandler, FormatId};
use crate::options::OpenOptions;
use crate::source::{DataSource, FileSource};

/// Detection order of the standard registry. Formats with strong signatures come first, the
/// compressed wrappers after them, and POD last because it has no signature at all.
const PRIORITY: [FormatId; 11] = [
    FormatId::Wad,
    FormatId::Wad2,
    FormatId::Pak,
    FormatId::Sin,
    FormatId::Grp,
    FormatId::Gob,
    FormatId::ChasmBin,
    FormatId::Hog,
    FormatId::Bz2,
    FormatId::Gz,
    FormatId::Pod,
];

/// Ordered set of format handlers, asked in turn whether they recognise some data
#[derive(Clone)]
pub struct FormatRegistry {
    handlers: Vec<&'static dyn FormatHandler>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.id()))
            .finish()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FormatRegistry {
    /// Every supported format, in detection order
    pub fn standard() -> Self {
        Self::new(PRIORITY)
    }

    /// A registry trying only `formats`, in the given order
    pub fn new(formats: impl IntoIterator<Item = FormatId>) -> Self {
        Self {
            handlers: formats.into_iter().map(FormatId::handler).collect(),
        }
    }

    pub fn handlers(&self) -> &[&'static dyn FormatHandler] {
        &self.handlers
    }

    /// The first format recognising `src`
    #[instrument(skip_all, fields(size = src.size()))]
    pub fn detect(&self, src: &dyn DataSource) -> Option<FormatId> {
        let found = self
            .handlers
            .iter()
            .find(|h| h.is_this_format(src))
            .map(|h| h.id());
        debug!(?found, "detected format");
        found
    }

    /// Every format recognising `src`, in detection order
    pub fn candidates(&self, src: &dyn DataSource) -> Vec<FormatId> {
        self.handlers
            .iter()
            .filter(|h| h.is_this_format(src))
            .map(|h| h.id())
            .collect()
    }

    /// Detect the format of a file, reading only what the checks need
    pub fn detect_file(&self, path: impl AsRef<Path>) -> Result<Option<FormatId>> {
        let src = FileSource::open(path)?;
        Ok(self.detect(&src))
    }

    /// The first format usually stored with the extension `ext`, ignoring case
    pub fn by_extension(&self, ext: &str) -> Option<FormatId> {
        let ext = ext.trim_start_matches('.');
        self.handlers
            .iter()
            .map(|h| h.id())
            .find(|id| id.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Detect the format of `mc` and open it
    pub fn open_buffer(&self, mc: ByteBuffer, options: OpenOptions) -> Result<Archive> {
        let format = self.detect(&mc).ok_or(Error::UnknownFormat)?;
        let mut archive = Archive::new(format).with_options(options);
        archive.open(mc)?;
        Ok(archive)
    }

    /// Detect the format of the file at `path` and open it
    pub fn open_file(&self, path: impl AsRef<Path>, options: OpenOptions) -> Result<Archive> {
        let path = path.as_ref();
        let format = self.detect_file(path)?.ok_or(Error::UnknownFormat)?;
        let mut archive = Archive::new(format).with_options(options);
        archive.open_file(path)?;
        Ok(archive)
    }
}
