//! Archive entries: named units of payload data.

use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::source::DataSource;

/// Where an entry stands relative to the archive's on-disk state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryState {
    /// Created by the application and never written
    #[default]
    New,

    /// Matches what was last read from or written to disk
    Unmodified,

    /// Content or metadata changed since the last read or write
    Modified,

    /// Removed from its archive
    Deleted,
}

/// Content type assigned by a [`crate::hooks::Classifier`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag(Box<str>);

impl TypeTag {
    pub const FOLDER: &'static str = "folder";
    pub const MARKER: &'static str = "marker";
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(tag: impl Into<Box<str>>) -> Self {
        Self(tag.into())
    }

    /// Tag for zero-length entries that only stand in for a directory
    pub fn folder() -> Self {
        Self::new(Self::FOLDER)
    }

    pub fn marker() -> Self {
        Self::new(Self::MARKER)
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_folder(&self) -> bool {
        self.as_str() == Self::FOLDER
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format specific value attached to an entry or archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(String),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PropertyValue::UInt(v) => Some(*v),
            PropertyValue::Int(v) => u64::try_from(*v).ok(),
            PropertyValue::Bool(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(v) => Some(v),
            PropertyValue::String(v) => Some(v.as_bytes()),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<u8> for PropertyValue {
    fn from(value: u8) -> Self {
        PropertyValue::UInt(value.into())
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::UInt(value.into())
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::UInt(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        PropertyValue::Bytes(value)
    }
}

/// Ordered map of named properties
pub type Properties = IndexMap<String, PropertyValue>;

/// The payload of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Bytes held in memory
    Loaded(Vec<u8>),

    /// Bytes still sitting in the archive's backing source
    Deferred {
        /// Start of the payload in the source
        offset: u64,
        /// Length of the payload in the source
        size: u64,
    },
}

/// A named unit of data inside an archive
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    name: String,
    content: Content,
    size_on_disk: Option<u64>,
    offset_on_disk: Option<u64>,
    type_tag: Option<TypeTag>,
    state: EntryState,
    properties: Properties,
}

impl Entry {
    /// Create an empty entry owned by the application
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_data(name, Vec::new())
    }

    /// Create an entry owned by the application holding `data`
    pub fn with_data(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: Content::Loaded(data.into()),
            size_on_disk: None,
            offset_on_disk: None,
            type_tag: None,
            state: EntryState::New,
            properties: Properties::new(),
        }
    }

    /// Entry parsed from a directory table whose payload is left in the source
    pub(crate) fn deferred(name: impl Into<String>, offset: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            content: Content::Deferred { offset, size },
            size_on_disk: Some(size),
            offset_on_disk: Some(offset),
            type_tag: None,
            state: EntryState::Unmodified,
            properties: Properties::new(),
        }
    }

    /// Entry parsed from a directory table with its payload already copied out
    pub(crate) fn parsed(name: impl Into<String>, data: Vec<u8>, offset: Option<u64>) -> Self {
        let size = data.len() as u64;
        Self {
            name: name.into(),
            content: Content::Loaded(data),
            size_on_disk: offset.map(|_| size),
            offset_on_disk: offset,
            type_tag: None,
            state: EntryState::Unmodified,
            properties: Properties::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the content in bytes, whether loaded or not
    pub fn size(&self) -> u64 {
        match &self.content {
            Content::Loaded(data) => data.len() as u64,
            Content::Deferred { size, .. } => *size,
        }
    }

    /// Number of bytes the entry occupied in the file it was read from
    pub fn size_on_disk(&self) -> Option<u64> {
        self.size_on_disk
    }

    /// Where the entry's payload started in the file it was read from
    pub fn offset_on_disk(&self) -> Option<u64> {
        self.offset_on_disk
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.content, Content::Loaded(_))
    }

    /// Loaded content, `None` while it is still deferred
    pub fn data(&self) -> Option<&[u8]> {
        match &self.content {
            Content::Loaded(data) => Some(data),
            Content::Deferred { .. } => None,
        }
    }

    /// Loaded content, failing when it has not been fetched yet
    pub fn loaded_data(&self) -> Result<&[u8]> {
        self.data().ok_or_else(|| {
            Error::SourceUnavailable(format!("content of {} has not been loaded", self.name))
        })
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn type_tag(&self) -> Option<&TypeTag> {
        self.type_tag.as_ref()
    }

    /// Whether the entry is an empty placeholder standing in for a directory
    pub fn is_folder_marker(&self) -> bool {
        self.size() == 0 && self.type_tag.as_ref().is_some_and(TypeTag::is_folder)
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Rename the entry
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Replace the content of the entry
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.content = Content::Loaded(data.into());
        self.touch();
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
        self.touch();
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        let removed = self.properties.shift_remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Set the content type without changing the entry state
    pub fn set_type_tag(&mut self, tag: TypeTag) {
        self.type_tag = Some(tag);
    }

    pub(crate) fn clear_type_tag(&mut self) {
        self.type_tag = None;
    }

    /// Record a property read from disk without changing the entry state
    pub(crate) fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub(crate) fn set_state(&mut self, state: EntryState) {
        self.state = state;
    }

    /// Fetch deferred content from `source`.
    ///
    /// Loading is idempotent: an entry that already holds its bytes never touches the source.
    #[instrument(skip(self, source), fields(name = %self.name), err)]
    pub fn resolve(&mut self, source: Option<&dyn DataSource>) -> Result<()> {
        let Content::Deferred { offset, size } = self.content else {
            return Ok(());
        };

        if size == 0 {
            self.content = Content::Loaded(Vec::new());
            return Ok(());
        }

        let source = source.ok_or_else(|| {
            Error::SourceUnavailable(format!("{} has no backing source", self.name))
        })?;

        let data = source.read_vec(offset, size).map_err(|e| {
            Error::SourceUnavailable(format!("{} at {offset}+{size}: {e}", self.name))
        })?;
        debug!(offset, size, "loaded entry data");

        self.content = Content::Loaded(data);
        Ok(())
    }

    fn touch(&mut self) {
        if self.state == EntryState::Unmodified {
            self.state = EntryState::Modified;
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::buffer::ByteBuffer;
    use crate::entry::{Content, Entry, EntryState, PropertyValue};
    use crate::error::{Error, Result};

    #[test]
    fn new_entries_stay_new() {
        let mut entry = Entry::with_data("MAP01", b"data".to_vec());
        assert_eq!(entry.state(), EntryState::New);
        assert_eq!(entry.size(), 4);

        entry.set_data(Vec::new());
        entry.set_name("MAP02");
        assert_eq!(entry.state(), EntryState::New);
    }

    #[test]
    fn parsed_entries_become_modified() {
        let mut entry = Entry::deferred("THINGS", 12, 40);
        assert_eq!(entry.state(), EntryState::Unmodified);

        entry.set_type_tag(crate::entry::TypeTag::unknown());
        assert_eq!(entry.state(), EntryState::Unmodified);

        entry.set_property("wad2.type", 0x40u8);
        assert_eq!(entry.state(), EntryState::Modified);
        assert_eq!(entry.property("wad2.type"), Some(&PropertyValue::UInt(0x40)));
    }

    #[test]
    fn resolve_reads_once() -> Result<()> {
        let source = ByteBuffer::from(b"..payload..".to_vec());
        let mut entry = Entry::deferred("LUMP", 2, 7);
        assert_eq!(entry.data(), None);

        entry.resolve(Some(&source))?;
        assert_eq!(entry.data(), Some(&b"payload"[..]));

        // No source is needed once the bytes are in memory
        entry.resolve(None)?;
        assert_eq!(entry.content(), &Content::Loaded(b"payload".to_vec()));
        assert_eq!(entry.state(), EntryState::Unmodified);

        Ok(())
    }

    #[test]
    fn resolve_without_source_fails() {
        let mut entry = Entry::deferred("LUMP", 0, 4);
        assert!(matches!(
            entry.resolve(None),
            Err(Error::SourceUnavailable(_))
        ));
        assert!(!entry.is_loaded());

        let short = ByteBuffer::from(vec![0u8; 2]);
        assert!(matches!(
            entry.resolve(Some(&short)),
            Err(Error::SourceUnavailable(_))
        ));
    }
}
