//! The contract every archive format implements.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::archive::Archive;
use crate::buffer::ByteBuffer;
use crate::directory::split_path;
use crate::entry::Entry;
use crate::error::{Error, Result, Warning};
use crate::source::{DataSource, FileSource};

/// Identifies a supported archive format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatId {
    /// Doom IWAD/PWAD
    Wad,
    /// Quake WAD2 and Half-Life WAD3
    Wad2,
    /// Quake PAK
    Pak,
    /// SiN PAK
    Sin,
    /// Build engine GRP
    Grp,
    /// Dark Forces GOB
    Gob,
    /// Chasm: The Rift BIN
    ChasmBin,
    /// Descent HOG
    Hog,
    /// BZip2 compressed file
    Bz2,
    /// GZip compressed file
    Gz,
    /// Terminal Velocity POD
    Pod,
}

impl FormatId {
    pub const ALL: [FormatId; 11] = [
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

    /// Short identifier, as used on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            FormatId::Wad => "wad",
            FormatId::Wad2 => "wad2",
            FormatId::Pak => "pak",
            FormatId::Sin => "sin",
            FormatId::Grp => "grp",
            FormatId::Gob => "gob",
            FormatId::ChasmBin => "chasm_bin",
            FormatId::Hog => "hog",
            FormatId::Bz2 => "bz2",
            FormatId::Gz => "gz",
            FormatId::Pod => "pod",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FormatId::Wad => "Doom Wad Archive",
            FormatId::Wad2 => "Quake Wad2 Archive",
            FormatId::Pak => "Quake Pak Archive",
            FormatId::Sin => "SiN Pak Archive",
            FormatId::Grp => "Build Grp Archive",
            FormatId::Gob => "Dark Forces Gob Archive",
            FormatId::ChasmBin => "Chasm Bin Archive",
            FormatId::Hog => "Descent Hog Archive",
            FormatId::Bz2 => "BZip2 File",
            FormatId::Gz => "GZip File",
            FormatId::Pod => "Terminal Velocity Pod Archive",
        }
    }

    /// File extensions usually carried by this format, lower case and without the dot
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FormatId::Wad => &["wad", "iwad", "pwad"],
            FormatId::Wad2 => &["wad"],
            FormatId::Pak => &["pak"],
            FormatId::Sin => &["sin"],
            FormatId::Grp => &["grp"],
            FormatId::Gob => &["gob"],
            FormatId::ChasmBin => &["bin"],
            FormatId::Hog => &["hog"],
            FormatId::Bz2 => &["bz2", "tbz", "tbz2"],
            FormatId::Gz => &["gz", "tgz"],
            FormatId::Pod => &["pod"],
        }
    }

    /// The handler implementing this format
    pub fn handler(self) -> &'static dyn FormatHandler {
        crate::formats::handler(self)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FormatId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::CustomError(format!("unknown archive format {s}")))
    }
}

/// Structural limits of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Longest name (or path, for formats storing paths) that fits on disk
    pub max_name_length: Option<usize>,

    /// Whether entries may live in subdirectories
    pub supports_dirs: bool,

    /// Whether the archive wraps exactly one entry
    pub single_entry: bool,

    /// Whether names must be unique within a directory, ignoring ASCII case
    pub unique_names: bool,
}

impl Capabilities {
    /// A flat directory-table format with a name limit
    pub const fn flat(max_name_length: usize, unique_names: bool) -> Self {
        Self {
            max_name_length: Some(max_name_length),
            supports_dirs: false,
            single_entry: false,
            unique_names,
        }
    }

    /// A format storing full paths as entry names
    pub const fn tree(max_name_length: usize) -> Self {
        Self {
            max_name_length: Some(max_name_length),
            supports_dirs: true,
            single_entry: false,
            unique_names: true,
        }
    }

    /// A compressed stream around a single file
    pub const fn single() -> Self {
        Self {
            max_name_length: None,
            supports_dirs: false,
            single_entry: true,
            unique_names: true,
        }
    }
}

/// A structural change about to be made to an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation<'a> {
    AddEntry { dir: &'a str, name: &'a str },
    RemoveEntry { path: &'a str },
    RenameEntry { path: &'a str, name: &'a str },
    MoveEntry { path: &'a str, dir: &'a str },
    SwapEntries { a: &'a str, b: &'a str },
    CreateDir { path: &'a str },
    RemoveDir { path: &'a str },
}

/// Recognises, reads and writes one archive format.
///
/// Handlers never touch files during [`FormatHandler::open`] or [`FormatHandler::write`]; they
/// work on [`ByteBuffer`]s filled and drained by [`Archive`].
pub trait FormatHandler: Send + Sync {
    fn id(&self) -> FormatId;

    fn capabilities(&self) -> Capabilities;

    /// Cheap check of the format's signature and table layout. Never fails, only says no.
    fn is_this_format(&self, src: &dyn DataSource) -> bool;

    /// [`FormatHandler::is_this_format`] on a file, reading only what the check needs
    fn is_this_format_file(&self, path: &Path) -> bool {
        FileSource::open(path)
            .map(|src| self.is_this_format(&src))
            .unwrap_or(false)
    }

    /// Parse `mc` into the archive's tree
    fn open(&self, archive: &mut Archive, mc: &mut ByteBuffer) -> Result<()>;

    /// Serialize the archive's tree into `mc`. Every entry is loaded beforehand.
    fn write(&self, archive: &Archive, mc: &mut ByteBuffer) -> Result<Vec<Warning>>;

    /// Bring the content of a deferred entry into memory
    fn load_entry_data(&self, source: Option<&dyn DataSource>, entry: &mut Entry) -> Result<()> {
        entry.resolve(source)
    }

    /// Update the format properties of a changed entry once it has been written
    fn entry_written(&self, _entry: &mut Entry) {}

    /// Reject changes the format cannot represent
    fn validate_mutation(&self, archive: &Archive, mutation: &Mutation<'_>) -> Result<()> {
        validate_with_capabilities(self.id(), self.capabilities(), archive, mutation)
    }
}

fn is_root(path: &str) -> bool {
    path.trim_matches('/').is_empty()
}

/// Structural checks shared by every format, driven by its [`Capabilities`]
pub fn validate_with_capabilities(
    format: FormatId,
    caps: Capabilities,
    archive: &Archive,
    mutation: &Mutation<'_>,
) -> Result<()> {
    let no_dirs = || {
        Error::UnsupportedMutation(format!("{format} archives cannot contain directories"))
    };
    let duplicate = |name: &str, dir: &str| {
        Error::UnsupportedMutation(format!(
            "an entry named {name} already exists in /{}",
            dir.trim_matches('/')
        ))
    };
    let taken = |dir: &str, name: &str| {
        archive
            .dir(dir)
            .and_then(|d| d.entry_index(name))
            .filter(|_| caps.unique_names)
    };

    match *mutation {
        Mutation::CreateDir { .. } if caps.single_entry || !caps.supports_dirs => Err(no_dirs()),
        Mutation::AddEntry { .. } if caps.single_entry && archive.num_entries() >= 1 => {
            Err(Error::UnsupportedMutation(format!(
                "{format} archives hold exactly one entry"
            )))
        }
        Mutation::AddEntry { dir, .. } | Mutation::MoveEntry { dir, .. }
            if !caps.supports_dirs && !is_root(dir) =>
        {
            Err(no_dirs())
        }
        Mutation::AddEntry { dir, name } => match taken(dir, name) {
            Some(_) => Err(duplicate(name, dir)),
            None => Ok(()),
        },
        Mutation::RenameEntry { path, name } => {
            let (dir, current) = split_path(path);
            let own = archive.dir(dir).and_then(|d| d.entry_index(current));
            match taken(dir, name) {
                Some(index) if Some(index) != own => Err(duplicate(name, dir)),
                _ => Ok(()),
            }
        }
        Mutation::MoveEntry { path, dir } => {
            let (from, name) = split_path(path);
            let same_dir = from.eq_ignore_ascii_case(dir.trim_matches('/'));
            match taken(dir, name) {
                Some(_) if !same_dir => Err(duplicate(name, dir)),
                _ => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

/// Read a NUL padded name field
pub(crate) fn read_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Encode a name into a NUL padded field, cutting whatever does not fit
pub(crate) fn name_field<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = name.as_bytes();
    let count = bytes.len().min(N);
    out[..count].copy_from_slice(&bytes[..count]);
    out
}

/// Cut `name` down to `limit` bytes, recording a warning when it had to be shortened
pub(crate) fn fit_name(name: &str, limit: usize, warnings: &mut Vec<Warning>) -> String {
    if name.len() <= limit {
        return name.to_owned();
    }

    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = name[..end].to_owned();

    warn!(name = %name, truncated = %truncated, limit, "name too long, truncating");
    warnings.push(Warning::NameTooLong {
        name: name.to_owned(),
        truncated: truncated.clone(),
        limit,
    });
    truncated
}

/// Fits the names of one write to a format's limit.
///
/// For formats with unique names, two different names cut down to the same stored name fail the
/// write instead of producing an archive that cannot address both files.
pub(crate) struct NameFitter {
    limit: usize,
    unique: bool,
    stored: HashMap<String, String>,
    warnings: Vec<Warning>,
}

impl NameFitter {
    pub(crate) fn new(caps: Capabilities) -> Self {
        Self {
            limit: caps.max_name_length.unwrap_or(usize::MAX),
            unique: caps.unique_names,
            stored: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn fit(&mut self, name: &str) -> Result<String> {
        let fitted = fit_name(name, self.limit, &mut self.warnings);
        if !self.unique {
            return Ok(fitted);
        }

        match self.stored.get(&fitted.to_ascii_lowercase()) {
            // Names already equal before truncation are left to the tree's own rules
            Some(other) if !other.eq_ignore_ascii_case(name) => {
                Err(Error::UnsupportedMutation(format!(
                    "{name} and {other} would both be stored as {fitted}"
                )))
            }
            Some(_) => Ok(fitted),
            None => {
                self.stored
                    .insert(fitted.to_ascii_lowercase(), name.to_owned());
                Ok(fitted)
            }
        }
    }

    pub(crate) fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// Fail with [`Error::CorruptDirectory`] when a record points outside of the data
pub(crate) fn check_bounds(name: &str, offset: u64, size: u64, total: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= total => Ok(()),
        _ => Err(Error::CorruptDirectory(format!(
            "entry {name} spans {offset}+{size}, beyond the {total} bytes available"
        ))),
    }
}

/// Build an entry for a record of a directory table, copying its payload out of `mc` when the
/// archive is set to load eagerly
pub(crate) fn table_entry(
    archive: &Archive,
    mc: &ByteBuffer,
    name: impl Into<String>,
    offset: u64,
    size: u64,
) -> Result<Entry> {
    let name = name.into();
    check_bounds(&name, offset, size, mc.size() as u64)?;

    if archive.options().eager_load {
        let data = mc.slice(offset as usize, size as usize)?.to_vec();
        Ok(Entry::parsed(name, data, Some(offset)))
    } else {
        Ok(Entry::deferred(name, offset, size))
    }
}

/// The entries to serialize, in write order, with their paths.
///
/// Folder placeholder entries are skipped. Formats without directories refuse trees that keep
/// entries below the root, and single entry formats refuse anything but one entry.
pub(crate) fn entries_for_write<'a>(
    archive: &'a Archive,
    caps: Capabilities,
) -> Result<Vec<(String, &'a Entry)>> {
    let root = archive.root();
    let format = archive.format();

    if !caps.supports_dirs && root.num_entries(true) != root.num_entries(false) {
        return Err(Error::UnsupportedMutation(format!(
            "{format} archives cannot store entries inside directories"
        )));
    }

    let entries: Vec<_> = root
        .flatten()
        .into_iter()
        .filter(|(_, e)| !e.is_folder_marker())
        .collect();

    if caps.single_entry && entries.len() != 1 {
        return Err(Error::UnsupportedMutation(format!(
            "{format} archives hold exactly one entry, found {}",
            entries.len()
        )));
    }

    Ok(entries)
}

/// Convert a size or offset to the 32 bit field most formats store it in
pub(crate) fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::UnsupportedMutation(format!("{what} of {value} bytes does not fit the format"))
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::error::{Error, Warning};
    use crate::handler::{
        check_bounds, fit_name, name_field, read_name, Capabilities, FormatId, NameFitter,
    };

    #[test]
    fn names_round_trip_through_fields() {
        let field = name_field::<8>("PLAYPAL");
        assert_eq!(&field, b"PLAYPAL\0");
        assert_eq!(read_name(&field), "PLAYPAL");

        // A name using the whole field carries no terminator
        let full = name_field::<8>("E1M1THNG");
        assert_eq!(read_name(&full), "E1M1THNG");
    }

    #[test]
    fn fit_name_warns() {
        let mut warnings = Vec::new();
        assert_eq!(fit_name("SHORT", 8, &mut warnings), "SHORT");
        assert!(warnings.is_empty());

        assert_eq!(fit_name("MUCHTOOLONG", 8, &mut warnings), "MUCHTOOL");
        assert_eq!(
            warnings,
            vec![Warning::NameTooLong {
                name: "MUCHTOOLONG".into(),
                truncated: "MUCHTOOL".into(),
                limit: 8
            }]
        );
    }

    #[test]
    fn cut_names_must_stay_distinct() {
        let mut names = NameFitter::new(Capabilities::flat(12, true));
        assert_eq!(names.fit("LONGNAME_0001.X").ok(), Some("LONGNAME_000".into()));
        assert!(matches!(
            names.fit("LONGNAME_0002.X"),
            Err(Error::UnsupportedMutation(_))
        ));
        assert_eq!(names.into_warnings().len(), 2);

        // Formats that allow duplicates only warn
        let mut lumps = NameFitter::new(Capabilities::flat(8, false));
        assert!(lumps.fit("SIDEDEFS1").is_ok());
        assert!(lumps.fit("SIDEDEFS2").is_ok());
    }

    #[test]
    fn bounds() {
        assert!(check_bounds("A", 10, 10, 20).is_ok());
        assert!(check_bounds("A", 10, 11, 20).is_err());
        assert!(check_bounds("A", u64::MAX, 1, 20).is_err());
    }

    #[test]
    fn format_ids_parse() {
        for id in FormatId::ALL {
            assert_eq!(id.as_str().parse::<FormatId>().ok(), Some(id));
        }
        assert_eq!("CHASM_BIN".parse::<FormatId>().ok(), Some(FormatId::ChasmBin));
        assert!("zip".parse::<FormatId>().is_err());
    }
}
