//! An archive: a tree of entries bound to one format.

use std::fmt::{self, Debug};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::buffer::ByteBuffer;
use crate::directory::{join_path, split_path, Directory, PATH_SEPARATOR};
use crate::entry::{Entry, EntryState, Properties, PropertyValue};
use crate::error::{Error, Result, Warning};
use crate::handler::{FormatHandler, FormatId, Mutation};
use crate::hooks::{ArchiveEvent, ArchiveObserver, Classifier, ProgressSink};
use crate::options::OpenOptions;
use crate::source::DataSource;

/// An archive of any supported format
///
/// ```
/// use lump_archive::{Archive, Entry, FormatId};
///
/// # fn doit() -> lump_archive::error::Result<()> {
/// let mut wad = Archive::new(FormatId::Wad);
/// wad.add_entry("", Entry::with_data("PLAYPAL", vec![0; 768]), None)?;
///
/// let bytes = wad.write()?;
///
/// let mut reopened = Archive::new(FormatId::Wad);
/// reopened.open(bytes)?;
/// assert_eq!(reopened.entry_data("PLAYPAL")?.len(), 768);
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct Archive {
    format: FormatId,
    root: Directory,
    filename: Option<PathBuf>,
    source: Option<Arc<dyn DataSource>>,
    properties: Properties,
    modified: bool,
    options: OpenOptions,
    suppressed: usize,
    pending_bulk: bool,
    observers: Vec<Box<dyn ArchiveObserver>>,
    classifier: Option<Arc<dyn Classifier>>,
    progress: Option<Arc<dyn ProgressSink>>,
    warnings: Vec<Warning>,
}

impl Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Archive")
            .field("format", &self.format)
            .field("filename", &self.filename)
            .field("entries", &self.num_entries())
            .field("modified", &self.modified)
            .finish()
    }
}

/// Holds back change notifications while alive.
///
/// Created by [`Archive::block_signals`]. Dereferences to the archive so bulk work can go
/// through the guard; when the last guard goes away a single [`ArchiveEvent::BulkChange`] is
/// sent if anything changed in the meantime.
pub struct SignalBlocker<'a> {
    archive: &'a mut Archive,
}

impl Deref for SignalBlocker<'_> {
    type Target = Archive;

    fn deref(&self) -> &Archive {
        self.archive
    }
}

impl DerefMut for SignalBlocker<'_> {
    fn deref_mut(&mut self) -> &mut Archive {
        self.archive
    }
}

impl Drop for SignalBlocker<'_> {
    fn drop(&mut self) {
        self.archive.suppressed -= 1;
        if self.archive.suppressed == 0 && self.archive.pending_bulk {
            self.archive.pending_bulk = false;
            self.archive.emit(ArchiveEvent::BulkChange);
        }
    }
}

impl Archive {
    /// An empty archive of the given format
    pub fn new(format: FormatId) -> Self {
        Self {
            format,
            root: Directory::default(),
            filename: None,
            source: None,
            properties: Properties::new(),
            modified: false,
            options: OpenOptions::default(),
            suppressed: 0,
            pending_bulk: false,
            observers: Vec::new(),
            classifier: None,
            progress: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    pub fn set_classifier(&mut self, classifier: Arc<dyn Classifier>) {
        self.classifier = Some(classifier);
    }

    pub fn set_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress = Some(sink);
    }

    pub fn add_observer(&mut self, observer: impl ArchiveObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn format(&self) -> FormatId {
        self.format
    }

    pub fn handler(&self) -> &'static dyn FormatHandler {
        self.format.handler()
    }

    /// Retarget the archive to another format.
    ///
    /// Every entry is loaded first so nothing depends on the layout of the old source.
    pub fn set_format(&mut self, format: FormatId) -> Result<()> {
        self.load_all()?;
        self.format = format;
        self.modified = true;
        Ok(())
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, filename: Option<PathBuf>) {
        self.filename = filename;
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
        self.modified = true;
    }

    /// Non-fatal problems recorded so far
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// The store deferred entries are read from
    pub fn source(&self) -> Option<&Arc<dyn DataSource>> {
        self.source.as_ref()
    }

    /// Replace or drop the store deferred entries are read from.
    ///
    /// Offsets recorded in deferred entries are kept, so a replacement must have the same
    /// layout. Without a source, loading a deferred entry fails with
    /// [`Error::SourceUnavailable`].
    pub fn set_source(&mut self, source: Option<Arc<dyn DataSource>>) {
        self.source = source;
    }

    /// Suspend change notifications until the returned guard is dropped
    pub fn block_signals(&mut self) -> SignalBlocker<'_> {
        self.suppressed += 1;
        SignalBlocker { archive: self }
    }

    pub fn signals_blocked(&self) -> bool {
        self.suppressed > 0
    }

    fn emit(&mut self, event: ArchiveEvent) {
        if self.suppressed > 0 {
            self.pending_bulk = true;
            return;
        }
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    fn reset(&mut self) {
        self.root = Directory::default();
        self.properties.clear();
        self.source = None;
    }

    /// Read the archive from `mc` using the current format.
    ///
    /// Anything the archive held before is dropped. On failure the archive is left empty.
    #[instrument(skip_all, fields(format = %self.format), err)]
    pub fn open(&mut self, mut mc: ByteBuffer) -> Result<()> {
        self.reset();
        let handler = self.handler();

        let result = {
            let mut blocked = self.block_signals();
            handler.open(&mut blocked, &mut mc)
        };

        if let Err(e) = result {
            self.reset();
            return Err(e);
        }

        self.source = Some(Arc::new(mc));
        self.classify_loaded();
        self.modified = false;
        info!(entries = self.num_entries(), "opened archive");

        Ok(())
    }

    /// Read the archive from a file using the current format
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        self.filename = Some(path.to_path_buf());
        self.open(ByteBuffer::from(data))
    }

    /// Serialize the archive with its current format.
    ///
    /// Nothing is produced when the tree breaks a rule of the format. After a successful write
    /// every entry counts as unmodified.
    #[instrument(skip_all, fields(format = %self.format), err)]
    pub fn write(&mut self) -> Result<ByteBuffer> {
        self.load_all()?;

        let mut out = ByteBuffer::new();
        let warnings = self.handler().write(self, &mut out)?;
        self.warnings.extend(warnings);

        let handler = self.handler();
        self.root.for_each_entry_mut(&mut |entry| {
            if entry.state() != EntryState::Unmodified {
                handler.entry_written(entry);
            }
            entry.set_state(EntryState::Unmodified);
            Ok(())
        })?;
        self.modified = false;
        info!(size = out.size(), "wrote archive");

        Ok(out)
    }

    /// Serialize the archive into a file. The file is only touched when serializing succeeds.
    pub fn write_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let out = self.write()?;
        std::fs::write(path, out.data())?;
        self.filename = Some(path.to_path_buf());
        Ok(())
    }

    pub fn entry(&self, path: &str) -> Option<&Entry> {
        let (dir, name) = split_path(path);
        self.root.subdir(dir)?.entry(name)
    }

    pub fn dir(&self, path: &str) -> Option<&Directory> {
        self.root.subdir(path)
    }

    /// Every entry with its path, in the order formats write them
    pub fn entries(&self) -> Vec<(String, &Entry)> {
        self.root.flatten()
    }

    pub fn num_entries(&self) -> usize {
        self.root.num_entries(true)
    }

    /// Make sure the content of the entry at `path` is in memory
    pub fn load_entry_data(&mut self, path: &str) -> Result<()> {
        let handler = self.handler();
        let entry = locate_entry_mut(&mut self.root, path)?;
        load_entry(
            handler,
            self.source.as_deref(),
            self.classifier.as_deref().filter(|_| self.options.classify),
            entry,
        )
    }

    /// Content of the entry at `path`, loading it on first access
    pub fn entry_data(&mut self, path: &str) -> Result<&[u8]> {
        self.load_entry_data(path)?;
        self.entry(path)
            .ok_or_else(|| Error::entry_not_found(path))?
            .loaded_data()
    }

    /// Bring every deferred entry into memory
    pub fn load_all(&mut self) -> Result<()> {
        let handler = self.handler();
        let source = self.source.as_deref();
        let classifier = self.classifier.as_deref().filter(|_| self.options.classify);
        self.root
            .for_each_entry_mut(&mut |entry| load_entry(handler, source, classifier, entry))
    }

    fn classify_loaded(&mut self) {
        let Some(classifier) = self.classifier.as_deref().filter(|_| self.options.classify)
        else {
            return;
        };

        let _ = self.root.for_each_entry_mut(&mut |entry| {
            classify_entry(classifier, entry);
            Ok(())
        });
    }

    /// Add `entry` to the directory at `dir` (the root is `""`), creating the directory if the
    /// format allows it. The entry starts out as [`EntryState::New`].
    pub fn add_entry(&mut self, dir: &str, mut entry: Entry, position: Option<usize>) -> Result<()> {
        check_entry_name(entry.name())?;
        self.handler().validate_mutation(
            self,
            &Mutation::AddEntry {
                dir,
                name: entry.name(),
            },
        )?;

        entry.set_state(EntryState::New);
        if let Some(classifier) = self.classifier.as_deref().filter(|_| self.options.classify) {
            classify_entry(classifier, &mut entry);
        }

        let path = join_path(dir, entry.name());
        self.root.ensure_dir(dir).add_entry(entry, position);
        self.modified = true;
        self.emit(ArchiveEvent::EntryAdded(path));

        Ok(())
    }

    /// Take the entry at `path` out of the archive
    pub fn remove_entry(&mut self, path: &str) -> Result<Entry> {
        self.handler()
            .validate_mutation(self, &Mutation::RemoveEntry { path })?;

        let (dir, name) = split_path(path);
        let parent = self
            .root
            .subdir_mut(dir)
            .ok_or_else(|| Error::dir_not_found(dir))?;
        let index = parent
            .entry_index(name)
            .ok_or_else(|| Error::entry_not_found(path))?;
        let mut entry = parent
            .remove_entry(index)
            .ok_or_else(|| Error::entry_not_found(path))?;

        entry.set_state(EntryState::Deleted);
        self.modified = true;
        self.emit(ArchiveEvent::EntryRemoved(path.to_owned()));

        Ok(entry)
    }

    pub fn rename_entry(&mut self, path: &str, name: &str) -> Result<()> {
        check_entry_name(name)?;
        self.handler()
            .validate_mutation(self, &Mutation::RenameEntry { path, name })?;

        locate_entry_mut(&mut self.root, path)?.set_name(name);
        self.modified = true;
        self.emit(ArchiveEvent::EntryRenamed {
            from: path.to_owned(),
            to: join_path(split_path(path).0, name),
        });

        Ok(())
    }

    /// Move the entry at `path` into the directory `dir`, at `position` or at the end
    pub fn move_entry(&mut self, path: &str, dir: &str, position: Option<usize>) -> Result<()> {
        self.handler()
            .validate_mutation(self, &Mutation::MoveEntry { path, dir })?;

        let (from, name) = split_path(path);
        let parent = self
            .root
            .subdir_mut(from)
            .ok_or_else(|| Error::dir_not_found(from))?;
        let index = parent
            .entry_index(name)
            .ok_or_else(|| Error::entry_not_found(path))?;
        let entry = parent
            .remove_entry(index)
            .ok_or_else(|| Error::entry_not_found(path))?;

        let to = join_path(dir, entry.name());
        self.root.ensure_dir(dir).add_entry(entry, position);
        self.modified = true;
        self.emit(ArchiveEvent::EntryMoved {
            from: path.to_owned(),
            to,
        });

        Ok(())
    }

    /// Exchange the positions of two entries of the same directory
    pub fn swap_entries(&mut self, a: &str, b: &str) -> Result<()> {
        self.handler()
            .validate_mutation(self, &Mutation::SwapEntries { a, b })?;

        let (dir_a, name_a) = split_path(a);
        let (dir_b, name_b) = split_path(b);
        if !dir_a.eq_ignore_ascii_case(dir_b) {
            return Err(Error::UnsupportedMutation(format!(
                "{a} and {b} are not in the same directory"
            )));
        }

        let parent = self
            .root
            .subdir_mut(dir_a)
            .ok_or_else(|| Error::dir_not_found(dir_a))?;
        let index_a = parent
            .entry_index(name_a)
            .ok_or_else(|| Error::entry_not_found(a))?;
        let index_b = parent
            .entry_index(name_b)
            .ok_or_else(|| Error::entry_not_found(b))?;
        parent.swap_entries(index_a, index_b);

        self.modified = true;
        self.emit(ArchiveEvent::EntriesSwapped(a.to_owned(), b.to_owned()));

        Ok(())
    }

    /// Create the directory at `path` and any missing parents
    pub fn create_dir(&mut self, path: &str) -> Result<()> {
        self.handler()
            .validate_mutation(self, &Mutation::CreateDir { path })?;

        if self.root.subdir(path).is_some() {
            return Ok(());
        }

        self.root.ensure_dir(path);
        self.modified = true;
        self.emit(ArchiveEvent::DirectoryAdded(
            path.trim_matches(PATH_SEPARATOR).to_owned(),
        ));

        Ok(())
    }

    /// Remove the directory at `path` with everything under it
    pub fn remove_dir(&mut self, path: &str) -> Result<Directory> {
        self.handler()
            .validate_mutation(self, &Mutation::RemoveDir { path })?;

        let (parent, name) = split_path(path);
        if name.is_empty() {
            return Err(Error::UnsupportedMutation(
                "the root directory cannot be removed".into(),
            ));
        }

        let mut removed = self
            .root
            .subdir_mut(parent)
            .and_then(|d| d.remove_dir(name))
            .ok_or_else(|| Error::dir_not_found(path))?;
        removed.for_each_entry_mut(&mut |entry| {
            entry.set_state(EntryState::Deleted);
            Ok(())
        })?;

        self.modified = true;
        self.emit(ArchiveEvent::DirectoryRemoved(
            path.trim_matches(PATH_SEPARATOR).to_owned(),
        ));

        Ok(removed)
    }

    /// Replace the content of the entry at `path`; its type is determined again
    pub fn set_entry_data(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let classifier = self.classifier.clone().filter(|_| self.options.classify);
        let entry = locate_entry_mut(&mut self.root, path)?;
        entry.set_data(data);
        if let Some(classifier) = classifier {
            entry.clear_type_tag();
            classify_entry(classifier.as_ref(), entry);
        }

        self.modified = true;
        self.emit(ArchiveEvent::EntryModified(path.to_owned()));

        Ok(())
    }

    pub fn set_entry_property(
        &mut self,
        path: &str,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        locate_entry_mut(&mut self.root, path)?.set_property(key, value);
        self.modified = true;
        self.emit(ArchiveEvent::EntryModified(path.to_owned()));
        Ok(())
    }

    /// Place an entry read by a format handler
    pub(crate) fn insert_parsed(&mut self, dir: &str, entry: Entry) {
        let path = join_path(dir, entry.name());
        self.root.ensure_dir(dir).add_entry(entry, None);
        self.emit(ArchiveEvent::EntryAdded(path));
    }

    /// Record an archive level property read by a format handler
    pub(crate) fn insert_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Tell the progress sink, if any, how far an operation over `total` entries got
    pub(crate) fn report_progress(&self, current: usize, total: usize, message: &str) {
        let Some(sink) = &self.progress else {
            return;
        };
        let interval = self.options.progress_interval.max(1);
        if current % interval == 0 || current == total {
            sink.on_progress(current, total, message);
        }
    }
}

fn check_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) {
        return Err(Error::UnsupportedMutation(format!(
            "{name:?} is not a valid entry name"
        )));
    }
    Ok(())
}

fn locate_entry_mut<'a>(root: &'a mut Directory, path: &str) -> Result<&'a mut Entry> {
    let (dir, name) = split_path(path);
    root.subdir_mut(dir)
        .and_then(|d| d.entry_mut(name))
        .ok_or_else(|| Error::entry_not_found(path))
}

fn load_entry(
    handler: &dyn FormatHandler,
    source: Option<&dyn DataSource>,
    classifier: Option<&dyn Classifier>,
    entry: &mut Entry,
) -> Result<()> {
    if entry.is_loaded() {
        return Ok(());
    }

    handler.load_entry_data(source, entry)?;
    if let Some(classifier) = classifier {
        classify_entry(classifier, entry);
    }
    Ok(())
}

fn classify_entry(classifier: &dyn Classifier, entry: &mut Entry) {
    if entry.type_tag().is_some() {
        return;
    }
    let Some(data) = entry.data() else {
        return;
    };

    let tag = classifier.classify(entry.name(), data);
    debug!(name = entry.name(), %tag, "classified entry");
    entry.set_type_tag(tag);
}
