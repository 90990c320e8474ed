//! Narrow interfaces to the collaborators around the engine.

use crate::entry::TypeTag;

/// Assigns a content type to entry data.
///
/// The engine never inspects entry content itself; it calls the classifier once the bytes of
/// an entry become available and stores the result.
pub trait Classifier: Send + Sync {
    fn classify(&self, name: &str, data: &[u8]) -> TypeTag;
}

impl<F> Classifier for F
where
    F: Fn(&str, &[u8]) -> TypeTag + Send + Sync,
{
    fn classify(&self, name: &str, data: &[u8]) -> TypeTag {
        self(name, data)
    }
}

/// Receives coarse progress while large archives are read or written
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, current: usize, total: usize, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn on_progress(&self, current: usize, total: usize, message: &str) {
        self(current, total, message)
    }
}

/// A change to an archive, delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEvent {
    EntryAdded(String),
    EntryRemoved(String),
    EntryRenamed { from: String, to: String },
    EntryMoved { from: String, to: String },
    EntriesSwapped(String, String),
    EntryModified(String),
    DirectoryAdded(String),
    DirectoryRemoved(String),

    /// Any number of changes happened while notifications were blocked
    BulkChange,
}

/// Gets told about changes to an archive
pub trait ArchiveObserver: Send {
    fn on_event(&mut self, event: &ArchiveEvent);
}

impl<F> ArchiveObserver for F
where
    F: FnMut(&ArchiveEvent) + Send,
{
    fn on_event(&mut self, event: &ArchiveEvent) {
        self(event)
    }
}
