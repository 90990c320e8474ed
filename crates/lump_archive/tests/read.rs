use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lump_archive::error::{Error, Result};
use lump_archive::{
    Archive, ByteBuffer, Content, DataSource, Entry, EntryState, FormatId, OpenOptions, TypeTag,
};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

/// Wraps a buffer and counts the reads going through it
#[derive(Debug)]
struct CountingSource {
    inner: ByteBuffer,
    reads: AtomicUsize,
}

impl CountingSource {
    fn new(inner: ByteBuffer) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DataSource for CountingSource {
    fn size(&self) -> u64 {
        self.inner.size() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(offset, buf)
    }
}

fn doom_wad() -> Result<ByteBuffer> {
    let mut wad = Archive::new(FormatId::Wad);
    wad.add_entry("", Entry::new("MAP01"), None)?;
    wad.add_entry("", Entry::with_data("THINGS", vec![1; 10]), None)?;
    wad.add_entry("", Entry::with_data("LINEDEFS", vec![2; 14]), None)?;
    wad.add_entry("", Entry::new("MAP02"), None)?;
    wad.add_entry("", Entry::with_data("THINGS", vec![3; 10]), None)?;
    wad.write()
}

#[test]
fn lazy_loads_hit_the_source_once() -> Result<()> {
    let mc = doom_wad()?;
    let source = Arc::new(CountingSource::new(mc.clone()));

    let mut wad = Archive::new(FormatId::Wad);
    wad.open(mc)?;
    let shared: Arc<dyn DataSource> = source.clone();
    wad.set_source(Some(shared));

    assert!(matches!(
        wad.entry("LINEDEFS").map(|e| e.content()),
        Some(Content::Deferred { .. })
    ));

    assert_eq!(wad.entry_data("LINEDEFS")?, &[2; 14][..]);
    assert_eq!(source.reads(), 1);

    assert_eq!(wad.entry_data("LINEDEFS")?, &[2; 14][..]);
    wad.load_entry_data("LINEDEFS")?;
    assert_eq!(source.reads(), 1);

    Ok(())
}

#[test]
fn released_source_fails_deferred_loads() -> Result<()> {
    let mut wad = Archive::new(FormatId::Wad);
    wad.open(doom_wad()?)?;
    wad.load_entry_data("LINEDEFS")?;
    wad.set_source(None);

    assert_eq!(wad.entry_data("LINEDEFS")?, &[2; 14][..]);
    assert!(matches!(
        wad.entry_data("THINGS"),
        Err(Error::SourceUnavailable(_))
    ));
    // Zero sized entries never need a source
    assert_eq!(wad.entry_data("MAP02")?, &[] as &[u8]);

    Ok(())
}

#[test]
fn duplicate_names_resolve_to_the_first() -> Result<()> {
    let mut wad = Archive::new(FormatId::Wad);
    wad.open(doom_wad()?)?;

    let names: Vec<_> = wad.entries().into_iter().map(|(path, _)| path).collect();
    assert_eq!(names, ["MAP01", "THINGS", "LINEDEFS", "MAP02", "THINGS"]);
    assert_eq!(wad.entry_data("THINGS")?, &[1; 10][..]);

    let second = wad.root().entry_at(4).map(|e| e.offset_on_disk());
    assert_eq!(second, Some(Some(12 + 10 + 14)));

    Ok(())
}

#[test]
fn opened_entries_are_unmodified() -> Result<()> {
    let mut wad = Archive::new(FormatId::Wad);
    wad.open(doom_wad()?)?;

    assert!(!wad.is_modified());
    for (_, entry) in wad.entries() {
        assert_eq!(entry.state(), EntryState::Unmodified);
    }

    wad.set_entry_data("LINEDEFS", vec![0; 4])?;
    assert!(wad.is_modified());
    assert_eq!(
        wad.entry("LINEDEFS").map(|e| e.state()),
        Some(EntryState::Modified)
    );

    Ok(())
}

#[test]
fn classifier_runs_when_data_arrives() -> Result<()> {
    let classify = |_: &str, data: &[u8]| {
        if data.is_empty() {
            TypeTag::marker()
        } else {
            TypeTag::new("lump")
        }
    };

    let mut lazy = Archive::new(FormatId::Wad);
    lazy.set_classifier(Arc::new(classify));
    lazy.open(doom_wad()?)?;
    assert_eq!(lazy.entry("MAP01").and_then(|e| e.type_tag()), Some(&TypeTag::marker()));
    assert_eq!(lazy.entry("LINEDEFS").and_then(|e| e.type_tag()), None);
    lazy.load_entry_data("LINEDEFS")?;
    assert_eq!(
        lazy.entry("LINEDEFS").and_then(|e| e.type_tag()).map(|t| t.as_str()),
        Some("lump")
    );

    let mut eager = Archive::new(FormatId::Wad)
        .with_options(OpenOptions::builder().eager_load(true).build());
    eager.set_classifier(Arc::new(classify));
    eager.open(doom_wad()?)?;
    assert!(eager.entries().iter().all(|(_, e)| e.type_tag().is_some()));

    let mut off = Archive::new(FormatId::Wad)
        .with_options(OpenOptions::builder().eager_load(true).classify(false).build());
    off.set_classifier(Arc::new(classify));
    off.open(doom_wad()?)?;
    assert!(off.entries().iter().all(|(_, e)| e.type_tag().is_none()));

    Ok(())
}

#[test]
fn progress_is_reported_per_interval() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = seen.clone();
        move |current: usize, total: usize, _: &str| {
            if let Ok(mut seen) = seen.lock() {
                seen.push((current, total));
            }
        }
    };

    let mut wad = Archive::new(FormatId::Wad)
        .with_options(OpenOptions::builder().progress_interval(2).build());
    wad.set_progress_sink(Arc::new(sink));
    wad.open(doom_wad()?)?;

    let seen = seen.lock().map(|s| s.clone()).unwrap_or_default();
    assert_eq!(seen, [(0, 5), (2, 5), (4, 5), (5, 5)]);

    Ok(())
}

#[traced_test]
#[test]
fn failed_open_leaves_nothing_behind() -> Result<()> {
    let mut input = doom_wad()?.into_inner();
    // Point the directory past the end of the file
    input[8] = 0xFF;

    let mut wad = Archive::new(FormatId::Wad);
    wad.open(doom_wad()?)?;
    assert!(wad.open(ByteBuffer::from(input)).is_err());

    assert_eq!(wad.num_entries(), 0);
    assert!(wad.properties().is_empty());
    assert!(wad.source().is_none());
    assert!(logs_contain("corrupt directory"));

    Ok(())
}
