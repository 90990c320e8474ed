//! The tree of directories and entries that makes up an archive.

use crate::entry::Entry;

/// Separator used for paths inside an archive
pub const PATH_SEPARATOR: char = '/';

/// A node of the archive tree owning entries and child directories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    name: String,
    entries: Vec<Entry>,
    dirs: Vec<Directory>,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn dirs(&self) -> &[Directory] {
        &self.dirs
    }

    /// Whether the directory holds neither entries nor subdirectories
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.dirs.is_empty()
    }

    /// Number of entries, optionally including all subdirectories
    pub fn num_entries(&self, recursive: bool) -> usize {
        let own = self.entries.len();
        if !recursive {
            return own;
        }
        own + self
            .dirs
            .iter()
            .map(|d| d.num_entries(true))
            .sum::<usize>()
    }

    /// Index of the first entry called `name`, compared case-insensitively
    pub fn entry_index(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name() == name)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| e.name().eq_ignore_ascii_case(name))
            })
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entry_index(name).map(|i| &self.entries[i])
    }

    pub fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entry_index(name).map(|i| &mut self.entries[i])
    }

    pub fn entry_at(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    fn dir_index(&self, name: &str) -> Option<usize> {
        self.dirs
            .iter()
            .position(|d| d.name == name)
            .or_else(|| {
                self.dirs
                    .iter()
                    .position(|d| d.name.eq_ignore_ascii_case(name))
            })
    }

    /// Direct child directory called `name`
    pub fn dir(&self, name: &str) -> Option<&Directory> {
        self.dir_index(name).map(|i| &self.dirs[i])
    }

    /// Directory at a `/` separated path relative to this one; the empty path is `self`
    pub fn subdir(&self, path: &str) -> Option<&Directory> {
        path_components(path).try_fold(self, |dir, name| dir.dir(name))
    }

    pub fn subdir_mut(&mut self, path: &str) -> Option<&mut Directory> {
        let mut current = self;
        for name in path_components(path) {
            let index = current.dir_index(name)?;
            current = &mut current.dirs[index];
        }
        Some(current)
    }

    /// Directory at `path`, creating every missing component on the way
    pub fn ensure_dir(&mut self, path: &str) -> &mut Directory {
        let mut current = self;
        for name in path_components(path) {
            let index = match current.dir_index(name) {
                Some(index) => index,
                None => {
                    current.dirs.push(Directory::new(name));
                    current.dirs.len() - 1
                }
            };
            current = &mut current.dirs[index];
        }
        current
    }

    /// Insert an entry at `position`, or append it
    pub fn add_entry(&mut self, entry: Entry, position: Option<usize>) {
        match position {
            Some(index) if index < self.entries.len() => self.entries.insert(index, entry),
            _ => self.entries.push(entry),
        }
    }

    pub fn remove_entry(&mut self, index: usize) -> Option<Entry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn swap_entries(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
    }

    /// Remove the direct child directory called `name` with everything under it
    pub fn remove_dir(&mut self, name: &str) -> Option<Directory> {
        self.dir_index(name).map(|i| self.dirs.remove(i))
    }

    /// Every entry below this directory with its path, depth first.
    ///
    /// The entries of a directory come before those of its subdirectories, which is the order
    /// formats with path names serialize in.
    pub fn flatten(&self) -> Vec<(String, &Entry)> {
        let mut out = Vec::with_capacity(self.num_entries(true));
        self.collect_into("", &mut out);
        out
    }

    fn collect_into<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Entry)>) {
        for entry in &self.entries {
            out.push((join_path(prefix, entry.name()), entry));
        }
        for dir in &self.dirs {
            dir.collect_into(&join_path(prefix, &dir.name), out);
        }
    }

    /// Visit every entry below this directory mutably
    pub(crate) fn for_each_entry_mut<F>(&mut self, f: &mut F) -> crate::error::Result<()>
    where
        F: FnMut(&mut Entry) -> crate::error::Result<()>,
    {
        for entry in &mut self.entries {
            f(entry)?;
        }
        for dir in &mut self.dirs {
            dir.for_each_entry_mut(f)?;
        }
        Ok(())
    }
}

fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(|c| !c.is_empty())
}

/// Join a directory path and a name
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches(PATH_SEPARATOR);
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}{PATH_SEPARATOR}{name}")
    }
}

/// Split a path into its directory part and its final component
pub fn split_path(path: &str) -> (&str, &str) {
    let path = path.trim_matches(PATH_SEPARATOR);
    match path.rfind(PATH_SEPARATOR) {
        Some(index) => (&path[..index], &path[index + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::directory::{join_path, split_path, Directory};
    use crate::entry::Entry;

    fn sample() -> Directory {
        let mut root = Directory::new("");
        root.add_entry(Entry::new("readme.txt"), None);
        root.ensure_dir("maps/e1").add_entry(Entry::new("e1m1.bsp"), None);
        root.ensure_dir("maps").add_entry(Entry::new("list.txt"), None);
        root.ensure_dir("sound").add_entry(Entry::new("pain.wav"), None);
        root
    }

    #[test]
    fn flatten_puts_entries_before_subdirectories() {
        let root = sample();
        let paths: Vec<_> = root.flatten().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec!["readme.txt", "maps/list.txt", "maps/e1/e1m1.bsp", "sound/pain.wav"]
        );
        assert_eq!(root.num_entries(true), 4);
        assert_eq!(root.num_entries(false), 1);
    }

    #[test]
    fn lookups_ignore_case() {
        let root = sample();
        assert!(root.subdir("MAPS/E1").is_some());
        assert!(root.subdir("maps/e2").is_none());
        assert_eq!(root.subdir("").map(|d| d.name()), Some(""));
        assert_eq!(
            root.subdir("maps").and_then(|d| d.entry("LIST.TXT")).map(|e| e.name()),
            Some("list.txt")
        );
    }

    #[test]
    fn exact_name_wins_over_case_insensitive_match() {
        let mut root = Directory::new("");
        root.add_entry(Entry::new("Mixed"), None);
        root.add_entry(Entry::new("MIXED"), None);
        assert_eq!(root.entry_index("MIXED"), Some(1));
        assert_eq!(root.entry_index("mixed"), Some(0));
    }

    #[test]
    fn positional_insert() {
        let mut root = Directory::new("");
        root.add_entry(Entry::new("A"), None);
        root.add_entry(Entry::new("C"), None);
        root.add_entry(Entry::new("B"), Some(1));
        root.add_entry(Entry::new("D"), Some(99));
        let names: Vec<_> = root.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn path_helpers() {
        assert_eq!(split_path("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_path("c.txt"), ("", "c.txt"));
        assert_eq!(join_path("", "x"), "x");
        assert_eq!(join_path("a/b/", "x"), "a/b/x");
    }
}
