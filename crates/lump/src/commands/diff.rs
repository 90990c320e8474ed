use std::cmp::Ordering;
use std::fmt::Display;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use itertools::{EitherOrBoth, Itertools};
use lump_archive::{Archive, FormatId};
use miette::{miette, Result};
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};

use super::open_archive;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Mode {
    /// Entry names, sizes and contents
    #[default]
    #[value(alias = "symantic")]
    Semantic,
    /// Also archive properties and line diffs of text entries
    Full,
}

#[derive(Debug, Eq, PartialEq)]
enum Change {
    Added(String, String),
    Removed(String, String),
    Comparison(String, String, String),
    Context(Vec<String>),
    Modified(String, String, Vec<Change>, Vec<Change>),
}

impl Change {
    fn modified(key: &str, name: &str) -> Self {
        Change::Modified(key.into(), name.into(), Vec::new(), Vec::new())
    }

    fn key(&self) -> &str {
        match self {
            Change::Added(key, _)
            | Change::Removed(key, _)
            | Change::Comparison(key, _, _)
            | Change::Modified(key, _, _, _) => key,
            Change::Context(_) => "context",
        }
    }

    pub fn with_children(&mut self, children: Vec<Change>) -> Result<()> {
        match self {
            Change::Modified(_, _, vec, _) => {
                vec.extend(children);
                vec.sort();
                Ok(())
            }
            _ => Err(miette!("tried to add children to an addition or removal")),
        }
    }

    pub fn with_related(&mut self, related: Vec<Change>) -> Result<()> {
        match self {
            Change::Modified(_, _, _, vec) => {
                vec.extend(related);
                Ok(())
            }
            _ => Err(miette!("tried to add related to an addition or removal")),
        }
    }
}

impl Ord for Change {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for Change {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Change::Added(key, value), Change::Added(other_key, other_value))
            | (Change::Removed(key, value), Change::Removed(other_key, other_value))
            | (Change::Modified(key, value, _, _), Change::Modified(other_key, other_value, _, _)) => {
                Some(key.cmp(other_key).then(value.cmp(other_value)))
            }
            (Change::Comparison(key, _, _), Change::Comparison(other_key, _, _)) => {
                Some(key.cmp(other_key))
            }
            _ => None,
        }
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Added(_, v) => writeln!(f, "✅ {}", v.green()),
            Change::Removed(_, v) => writeln!(f, "❌ {}", v.red()),
            Change::Comparison(key, old, new) => {
                writeln!(f, "* {}: {} vs {}", key, old.red(), new.green())
            }
            Change::Context(values) => {
                writeln!(f, "{}", values.iter().map(|l| format!(" {l}")).join("\n"))
            }
            Change::Modified(_, name, children, related) => {
                writeln!(f, "🔃 {}", name.blue())?;
                for change in related {
                    write!(f, "{}", indent(&change.to_string()))?;
                }

                for (key, group) in &children.iter().chunk_by(|c| c.key().to_owned()) {
                    writeln!(f, "  * {key}:")?;
                    for change in group {
                        write!(f, "{}", indent(&indent(&change.to_string())))?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Prefix every line with two spaces
fn indent(text: &str) -> String {
    text.lines().map(|l| format!("  {l}\n")).collect()
}

#[derive(Args)]
pub struct DiffArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    left: PathBuf,

    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    right: PathBuf,

    /// Read both inputs as this format instead of detecting them
    #[arg(long, value_name = "FORMAT")]
    format: Option<FormatId>,

    /// Comparison mode
    #[arg(short, long, value_enum, default_value_t = Mode::Semantic)]
    mode: Mode,
}

impl DiffArgs {
    /// Line diff of two text entries, empty unless both sides are UTF-8
    fn text_context(&self, left: &[u8], right: &[u8]) -> Vec<String> {
        let (Ok(old), Ok(new)) = (std::str::from_utf8(left), std::str::from_utf8(right)) else {
            return Vec::new();
        };

        let diff = TextDiff::from_lines(old, new);
        let mut comparison = Vec::new();
        for op in diff.ops() {
            for change in diff.iter_inline_changes(op) {
                let mut context = String::new();
                for (emphasized, value) in change.iter_strings_lossy() {
                    if emphasized {
                        if change.tag() == ChangeTag::Insert {
                            context.push_str(&format!("{}", value.green().underline()));
                        } else {
                            context.push_str(&format!("{}", value.red().underline()));
                        }
                    } else if change.tag() != ChangeTag::Equal {
                        context.push_str(&format!("{}", value.dimmed()));
                    }
                }
                if !context.is_empty() {
                    comparison.push(context.trim_end().to_owned());
                }
            }
        }
        comparison
    }

    fn handle_entry(&self, name: &str, left: &[u8], right: &[u8]) -> Result<Option<Change>> {
        if left == right {
            return Ok(None);
        }

        let mut result = Change::modified("entries", name);

        if left.len() != right.len() {
            result.with_related(vec![Change::Comparison(
                "size".into(),
                left.len().to_string(),
                right.len().to_string(),
            )])?;
        } else {
            result.with_related(vec![Change::Comparison(
                "content".into(),
                "old".into(),
                "new".into(),
            )])?;
        }

        if self.mode == Mode::Full {
            let context = self.text_context(left, right);
            if !context.is_empty() {
                result.with_related(vec![Change::Context(context)])?;
            }
        }

        Ok(Some(result))
    }

    fn handle_archive(
        &self,
        name: &str,
        left: &mut Archive,
        right: &mut Archive,
    ) -> Result<Option<Change>> {
        let mut result: Option<Change> = None;

        if left.num_entries() != right.num_entries() {
            result
                .get_or_insert_with(|| Change::modified("archive", name))
                .with_related(vec![Change::Comparison(
                    "entries".into(),
                    left.num_entries().to_string(),
                    right.num_entries().to_string(),
                )])?;
        }

        if self.mode == Mode::Full {
            if left.format() != right.format() {
                result
                    .get_or_insert_with(|| Change::modified("archive", name))
                    .with_related(vec![Change::Comparison(
                        "format".into(),
                        left.format().to_string(),
                        right.format().to_string(),
                    )])?;
            }

            let keys = left
                .properties()
                .keys()
                .chain(right.properties().keys())
                .unique()
                .sorted()
                .cloned()
                .collect::<Vec<_>>();
            for key in keys {
                let old = left.property(&key);
                let new = right.property(&key);
                if old != new {
                    let show = |v: Option<&lump_archive::PropertyValue>| {
                        v.map_or_else(|| "-".to_owned(), |v| format!("{v:?}"))
                    };
                    result
                        .get_or_insert_with(|| Change::modified("archive", name))
                        .with_related(vec![Change::Comparison(key, show(old), show(new))])?;
                }
            }
        }

        left.load_all()?;
        right.load_all()?;

        let left_entries = left.entries();
        let right_entries = right.entries();
        let left_sorted = left_entries.iter().sorted_by(|a, b| a.0.cmp(&b.0));
        let right_sorted = right_entries.iter().sorted_by(|a, b| a.0.cmp(&b.0));

        let mut children = Vec::new();
        for pair in left_sorted.merge_join_by(right_sorted, |a, b| a.0.cmp(&b.0)) {
            match pair {
                EitherOrBoth::Left((path, _)) => {
                    children.push(Change::Removed("entries".into(), path.clone()))
                }
                EitherOrBoth::Right((path, _)) => {
                    children.push(Change::Added("entries".into(), path.clone()))
                }
                EitherOrBoth::Both((path, l), (_, r)) => {
                    if let Some(c) = self.handle_entry(path, l.loaded_data()?, r.loaded_data()?)? {
                        children.push(c);
                    }
                }
            }
        }

        if !children.is_empty() {
            result
                .get_or_insert_with(|| Change::modified("archive", name))
                .with_children(children)?;
        }

        Ok(result)
    }

    pub fn handle(&self) -> Result<()> {
        let mut left = open_archive(&self.left, self.format)?;
        let mut right = open_archive(&self.right, self.format)?;

        let difference =
            self.handle_archive(&self.left.to_string_lossy(), &mut left, &mut right)?;

        if let Some(d) = difference {
            println!("{d}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::Change;

    #[test]
    fn changes_sort_by_kind_then_name() {
        let mut changes = vec![
            Change::Added("entries".into(), "B".into()),
            Change::Added("entries".into(), "A".into()),
        ];
        changes.sort();
        assert_eq!(
            changes,
            vec![
                Change::Added("entries".into(), "A".into()),
                Change::Added("entries".into(), "B".into()),
            ]
        );
    }

    #[test]
    fn children_only_attach_to_modifications() {
        let mut added = Change::Added("entries".into(), "A".into());
        assert!(added.with_children(vec![]).is_err());

        let mut modified = Change::modified("archive", "x.wad");
        modified
            .with_children(vec![Change::Removed("entries".into(), "MAP01".into())])
            .unwrap();
        let text = modified.to_string();
        assert!(text.contains("* entries:"));
        assert!(text.contains("MAP01"));
    }

    #[test]
    fn nested_changes_are_indented() {
        let mut inner = Change::modified("entries", "MAP01");
        inner
            .with_related(vec![Change::Comparison("size".into(), "1".into(), "2".into())])
            .unwrap();
        let mut outer = Change::modified("archive", "x.wad");
        outer.with_children(vec![inner]).unwrap();

        let text = outer.to_string();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[1], "  * entries:");
        assert!(lines[2].starts_with("    🔃 "));
        assert!(lines[3].starts_with("      * size: "));
    }
}
