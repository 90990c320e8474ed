//! Content typing for entries shown by the command line tool.

use lump_archive::error::{Error, Result};
use lump_archive::{Classifier, DataSource, FormatRegistry, TypeTag};

/// Tags entries that are archives themselves with their format id, empty entries as
/// markers, and everything else as unknown
#[derive(Debug, Clone, Default)]
pub struct ArchiveClassifier {
    registry: FormatRegistry,
}

impl ArchiveClassifier {
    pub fn new(registry: FormatRegistry) -> Self {
        Self { registry }
    }
}

impl Classifier for ArchiveClassifier {
    fn classify(&self, _name: &str, data: &[u8]) -> TypeTag {
        if data.is_empty() {
            return TypeTag::marker();
        }

        match self.registry.detect(&Bytes(data)) {
            Some(format) => TypeTag::new(format.as_str()),
            None => TypeTag::unknown(),
        }
    }
}

/// Borrowed bytes, readable by the format detectors without a copy
#[derive(Debug)]
struct Bytes<'a>(&'a [u8]);

impl DataSource for Bytes<'_> {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(buf.len())?))
            .filter(|range| range.end <= self.0.len());

        match range {
            Some(range) => {
                buf.copy_from_slice(&self.0[range]);
                Ok(())
            }
            None => Err(Error::OutOfRange {
                offset,
                length: buf.len() as u64,
                size: self.size(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use lump_archive::{Archive, Classifier, Entry, FormatId, TypeTag};
    use pretty_assertions::assert_eq;

    use crate::classify::ArchiveClassifier;

    #[test]
    fn nested_archives_get_their_format() -> lump_archive::error::Result<()> {
        let mut wad = Archive::new(FormatId::Wad);
        wad.add_entry("", Entry::with_data("DEMO1", vec![1, 2, 3]), None)?;
        let nested = wad.write()?;

        let classifier = ArchiveClassifier::default();
        assert_eq!(
            classifier.classify("MAPS.WAD", nested.data()),
            TypeTag::new("wad")
        );
        assert_eq!(classifier.classify("F_START", &[]), TypeTag::marker());
        assert_eq!(
            classifier.classify("README", b"just some text"),
            TypeTag::unknown()
        );

        Ok(())
    }
}
