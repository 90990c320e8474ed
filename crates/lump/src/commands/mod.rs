pub mod convert;
pub mod detect;
pub mod diff;
pub mod extract;
pub mod list;
pub mod pack;

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use lump_archive::{Archive, FormatId, FormatRegistry, OpenOptions};
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::warn;

use crate::classify::ArchiveClassifier;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// List the entries of an archive
    List(list::ListArgs),
    /// Extract an archive into a directory
    Extract(extract::ExtractArgs),
    /// Build an archive from a directory
    Pack(pack::PackArgs),
    /// Rewrite an archive in another format
    Convert(convert::ConvertArgs),
    /// Report the format of files
    Detect(detect::DetectArgs),
    /// Compare two archives
    Diff(diff::DiffArgs),
}

impl Commands {
    pub fn handle(&self) -> Result<()> {
        match self {
            Commands::List(list) => list.handle(),
            Commands::Extract(extract) => extract.handle(),
            Commands::Pack(pack) => pack.handle(),
            Commands::Convert(convert) => convert.handle(),
            Commands::Detect(detect) => detect.handle(),
            Commands::Diff(diff) => diff.handle(),
        }
    }
}

/// Open `path` as `format`, or as whatever format it is detected as
pub(crate) fn open_archive(path: &Path, format: Option<FormatId>) -> Result<Archive> {
    let registry = FormatRegistry::standard();
    let format = match format {
        Some(format) => format,
        None => registry
            .detect_file(path)
            .context(format!("path: {}", path.display()))?
            .ok_or_else(|| miette!("unable to detect the format of {}", path.display()))?,
    };

    let mut archive = Archive::new(format).with_options(OpenOptions::default());
    archive.set_classifier(Arc::new(ArchiveClassifier::new(registry)));
    archive
        .open_file(path)
        .context(format!("opening {} as {format}", path.display()))?;

    Ok(archive)
}

/// Serialize `archive` and store it at `path`. Nothing is created when serializing fails.
pub(crate) fn write_archive(archive: &mut Archive, path: &Path, overwrite: bool) -> Result<()> {
    let data = archive
        .write()
        .context(format!("serializing {}", archive.format()))?;

    for warning in archive.take_warnings() {
        warn!("{warning}");
    }

    let mut out = if !overwrite {
        File::create_new(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))?
    } else {
        File::create(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))?
    };

    out.write_all(data.data())
        .into_diagnostic()
        .context(format!("writing {}", path.display()))
}
