use std::path::PathBuf;

use clap::Args;
use itertools::Itertools;
use lump_archive::{Archive, Entry, FormatId, FormatRegistry};
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::write_archive;

#[derive(Args)]
pub struct PackArgs {
    /// A source directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// The archive to create
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Archive format, guessed from the file extension when left out
    #[arg(long, value_name = "FORMAT")]
    format: Option<FormatId>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl PackArgs {
    fn format(&self) -> Result<FormatId> {
        if let Some(format) = self.format {
            return Ok(format);
        }

        self.file
            .extension()
            .and_then(|ext| FormatRegistry::standard().by_extension(&ext.to_string_lossy()))
            .ok_or_else(|| miette!("unable to guess a format for {}", self.file.display()))
    }

    pub fn handle(&self) -> Result<()> {
        let format = self.format()?;
        let mut archive = Archive::new(format);
        archive.set_filename(Some(self.file.clone()));

        let mut files = WalkDir::new(&self.directory)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter(|e| e.as_ref().map_or(true, |e| e.file_type().is_file()))
            .peekable();

        if files.peek().is_none() {
            return Err(miette!("{} is empty", self.directory.display()));
        }

        for file in files {
            let file = file.into_diagnostic()?;
            let relative = file
                .path()
                .strip_prefix(&self.directory)
                .into_diagnostic()?;

            let dir = relative
                .parent()
                .map(|p| p.iter().map(|c| c.to_string_lossy()).join("/"))
                .unwrap_or_default();
            let name = file.file_name().to_string_lossy().into_owned();

            let data = std::fs::read(file.path())
                .into_diagnostic()
                .context(format!("reading {}", file.path().display()))?;

            debug!("adding {} ({} bytes)", relative.display(), data.len());
            archive
                .add_entry(&dir, Entry::with_data(name, data), None)
                .context(format!("adding {}", relative.display()))?;
        }

        info!(
            "writing {} entries to {} as {format}",
            archive.num_entries(),
            self.file.display()
        );
        write_archive(&mut archive, &self.file, self.overwrite)
    }
}
