use std::path::PathBuf;

use clap::Args;
use itertools::Itertools;
use lump_archive::{FileSource, FormatRegistry};
use miette::{Context, Result};
use owo_colors::OwoColorize;

#[derive(Args)]
pub struct DetectArgs {
    /// Files to check
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// List every format whose signature matches, not only the preferred one
    #[arg(short, long, default_value_t = false)]
    all: bool,
}

impl DetectArgs {
    pub fn handle(&self) -> Result<()> {
        let registry = FormatRegistry::standard();

        for path in &self.files {
            let source =
                FileSource::open(path).context(format!("path: {}", path.display()))?;

            let found = if self.all {
                registry.candidates(&source)
            } else {
                registry.detect(&source).into_iter().collect()
            };

            if found.is_empty() {
                println!("{}: {}", path.display(), "unknown".red());
            } else {
                println!(
                    "{}: {}",
                    path.display(),
                    found
                        .iter()
                        .map(|id| format!("{} ({})", id.green(), id.description()))
                        .join(", ")
                );
            }
        }

        Ok(())
    }
}
