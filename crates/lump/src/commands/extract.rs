use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use clap::Args;
use lump_archive::FormatId;
use miette::{Context, IntoDiagnostic, Result};
use tracing::{info, warn};

use super::open_archive;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Read the input as this format instead of detecting it
    #[arg(long, value_name = "FORMAT")]
    format: Option<FormatId>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// Entry paths come from the archive, so anything that could climb out of the target is refused
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut archive = open_archive(&self.file, self.format)?;
        archive.load_all()?;

        for (name, entry) in archive.entries() {
            let relative = Path::new(&name);
            if !is_contained(relative) {
                warn!("skipping {name}, it points outside of the target");
                continue;
            }

            let p = self.directory.join(relative);

            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)
                    .into_diagnostic()
                    .context(format!("creating {}", parent.display()))?;
            }

            // markers only keep their directory alive
            if entry.is_folder_marker() {
                continue;
            }

            info!("writing {}", p.display());

            let mut out = if !self.overwrite {
                File::create_new(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", p.display()))?
            } else {
                File::create(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", p.display()))?
            };

            out.write_all(entry.loaded_data()?)
                .into_diagnostic()
                .context(format!("writing {}", p.display()))?;
        }

        Ok(())
    }
}
