use std::path::PathBuf;

use clap::Args;
use lump_archive::FormatId;
use miette::{Context, Result};
use tracing::info;

use super::{open_archive, write_archive};

#[derive(Args)]
pub struct ConvertArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// The archive to create
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Format to write
    #[arg(long, value_name = "FORMAT")]
    format: FormatId,

    /// Read the input as this format instead of detecting it
    #[arg(long, value_name = "FORMAT")]
    from: Option<FormatId>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ConvertArgs {
    pub fn handle(&self) -> Result<()> {
        let mut archive = open_archive(&self.input, self.from)?;
        archive.load_all()?;

        info!(
            "converting {} from {} to {}",
            self.input.display(),
            archive.format(),
            self.format
        );

        archive
            .set_format(self.format)
            .context(format!("converting to {}", self.format))?;
        archive.set_filename(Some(self.output.clone()));

        write_archive(&mut archive, &self.output, self.overwrite)
    }
}
