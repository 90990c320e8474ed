use std::path::PathBuf;

use clap::Args;
use lump_archive::FormatId;
use miette::Result;
use owo_colors::OwoColorize;

use super::open_archive;

#[derive(Args)]
pub struct ListArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Read the input as this format instead of detecting it
    #[arg(long, value_name = "FORMAT")]
    format: Option<FormatId>,

    /// Also print archive properties
    #[arg(short, long, default_value_t = false)]
    properties: bool,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let mut archive = open_archive(&self.file, self.format)?;
        archive.load_all()?;

        println!(
            "{} ({}, {} entries)",
            self.file.display().bold(),
            archive.format().description(),
            archive.num_entries()
        );

        if self.properties {
            for (key, value) in archive.properties() {
                println!("  {}: {value:?}", key.dimmed());
            }
        }

        for (path, entry) in archive.entries() {
            let tag = entry.type_tag().map(|t| t.as_str()).unwrap_or("-");
            println!("{:>10}  {:<12}  {path}", entry.size(), tag.cyan());
        }

        Ok(())
    }
}
