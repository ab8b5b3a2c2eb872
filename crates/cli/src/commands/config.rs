//! accord config command

use clap::Args;
use shared::AccordConfig;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ConfigCommand {
    /// Configuration file to load; defaults are used when omitted
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn run(&self) -> anyhow::Result<()> {
        let config = match &self.file {
            Some(path) => AccordConfig::from_file(path)?,
            None => AccordConfig::default(),
        };
        println!("{}", serde_json::to_string_pretty(&config)?);
        Ok(())
    }
}
