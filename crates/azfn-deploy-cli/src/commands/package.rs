//! Package command - build the deployment archive only

use anyhow::Result;
use clap::Args;
use colored::*;
use std::path::PathBuf;

use azfn_deploy_core::{package_to, AppConfig};

#[derive(Args)]
pub struct PackageCommand {
    /// Function app source directory
    #[arg(long)]
    source: Option<PathBuf>,

    /// Where to write the archive
    #[arg(short = 'o', long, default_value = "app.zip")]
    output: PathBuf,
}

impl PackageCommand {
    pub fn execute(&self, config: &AppConfig, json: bool) -> Result<()> {
        let source = self.source.clone().unwrap_or_else(|| config.source_dir());
        let stats = package_to(&source, &self.output)?;

        if json {
            let output = serde_json::json!({
                "source": source.display().to_string(),
                "archive": self.output.display().to_string(),
                "files": stats.files,
                "bytes": stats.bytes,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "{} Wrote {} ({} files, {} bytes)",
                "✓".green(),
                self.output.display().to_string().bold(),
                stats.files,
                stats.bytes
            );
        }

        Ok(())
    }
}
