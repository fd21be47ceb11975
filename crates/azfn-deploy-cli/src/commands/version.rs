//! Version command - show version information

use anyhow::Result;
use clap::Args;
use colored::*;

#[derive(Args)]
pub struct VersionCommand;

impl VersionCommand {
    pub fn execute(&self) -> Result<()> {
        println!("{} {}", "azfn-deploy".bold(), env!("CARGO_PKG_VERSION").green());
        println!();
        println!("  {} {}", "Core library:".cyan(), azfn_deploy_core::VERSION);
        println!("  {} {}", "Target OS:".cyan(), std::env::consts::OS);
        println!("  {} {}", "Architecture:".cyan(), std::env::consts::ARCH);

        Ok(())
    }
}
