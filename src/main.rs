//! polylookup CLI entry point
//!
//! Parses arguments, runs the selected subcommand and renders failures with
//! context and suggestions on stderr:
//! - `resolve` - print a control's resolved relationship descriptor
//! - `list` - list associated records
//! - `search` - search candidate target records
//! - `associate` / `disassociate` - create or remove an association
//! - `fields` - host-record fields a control depends on

use anyhow::Result;
use clap::Parser;
use polylookup::cli;
use polylookup::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
