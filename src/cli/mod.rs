//! Command-line interface for polylookup.
//!
//! The CLI exposes the resolver and the association query builder against a
//! live environment, one subcommand per operation:
//!
//! - `resolve` - print the resolved [`MetadataDescriptor`](crate::metadata::MetadataDescriptor)
//! - `list` - records associated with a source record
//! - `search` - candidate targets, one page at a time
//! - `associate` / `disassociate` - create or remove one association
//! - `fields` - host-record fields a control's templates depend on
//!
//! Every subcommand that talks to the environment takes the control's
//! parameters either from flags or from a `--control` TOML file (flags win),
//! and prints JSON on stdout. Logging goes to stderr.
//!
//! # Examples
//!
//! ```bash
//! # Native many-to-many
//! polylookup list --entity account --relationship account_contacts --id <account id>
//!
//! # Custom intersect entity
//! polylookup search --entity account --relationship account_connectionrows \
//!     --link-relationship connectionrow_target_contact "ann"
//!
//! # Which fields does this filter depend on? (offline)
//! polylookup fields --template '<condition value="{{ parentcustomerid.id }}" />'
//! ```

mod associate;
pub mod common;
mod fields;
mod list;
mod resolve;
mod search;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use associate::{AssociateCommand, DisassociateCommand};
pub use fields::FieldsCommand;
pub use list::ListCommand;
pub use resolve::ResolveCommand;
pub use search::SearchCommand;

/// Runtime configuration derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter directive; `None` disables logging
    pub log_level: Option<String>,

    /// Global config file to use instead of the default location
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Configuration with logging off and the default config location.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the stderr log subscriber.
    ///
    /// `RUST_LOG` wins over the level chosen by `--verbose`; `--quiet`
    /// switches logging off entirely. Only the first call in a process has an
    /// effect.
    pub fn init_logging(&self) {
        let Some(level) = &self.log_level else {
            return;
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    }
}

/// Inspect and edit polymorphic lookup associations.
#[derive(Parser)]
#[command(
    name = "polylookup",
    about = "Resolve lookup relationships and manage their associations",
    version,
    long_about = "Resolves the relationship behind a polymorphic lookup control \
                  (native many-to-many, custom intersect entity or connection) \
                  and lists, searches, creates and removes its associations \
                  through the Web API."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the global config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a control's relationship and print its descriptor
    Resolve(ResolveCommand),

    /// List the records associated with a source record
    List(ListCommand),

    /// Search candidate target records
    Search(SearchCommand),

    /// Associate a target record with a source record
    Associate(AssociateCommand),

    /// Remove an association
    Disassociate(DisassociateCommand),

    /// Show the host-record fields a control's templates depend on
    Fields(FieldsCommand),
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Returns the command's error with context for display.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Build a [`CliConfig`] from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the command's error with context for display.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Resolve(cmd) => cmd.execute(&config).await,
            Commands::List(cmd) => cmd.execute(&config).await,
            Commands::Search(cmd) => cmd.execute(&config).await,
            Commands::Associate(cmd) => cmd.execute(&config).await,
            Commands::Disassociate(cmd) => cmd.execute(&config).await,
            Commands::Fields(cmd) => cmd.execute(&config).await,
        }
    }
}
