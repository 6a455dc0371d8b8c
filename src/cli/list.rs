//! List the records associated with a source record.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use tracing::info;

use super::CliConfig;
use super::common::{ControlArgs, Environment, print_json};

/// Arguments of `polylookup list`.
#[derive(Args, Debug, Clone)]
pub struct ListCommand {
    #[command(flatten)]
    pub control: ControlArgs,

    /// Id of the source record; without it nothing is associated yet
    #[arg(long)]
    pub id: Option<String>,
}

impl ListCommand {
    /// Run against the configured environment and print the records.
    ///
    /// # Errors
    ///
    /// Configuration, resolution and query errors.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let env = Environment::connect(config).await?;
        print_json(&self.run(&env).await?)
    }

    /// List and return the records as a JSON array.
    ///
    /// # Errors
    ///
    /// Configuration, resolution and query errors.
    pub async fn run(&self, env: &Environment) -> Result<Value> {
        let control = self.control.to_control_config().await?;
        let descriptor = env.descriptor(&control).await?;
        let records = env
            .builder()
            .list_associated(&descriptor, self.id.as_deref())
            .await
            .context("Failed to list associated records")?;
        info!("{} associated {}", records.len(), descriptor.target_entity.logical_name);
        Ok(serde_json::to_value(records)?)
    }
}
