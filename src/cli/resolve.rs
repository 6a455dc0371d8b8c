//! Print the resolved descriptor of a control.

use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tracing::info;

use super::CliConfig;
use super::common::{ControlArgs, Environment, print_json};

/// Arguments of `polylookup resolve`.
#[derive(Args, Debug, Clone)]
pub struct ResolveCommand {
    #[command(flatten)]
    pub control: ControlArgs,
}

impl ResolveCommand {
    /// Run against the configured environment and print the descriptor.
    ///
    /// # Errors
    ///
    /// Configuration and resolution errors.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let env = Environment::connect(config).await?;
        print_json(&self.run(&env).await?)
    }

    /// Resolve and return the descriptor as JSON.
    ///
    /// # Errors
    ///
    /// Configuration and resolution errors.
    pub async fn run(&self, env: &Environment) -> Result<Value> {
        let control = self.control.to_control_config().await?;
        let descriptor = env.descriptor(&control).await?;
        info!(
            "Resolved {} -> {} as {}",
            descriptor.source_entity.logical_name,
            descriptor.target_entity.logical_name,
            descriptor.shape.kind()
        );
        Ok(serde_json::to_value(&*descriptor)?)
    }
}
