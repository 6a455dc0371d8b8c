//! Create and remove single associations.

use anyhow::Result;
use clap::Args;
use serde_json::{Value, json};
use tracing::info;

use super::CliConfig;
use super::common::{ControlArgs, Environment, print_json};

/// Arguments of `polylookup associate`.
#[derive(Args, Debug, Clone)]
pub struct AssociateCommand {
    #[command(flatten)]
    pub control: ControlArgs,

    /// Id of the saved source record
    #[arg(long)]
    pub id: String,

    /// Id of the target record to associate
    #[arg(long)]
    pub target: String,
}

impl AssociateCommand {
    /// Run against the configured environment.
    ///
    /// # Errors
    ///
    /// Configuration, resolution and association errors.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let env = Environment::connect(config).await?;
        print_json(&self.run(&env).await?)
    }

    /// Associate and return the outcome as JSON. `link_row_id` is set for the
    /// lookup-based shapes.
    ///
    /// # Errors
    ///
    /// Configuration, resolution and association errors.
    pub async fn run(&self, env: &Environment) -> Result<Value> {
        let session = env.session(self.control.to_control_config().await?)?;
        let link_row_id = session.associate(&self.id, &self.target).await?;
        info!("Associated {} with {}", self.target, self.id);
        Ok(json!({
            "source_record_id": self.id,
            "target_id": self.target,
            "link_row_id": link_row_id,
        }))
    }
}

/// Arguments of `polylookup disassociate`.
#[derive(Args, Debug, Clone)]
pub struct DisassociateCommand {
    #[command(flatten)]
    pub control: ControlArgs,

    /// Id of the saved source record
    #[arg(long)]
    pub id: String,

    /// Target id (many-to-many) or link row id (custom and connection)
    #[arg(long, value_name = "ID")]
    pub link: String,
}

impl DisassociateCommand {
    /// Run against the configured environment.
    ///
    /// # Errors
    ///
    /// Configuration, resolution and association errors.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let env = Environment::connect(config).await?;
        print_json(&self.run(&env).await?)
    }

    /// Remove the association and return the outcome as JSON.
    ///
    /// # Errors
    ///
    /// Configuration, resolution and association errors, including an id of
    /// the wrong kind for the shape.
    pub async fn run(&self, env: &Environment) -> Result<Value> {
        let session = env.session(self.control.to_control_config().await?)?;
        session.disassociate(&self.id, &self.link).await?;
        info!("Removed association {} from {}", self.link, self.id);
        Ok(json!({
            "source_record_id": self.id,
            "removed": self.link,
        }))
    }
}
