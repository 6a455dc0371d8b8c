//! Report the host-record fields a control depends on.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::Value;

use super::CliConfig;
use super::common::{ControlArgs, Environment, print_json};
use crate::templating::extract_field_names;

/// Arguments of `polylookup fields`.
#[derive(Args, Debug, Clone)]
pub struct FieldsCommand {
    /// Inspect this template instead of a control; works offline
    #[arg(long)]
    pub template: Option<String>,

    #[command(flatten)]
    pub control: ControlArgs,
}

impl FieldsCommand {
    /// Print the field names as a JSON array.
    ///
    /// # Errors
    ///
    /// Configuration and resolution errors; none for `--template`.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        if let Some(template) = &self.template {
            return print_json(&extract_field_names(template));
        }
        self.require_control()?;
        let env = Environment::connect(config).await?;
        print_json(&self.run(&env).await?)
    }

    /// Field names of `--template`, or those watched by the control's view
    /// and custom filter.
    ///
    /// # Errors
    ///
    /// Configuration and resolution errors.
    pub async fn run(&self, env: &Environment) -> Result<Value> {
        if let Some(template) = &self.template {
            return Ok(serde_json::to_value(extract_field_names(template))?);
        }
        self.require_control()?;
        let session = env.session(self.control.to_control_config().await?)?;
        Ok(serde_json::to_value(session.watched_fields().await?)?)
    }

    fn require_control(&self) -> Result<()> {
        if self.control.is_empty() {
            bail!("Pass --template <TEXT>, or a control via --entity/--relationship or --control");
        }
        Ok(())
    }
}
