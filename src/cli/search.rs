//! Search candidate target records.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use super::CliConfig;
use super::common::{ControlArgs, Environment, parse_record, print_json};

/// Arguments of `polylookup search`.
#[derive(Args, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub control: ControlArgs,

    /// Text matched against the searchable columns; empty lists everything
    #[arg(default_value = "")]
    pub text: String,

    /// Host record field values as a JSON object, for `{{ field }}`
    /// placeholders in the view and custom filter
    #[arg(long, value_name = "JSON")]
    pub record: Option<String>,
}

impl SearchCommand {
    /// Run against the configured environment and print the page.
    ///
    /// # Errors
    ///
    /// Configuration, resolution and query errors.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let env = Environment::connect(config).await?;
        print_json(&self.run(&env).await?)
    }

    /// Search and return the page as JSON (`records` and `has_more`).
    ///
    /// # Errors
    ///
    /// Configuration, resolution and query errors.
    pub async fn run(&self, env: &Environment) -> Result<Value> {
        let control = self.control.to_control_config().await?;
        let record = parse_record(self.record.as_deref())?;
        let descriptor = env.descriptor(&control).await?;

        let page_size = control.page_size_or(env.default_page_size());
        let request = control.search_request(&self.text, page_size, record);
        let page = env
            .builder()
            .search(&descriptor, &request)
            .await
            .with_context(|| format!("Search for '{}' failed", self.text))?;
        Ok(serde_json::to_value(page)?)
    }
}
