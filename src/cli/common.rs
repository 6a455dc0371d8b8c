//! Arguments and plumbing shared by the CLI subcommands.

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use super::CliConfig;
use crate::api::DataApi;
use crate::association::AssociationQueryBuilder;
use crate::config::{ControlConfig, GlobalConfig};
use crate::metadata::{LinkShape, MetadataDescriptor};
use crate::resolver::RelationshipResolver;
use crate::session::LookupSession;
use crate::templating::RecordContext;

/// Parameters of the lookup control a subcommand works on.
///
/// Values given as flags override those loaded from `--control`.
#[derive(Args, Debug, Clone, Default)]
pub struct ControlArgs {
    /// TOML file with the control's parameters
    #[arg(long, value_name = "FILE")]
    pub control: Option<PathBuf>,

    /// Logical name of the source entity
    #[arg(short, long)]
    pub entity: Option<String>,

    /// Schema name of the relationship from the source entity
    #[arg(short, long)]
    pub relationship: Option<String>,

    /// Many-to-one from the intersect entity to the target entity
    #[arg(long)]
    pub link_relationship: Option<String>,

    /// Shape of a lookup-based relationship: custom or connection
    #[arg(long, value_parser = parse_link_shape)]
    pub shape: Option<LinkShape>,

    /// Target view to use instead of the default public view
    #[arg(long)]
    pub view: Option<String>,

    /// Extra FetchXML <filter> template applied to searches
    #[arg(long)]
    pub custom_filter: Option<String>,

    /// Column searched in addition to the primary name (repeatable)
    #[arg(long = "search-column", value_name = "COLUMN")]
    pub search_columns: Vec<String>,

    /// Number of records per search page
    #[arg(long)]
    pub page_size: Option<usize>,
}

impl ControlArgs {
    /// Whether any control parameter was given at all.
    pub fn is_empty(&self) -> bool {
        self.control.is_none() && self.entity.is_none() && self.relationship.is_none()
    }

    /// Merge the `--control` file (if any) with the flags and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the merged
    /// parameters do not validate.
    pub async fn to_control_config(&self) -> Result<ControlConfig> {
        let mut config = match &self.control {
            Some(path) => ControlConfig::load_from(path).await?,
            None => ControlConfig::default(),
        };

        if let Some(entity) = &self.entity {
            config.entity.clone_from(entity);
        }
        if let Some(relationship) = &self.relationship {
            config.relationship.clone_from(relationship);
        }
        if self.link_relationship.is_some() {
            config.link_relationship.clone_from(&self.link_relationship);
        }
        if let Some(shape) = self.shape {
            config.link_shape = shape;
        }
        if self.view.is_some() {
            config.view.clone_from(&self.view);
        }
        if self.custom_filter.is_some() {
            config.custom_filter.clone_from(&self.custom_filter);
        }
        if !self.search_columns.is_empty() {
            config.search_columns.clone_from(&self.search_columns);
        }
        if self.page_size.is_some() {
            config.page_size = self.page_size;
        }

        if config.entity.is_empty() && config.relationship.is_empty() {
            bail!("No control given: pass --entity and --relationship, or --control <FILE>");
        }
        config.validate().context("Invalid control parameters")?;
        Ok(config)
    }
}

fn parse_link_shape(value: &str) -> Result<LinkShape, String> {
    match value.to_ascii_lowercase().as_str() {
        "custom" => Ok(LinkShape::Custom),
        "connection" => Ok(LinkShape::Connection),
        other => Err(format!("unknown shape '{other}' (expected 'custom' or 'connection')")),
    }
}

/// The environment a subcommand runs against.
pub struct Environment {
    api: Arc<dyn DataApi>,
    resolver: Arc<RelationshipResolver>,
    default_page_size: usize,
}

impl Environment {
    /// Wrap an already constructed data API.
    pub fn new(api: Arc<dyn DataApi>, default_page_size: usize) -> Self {
        Self {
            resolver: Arc::new(RelationshipResolver::new(Arc::clone(&api))),
            api,
            default_page_size,
        }
    }

    /// Connect to the environment named by the global configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or names no
    /// usable environment.
    pub async fn connect(cli: &CliConfig) -> Result<Self> {
        let global = GlobalConfig::load_with_optional(cli.config_path.clone()).await?;
        let client = global.client()?;
        Ok(Self::new(Arc::new(client), global.page_size))
    }

    /// Page size used when the control does not set one.
    pub const fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// Resolve the descriptor of `control`.
    ///
    /// # Errors
    ///
    /// Any resolution error.
    pub async fn descriptor(&self, control: &ControlConfig) -> Result<Arc<MetadataDescriptor>> {
        let key = control.descriptor_key();
        self.resolver
            .resolve(&key)
            .await
            .with_context(|| format!("Failed to resolve '{}' on '{}'", key.relationship, key.source_entity))
    }

    /// Query builder over this environment.
    pub fn builder(&self) -> AssociationQueryBuilder {
        AssociationQueryBuilder::new(Arc::clone(&self.api))
    }

    /// Session for `control`, sharing this environment's resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if `control` does not validate.
    pub fn session(&self, control: ControlConfig) -> Result<LookupSession> {
        Ok(LookupSession::with_resolver(
            Arc::clone(&self.api),
            Arc::clone(&self.resolver),
            control,
            self.default_page_size,
        )?)
    }
}

/// Parse `--record` JSON into a [`RecordContext`].
///
/// # Errors
///
/// Returns an error unless `json` is a JSON object.
pub fn parse_record(json: Option<&str>) -> Result<RecordContext> {
    let Some(json) = json else {
        return Ok(RecordContext::new());
    };
    let values: Map<String, Value> =
        serde_json::from_str(json).context("--record must be a JSON object of field values")?;
    Ok(RecordContext::from_map(values))
}

/// Print `value` as pretty JSON on stdout.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
