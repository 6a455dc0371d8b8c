//! Per-control configuration: the parameters a lookup control is bound with.
//!
//! ```toml
//! entity = "account"
//! relationship = "account_connectionrows"
//! link_relationship = "connectionrow_target_contact"
//! link_shape = "custom"
//! view = "Active Contacts"
//! search_columns = ["emailaddress1"]
//! custom_filter = '<filter><condition attribute="parentcustomerid" operator="eq" value="{{ parentcustomerid.id }}" /></filter>'
//! page_size = 10
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::association::SearchRequest;
use crate::constants::MAX_PAGE_SIZE;
use crate::core::LookupError;
use crate::metadata::{DescriptorKey, LinkShape};
use crate::templating::RecordContext;

/// Bound parameters of one lookup control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// Logical name of the host (source) entity
    pub entity: String,

    /// Schema name of the relationship from the source
    pub relationship: String,

    /// Many-to-one from the intersect entity to the target, for the
    /// lookup-based shapes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_relationship: Option<String>,

    /// Which lookup-based shape applies
    #[serde(default)]
    pub link_shape: LinkShape,

    /// Target view; the default public view when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    /// Extra `<filter>` template applied to searches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_filter: Option<String>,

    /// Columns searched in addition to the target's primary name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_columns: Vec<String>,

    /// Search page size; the global default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
}

impl ControlConfig {
    /// Control bound to a native many-to-many relationship.
    pub fn new(entity: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            relationship: relationship.into(),
            ..Self::default()
        }
    }

    /// Load and validate a control definition from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// [`validate`](Self::validate).
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read control config from {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse control config from {}", path.display()))?;
        config.validate().with_context(|| format!("Invalid control config in {}", path.display()))?;
        Ok(config)
    }

    /// Check that the parameters describe a resolvable control.
    ///
    /// # Errors
    ///
    /// [`LookupError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), LookupError> {
        let error = |message: String| Err(LookupError::ConfigError { message });

        if self.entity.trim().is_empty() {
            return error("entity must not be empty".to_string());
        }
        if self.relationship.trim().is_empty() {
            return error("relationship must not be empty".to_string());
        }
        if self.link_relationship.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return error("link_relationship must not be empty when set".to_string());
        }
        if self.link_shape == LinkShape::Connection && self.link_relationship.is_none() {
            return error("link_shape 'connection' requires a link_relationship".to_string());
        }
        if let Some(size) = self.page_size {
            if size == 0 || size > MAX_PAGE_SIZE {
                return error(format!("page_size must be between 1 and {MAX_PAGE_SIZE}, got {size}"));
            }
        }
        if self.search_columns.iter().any(|c| c.trim().is_empty()) {
            return error("search_columns must not contain empty names".to_string());
        }
        Ok(())
    }

    /// Memoization key of the descriptor this control needs.
    pub fn descriptor_key(&self) -> DescriptorKey {
        let key = match &self.link_relationship {
            Some(link) => DescriptorKey::linked(&self.entity, &self.relationship, link, self.link_shape),
            None => DescriptorKey::many_to_many(&self.entity, &self.relationship),
        };
        match &self.view {
            Some(view) => key.with_view(view),
            None => key,
        }
    }

    /// Page size of this control, falling back to `default`.
    pub fn page_size_or(&self, default: usize) -> usize {
        self.page_size.unwrap_or(default)
    }

    /// Search request for `text` carrying this control's filter and search
    /// columns.
    pub fn search_request(&self, text: &str, page_size: usize, record: RecordContext) -> SearchRequest {
        let request = SearchRequest::new(text, page_size)
            .with_record(record)
            .with_search_columns(self.search_columns.iter().cloned());
        match &self.custom_filter {
            Some(filter) => request.with_custom_filter(filter.clone()),
            None => request,
        }
    }
}
