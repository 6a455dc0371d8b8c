//! Template expansion for query templates.
//!
//! Two operations are offered to the rest of the crate:
//!
//! - [`TemplateRenderer::expand`] substitutes `{{ field }}` placeholders with
//!   values from an explicit [`RecordContext`]
//! - [`extract_field_names`] lists the distinct host-record fields a template
//!   depends on, which drives cache invalidation on field changes
//!
//! Placeholders follow Tera syntax. For a dotted placeholder such as
//! `{{ parentcustomerid.id }}` the field name is the first segment.

pub mod error;
pub mod renderer;

pub use error::TemplateError;
pub use renderer::TemplateRenderer;

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Field values of the host record, passed explicitly to every operation
/// that needs them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordContext {
    values: Map<String, Value>,
}

impl RecordContext {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing JSON object.
    pub const fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values,
        }
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    /// Value of a field, if set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// All field values.
    pub const fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

static VARIABLE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{-?\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)").expect("variable path pattern is valid")
});

/// Every distinct variable path (`field` or `field.sub`) referenced in
/// `{{ ... }}` expressions, in first-appearance order.
pub(crate) fn extract_variable_paths(template: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for caps in VARIABLE_PATH.captures_iter(template) {
        let path = caps[1].to_string();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// Distinct host-record field names referenced by `template`, in
/// first-appearance order.
///
/// # Examples
///
/// ```rust
/// use polylookup::templating::extract_field_names;
///
/// let fields = extract_field_names(
///     r#"<condition attribute="parentcustomerid" operator="eq" value="{{ parentcustomerid.id }}" />
///        <condition attribute="name" operator="like" value="{{name}}%" />
///        <condition attribute="owner" operator="eq" value="{{ parentcustomerid.name }}" />"#,
/// );
/// assert_eq!(fields, vec!["parentcustomerid", "name"]);
/// ```
pub fn extract_field_names(template: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for path in extract_variable_paths(template) {
        let field = path.split('.').next().unwrap_or(&path).to_string();
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_ignores_non_placeholders() {
        assert!(extract_field_names("<fetch><entity name=\"contact\" /></fetch>").is_empty());
        assert!(extract_field_names("{% if x %}{% endif %}").is_empty());
    }

    #[test]
    fn test_extract_handles_whitespace_control_and_filters() {
        let fields = extract_field_names("{{- name | upper }} {{statecode}} {{ name }}");
        assert_eq!(fields, vec!["name", "statecode"]);
    }

    #[test]
    fn test_record_context_accessors() {
        let mut record = RecordContext::new().with("name", json!("Contoso"));
        record.set("revenue", json!(10));
        assert_eq!(record.get("name"), Some(&json!("Contoso")));
        assert_eq!(record.values().len(), 2);
        assert!(record.get("missing").is_none());
    }
}
