//! Template rendering engine with Tera.
//!
//! Query templates (view FetchXML and custom filters) may reference fields of
//! the host record as `{{ field }}` or `{{ field.property }}`. This module
//! expands them against an explicit [`RecordContext`]; there is no ambient
//! "current record".

use serde_json::{Map, Value};
use tera::{Context as TeraContext, Tera};

use super::error::TemplateError;
use super::{extract_variable_paths, RecordContext};

/// Template renderer wrapping Tera's one-off rendering.
///
/// Output is XML-escaped because every template ends up inside FetchXML.
/// Placeholders whose field is absent from the record expand to an empty
/// string rather than failing, matching how an unset form field behaves.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    /// Whether templating is enabled; when disabled templates pass through
    enabled: bool,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TemplateRenderer {
    /// Create a renderer.
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
        }
    }

    /// Expand `template` with the field values of `record`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use polylookup::templating::{RecordContext, TemplateRenderer};
    /// use serde_json::json;
    ///
    /// let record = RecordContext::new().with("name", json!("Contoso"));
    /// let out = TemplateRenderer::default()
    ///     .expand(r#"<condition attribute="name" operator="eq" value="{{ name }}" />"#, &record)
    ///     .unwrap();
    /// assert_eq!(out, r#"<condition attribute="name" operator="eq" value="Contoso" />"#);
    /// ```
    pub fn expand(&self, template: &str, record: &RecordContext) -> Result<String, TemplateError> {
        if !self.enabled || !contains_template_syntax(template) {
            return Ok(template.to_string());
        }

        let mut values = record.values().clone();
        for path in extract_variable_paths(template) {
            let segments: Vec<&str> = path.split('.').collect();
            ensure_path(&mut values, &segments);
        }

        let mut context = TeraContext::new();
        for (name, value) in &values {
            context.insert(name.as_str(), value);
        }

        tracing::debug!(target: "templating", "Expanding template with {} field(s)", values.len());
        Tera::one_off(template, &context, true).map_err(|e| TemplateError::Render {
            message: format_tera_error(&e),
        })
    }
}

/// Whether the content contains Tera delimiters.
fn contains_template_syntax(content: &str) -> bool {
    content.contains("{{") || content.contains("{%") || content.contains("{#")
}

/// Make sure `segments` resolves inside `values`, inserting an empty string
/// at the leaf and objects along the way where something is missing.
fn ensure_path(values: &mut Map<String, Value>, segments: &[&str]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        let slot = values.entry(first.to_string()).or_insert(Value::Null);
        if slot.is_null() {
            *slot = Value::String(String::new());
        }
        return;
    }

    let slot = values.entry(first.to_string()).or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(inner) = slot {
        ensure_path(inner, rest);
    }
}

/// Walk a Tera error chain, dropping the internal one-off template name.
fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut messages = Vec::new();
    let mut current: Option<&dyn Error> = Some(error);
    while let Some(err) = current {
        let cleaned = err
            .to_string()
            .replace("while rendering '__tera_one_off'", "")
            .replace("Failed to render '__tera_one_off'", "")
            .replace("Failed to parse '__tera_one_off'", "")
            .replace("'__tera_one_off'", "template")
            .trim()
            .to_string();
        if !cleaned.is_empty() {
            messages.push(cleaned);
        }
        current = err.source();
    }

    if messages.is_empty() {
        "Template syntax error".to_string()
    } else {
        messages.join(" → ")
    }
}
