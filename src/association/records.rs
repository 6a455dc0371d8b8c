//! Plain data returned by the association query builder.

use serde::Serialize;

use crate::api::{Row, formatted_value_key, value_to_text};
use crate::constants::INTERSECT_ALIAS;
use crate::metadata::{LinkIdKind, MetadataDescriptor};
use crate::templating::RecordContext;

/// One target record, as listed or found by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationRecord {
    /// Id of the link row; only set for listed records of the lookup-based
    /// shapes
    pub intersect_row_id: Option<String>,
    /// Id of the target record
    pub target_id: String,
    /// Display text of the target record; never null
    pub target_display_name: String,
    /// Every column returned for the row, including annotations
    pub raw_fields: Row,
}

impl AssociationRecord {
    /// Build from a result row of an association or search query.
    pub fn from_row(row: Row, descriptor: &MetadataDescriptor) -> Self {
        let target = &descriptor.target_entity;
        let target_id = row.get(&target.primary_key_attribute).map(value_to_text).unwrap_or_default();
        let target_display_name = display_text(&row, &target.primary_name_attribute);
        let intersect_row_id = descriptor
            .shape
            .link_join()
            .map(|join| format!("{INTERSECT_ALIAS}.{}", join.intersect_primary_key_attribute))
            .and_then(|column| row.get(&column).map(value_to_text))
            .filter(|id| !id.is_empty());

        Self {
            intersect_row_id,
            target_id,
            target_display_name,
            raw_fields: row,
        }
    }

    /// Display text of `column`.
    pub fn display_value(&self, column: &str) -> String {
        display_text(&self.raw_fields, column)
    }

    /// The identifier of the given kind, if this record carries one.
    pub fn link_id(&self, kind: LinkIdKind) -> Option<&str> {
        match kind {
            LinkIdKind::TargetId => Some(self.target_id.as_str()).filter(|id| !id.is_empty()),
            LinkIdKind::IntersectRowId => self.intersect_row_id.as_deref(),
        }
    }
}

/// Formatted value annotation, then raw value, then the empty string.
pub fn display_text(row: &Row, column: &str) -> String {
    if let Some(formatted) = row.get(&formatted_value_key(column)).and_then(|v| v.as_str()) {
        return formatted.to_string();
    }
    row.get(column).map(value_to_text).unwrap_or_default()
}

/// Parameters of a candidate search.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Free text matched against the searchable columns; blank means "all"
    pub text: String,
    /// Number of records per page
    pub page_size: usize,
    /// Field values of the host record, used to expand placeholders
    pub record: RecordContext,
    /// Additional `<filter>` template applied to the target entity
    pub custom_filter: Option<String>,
    /// Columns searched in addition to the primary name
    pub search_columns: Vec<String>,
}

impl SearchRequest {
    /// Search for `text`, returning at most `page_size` records.
    pub fn new(text: impl Into<String>, page_size: usize) -> Self {
        Self {
            text: text.into(),
            page_size,
            ..Self::default()
        }
    }

    /// Expand placeholders against `record`.
    #[must_use]
    pub fn with_record(mut self, record: RecordContext) -> Self {
        self.record = record;
        self
    }

    /// Apply an additional filter template.
    #[must_use]
    pub fn with_custom_filter(mut self, filter: impl Into<String>) -> Self {
        self.custom_filter = Some(filter.into());
        self
    }

    /// Also match the text against `columns`.
    #[must_use]
    pub fn with_search_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_columns.extend(columns.into_iter().map(Into::into));
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    /// At most `page_size` records
    pub records: Vec<AssociationRecord>,
    /// Whether more records match than were returned
    pub has_more: bool,
}

impl SearchPage {
    /// A page with no records.
    pub fn empty() -> Self {
        Self::default()
    }
}
