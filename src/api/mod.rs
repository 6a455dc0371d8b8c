//! Remote data access.
//!
//! Everything the core needs from the platform goes through the [`DataApi`]
//! trait: relationship, entity and view metadata lookups, record retrieval by
//! structured query, and the create/delete/`$ref` mutations used to maintain
//! associations. The crate issues no requests outside this surface.
//!
//! Two implementations exist:
//! - [`WebApiClient`] talks to a Dataverse-style Web API over HTTPS
//! - `test_utils::InMemoryDataApi` (feature `test-utils`) keeps everything in
//!   memory for tests and offline experiments
//!
//! # Row format
//!
//! Rows are JSON objects keyed by attribute logical name. Attributes of a
//! joined entity are keyed `alias.attribute`. The display value of a column,
//! when the store provides one, sits next to it under
//! `column@OData.Community.Display.V1.FormattedValue`.

pub mod client;
pub mod error;
pub mod query;
pub mod types;

pub use client::WebApiClient;
pub use error::{ApiError, ApiResult};
pub use query::{
    Condition, ConditionOperator, Filter, FilterType, LinkEntity, RecordQuery, root_entity_attributes,
};
pub use types::{
    BooleanManagedProperty, EntityDefinition, Label, LocalizedLabel,
    ManyToManyRelationshipMetadata, OneToManyRelationshipMetadata, RelationshipSide, SavedQuery,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::constants::{FORMATTED_VALUE_ANNOTATION, ODATA_BIND_SUFFIX};

/// A single result row.
pub type Row = serde_json::Map<String, Value>;

/// The data API surface consumed by the resolver and the query builder.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Look up a relationship as many-to-many; `None` when no such
    /// many-to-many relationship exists.
    async fn many_to_many_relationship(
        &self,
        schema_name: &str,
    ) -> ApiResult<Option<ManyToManyRelationshipMetadata>>;

    /// Look up a relationship as one-to-many; `None` when no such
    /// one-to-many relationship exists.
    async fn one_to_many_relationship(
        &self,
        schema_name: &str,
    ) -> ApiResult<Option<OneToManyRelationshipMetadata>>;

    /// Fetch an entity definition by logical name.
    async fn entity_definition(&self, logical_name: &str) -> ApiResult<EntityDefinition>;

    /// Fetch the named public view of `entity`, or its default public view
    /// when `view_name` is `None`.
    async fn saved_view(
        &self,
        entity: &str,
        view_name: Option<&str>,
    ) -> ApiResult<Option<SavedQuery>>;

    /// Run a query against an entity's collection.
    async fn retrieve_multiple(&self, entity_set: &str, query: &RecordQuery)
    -> ApiResult<Vec<Row>>;

    /// Create a record and return its id.
    async fn create_record(&self, entity_set: &str, record: Row) -> ApiResult<String>;

    /// Delete a record by id.
    async fn delete_record(&self, entity_set: &str, id: &str) -> ApiResult<()>;

    /// Add a relationship reference from `entity_set(id)` through the
    /// collection navigation property to `target_set(target_id)`.
    async fn associate(
        &self,
        entity_set: &str,
        id: &str,
        navigation_property: &str,
        target_set: &str,
        target_id: &str,
    ) -> ApiResult<()>;

    /// Remove the relationship reference to `target_id`.
    async fn disassociate(
        &self,
        entity_set: &str,
        id: &str,
        navigation_property: &str,
        target_id: &str,
    ) -> ApiResult<()>;
}

/// Key of a single-valued navigation binding in a create payload.
pub fn bind_key(navigation_property: &str) -> String {
    format!("{navigation_property}{ODATA_BIND_SUFFIX}")
}

/// Relative URL of a record, as used in `@odata.bind` values.
pub fn bind_value(entity_set: &str, id: &str) -> String {
    format!("/{entity_set}({id})")
}

/// Split a bind value (`/contacts(123)`, with or without leading slash or
/// base URL) into entity set and id.
pub fn parse_bind_value(value: &str) -> Option<(&str, &str)> {
    let value = value.strip_suffix(')')?;
    let open = value.rfind('(')?;
    let set = &value[..open];
    let set = set.rsplit('/').next().unwrap_or(set);
    let id = &value[open + 1..];
    if set.is_empty() || id.is_empty() { None } else { Some((set, id)) }
}

/// Column name of the formatted-value annotation for `column`.
pub fn formatted_value_key(column: &str) -> String {
    format!("{column}{FORMATTED_VALUE_ANNOTATION}")
}

/// Render a raw JSON value as display text.
///
/// Strings are returned as-is, `null` becomes empty, everything else uses its
/// JSON rendering.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_round_trip() {
        let value = bind_value("contacts", "c-1");
        assert_eq!(value, "/contacts(c-1)");
        assert_eq!(parse_bind_value(&value), Some(("contacts", "c-1")));
        assert_eq!(
            parse_bind_value("https://org.example/api/data/v9.2/accounts(a-9)"),
            Some(("accounts", "a-9"))
        );
        assert_eq!(parse_bind_value("contacts"), None);
        assert_eq!(parse_bind_value("/contacts()"), None);
        assert_eq!(bind_key("record1id_account"), "record1id_account@odata.bind");
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!(null)), "");
        assert_eq!(value_to_text(&json!("Ann")), "Ann");
        assert_eq!(value_to_text(&json!(42)), "42");
        assert_eq!(value_to_text(&json!(true)), "true");
    }
}
