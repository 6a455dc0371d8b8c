//! Association queries and mutations for a resolved relationship.
//!
//! [`AssociationQueryBuilder`] works purely from a [`MetadataDescriptor`]; it
//! never discovers relationships itself. Every operation dispatches once on
//! [`RelationshipShape`]:
//!
//! | Operation | Many-to-many | Custom intersect / connection |
//! |---|---|---|
//! | list | target joined to the intersect table | target joined to the link rows, link row id projected |
//! | associate | `$ref` link through the source's collection property | create a link row with both bindings |
//! | disassociate | `$ref` unlink keyed by **target id** | delete the link row by **its own id** |
//!
//! The identifier passed to `disassociate` is checked against the currently
//! associated records before anything is sent, so passing a target id where a
//! link row id is required (or the reverse) fails instead of silently doing
//! nothing.
//!
//! Mutations are not retried and are not idempotent for the lookup-based
//! shapes: associating an already linked pair creates a second link row.
//! Callers de-duplicate first.

mod records;

pub use records::{AssociationRecord, SearchPage, SearchRequest, display_text};

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::api::{
    ApiError, Condition, DataApi, Filter, LinkEntity, RecordQuery, Row, bind_key, bind_value,
};
use crate::constants::{INTERSECT_ALIAS, MAX_PAGE_SIZE};
use crate::core::{LookupError, LookupResult};
use crate::metadata::{LinkIdKind, MetadataDescriptor, RelationshipShape};
use crate::templating::TemplateRenderer;

const ASSOCIATE: &str = "associate";
const DISASSOCIATE: &str = "disassociate";

/// Builds and runs association reads and mutations.
#[derive(Clone)]
pub struct AssociationQueryBuilder {
    api: Arc<dyn DataApi>,
    renderer: TemplateRenderer,
}

impl std::fmt::Debug for AssociationQueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationQueryBuilder").field("renderer", &self.renderer).finish()
    }
}

impl AssociationQueryBuilder {
    /// Create a builder using the default template renderer.
    pub fn new(api: Arc<dyn DataApi>) -> Self {
        Self {
            api,
            renderer: TemplateRenderer::default(),
        }
    }

    /// Use `renderer` for view and filter templates.
    #[must_use]
    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// The query listing the targets associated with `source_record_id`.
    ///
    /// Projects the target key and primary name, plus the link row id for the
    /// lookup-based shapes; view columns are left to searches.
    pub fn associated_query(descriptor: &MetadataDescriptor, source_record_id: &str) -> RecordQuery {
        let target = &descriptor.target_entity;
        let link = match &descriptor.shape {
            RelationshipShape::ManyToMany(join) => LinkEntity {
                name: join.intersect_entity.clone(),
                from: join.target_join_attribute.clone(),
                to: target.primary_key_attribute.clone(),
                alias: INTERSECT_ALIAS.to_string(),
                intersect: true,
                attributes: Vec::new(),
                filters: vec![Filter::all(vec![Condition::eq(
                    join.source_join_attribute.clone(),
                    source_record_id,
                )])],
            },
            RelationshipShape::CustomIntersect(join) | RelationshipShape::Connection(join) => {
                LinkEntity {
                    name: join.intersect_entity.clone(),
                    from: join.target_link_attribute.clone(),
                    to: target.primary_key_attribute.clone(),
                    alias: INTERSECT_ALIAS.to_string(),
                    intersect: false,
                    attributes: vec![join.intersect_primary_key_attribute.clone()],
                    filters: vec![Filter::all(vec![Condition::eq(
                        join.source_link_attribute.clone(),
                        source_record_id,
                    )])],
                }
            }
        };

        RecordQuery::new(target.logical_name.clone())
            .select([target.primary_key_attribute.clone(), target.primary_name_attribute.clone()])
            .order_by(target.primary_name_attribute.clone())
            .link(link)
    }

    /// Targets currently associated with `source_record_id`.
    ///
    /// Returns an empty list without any remote call when there is no source
    /// record yet (create mode).
    ///
    /// # Errors
    ///
    /// [`LookupError::QueryError`] when the query fails,
    /// [`LookupError::InvalidRecordId`] for a malformed id.
    pub async fn list_associated(
        &self,
        descriptor: &MetadataDescriptor,
        source_record_id: Option<&str>,
    ) -> LookupResult<Vec<AssociationRecord>> {
        let Some(source_record_id) = source_record_id.filter(|id| !id.trim().is_empty()) else {
            return Ok(Vec::new());
        };
        let source_record_id = normalize_record_id(source_record_id)?;

        let target = &descriptor.target_entity;
        let query = Self::associated_query(descriptor, &source_record_id);
        debug!(
            target: "association",
            "Listing {} associated with {}({})",
            target.logical_name, descriptor.source_entity.logical_name, source_record_id
        );

        let rows = self
            .api
            .retrieve_multiple(&target.entity_set_name, &query)
            .await
            .map_err(|e| LookupError::query(&target.logical_name, &e))?;
        Ok(rows.into_iter().map(|row| AssociationRecord::from_row(row, descriptor)).collect())
    }

    /// The query a search would run.
    ///
    /// # Errors
    ///
    /// [`LookupError::QueryError`] when a template cannot be expanded.
    pub fn search_query(
        &self,
        descriptor: &MetadataDescriptor,
        request: &SearchRequest,
    ) -> LookupResult<RecordQuery> {
        let target = &descriptor.target_entity;
        let page_size = request.page_size.min(MAX_PAGE_SIZE);
        let template_error = |e: crate::templating::TemplateError| LookupError::QueryError {
            entity: target.logical_name.clone(),
            reason: e.to_string(),
        };

        let view_query = self
            .renderer
            .expand(&descriptor.default_view.fetch_query_template, &request.record)
            .map_err(template_error)?;

        let mut query = RecordQuery::new(target.logical_name.clone())
            .with_template(view_query)
            .select(base_columns(descriptor))
            .top(page_size + 1);

        let text = request.text.trim();
        if !text.is_empty() {
            let mut columns = vec![target.primary_name_attribute.clone()];
            for column in &request.search_columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
            query = query
                .filter(Filter::any(columns.into_iter().map(|c| Condition::contains(c, text)).collect()));
        }

        if let Some(filter) = &request.custom_filter {
            query = query.raw_filter(self.renderer.expand(filter, &request.record).map_err(template_error)?);
        }
        Ok(query)
    }

    /// One page of candidate targets.
    ///
    /// Asks for `page_size + 1` rows; `has_more` is set when the extra row
    /// came back, and only `page_size` records are returned.
    ///
    /// # Errors
    ///
    /// [`LookupError::QueryError`] when a template cannot be expanded or the
    /// query fails.
    pub async fn search(
        &self,
        descriptor: &MetadataDescriptor,
        request: &SearchRequest,
    ) -> LookupResult<SearchPage> {
        let target = &descriptor.target_entity;
        let page_size = request.page_size.min(MAX_PAGE_SIZE);
        let query = self.search_query(descriptor, request)?;
        debug!(target: "association", "Searching {} for '{}' (page of {})", target.logical_name, request.text, page_size);

        let mut rows = self
            .api
            .retrieve_multiple(&target.entity_set_name, &query)
            .await
            .map_err(|e| LookupError::query(&target.logical_name, &e))?;

        let has_more = rows.len() > page_size;
        rows.truncate(page_size);
        Ok(SearchPage {
            records: rows.into_iter().map(|row| AssociationRecord::from_row(row, descriptor)).collect(),
            has_more,
        })
    }

    /// Link `target_id` to `source_record_id`.
    ///
    /// Returns the id of the created link row for the lookup-based shapes and
    /// `None` for many-to-many.
    ///
    /// # Errors
    ///
    /// [`LookupError::AssociationError`] when the remote call fails;
    /// "relationship not supported" when the store rejects the operation for
    /// this relationship.
    pub async fn associate(
        &self,
        descriptor: &MetadataDescriptor,
        source_record_id: &str,
        target_id: &str,
    ) -> LookupResult<Option<String>> {
        let source_record_id = normalize_record_id(source_record_id)?;
        let target_id = normalize_record_id(target_id)?;
        let source = &descriptor.source_entity;
        let target = &descriptor.target_entity;

        match &descriptor.shape {
            RelationshipShape::ManyToMany(join) => {
                debug!(
                    target: "association",
                    "Linking {}({}) to {}({}) via {}",
                    source.entity_set_name, source_record_id, target.entity_set_name, target_id, join.source_navigation_property
                );
                self.api
                    .associate(
                        &source.entity_set_name,
                        &source_record_id,
                        &join.source_navigation_property,
                        &target.entity_set_name,
                        &target_id,
                    )
                    .await
                    .map_err(|e| mutation_error(ASSOCIATE, &e))?;
                Ok(None)
            }
            RelationshipShape::CustomIntersect(join) | RelationshipShape::Connection(join) => {
                let intersect_set = intersect_set(descriptor, ASSOCIATE)?;
                let mut row = Row::new();
                row.insert(
                    bind_key(&join.source_navigation_property),
                    Value::String(bind_value(&source.entity_set_name, &source_record_id)),
                );
                row.insert(
                    bind_key(&join.target_navigation_property),
                    Value::String(bind_value(&target.entity_set_name, &target_id)),
                );
                debug!(target: "association", "Creating {} row for {} -> {}", join.intersect_entity, source_record_id, target_id);
                let id = self
                    .api
                    .create_record(intersect_set, row)
                    .await
                    .map_err(|e| mutation_error(ASSOCIATE, &e))?;
                Ok(Some(id))
            }
        }
    }

    /// Remove one association.
    ///
    /// `link_or_target_id` is the target id for many-to-many and the link
    /// row's own id for the lookup-based shapes.
    ///
    /// # Errors
    ///
    /// [`LookupError::AssociationError`] when the identifier does not name a
    /// current association in the kind the shape requires, or when the remote
    /// call fails.
    pub async fn disassociate(
        &self,
        descriptor: &MetadataDescriptor,
        source_record_id: &str,
        link_or_target_id: &str,
    ) -> LookupResult<()> {
        let source_record_id = normalize_record_id(source_record_id)?;
        let id = normalize_record_id(link_or_target_id)?;
        let kind = descriptor.shape.link_id_kind();

        let associated = self
            .list_associated(descriptor, Some(&source_record_id))
            .await
            .map_err(|e| LookupError::association(DISASSOCIATE, e.to_string()))?;
        let names = |k: LinkIdKind| associated.iter().filter_map(move |r| r.link_id(k));
        if !names(kind).any(|candidate| candidate.eq_ignore_ascii_case(&id)) {
            let other = match kind {
                LinkIdKind::TargetId => LinkIdKind::IntersectRowId,
                LinkIdKind::IntersectRowId => LinkIdKind::TargetId,
            };
            let reason = if names(other).any(|candidate| candidate.eq_ignore_ascii_case(&id)) {
                format!(
                    "'{id}' is a {other}, but {} associations are removed by {kind}",
                    descriptor.shape.kind()
                )
            } else {
                format!(
                    "'{id}' is not the {kind} of any record associated with {}({source_record_id})",
                    descriptor.source_entity.logical_name
                )
            };
            return Err(LookupError::association(DISASSOCIATE, reason));
        }

        let source = &descriptor.source_entity;
        let outcome = match &descriptor.shape {
            RelationshipShape::ManyToMany(join) => {
                debug!(target: "association", "Unlinking {}({}) from {}", source.entity_set_name, source_record_id, id);
                self.api
                    .disassociate(&source.entity_set_name, &source_record_id, &join.source_navigation_property, &id)
                    .await
            }
            RelationshipShape::CustomIntersect(_) | RelationshipShape::Connection(_) => {
                let intersect_set = intersect_set(descriptor, DISASSOCIATE)?;
                debug!(target: "association", "Deleting {}({})", intersect_set, id);
                self.api.delete_record(intersect_set, &id).await
            }
        };
        outcome.map_err(|e| mutation_error(DISASSOCIATE, &e))
    }
}

/// Target key, primary name and view columns, without duplicates.
fn base_columns(descriptor: &MetadataDescriptor) -> Vec<String> {
    let target = &descriptor.target_entity;
    let mut columns = vec![target.primary_key_attribute.clone(), target.primary_name_attribute.clone()];
    for column in &descriptor.default_view.display_columns {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    columns
}

fn intersect_set<'a>(descriptor: &'a MetadataDescriptor, operation: &str) -> LookupResult<&'a str> {
    descriptor
        .intersect_entity
        .as_ref()
        .map(|e| e.entity_set_name.as_str())
        .ok_or_else(|| LookupError::association(operation, "relationship not supported"))
}

fn mutation_error(operation: &str, error: &ApiError) -> LookupError {
    if error.is_not_supported() {
        LookupError::association(operation, "relationship not supported")
    } else {
        LookupError::association(operation, error.to_string())
    }
}

/// Trim, strip GUID braces and reject ids that cannot appear in a URL key.
pub fn normalize_record_id(id: &str) -> LookupResult<String> {
    let trimmed = id.trim();
    let unbraced = trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')).unwrap_or(trimmed);
    if unbraced.is_empty() || !unbraced.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(LookupError::InvalidRecordId {
            id: id.to_string(),
        });
    }
    Ok(unbraced.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DescriptorKey, LinkShape};
    use crate::resolver::RelationshipResolver;
    use crate::test_utils::{InMemoryDataApi, StoreFixture, ids};
    use crate::templating::RecordContext;
    use serde_json::json;

    async fn setup(key: DescriptorKey) -> (Arc<InMemoryDataApi>, AssociationQueryBuilder, Arc<MetadataDescriptor>) {
        let api = Arc::new(StoreFixture::sample().build());
        let descriptor = RelationshipResolver::new(api.clone()).resolve(&key).await.unwrap();
        (api.clone(), AssociationQueryBuilder::new(api), descriptor)
    }

    fn custom_key() -> DescriptorKey {
        DescriptorKey::linked("account", "account_connectionrows", "connectionrow_target_contact", LinkShape::Custom)
    }

    #[test]
    fn test_normalize_record_id() {
        assert_eq!(
            normalize_record_id(" {C0000000-0000-0000-0000-000000000001} ").unwrap(),
            "c0000000-0000-0000-0000-000000000001"
        );
        assert!(matches!(normalize_record_id(""), Err(LookupError::InvalidRecordId { .. })));
        assert!(normalize_record_id("a1)/delete").is_err());
    }

    #[tokio::test]
    async fn test_list_without_record_makes_no_call() {
        let (api, builder, descriptor) = setup(custom_key()).await;
        let before = api.total_calls();
        assert!(builder.list_associated(&descriptor, None).await.unwrap().is_empty());
        assert!(builder.list_associated(&descriptor, Some("  ")).await.unwrap().is_empty());
        assert_eq!(api.total_calls(), before);
    }

    #[tokio::test]
    async fn test_associated_query_projects_key_name_and_link_row() {
        let key = custom_key().with_view("Active Contacts");
        let (_api, _builder, descriptor) = setup(key).await;
        assert_eq!(descriptor.default_view.display_columns, vec!["fullname", "emailaddress1"]);

        let query = AssociationQueryBuilder::associated_query(&descriptor, ids::ACCOUNT);
        assert_eq!(query.attributes, vec!["contactid", "fullname"]);
        assert!(query.template.is_none());
        assert_eq!(query.link.unwrap().attributes, vec!["connectionrowid"]);
    }

    #[tokio::test]
    async fn test_associate_creates_one_bound_row() {
        let (api, builder, descriptor) = setup(custom_key()).await;
        let row_id = builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_BOB).await.unwrap().unwrap();

        let rows = api.records("connectionrow");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("sourceid"), Some(&json!(ids::ACCOUNT)));
        assert_eq!(rows[0].get("targetid"), Some(&json!(ids::CONTACT_BOB)));
        assert_eq!(rows[0].get("connectionrowid"), Some(&json!(row_id)));
    }

    #[tokio::test]
    async fn test_disassociate_rejects_target_id_for_link_rows() {
        let (api, builder, descriptor) = setup(custom_key()).await;
        builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_BOB).await.unwrap();

        let err = builder.disassociate(&descriptor, ids::ACCOUNT, ids::CONTACT_BOB).await.unwrap_err();
        assert!(err.is_association_error());
        assert!(err.to_string().contains("is a target id"));
        assert_eq!(api.calls("delete_record"), 0);
        assert_eq!(api.records("connectionrow").len(), 1);
    }

    #[tokio::test]
    async fn test_search_page_size_and_has_more() {
        let api = Arc::new(StoreFixture::sample().with_generated_contacts(7).build());
        let descriptor = RelationshipResolver::new(api.clone())
            .resolve(&DescriptorKey::many_to_many("account", "account_contacts"))
            .await
            .unwrap();
        let builder = AssociationQueryBuilder::new(api.clone());

        let page = builder.search(&descriptor, &SearchRequest::new("", 4)).await.unwrap();
        assert_eq!(api.last_query().unwrap().top, Some(5));
        assert_eq!(page.records.len(), 4);
        assert!(page.has_more);

        let page = builder.search(&descriptor, &SearchRequest::new("", 10)).await.unwrap();
        assert_eq!(api.last_query().unwrap().top, Some(11));
        assert_eq!(page.records.len(), 10);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_search_text_and_templates() {
        let key = DescriptorKey::many_to_many("account", "account_contacts").with_view("Contacts by Parent");
        let (api, builder, descriptor) = setup(key).await;
        let request = SearchRequest::new("arch", 5)
            .with_search_columns(["emailaddress1", "fullname"])
            .with_record(RecordContext::new().with("parentcustomerid", json!({ "id": ids::ACCOUNT })))
            .with_custom_filter(r#"<filter><condition attribute="statecode" operator="eq" value="{{ statecode }}" /></filter>"#);

        let page = builder.search(&descriptor, &request).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].target_display_name, "Ann Archer");

        let query = api.last_query().unwrap();
        let template = query.template.unwrap();
        assert!(template.contains(ids::ACCOUNT));
        assert!(!template.contains("{{"));
        assert_eq!(query.filters[0].conditions.len(), 2);
        assert_eq!(query.raw_filters[0], r#"<filter><condition attribute="statecode" operator="eq" value="" /></filter>"#);
    }

    #[tokio::test]
    async fn test_unsupported_mutation_reports_relationship_not_supported() {
        let (api, builder, descriptor) = setup(DescriptorKey::many_to_many("account", "account_contacts")).await;
        api.fail(
            "associate",
            ApiError::NotSupported {
                message: "navigation property is read-only".to_string(),
            },
        );
        let err = builder.associate(&descriptor, ids::ACCOUNT, ids::CONTACT_ANN).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to associate: relationship not supported");
    }
}
