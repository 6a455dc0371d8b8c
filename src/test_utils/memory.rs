//! In-memory [`DataApi`] for tests.
//!
//! Metadata and records live in plain maps. Queries are evaluated from their
//! structured form (filters, one inner join, ordering and row limit); view
//! templates and pre-rendered filter fragments are recorded but not applied.
//! Every call is counted per method, failures can be injected per method and
//! an optional latency keeps calls in flight long enough to overlap. Read
//! responses can also be held back after the store was read.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::api::{
    ApiError, ApiResult, ConditionOperator, DataApi, EntityDefinition, Filter, FilterType,
    ManyToManyRelationshipMetadata, OneToManyRelationshipMetadata, RecordQuery, Row, SavedQuery,
    formatted_value_key, parse_bind_value, value_to_text,
};
use crate::constants::ODATA_BIND_SUFFIX;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Store {
    many_to_many: HashMap<String, ManyToManyRelationshipMetadata>,
    one_to_many: HashMap<String, OneToManyRelationshipMetadata>,
    entities: HashMap<String, EntityDefinition>,
    views: Vec<(String, SavedQuery)>,
    records: HashMap<String, Vec<Row>>,
}

impl Store {
    fn entity_for_set(&self, entity_set: &str) -> ApiResult<String> {
        self.entities
            .values()
            .find(|e| e.entity_set_name == entity_set)
            .map(|e| e.logical_name.clone())
            .ok_or_else(|| ApiError::Status {
                status: 404,
                url: entity_set.to_string(),
                message: format!("Resource not found for the segment '{entity_set}'."),
            })
    }

    fn primary_key(&self, logical_name: &str) -> ApiResult<String> {
        self.entities.get(logical_name).map(|e| e.primary_id_attribute.clone()).ok_or_else(|| {
            ApiError::Status {
                status: 404,
                url: logical_name.to_string(),
                message: format!("Could not find entity '{logical_name}'"),
            }
        })
    }

    /// Lookup attribute on `referencing` bound through single-valued
    /// navigation property `nav` to an entity of type `referenced`.
    fn lookup_attribute(&self, referencing: &str, nav: &str, referenced: &str) -> Option<String> {
        self.one_to_many
            .values()
            .find(|r| {
                r.referencing_entity == referencing
                    && r.referenced_entity == referenced
                    && (r.referencing_entity_navigation_property_name.as_deref() == Some(nav)
                        || r.referencing_attribute == nav
                        || format!("{}_{}", r.referencing_attribute, r.referenced_entity) == nav)
            })
            .map(|r| r.referencing_attribute.clone())
    }

    /// Intersect table and join attributes behind collection navigation
    /// property `nav` of `entity`: `(intersect, own attribute, other attribute)`.
    fn collection_navigation(
        &self,
        entity: &str,
        nav: &str,
        target: Option<&str>,
    ) -> Option<(String, String, String)> {
        self.many_to_many.values().find_map(|r| {
            let nav1 = r.entity1_navigation_property_name.as_deref().unwrap_or(&r.schema_name);
            let nav2 = r.entity2_navigation_property_name.as_deref().unwrap_or(&r.schema_name);
            let target_matches = |other: &str| target.is_none_or(|t| t == other);

            if r.entity1_logical_name == entity && nav1 == nav && target_matches(&r.entity2_logical_name)
            {
                Some((
                    r.intersect_entity_name.clone(),
                    r.entity1_intersect_attribute.clone(),
                    r.entity2_intersect_attribute.clone(),
                ))
            } else if r.entity2_logical_name == entity
                && nav2 == nav
                && target_matches(&r.entity1_logical_name)
            {
                Some((
                    r.intersect_entity_name.clone(),
                    r.entity2_intersect_attribute.clone(),
                    r.entity1_intersect_attribute.clone(),
                ))
            } else {
                None
            }
        })
    }

    /// Rows of `entity_set` matching `query`.
    fn evaluate(&self, entity_set: &str, query: &RecordQuery) -> ApiResult<Vec<Row>> {
        let logical = self.entity_for_set(entity_set)?;
        if logical != query.entity {
            return Err(ApiError::Status {
                status: 400,
                url: entity_set.to_string(),
                message: format!(
                    "Query entity '{}' does not match collection '{entity_set}'",
                    query.entity
                ),
            });
        }

        let empty = Vec::new();
        let rows = self.records.get(&logical).unwrap_or(&empty);
        let mut out = Vec::new();
        for row in rows {
            if !query.filters.iter().all(|f| matches_filter(row, f)) {
                continue;
            }
            let Some(link) = &query.link else {
                out.push(project(row, &query.attributes));
                continue;
            };

            let parent_key = text_of(row, &link.to);
            let linked_rows = self.records.get(&link.name).unwrap_or(&empty);
            for linked in linked_rows {
                if !same_id(linked, &link.from, &parent_key)
                    || !link.filters.iter().all(|f| matches_filter(linked, f))
                {
                    continue;
                }
                let mut projected = project(row, &query.attributes);
                for attribute in &link.attributes {
                    if let Some(value) = linked.get(attribute) {
                        projected.insert(format!("{}.{}", link.alias, attribute), value.clone());
                    }
                }
                out.push(projected);
            }
        }

        if let Some(order) = &query.order_by {
            out.sort_by_key(|row| text_of(row, order).to_lowercase());
        }
        if let Some(top) = query.top {
            out.truncate(top);
        }
        Ok(out)
    }
}

fn text_of(row: &Row, attribute: &str) -> String {
    row.get(attribute).map(value_to_text).unwrap_or_default()
}

fn same_id(row: &Row, attribute: &str, id: &str) -> bool {
    let value = text_of(row, attribute);
    !value.is_empty() && value.eq_ignore_ascii_case(id)
}

fn like_matches(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let leading = pattern.starts_with('%');
    let trailing = pattern.len() > 1 && pattern.ends_with('%');
    let core = pattern.trim_matches('%');
    match (leading, trailing) {
        (true, true) => text.contains(core),
        (true, false) => text.ends_with(core),
        (false, true) => text.starts_with(core),
        (false, false) => text == core,
    }
}

fn matches_filter(row: &Row, filter: &Filter) -> bool {
    let check = |condition: &crate::api::Condition| {
        let actual = text_of(row, &condition.attribute);
        match condition.operator {
            ConditionOperator::Eq => actual.eq_ignore_ascii_case(&condition.value),
            ConditionOperator::Like => like_matches(&actual, &condition.value),
        }
    };
    if filter.conditions.is_empty() {
        return true;
    }
    match filter.filter_type {
        FilterType::And => filter.conditions.iter().all(check),
        FilterType::Or => filter.conditions.iter().any(check),
    }
}

fn project(row: &Row, attributes: &[String]) -> Row {
    if attributes.is_empty() {
        return row.clone();
    }
    let mut out = Row::new();
    for attribute in attributes {
        if let Some(value) = row.get(attribute) {
            out.insert(attribute.clone(), value.clone());
        }
        let formatted = formatted_value_key(attribute);
        if let Some(value) = row.get(&formatted) {
            out.insert(formatted, value.clone());
        }
    }
    out
}

/// A [`DataApi`] backed by in-process maps.
#[derive(Default)]
pub struct InMemoryDataApi {
    store: Mutex<Store>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    queries: Mutex<Vec<RecordQuery>>,
    latency: Option<Duration>,
    response_delays: Mutex<HashMap<&'static str, Duration>>,
}

impl std::fmt::Debug for InMemoryDataApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDataApi").field("latency", &self.latency).finish_non_exhaustive()
    }
}

impl InMemoryDataApi {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Hold every response of `method` for `delay` after the store has been
    /// read, so writes can land between the read and its response.
    pub fn delay_responses(&self, method: &'static str, delay: Duration) {
        lock(&self.response_delays).insert(method, delay);
    }

    /// Register a many-to-many relationship.
    pub fn add_many_to_many(&self, relationship: ManyToManyRelationshipMetadata) {
        lock(&self.store).many_to_many.insert(relationship.schema_name.clone(), relationship);
    }

    /// Register a one-to-many relationship.
    pub fn add_one_to_many(&self, relationship: OneToManyRelationshipMetadata) {
        lock(&self.store).one_to_many.insert(relationship.schema_name.clone(), relationship);
    }

    /// Register an entity definition.
    pub fn add_entity(&self, definition: EntityDefinition) {
        lock(&self.store).entities.insert(definition.logical_name.clone(), definition);
    }

    /// Register a public view of `entity`.
    pub fn add_view(&self, entity: &str, view: SavedQuery) {
        lock(&self.store).views.push((entity.to_string(), view));
    }

    /// Store a row of `entity`.
    pub fn insert_record(&self, entity: &str, row: Row) {
        lock(&self.store).records.entry(entity.to_string()).or_default().push(row);
    }

    /// Snapshot of the rows of `entity`.
    pub fn records(&self, entity: &str) -> Vec<Row> {
        lock(&self.store).records.get(entity).cloned().unwrap_or_default()
    }

    /// Make every call of `method` fail with `error` until cleared.
    pub fn fail(&self, method: &'static str, error: ApiError) {
        lock(&self.failures).insert(method, error);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Number of calls made to `method` (a [`DataApi`] method name).
    pub fn calls(&self, method: &str) -> usize {
        lock(&self.calls).get(method).copied().unwrap_or(0)
    }

    /// Number of calls made to any method.
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Every query received by `retrieve_multiple`, in order.
    pub fn queries(&self) -> Vec<RecordQuery> {
        lock(&self.queries).clone()
    }

    /// The most recent query received by `retrieve_multiple`.
    pub fn last_query(&self) -> Option<RecordQuery> {
        lock(&self.queries).last().cloned()
    }

    async fn enter(&self, method: &'static str) -> ApiResult<()> {
        *lock(&self.calls).entry(method).or_insert(0) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failure = lock(&self.failures).get(method).cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn respond(&self, method: &'static str) {
        let delay = lock(&self.response_delays).get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DataApi for InMemoryDataApi {
    async fn many_to_many_relationship(
        &self,
        schema_name: &str,
    ) -> ApiResult<Option<ManyToManyRelationshipMetadata>> {
        self.enter("many_to_many_relationship").await?;
        Ok(lock(&self.store).many_to_many.get(schema_name).cloned())
    }

    async fn one_to_many_relationship(
        &self,
        schema_name: &str,
    ) -> ApiResult<Option<OneToManyRelationshipMetadata>> {
        self.enter("one_to_many_relationship").await?;
        Ok(lock(&self.store).one_to_many.get(schema_name).cloned())
    }

    async fn entity_definition(&self, logical_name: &str) -> ApiResult<EntityDefinition> {
        self.enter("entity_definition").await?;
        lock(&self.store).entities.get(logical_name).cloned().ok_or_else(|| ApiError::Status {
            status: 404,
            url: format!("EntityDefinitions(LogicalName='{logical_name}')"),
            message: format!("Could not find entity '{logical_name}'"),
        })
    }

    async fn saved_view(
        &self,
        entity: &str,
        view_name: Option<&str>,
    ) -> ApiResult<Option<SavedQuery>> {
        self.enter("saved_view").await?;
        let store = lock(&self.store);
        Ok(store
            .views
            .iter()
            .filter(|(owner, _)| owner == entity)
            .map(|(_, view)| view)
            .find(|view| match view_name {
                Some(name) => view.name == name,
                None => view.isdefault,
            })
            .cloned())
    }

    async fn retrieve_multiple(
        &self,
        entity_set: &str,
        query: &RecordQuery,
    ) -> ApiResult<Vec<Row>> {
        self.enter("retrieve_multiple").await?;
        lock(&self.queries).push(query.clone());

        let result = lock(&self.store).evaluate(entity_set, query);
        self.respond("retrieve_multiple").await;
        result
    }

    async fn create_record(&self, entity_set: &str, record: Row) -> ApiResult<String> {
        self.enter("create_record").await?;
        let mut store = lock(&self.store);
        let logical = store.entity_for_set(entity_set)?;
        let primary_key = store.primary_key(&logical)?;

        let mut row = Row::new();
        for (key, value) in record {
            let Some(nav) = key.strip_suffix(ODATA_BIND_SUFFIX) else {
                row.insert(key, value);
                continue;
            };
            let (target_set, target_id) =
                value.as_str().and_then(parse_bind_value).ok_or_else(|| ApiError::Status {
                    status: 400,
                    url: entity_set.to_string(),
                    message: format!("Malformed binding for '{nav}': {value}"),
                })?;
            let target = store.entity_for_set(target_set)?;
            let attribute =
                store.lookup_attribute(&logical, nav, &target).ok_or_else(|| ApiError::Status {
                    status: 400,
                    url: entity_set.to_string(),
                    message: format!(
                        "An undeclared property '{nav}' which only has property annotations in the payload"
                    ),
                })?;
            row.insert(attribute, Value::String(target_id.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        row.insert(primary_key, Value::String(id.clone()));
        store.records.entry(logical).or_default().push(row);
        Ok(id)
    }

    async fn delete_record(&self, entity_set: &str, id: &str) -> ApiResult<()> {
        self.enter("delete_record").await?;
        let mut store = lock(&self.store);
        let logical = store.entity_for_set(entity_set)?;
        let primary_key = store.primary_key(&logical)?;

        let rows = store.records.entry(logical).or_default();
        let before = rows.len();
        rows.retain(|row| !same_id(row, &primary_key, id));
        if rows.len() == before {
            return Err(ApiError::RecordNotFound {
                entity_set: entity_set.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn associate(
        &self,
        entity_set: &str,
        id: &str,
        navigation_property: &str,
        target_set: &str,
        target_id: &str,
    ) -> ApiResult<()> {
        self.enter("associate").await?;
        let mut store = lock(&self.store);
        let logical = store.entity_for_set(entity_set)?;
        let target = store.entity_for_set(target_set)?;
        let (intersect, own, other) = store
            .collection_navigation(&logical, navigation_property, Some(&target))
            .ok_or_else(|| ApiError::NotSupported {
                message: format!(
                    "'{navigation_property}' is not a many-to-many navigation property of '{logical}'"
                ),
            })?;

        let rows = store.records.entry(intersect.clone()).or_default();
        if rows.iter().any(|r| same_id(r, &own, id) && same_id(r, &other, target_id)) {
            return Ok(());
        }
        let mut row = Row::new();
        row.insert(format!("{intersect}id"), Value::String(Uuid::new_v4().to_string()));
        row.insert(own, Value::String(id.to_string()));
        row.insert(other, Value::String(target_id.to_string()));
        rows.push(row);
        Ok(())
    }

    async fn disassociate(
        &self,
        entity_set: &str,
        id: &str,
        navigation_property: &str,
        target_id: &str,
    ) -> ApiResult<()> {
        self.enter("disassociate").await?;
        let mut store = lock(&self.store);
        let logical = store.entity_for_set(entity_set)?;
        let (intersect, own, other) = store
            .collection_navigation(&logical, navigation_property, None)
            .ok_or_else(|| ApiError::NotSupported {
                message: format!(
                    "'{navigation_property}' is not a many-to-many navigation property of '{logical}'"
                ),
            })?;

        let rows = store.records.entry(intersect.clone()).or_default();
        let before = rows.len();
        rows.retain(|r| !(same_id(r, &own, id) && same_id(r, &other, target_id)));
        if rows.len() == before {
            return Err(ApiError::RecordNotFound {
                entity_set: intersect,
                id: target_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Condition, LinkEntity};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_like_matches() {
        assert!(like_matches("Ann Archer", "%arch%"));
        assert!(like_matches("Ann Archer", "ann%"));
        assert!(like_matches("Ann Archer", "%er"));
        assert!(!like_matches("Ann Archer", "%bob%"));
        assert!(like_matches("anything", "%"));
    }

    #[test]
    fn test_filter_evaluation() {
        let r = row(json!({ "fullname": "Ann Archer", "statecode": 0 }));
        assert!(matches_filter(&r, &Filter::all(vec![Condition::eq("statecode", "0")])));
        assert!(matches_filter(
            &r,
            &Filter::any(vec![Condition::contains("fullname", "bob"), Condition::contains("fullname", "ann")])
        ));
        assert!(!matches_filter(&r, &Filter::all(vec![Condition::contains("fullname", "bob")])));
    }

    #[tokio::test]
    async fn test_inner_join_and_projection() {
        let api = InMemoryDataApi::new();
        api.add_entity(
            serde_json::from_value(json!({
                "LogicalName": "contact",
                "PrimaryIdAttribute": "contactid",
                "PrimaryNameAttribute": "fullname",
                "EntitySetName": "contacts",
                "DisplayName": { "UserLocalizedLabel": { "Label": "Contact" } }
            }))
            .unwrap(),
        );
        api.insert_record("contact", row(json!({ "contactid": "c1", "fullname": "Ann", "telephone1": "1" })));
        api.insert_record("contact", row(json!({ "contactid": "c2", "fullname": "Bob" })));
        api.insert_record("link_row", row(json!({ "link_rowid": "l1", "owner": "a1", "member": "c2" })));

        let query = RecordQuery::new("contact").select(["contactid", "fullname"]).link(LinkEntity {
            name: "link_row".to_string(),
            from: "member".to_string(),
            to: "contactid".to_string(),
            alias: "link".to_string(),
            intersect: false,
            attributes: vec!["link_rowid".to_string()],
            filters: vec![Filter::all(vec![Condition::eq("owner", "a1")])],
        });

        let rows = api.retrieve_multiple("contacts", &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("fullname"), Some(&json!("Bob")));
        assert_eq!(rows[0].get("link.link_rowid"), Some(&json!("l1")));
        assert!(rows[0].get("telephone1").is_none());
        assert_eq!(api.calls("retrieve_multiple"), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let api = InMemoryDataApi::new();
        api.fail(
            "entity_definition",
            ApiError::Transport {
                url: "x".to_string(),
                reason: "connection reset".to_string(),
            },
        );
        assert!(api.entity_definition("contact").await.is_err());
        api.clear_failures();
        assert!(api.entity_definition("contact").await.unwrap_err().is_not_found());
        assert_eq!(api.calls("entity_definition"), 2);
    }
}
