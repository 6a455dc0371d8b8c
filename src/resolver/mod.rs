//! Relationship resolution.
//!
//! The [`RelationshipResolver`] turns a [`DescriptorKey`] into a
//! [`MetadataDescriptor`] by consulting relationship, entity and view
//! metadata through the [`DataApi`].
//!
//! # Resolution steps
//!
//! 1. Without a link relationship the relationship is read as a native
//!    many-to-many. The source may be declared on either side; the target is
//!    the other side.
//! 2. With a link relationship, the relationship is a one-to-many whose
//!    referenced entity is the source and whose referencing entity is the
//!    intersect. The link relationship must be a many-to-one from that same
//!    intersect; its referenced entity is the target.
//! 3. Source, intersect and target entity definitions are fetched
//!    concurrently.
//! 4. The target's named (or default public) view supplies the query template
//!    and display columns.
//! 5. The pieces are assembled into an immutable descriptor.
//!
//! # Memoization
//!
//! Descriptors are cached per key for the lifetime of the resolver. The cache
//! stores the *pending* resolution as a shared future, so concurrent callers
//! asking for the same key wait on a single remote resolution instead of each
//! starting their own:
//!
//! - the first caller inserts the shared future and drives it
//! - later callers clone the same shared future and await it
//! - on success the completed future stays cached and answers immediately
//! - on failure every caller that shared the attempt gets the same error and
//!   the entry is removed, so the next separate call starts fresh
//!
//! Removal only happens if the cached entry is still the failed attempt; a
//! newer attempt inserted in between is left alone.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{DataApi, EntityDefinition, RelationshipSide};
use crate::constants::CONNECTION_ENTITY;
use crate::core::{LookupError, LookupResult};
use crate::metadata::{
    DescriptorKey, EntityInfo, LinkEntityJoin, LinkShape, ManyToManyJoin, MetadataDescriptor,
    RelationshipShape, TargetEntityInfo, ViewDefinition,
};

type Resolution = Shared<BoxFuture<'static, LookupResult<Arc<MetadataDescriptor>>>>;

/// Memoizing relationship resolver.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RelationshipResolver {
    api: Arc<dyn DataApi>,
    resolutions: DashMap<DescriptorKey, Resolution>,
}

impl std::fmt::Debug for RelationshipResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipResolver").field("cached", &self.resolutions.len()).finish()
    }
}

impl RelationshipResolver {
    /// Create a resolver with an empty cache.
    pub fn new(api: Arc<dyn DataApi>) -> Self {
        Self {
            api,
            resolutions: DashMap::new(),
        }
    }

    /// Resolve `key`, sharing any resolution already in flight or finished.
    ///
    /// # Errors
    ///
    /// - [`LookupError::RelationshipNotFound`] when the relationship does not
    ///   exist or does not involve the source entity as required
    /// - [`LookupError::UnsupportedRelationship`] when the relationship exists
    ///   but cannot be used (self-referential many-to-many, link relationship
    ///   not leaving the intersect entity, target equal to source)
    /// - [`LookupError::MetadataFetch`] when a remote metadata call fails or
    ///   the requested view does not exist
    pub async fn resolve(&self, key: &DescriptorKey) -> LookupResult<Arc<MetadataDescriptor>> {
        let resolution = match self.resolutions.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(target: "resolver", "Joining resolution of {}", key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                debug!(target: "resolver", "Starting resolution of {}", key);
                let api = Arc::clone(&self.api);
                let owned_key = key.clone();
                let resolution: Resolution = async move {
                    resolve_uncached(api.as_ref(), &owned_key).await.map(Arc::new)
                }
                .boxed()
                .shared();
                entry.insert(resolution.clone());
                resolution
            }
        };

        let result = resolution.clone().await;
        if let Err(error) = &result {
            let removed = self
                .resolutions
                .remove_if(key, |_, cached| cached.ptr_eq(&resolution))
                .is_some();
            if removed {
                warn!(target: "resolver", "Resolution of {} failed: {}", key, error);
            }
        }
        result
    }

    /// Whether a resolution for `key` is cached or in flight.
    pub fn is_cached(&self, key: &DescriptorKey) -> bool {
        self.resolutions.contains_key(key)
    }

    /// Number of cached or in-flight resolutions.
    pub fn cached_count(&self) -> usize {
        self.resolutions.len()
    }

    /// Forget every cached descriptor.
    pub fn clear(&self) {
        self.resolutions.clear();
    }
}

/// Shape-specific outcome of steps 1 and 2.
enum Plan {
    ManyToMany {
        target: String,
        join: ManyToManyJoin,
    },
    Linked {
        intersect: String,
        target: String,
        source_link_attribute: String,
        target_link_attribute: String,
        source_navigation_property: String,
        target_navigation_property: String,
    },
}

impl Plan {
    fn target(&self) -> &str {
        match self {
            Self::ManyToMany { target, .. } | Self::Linked { target, .. } => target,
        }
    }

    fn intersect(&self) -> Option<&str> {
        match self {
            Self::ManyToMany { .. } => None,
            Self::Linked { intersect, .. } => Some(intersect),
        }
    }
}

fn not_found(key: &DescriptorKey) -> LookupError {
    LookupError::RelationshipNotFound {
        entity: key.source_entity.clone(),
        relationship: key.relationship.clone(),
    }
}

fn unsupported(relationship: &str, reason: impl Into<String>) -> LookupError {
    LookupError::UnsupportedRelationship {
        relationship: relationship.to_string(),
        reason: reason.into(),
    }
}

async fn resolve_uncached(api: &dyn DataApi, key: &DescriptorKey) -> LookupResult<MetadataDescriptor> {
    let plan = match &key.link_relationship {
        None => plan_many_to_many(api, key).await?,
        Some(link) => plan_linked(api, key, link).await?,
    };

    let intersect = async {
        match plan.intersect() {
            Some(name) => fetch_entity(api, name).await.map(Some),
            None => Ok(None),
        }
    };
    let (source, intersect, target) = futures::try_join!(
        fetch_entity(api, &key.source_entity),
        intersect,
        fetch_entity(api, plan.target()),
    )?;

    let view = fetch_view(api, &target.logical_name, key.view_name.as_deref()).await?;

    let primary_name_attribute = match &target.primary_name_attribute {
        Some(name) if !name.is_empty() => name.clone(),
        _ => {
            warn!(
                target: "resolver",
                "Entity '{}' has no primary name attribute; displaying '{}'",
                target.logical_name, target.primary_id_attribute
            );
            target.primary_id_attribute.clone()
        }
    };

    let shape = match plan {
        Plan::ManyToMany { join, .. } => RelationshipShape::ManyToMany(join),
        Plan::Linked {
            source_link_attribute,
            target_link_attribute,
            source_navigation_property,
            target_navigation_property,
            ..
        } => {
            let join = LinkEntityJoin {
                intersect_entity: intersect
                    .as_ref()
                    .map(|i| i.logical_name.clone())
                    .unwrap_or_default(),
                intersect_primary_key_attribute: intersect
                    .as_ref()
                    .map(|i| i.primary_id_attribute.clone())
                    .unwrap_or_default(),
                source_link_attribute,
                target_link_attribute,
                source_navigation_property,
                target_navigation_property,
            };
            match key.link_shape {
                LinkShape::Custom => RelationshipShape::CustomIntersect(join),
                LinkShape::Connection => RelationshipShape::Connection(join),
            }
        }
    };

    let descriptor = MetadataDescriptor {
        key: key.clone(),
        source_entity: entity_info(&source),
        intersect_entity: intersect.as_ref().map(entity_info),
        target_entity: TargetEntityInfo {
            logical_name: target.logical_name.clone(),
            primary_key_attribute: target.primary_id_attribute.clone(),
            primary_name_attribute,
            entity_set_name: target.entity_set_name.clone(),
            display_name: target.display_label(),
            quick_create_enabled: target.quick_create_enabled(),
        },
        shape,
        default_view: view,
    };

    debug!(
        target: "resolver",
        "Resolved {} as {}: {} -> {}",
        key,
        descriptor.shape.kind(),
        descriptor.source_entity.logical_name,
        descriptor.target_entity.logical_name
    );
    Ok(descriptor)
}

async fn plan_many_to_many(api: &dyn DataApi, key: &DescriptorKey) -> LookupResult<Plan> {
    let relationship = api
        .many_to_many_relationship(&key.relationship)
        .await
        .map_err(|e| LookupError::metadata_fetch(format!("relationship '{}'", key.relationship), &e))?
        .ok_or_else(|| not_found(key))?;

    let side = relationship.side_of(&key.source_entity).ok_or_else(|| not_found(key))?;
    if relationship.is_self_referential() {
        return Err(unsupported(
            &key.relationship,
            format!("both sides are '{}'; source and target must differ", key.source_entity),
        ));
    }

    let (target, source_join, target_join, navigation) = match side {
        RelationshipSide::Entity1 => (
            relationship.entity2_logical_name,
            relationship.entity1_intersect_attribute,
            relationship.entity2_intersect_attribute,
            relationship.entity1_navigation_property_name,
        ),
        RelationshipSide::Entity2 => (
            relationship.entity1_logical_name,
            relationship.entity2_intersect_attribute,
            relationship.entity1_intersect_attribute,
            relationship.entity2_navigation_property_name,
        ),
    };

    Ok(Plan::ManyToMany {
        target,
        join: ManyToManyJoin {
            intersect_entity: relationship.intersect_entity_name,
            source_join_attribute: source_join,
            target_join_attribute: target_join,
            source_navigation_property: navigation.unwrap_or(relationship.schema_name),
        },
    })
}

async fn plan_linked(api: &dyn DataApi, key: &DescriptorKey, link_name: &str) -> LookupResult<Plan> {
    let relationship = api
        .one_to_many_relationship(&key.relationship)
        .await
        .map_err(|e| LookupError::metadata_fetch(format!("relationship '{}'", key.relationship), &e))?
        .ok_or_else(|| not_found(key))?;
    if relationship.referenced_entity != key.source_entity {
        return Err(not_found(key));
    }
    let intersect = relationship.referencing_entity;

    let link = api
        .one_to_many_relationship(link_name)
        .await
        .map_err(|e| LookupError::metadata_fetch(format!("relationship '{link_name}'"), &e))?
        .ok_or_else(|| unsupported(link_name, "not a many-to-one relationship"))?;
    if link.referencing_entity != intersect {
        return Err(unsupported(
            link_name,
            format!("must be a many-to-one from '{intersect}', found one from '{}'", link.referencing_entity),
        ));
    }
    if link.referenced_entity == key.source_entity {
        return Err(unsupported(
            link_name,
            format!("points back to '{}'; source and target must differ", key.source_entity),
        ));
    }

    if key.link_shape == LinkShape::Connection && intersect != CONNECTION_ENTITY {
        warn!(
            target: "resolver",
            "Connection shape requested but the link entity is '{}'", intersect
        );
    }

    let (source_navigation_property, target_navigation_property) = match key.link_shape {
        LinkShape::Connection => (
            format!("{}_{}", relationship.referencing_attribute, key.source_entity),
            format!("{}_{}", link.referencing_attribute, link.referenced_entity),
        ),
        LinkShape::Custom => (
            relationship
                .referencing_entity_navigation_property_name
                .unwrap_or_else(|| relationship.referencing_attribute.clone()),
            link.referencing_entity_navigation_property_name
                .unwrap_or_else(|| link.referencing_attribute.clone()),
        ),
    };

    Ok(Plan::Linked {
        intersect,
        target: link.referenced_entity,
        source_link_attribute: relationship.referencing_attribute,
        target_link_attribute: link.referencing_attribute,
        source_navigation_property,
        target_navigation_property,
    })
}

async fn fetch_entity(api: &dyn DataApi, logical_name: &str) -> LookupResult<EntityDefinition> {
    api.entity_definition(logical_name)
        .await
        .map_err(|e| LookupError::metadata_fetch(format!("entity '{logical_name}'"), &e))
}

async fn fetch_view(
    api: &dyn DataApi,
    entity: &str,
    view_name: Option<&str>,
) -> LookupResult<ViewDefinition> {
    let subject = match view_name {
        Some(name) => format!("view '{name}' of '{entity}'"),
        None => format!("default view of '{entity}'"),
    };
    let view = api
        .saved_view(entity, view_name)
        .await
        .map_err(|e| LookupError::metadata_fetch(subject.clone(), &e))?
        .ok_or_else(|| LookupError::MetadataFetch {
            subject,
            reason: "no such public view".to_string(),
        })?;

    Ok(ViewDefinition::from_view(&view.name, &view.fetchxml, view.layoutxml.as_deref()))
}

fn entity_info(definition: &EntityDefinition) -> EntityInfo {
    EntityInfo {
        logical_name: definition.logical_name.clone(),
        primary_key_attribute: definition.primary_id_attribute.clone(),
        entity_set_name: definition.entity_set_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::test_utils::{InMemoryDataApi, StoreFixture};
    use std::time::Duration;

    fn resolver() -> (Arc<InMemoryDataApi>, RelationshipResolver) {
        let api = Arc::new(StoreFixture::sample().build());
        let resolver = RelationshipResolver::new(api.clone());
        (api, resolver)
    }

    #[tokio::test]
    async fn test_many_to_many_source_on_entity2() {
        let (_, resolver) = resolver();
        let descriptor =
            resolver.resolve(&DescriptorKey::many_to_many("account", "account_contacts")).await.unwrap();

        assert_eq!(descriptor.source_entity.logical_name, "account");
        assert_eq!(descriptor.target_entity.logical_name, "contact");
        assert_eq!(descriptor.target_entity.primary_name_attribute, "fullname");
        assert!(descriptor.intersect_entity.is_none());
        match &descriptor.shape {
            RelationshipShape::ManyToMany(join) => {
                assert_eq!(join.intersect_entity, "accountcontacts");
                assert_eq!(join.source_join_attribute, "accountid");
                assert_eq!(join.target_join_attribute, "contactid");
                assert_eq!(join.source_navigation_property, "account_contacts");
            }
            other => panic!("unexpected shape {other:?}"),
        }
        assert_eq!(descriptor.default_view.name, "Active Contacts");
        assert_eq!(descriptor.default_view.display_columns, vec!["fullname", "emailaddress1"]);
    }

    #[tokio::test]
    async fn test_many_to_many_source_on_entity1() {
        let (_, resolver) = resolver();
        let descriptor =
            resolver.resolve(&DescriptorKey::many_to_many("contact", "account_contacts")).await.unwrap();
        assert_eq!(descriptor.target_entity.logical_name, "account");
        assert_eq!(descriptor.target_entity.primary_name_attribute, "name");
    }

    #[tokio::test]
    async fn test_connection_uses_polymorphic_navigation_names() {
        let (_, resolver) = resolver();
        let key = DescriptorKey::linked(
            "account",
            "account_connections1",
            "contact_connections2",
            LinkShape::Connection,
        );
        let descriptor = resolver.resolve(&key).await.unwrap();

        let RelationshipShape::Connection(join) = &descriptor.shape else {
            panic!("expected connection shape");
        };
        assert_eq!(join.intersect_entity, "connection");
        assert_eq!(join.intersect_primary_key_attribute, "connectionid");
        assert_eq!(join.source_link_attribute, "record1id");
        assert_eq!(join.target_link_attribute, "record2id");
        assert_eq!(join.source_navigation_property, "record1id_account");
        assert_eq!(join.target_navigation_property, "record2id_contact");
        assert_eq!(descriptor.intersect_entity.as_ref().unwrap().entity_set_name, "connections");
    }

    #[tokio::test]
    async fn test_missing_primary_name_falls_back_to_key() {
        let (api, resolver) = resolver();
        let mut definition = api.entity_definition("lead").await.unwrap();
        definition.logical_name = "activitymarker".to_string();
        definition.primary_id_attribute = "activitymarkerid".to_string();
        definition.primary_name_attribute = None;
        definition.entity_set_name = "activitymarkers".to_string();
        api.add_entity(definition);
        api.add_many_to_many(crate::api::ManyToManyRelationshipMetadata {
            schema_name: "account_markers".to_string(),
            entity1_logical_name: "account".to_string(),
            entity2_logical_name: "activitymarker".to_string(),
            intersect_entity_name: "accountmarkers".to_string(),
            entity1_intersect_attribute: "accountid".to_string(),
            entity2_intersect_attribute: "activitymarkerid".to_string(),
            entity1_navigation_property_name: None,
            entity2_navigation_property_name: None,
        });
        api.add_view(
            "activitymarker",
            crate::api::SavedQuery {
                savedqueryid: None,
                name: "All Markers".to_string(),
                fetchxml: "<fetch><entity name=\"activitymarker\" /></fetch>".to_string(),
                layoutxml: None,
                isdefault: true,
            },
        );

        let descriptor =
            resolver.resolve(&DescriptorKey::many_to_many("account", "account_markers")).await.unwrap();
        assert_eq!(descriptor.target_entity.primary_name_attribute, "activitymarkerid");
        let RelationshipShape::ManyToMany(join) = &descriptor.shape else {
            panic!("expected many-to-many shape");
        };
        assert_eq!(join.source_navigation_property, "account_markers");
    }

    #[tokio::test]
    async fn test_error_kinds() {
        let (_, resolver) = resolver();

        let err = resolver.resolve(&DescriptorKey::many_to_many("account", "missing")).await.unwrap_err();
        assert!(matches!(err, LookupError::RelationshipNotFound { .. }));

        let err = resolver.resolve(&DescriptorKey::many_to_many("account", "contact_leads")).await.unwrap_err();
        assert!(matches!(err, LookupError::RelationshipNotFound { .. }));

        let err =
            resolver.resolve(&DescriptorKey::many_to_many("contact", "contact_contacts")).await.unwrap_err();
        assert!(matches!(err, LookupError::UnsupportedRelationship { .. }));

        let key = DescriptorKey::linked(
            "account",
            "account_connectionrows",
            "contact_customer_accounts",
            LinkShape::Custom,
        );
        let err = resolver.resolve(&key).await.unwrap_err();
        assert!(matches!(err, LookupError::UnsupportedRelationship { .. }));

        let key = DescriptorKey::linked("account", "account_connectionrows", "nope", LinkShape::Custom);
        let err = resolver.resolve(&key).await.unwrap_err();
        assert!(matches!(err, LookupError::UnsupportedRelationship { .. }));

        let key = DescriptorKey::many_to_many("account", "account_contacts").with_view("No Such View");
        let err = resolver.resolve(&key).await.unwrap_err();
        assert!(matches!(err, LookupError::MetadataFetch { .. }));

        assert_eq!(resolver.cached_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_resolution() {
        let api = Arc::new(StoreFixture::sample().with_latency(Duration::from_millis(20)).build());
        let resolver = RelationshipResolver::new(api.clone());
        let key = DescriptorKey::many_to_many("account", "account_contacts");

        let (a, b, c) = tokio::join!(resolver.resolve(&key), resolver.resolve(&key), resolver.resolve(&key));
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(api.calls("many_to_many_relationship"), 1);
        assert_eq!(api.calls("saved_view"), 1);

        let again = resolver.resolve(&key).await.unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(api.calls("many_to_many_relationship"), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_is_shared_then_dropped() {
        let api = Arc::new(StoreFixture::sample().with_latency(Duration::from_millis(10)).build());
        api.fail(
            "saved_view",
            ApiError::Transport {
                url: "savedqueries".to_string(),
                reason: "connection reset".to_string(),
            },
        );
        let resolver = RelationshipResolver::new(api.clone());
        let key = DescriptorKey::many_to_many("account", "account_contacts");

        let (a, b) = tokio::join!(resolver.resolve(&key), resolver.resolve(&key));
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(api.calls("saved_view"), 1);
        assert!(!resolver.is_cached(&key));

        api.clear_failures();
        resolver.resolve(&key).await.unwrap();
        assert_eq!(api.calls("saved_view"), 2);
        assert!(resolver.is_cached(&key));
    }

    #[tokio::test]
    async fn test_distinct_keys_resolve_separately() {
        let (api, resolver) = resolver();
        let plain = DescriptorKey::many_to_many("account", "account_contacts");
        let viewed = plain.clone().with_view("Contacts by Parent");

        let a = resolver.resolve(&plain).await.unwrap();
        let b = resolver.resolve(&viewed).await.unwrap();
        assert_eq!(a.default_view.name, "Active Contacts");
        assert_eq!(b.default_view.name, "Contacts by Parent");
        assert_eq!(api.calls("many_to_many_relationship"), 2);
        assert_eq!(resolver.cached_count(), 2);

        resolver.clear();
        assert_eq!(resolver.cached_count(), 0);
    }
}
