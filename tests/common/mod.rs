//! Shared setup for the integration tests.

#![allow(dead_code)]

use polylookup::association::AssociationQueryBuilder;
use polylookup::metadata::{DescriptorKey, LinkShape, MetadataDescriptor};
use polylookup::resolver::RelationshipResolver;
use polylookup::test_utils::{InMemoryDataApi, StoreFixture, init_test_logging};
use std::sync::Arc;

/// Native many-to-many from the account side.
pub fn many_to_many_key() -> DescriptorKey {
    DescriptorKey::many_to_many("account", "account_contacts")
}

/// Custom `connectionrow` intersect from account to contact.
pub fn custom_key() -> DescriptorKey {
    DescriptorKey::linked("account", "account_connectionrows", "connectionrow_target_contact", LinkShape::Custom)
}

/// Built-in connection entity from account to contact.
pub fn connection_key() -> DescriptorKey {
    DescriptorKey::linked("account", "account_connections1", "contact_connections2", LinkShape::Connection)
}

/// One key per supported shape.
pub fn all_shape_keys() -> Vec<DescriptorKey> {
    vec![many_to_many_key(), custom_key(), connection_key()]
}

/// Sample store, resolver and query builder sharing one in-memory API.
pub struct Harness {
    pub api: Arc<InMemoryDataApi>,
    pub resolver: RelationshipResolver,
    pub builder: AssociationQueryBuilder,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(StoreFixture::sample())
    }

    pub fn with_store(fixture: StoreFixture) -> Self {
        init_test_logging(None);
        let api = Arc::new(fixture.build());
        Self {
            resolver: RelationshipResolver::new(api.clone()),
            builder: AssociationQueryBuilder::new(api.clone()),
            api,
        }
    }

    pub async fn descriptor(&self, key: &DescriptorKey) -> Arc<MetadataDescriptor> {
        self.resolver.resolve(key).await.unwrap()
    }
}
