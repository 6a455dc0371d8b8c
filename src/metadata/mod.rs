//! Resolved relationship metadata.
//!
//! A [`MetadataDescriptor`] is the read-only bundle of entity and attribute
//! names that every association query and mutation works from. It is produced
//! by the [`resolver`](crate::resolver) once per [`DescriptorKey`] and never
//! mutated afterwards; a different key yields a different descriptor.
//!
//! The relationship shape is a sum type dispatched once per descriptor, so
//! the query builder matches on [`RelationshipShape`] instead of re-inspecting
//! metadata.

use roxmltree::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::api::root_entity_attributes;

/// Caller-supplied discriminant between the two lookup-based shapes.
///
/// The resolver cannot infer this from metadata: both shapes are "an entity
/// with two lookups".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkShape {
    /// A regular entity acts as the link row.
    #[default]
    Custom,
    /// The platform's built-in connection entity is the link row.
    Connection,
}

impl fmt::Display for LinkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom => write!(f, "custom"),
            Self::Connection => write!(f, "connection"),
        }
    }
}

/// Memoization key of a resolved descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorKey {
    /// Logical name of the source entity
    pub source_entity: String,
    /// Schema name of the relationship from the source
    pub relationship: String,
    /// Schema name of the many-to-one from the intersect entity to the target
    pub link_relationship: Option<String>,
    /// View of the target entity; `None` selects the default public view
    pub view_name: Option<String>,
    /// Which lookup-based shape applies when `link_relationship` is set
    pub link_shape: LinkShape,
}

impl DescriptorKey {
    /// Key for a native many-to-many relationship.
    pub fn many_to_many(source_entity: impl Into<String>, relationship: impl Into<String>) -> Self {
        Self {
            source_entity: source_entity.into(),
            relationship: relationship.into(),
            link_relationship: None,
            view_name: None,
            link_shape: LinkShape::Custom,
        }
    }

    /// Key for a lookup-based (custom intersect or connection) relationship.
    pub fn linked(
        source_entity: impl Into<String>,
        relationship: impl Into<String>,
        link_relationship: impl Into<String>,
        link_shape: LinkShape,
    ) -> Self {
        Self {
            source_entity: source_entity.into(),
            relationship: relationship.into(),
            link_relationship: Some(link_relationship.into()),
            view_name: None,
            link_shape,
        }
    }

    /// Select a named target view.
    #[must_use]
    pub fn with_view(mut self, view_name: impl Into<String>) -> Self {
        self.view_name = Some(view_name.into());
        self
    }
}

impl fmt::Display for DescriptorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_entity, self.relationship)?;
        if let Some(link) = &self.link_relationship {
            write!(f, "/{link} ({})", self.link_shape)?;
        }
        if let Some(view) = &self.view_name {
            write!(f, " [{view}]")?;
        }
        Ok(())
    }
}

/// Names of an entity needed for queries and bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Logical name
    pub logical_name: String,
    /// Primary key attribute
    pub primary_key_attribute: String,
    /// Web API collection name
    pub entity_set_name: String,
}

/// Names and presentation data of the target entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntityInfo {
    /// Logical name
    pub logical_name: String,
    /// Primary key attribute
    pub primary_key_attribute: String,
    /// Primary name attribute used as the display text of a record
    pub primary_name_attribute: String,
    /// Web API collection name
    pub entity_set_name: String,
    /// Localized display name of the entity
    pub display_name: String,
    /// Whether quick create is available for new targets
    pub quick_create_enabled: bool,
}

/// Join description of a native many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManyToManyJoin {
    /// Logical name of the intersect table
    pub intersect_entity: String,
    /// Intersect attribute holding the source id
    pub source_join_attribute: String,
    /// Intersect attribute holding the target id
    pub target_join_attribute: String,
    /// Collection navigation property on the source used for `$ref` calls
    pub source_navigation_property: String,
}

/// Join description of a lookup-based relationship (link row entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntityJoin {
    /// Logical name of the link row entity
    pub intersect_entity: String,
    /// Primary key of the link row entity
    pub intersect_primary_key_attribute: String,
    /// Lookup attribute on the link row pointing at the source
    pub source_link_attribute: String,
    /// Lookup attribute on the link row pointing at the target
    pub target_link_attribute: String,
    /// Single-valued navigation property for the source binding
    pub source_navigation_property: String,
    /// Single-valued navigation property for the target binding
    pub target_navigation_property: String,
}

/// Which relationship pattern governs queries and mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RelationshipShape {
    /// Native intersect-table relationship.
    ManyToMany(ManyToManyJoin),
    /// A regular entity acts as the link row.
    CustomIntersect(LinkEntityJoin),
    /// The built-in connection entity acts as the link row.
    Connection(LinkEntityJoin),
}

/// Which identifier [`disassociate`](crate::association::AssociationQueryBuilder::disassociate)
/// expects for a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkIdKind {
    /// The target record's id.
    TargetId,
    /// The link row's own id.
    IntersectRowId,
}

impl fmt::Display for LinkIdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetId => write!(f, "target id"),
            Self::IntersectRowId => write!(f, "intersect row id"),
        }
    }
}

impl RelationshipShape {
    /// Short name used in logs and CLI output.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ManyToMany(_) => "many-to-many",
            Self::CustomIntersect(_) => "custom-intersect",
            Self::Connection(_) => "connection",
        }
    }

    /// Logical name of the intersect (link) entity.
    pub fn intersect_entity(&self) -> &str {
        match self {
            Self::ManyToMany(join) => &join.intersect_entity,
            Self::CustomIntersect(join) | Self::Connection(join) => &join.intersect_entity,
        }
    }

    /// The link row join, for the lookup-based shapes.
    pub const fn link_join(&self) -> Option<&LinkEntityJoin> {
        match self {
            Self::ManyToMany(_) => None,
            Self::CustomIntersect(join) | Self::Connection(join) => Some(join),
        }
    }

    /// Identifier kind expected when removing an association.
    pub const fn link_id_kind(&self) -> LinkIdKind {
        match self {
            Self::ManyToMany(_) => LinkIdKind::TargetId,
            Self::CustomIntersect(_) | Self::Connection(_) => LinkIdKind::IntersectRowId,
        }
    }
}

/// The target view a search starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// View name
    pub name: String,
    /// FetchXML of the view, possibly with `{{ field }}` placeholders
    pub fetch_query_template: String,
    /// Columns shown by the view, in layout order
    pub display_columns: Vec<String>,
}

impl ViewDefinition {
    /// Build from view FetchXML and layout XML.
    ///
    /// Display columns come from the layout's `<cell name="...">` entries;
    /// without a usable layout the attributes of the view's root `<entity>`
    /// are used. Cells of linked entities (`alias.attribute`) are skipped
    /// since they are not attributes of the target.
    pub fn from_view(name: &str, fetch_xml: &str, layout_xml: Option<&str>) -> Self {
        let display_columns = layout_xml
            .and_then(|layout| layout_columns(name, layout))
            .filter(|cols| !cols.is_empty())
            .or_else(|| root_entity_attributes(fetch_xml))
            .unwrap_or_else(|| {
                warn!(target: "resolver", "View '{}' has no readable columns", name);
                Vec::new()
            });

        Self {
            name: name.to_string(),
            fetch_query_template: fetch_xml.to_string(),
            display_columns,
        }
    }
}

fn layout_columns(view: &str, layout_xml: &str) -> Option<Vec<String>> {
    let doc = match Document::parse(layout_xml) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(target: "resolver", "Ignoring layout of view '{}': {}", view, e);
            return None;
        }
    };

    let mut names: Vec<String> = Vec::new();
    for name in doc
        .descendants()
        .filter(|n| n.has_tag_name("cell"))
        .filter_map(|n| n.attribute("name"))
        .filter(|name| !name.contains('.'))
    {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    Some(names)
}

/// The resolved, immutable bundle used by all association operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDescriptor {
    /// The key this descriptor was resolved for
    pub key: DescriptorKey,
    /// Entity owning the lookup control
    pub source_entity: EntityInfo,
    /// Link row entity; `None` for native many-to-many
    pub intersect_entity: Option<EntityInfo>,
    /// Entity being selected
    pub target_entity: TargetEntityInfo,
    /// Relationship pattern
    pub shape: RelationshipShape,
    /// Target view used for searches and display columns
    pub default_view: ViewDefinition,
}
