//! Wire types for the metadata endpoints of the data API.
//!
//! Field names follow the Web API payloads (`PascalCase` for metadata
//! definitions, lowercase for `savedquery` rows).

use serde::{Deserialize, Serialize};

/// Metadata for a native many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManyToManyRelationshipMetadata {
    /// The schema name of the relationship (e.g. "account_contacts").
    pub schema_name: String,

    /// The logical name of the first entity in the declaration.
    pub entity1_logical_name: String,

    /// The logical name of the second entity in the declaration.
    pub entity2_logical_name: String,

    /// The logical name of the intersect (junction) entity.
    pub intersect_entity_name: String,

    /// The attribute on the intersect entity pointing at entity 1.
    pub entity1_intersect_attribute: String,

    /// The attribute on the intersect entity pointing at entity 2.
    pub entity2_intersect_attribute: String,

    /// The collection navigation property on entity 1.
    #[serde(default)]
    pub entity1_navigation_property_name: Option<String>,

    /// The collection navigation property on entity 2.
    #[serde(default)]
    pub entity2_navigation_property_name: Option<String>,
}

/// Which side of a many-to-many declaration an entity occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipSide {
    /// `Entity1*` fields describe the entity.
    Entity1,
    /// `Entity2*` fields describe the entity.
    Entity2,
}

impl ManyToManyRelationshipMetadata {
    /// Locate `logical_name` in the declaration.
    ///
    /// Returns `None` when the entity is on neither side. A self-referential
    /// relationship reports [`RelationshipSide::Entity1`].
    pub fn side_of(&self, logical_name: &str) -> Option<RelationshipSide> {
        if self.entity1_logical_name == logical_name {
            Some(RelationshipSide::Entity1)
        } else if self.entity2_logical_name == logical_name {
            Some(RelationshipSide::Entity2)
        } else {
            None
        }
    }

    /// Whether both sides name the same entity.
    pub fn is_self_referential(&self) -> bool {
        self.entity1_logical_name == self.entity2_logical_name
    }
}

/// Metadata for a one-to-many (equivalently many-to-one) relationship.
///
/// The referenced entity is the "one" side; the referencing entity holds the
/// lookup attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OneToManyRelationshipMetadata {
    /// The schema name of the relationship.
    pub schema_name: String,

    /// The logical name of the referenced ("one" side) entity.
    pub referenced_entity: String,

    /// The primary key attribute of the referenced entity.
    #[serde(default)]
    pub referenced_attribute: Option<String>,

    /// The logical name of the referencing ("many" side) entity.
    pub referencing_entity: String,

    /// The lookup attribute on the referencing entity.
    pub referencing_attribute: String,

    /// Collection navigation property on the referenced entity.
    #[serde(default)]
    pub referenced_entity_navigation_property_name: Option<String>,

    /// Single-valued navigation property on the referencing entity.
    #[serde(default)]
    pub referencing_entity_navigation_property_name: Option<String>,
}

/// A localized label as returned in `DisplayName`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocalizedLabel {
    /// The label text.
    pub label: String,
}

/// The `DisplayName` label set of a metadata item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Label {
    /// Label in the calling user's language, when one exists.
    #[serde(default)]
    pub user_localized_label: Option<LocalizedLabel>,
}

/// A boolean managed property (`{ "Value": true }`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BooleanManagedProperty {
    /// The effective value.
    pub value: bool,
}

/// The subset of an entity definition the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityDefinition {
    /// Logical name (e.g. "contact").
    pub logical_name: String,

    /// Primary key attribute (e.g. "contactid").
    pub primary_id_attribute: String,

    /// Primary name attribute (e.g. "fullname"); absent on some system entities.
    #[serde(default)]
    pub primary_name_attribute: Option<String>,

    /// Web API collection name (e.g. "contacts").
    pub entity_set_name: String,

    /// Localized display name.
    #[serde(default)]
    pub display_name: Label,

    /// Whether the entity supports quick create forms.
    #[serde(default)]
    pub is_quick_create_enabled: Option<BooleanManagedProperty>,
}

impl EntityDefinition {
    /// Localized display name, falling back to the logical name.
    pub fn display_label(&self) -> String {
        self.display_name
            .user_localized_label
            .as_ref()
            .map(|l| l.label.clone())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.logical_name.clone())
    }

    /// Whether quick create is enabled.
    pub fn quick_create_enabled(&self) -> bool {
        self.is_quick_create_enabled.is_some_and(|p| p.value)
    }
}

/// A saved (system) view row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    /// Primary key of the view.
    #[serde(default)]
    pub savedqueryid: Option<String>,

    /// View name.
    pub name: String,

    /// FetchXML query of the view.
    pub fetchxml: String,

    /// Grid layout of the view; lists the displayed columns.
    #[serde(default)]
    pub layoutxml: Option<String>,

    /// Whether this is the entity's default public view.
    #[serde(default)]
    pub isdefault: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_many_to_many_deserializes_pascal_case() {
        let value = json!({
            "SchemaName": "account_contacts",
            "Entity1LogicalName": "contact",
            "Entity2LogicalName": "account",
            "IntersectEntityName": "accountcontacts",
            "Entity1IntersectAttribute": "contactid",
            "Entity2IntersectAttribute": "accountid",
            "Entity1NavigationPropertyName": "account_contacts_contact",
            "Entity2NavigationPropertyName": "account_contacts_account"
        });
        let rel: ManyToManyRelationshipMetadata = serde_json::from_value(value).unwrap();

        assert_eq!(rel.side_of("account"), Some(RelationshipSide::Entity2));
        assert_eq!(rel.side_of("contact"), Some(RelationshipSide::Entity1));
        assert_eq!(rel.side_of("lead"), None);
        assert!(!rel.is_self_referential());
    }

    #[test]
    fn test_entity_definition_labels() {
        let value = json!({
            "LogicalName": "contact",
            "PrimaryIdAttribute": "contactid",
            "PrimaryNameAttribute": "fullname",
            "EntitySetName": "contacts",
            "DisplayName": { "UserLocalizedLabel": { "Label": "Contact" } },
            "IsQuickCreateEnabled": { "Value": true }
        });
        let def: EntityDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(def.display_label(), "Contact");
        assert!(def.quick_create_enabled());

        let bare: EntityDefinition = serde_json::from_value(json!({
            "LogicalName": "connection",
            "PrimaryIdAttribute": "connectionid",
            "EntitySetName": "connections"
        }))
        .unwrap();
        assert_eq!(bare.display_label(), "connection");
        assert!(!bare.quick_create_enabled());
        assert!(bare.primary_name_attribute.is_none());
    }
}
