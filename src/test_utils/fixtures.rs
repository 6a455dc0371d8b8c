//! Sample metadata and records for the three relationship shapes.
//!
//! [`StoreFixture::sample`] builds an environment with:
//!
//! - `account_contacts`: native many-to-many between `account` and `contact`,
//!   declared with `contact` as entity 1
//! - `account_connectionrows` + `connectionrow_target_contact`: a custom
//!   `connectionrow` entity with lookups `sourceid` (account) and `targetid`
//!   (contact)
//! - `account_connections1` + `contact_connections2`: the built-in
//!   `connection` entity with polymorphic lookups `record1id` / `record2id`
//! - a few relationships that are invalid for one reason or another, used by
//!   the error-path tests

use serde_json::{Value, json};
use std::time::Duration;

use super::InMemoryDataApi;
use crate::api::{
    BooleanManagedProperty, EntityDefinition, Label, LocalizedLabel, ManyToManyRelationshipMetadata,
    OneToManyRelationshipMetadata, Row, SavedQuery,
};

/// Fixed record ids used by the sample store.
pub mod ids {
    /// The sample account.
    pub const ACCOUNT: &str = "a0000000-0000-0000-0000-000000000001";
    /// Contact "Ann Archer".
    pub const CONTACT_ANN: &str = "c0000000-0000-0000-0000-000000000001";
    /// Contact "Bob Baker".
    pub const CONTACT_BOB: &str = "c0000000-0000-0000-0000-000000000002";
    /// Contact "Cara Cole".
    pub const CONTACT_CARA: &str = "c0000000-0000-0000-0000-000000000003";
}

/// Default public view of `contact`.
pub const ACTIVE_CONTACTS_FETCH: &str = r#"<fetch version="1.0" output-format="xml-platform" mapping="logical" distinct="false"><entity name="contact"><attribute name="fullname" /><attribute name="emailaddress1" /><attribute name="contactid" /><order attribute="fullname" descending="false" /><filter type="and"><condition attribute="statecode" operator="eq" value="0" /></filter></entity></fetch>"#;

/// A contact view filtered by a field of the host record.
pub const CONTACTS_BY_PARENT_FETCH: &str = r#"<fetch version="1.0" mapping="logical"><entity name="contact"><attribute name="fullname" /><attribute name="contactid" /><filter type="and"><condition attribute="parentcustomerid" operator="eq" value="{{ parentcustomerid.id }}" /></filter></entity></fetch>"#;

/// Builder around an [`InMemoryDataApi`] pre-populated with sample data.
#[derive(Debug)]
pub struct StoreFixture {
    api: InMemoryDataApi,
}

fn entity(
    logical_name: &str,
    primary_id: &str,
    primary_name: Option<&str>,
    entity_set: &str,
    label: &str,
    quick_create: bool,
) -> EntityDefinition {
    EntityDefinition {
        logical_name: logical_name.to_string(),
        primary_id_attribute: primary_id.to_string(),
        primary_name_attribute: primary_name.map(ToString::to_string),
        entity_set_name: entity_set.to_string(),
        display_name: Label {
            user_localized_label: Some(LocalizedLabel {
                label: label.to_string(),
            }),
        },
        is_quick_create_enabled: Some(BooleanManagedProperty {
            value: quick_create,
        }),
    }
}

fn one_to_many(
    schema_name: &str,
    referenced: &str,
    referenced_attribute: &str,
    referencing: &str,
    referencing_attribute: &str,
    navigation_property: Option<&str>,
) -> OneToManyRelationshipMetadata {
    OneToManyRelationshipMetadata {
        schema_name: schema_name.to_string(),
        referenced_entity: referenced.to_string(),
        referenced_attribute: Some(referenced_attribute.to_string()),
        referencing_entity: referencing.to_string(),
        referencing_attribute: referencing_attribute.to_string(),
        referenced_entity_navigation_property_name: Some(schema_name.to_string()),
        referencing_entity_navigation_property_name: navigation_property.map(ToString::to_string),
    }
}

fn many_to_many(
    schema_name: &str,
    entity1: (&str, &str),
    entity2: (&str, &str),
    intersect: &str,
) -> ManyToManyRelationshipMetadata {
    ManyToManyRelationshipMetadata {
        schema_name: schema_name.to_string(),
        entity1_logical_name: entity1.0.to_string(),
        entity2_logical_name: entity2.0.to_string(),
        intersect_entity_name: intersect.to_string(),
        entity1_intersect_attribute: entity1.1.to_string(),
        entity2_intersect_attribute: entity2.1.to_string(),
        entity1_navigation_property_name: Some(schema_name.to_string()),
        entity2_navigation_property_name: Some(schema_name.to_string()),
    }
}

fn view(name: &str, fetch_xml: &str, cells: &[&str], is_default: bool) -> SavedQuery {
    let layout = cells.iter().fold(String::new(), |mut acc, cell| {
        acc.push_str(&format!(r#"<cell name="{cell}" width="150" />"#));
        acc
    });
    SavedQuery {
        savedqueryid: None,
        name: name.to_string(),
        fetchxml: fetch_xml.to_string(),
        layoutxml: Some(format!(r#"<grid name="resultset" object="2"><row name="result">{layout}</row></grid>"#)),
        isdefault: is_default,
    }
}

/// Turn a JSON object literal into a [`Row`].
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

impl StoreFixture {
    /// Metadata, views and records for all three shapes.
    pub fn sample() -> Self {
        let api = InMemoryDataApi::new();

        api.add_entity(entity("account", "accountid", Some("name"), "accounts", "Account", true));
        api.add_entity(entity("contact", "contactid", Some("fullname"), "contacts", "Contact", true));
        api.add_entity(entity("connection", "connectionid", Some("name"), "connections", "Connection", false));
        api.add_entity(entity("connectionrow", "connectionrowid", None, "connectionrows", "Connection Row", false));
        api.add_entity(entity("lead", "leadid", Some("fullname"), "leads", "Lead", true));

        api.add_many_to_many(many_to_many(
            "account_contacts",
            ("contact", "contactid"),
            ("account", "accountid"),
            "accountcontacts",
        ));
        api.add_many_to_many(many_to_many(
            "contact_contacts",
            ("contact", "contactidone"),
            ("contact", "contactidtwo"),
            "contactcontacts",
        ));
        api.add_many_to_many(many_to_many(
            "contact_leads",
            ("contact", "contactid"),
            ("lead", "leadid"),
            "contactleads",
        ));

        api.add_one_to_many(one_to_many(
            "account_connectionrows",
            "account",
            "accountid",
            "connectionrow",
            "sourceid",
            Some("sourceid"),
        ));
        api.add_one_to_many(one_to_many(
            "connectionrow_target_contact",
            "contact",
            "contactid",
            "connectionrow",
            "targetid",
            Some("targetid"),
        ));
        api.add_one_to_many(one_to_many(
            "account_connections1",
            "account",
            "accountid",
            "connection",
            "record1id",
            Some("record1id_account"),
        ));
        api.add_one_to_many(one_to_many(
            "contact_connections2",
            "contact",
            "contactid",
            "connection",
            "record2id",
            Some("record2id_contact"),
        ));
        api.add_one_to_many(one_to_many(
            "contact_customer_accounts",
            "account",
            "accountid",
            "contact",
            "parentcustomerid",
            Some("parentcustomerid_account"),
        ));

        api.add_view("contact", view("Active Contacts", ACTIVE_CONTACTS_FETCH, &["fullname", "emailaddress1"], true));
        api.add_view("contact", view("Contacts by Parent", CONTACTS_BY_PARENT_FETCH, &["fullname"], false));
        api.add_view(
            "account",
            view(
                "Active Accounts",
                r#"<fetch version="1.0" mapping="logical"><entity name="account"><attribute name="name" /><attribute name="accountid" /></entity></fetch>"#,
                &["name"],
                true,
            ),
        );

        api.insert_record("account", row(json!({ "accountid": ids::ACCOUNT, "name": "Contoso" })));
        api.insert_record(
            "contact",
            row(json!({
                "contactid": ids::CONTACT_ANN,
                "fullname": "Ann Archer",
                "emailaddress1": "ann@example.com",
                "parentcustomerid": ids::ACCOUNT,
            })),
        );
        api.insert_record(
            "contact",
            row(json!({ "contactid": ids::CONTACT_BOB, "fullname": "Bob Baker" })),
        );
        api.insert_record(
            "contact",
            row(json!({
                "contactid": ids::CONTACT_CARA,
                "fullname": "Cara Cole",
                "fullname@OData.Community.Display.V1.FormattedValue": "Cole, Cara",
            })),
        );

        Self {
            api,
        }
    }

    /// Add `count` generated contacts named "Generated NNN".
    #[must_use]
    pub fn with_generated_contacts(self, count: usize) -> Self {
        for n in 0..count {
            self.api.insert_record(
                "contact",
                row(json!({
                    "contactid": format!("d0000000-0000-0000-0000-{n:012}"),
                    "fullname": format!("Generated {n:03}"),
                })),
            );
        }
        self
    }

    /// Delay every call of the built store.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.api = self.api.with_latency(latency);
        self
    }

    /// Finish building.
    pub fn build(self) -> InMemoryDataApi {
        self.api
    }
}
