//! Structured record queries and their FetchXML rendering.
//!
//! The association layer describes what it wants as a [`RecordQuery`]; the
//! Web API client renders it to FetchXML, while the in-memory store used in
//! tests evaluates the structure directly. A query may start from a view's
//! FetchXML (`template`), in which case the extra attributes, filters and the
//! link entity are spliced into the template's root `<entity>` element and the
//! row count replaces whatever paging the template carried.

use roxmltree::{Document, Node};
use std::fmt::Write as _;

/// How the conditions of a [`Filter`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Every condition must hold.
    #[default]
    And,
    /// At least one condition must hold.
    Or,
}

impl FilterType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Comparison used by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    /// Exact equality.
    Eq,
    /// SQL-style `like` with `%` wildcards.
    Like,
}

impl ConditionOperator {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Like => "like",
        }
    }
}

/// A single attribute comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Attribute logical name
    pub attribute: String,
    /// Comparison operator
    pub operator: ConditionOperator,
    /// Right-hand value, unescaped
    pub value: String,
}

impl Condition {
    /// `attribute eq value`
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: ConditionOperator::Eq,
            value: value.into(),
        }
    }

    /// `attribute like %text%`
    pub fn contains(attribute: impl Into<String>, text: &str) -> Self {
        Self {
            attribute: attribute.into(),
            operator: ConditionOperator::Like,
            value: format!("%{text}%"),
        }
    }
}

/// A group of conditions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    /// How the conditions combine
    pub filter_type: FilterType,
    /// The conditions
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// A filter whose conditions must all hold.
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self {
            filter_type: FilterType::And,
            conditions,
        }
    }

    /// A filter of which one condition must hold.
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self {
            filter_type: FilterType::Or,
            conditions,
        }
    }

    fn write_xml(&self, out: &mut String) {
        if self.conditions.is_empty() {
            return;
        }
        let _ = write!(out, "<filter type=\"{}\">", self.filter_type.as_str());
        for condition in &self.conditions {
            let _ = write!(
                out,
                "<condition attribute=\"{}\" operator=\"{}\" value=\"{}\" />",
                escape_xml(&condition.attribute),
                condition.operator.as_str(),
                escape_xml(&condition.value)
            );
        }
        out.push_str("</filter>");
    }
}

/// An inner join to a related entity.
///
/// `from` is the attribute on the linked entity, `to` the attribute on the
/// parent entity. Linked attributes come back as `alias.attribute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntity {
    /// Logical name of the linked entity
    pub name: String,
    /// Join attribute on the linked entity
    pub from: String,
    /// Join attribute on the parent entity
    pub to: String,
    /// Alias used to prefix linked attributes in result rows
    pub alias: String,
    /// Whether the linked entity is a native intersect table
    pub intersect: bool,
    /// Linked attributes to return
    pub attributes: Vec<String>,
    /// Filters applied to the linked entity
    pub filters: Vec<Filter>,
}

impl LinkEntity {
    fn write_xml(&self, out: &mut String) {
        let _ = write!(
            out,
            "<link-entity name=\"{}\" from=\"{}\" to=\"{}\" alias=\"{}\" link-type=\"inner\"",
            escape_xml(&self.name),
            escape_xml(&self.from),
            escape_xml(&self.to),
            escape_xml(&self.alias)
        );
        if self.intersect {
            out.push_str(" intersect=\"true\"");
        }
        out.push('>');
        for attribute in &self.attributes {
            let _ = write!(out, "<attribute name=\"{}\" />", escape_xml(attribute));
        }
        for filter in &self.filters {
            filter.write_xml(out);
        }
        out.push_str("</link-entity>");
    }
}

/// A query for rows of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordQuery {
    /// Logical name of the queried entity
    pub entity: String,
    /// Expanded view FetchXML to start from, if any
    pub template: Option<String>,
    /// Attributes to return
    pub attributes: Vec<String>,
    /// Structured filters
    pub filters: Vec<Filter>,
    /// Pre-rendered `<filter>` fragments (expanded custom filters)
    pub raw_filters: Vec<String>,
    /// Optional join
    pub link: Option<LinkEntity>,
    /// Maximum number of rows
    pub top: Option<usize>,
    /// Ascending sort attribute
    pub order_by: Option<String>,
}

impl RecordQuery {
    /// Start a query for `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Self::default()
        }
    }

    /// Start from an expanded view query.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Add attributes to return, skipping duplicates.
    #[must_use]
    pub fn select<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for attribute in attributes {
            let attribute = attribute.into();
            if !attribute.is_empty() && !self.attributes.contains(&attribute) {
                self.attributes.push(attribute);
            }
        }
        self
    }

    /// Add a filter; empty filters are dropped.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        if !filter.conditions.is_empty() {
            self.filters.push(filter);
        }
        self
    }

    /// Add a pre-rendered `<filter>` fragment.
    #[must_use]
    pub fn raw_filter(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        if !fragment.trim().is_empty() {
            self.raw_filters.push(fragment);
        }
        self
    }

    /// Join a related entity.
    #[must_use]
    pub fn link(mut self, link: LinkEntity) -> Self {
        self.link = Some(link);
        self
    }

    /// Limit the number of rows.
    #[must_use]
    pub fn top(mut self, count: usize) -> Self {
        self.top = Some(count);
        self
    }

    /// Sort ascending by `attribute`.
    #[must_use]
    pub fn order_by(mut self, attribute: impl Into<String>) -> Self {
        self.order_by = Some(attribute.into());
        self
    }

    /// Render the query as FetchXML.
    pub fn to_fetch_xml(&self) -> String {
        if let Some(template) = &self.template {
            if let Some(xml) = self.splice_into(template) {
                return xml;
            }
            tracing::warn!(
                target: "api",
                "View query for '{}' has no root entity element; building a plain query",
                self.entity
            );
        }

        let mut xml = String::from("<fetch version=\"1.0\" mapping=\"logical\"");
        if let Some(top) = self.top {
            let _ = write!(xml, " count=\"{top}\"");
        }
        let _ = write!(xml, "><entity name=\"{}\">", escape_xml(&self.entity));
        xml.push_str(&self.entity_body(&[]));
        xml.push_str("</entity></fetch>");
        xml
    }

    /// Re-emit the view query with this query's paging, attributes, filters
    /// and join added to its root entity.
    fn splice_into(&self, template: &str) -> Option<String> {
        let doc = Document::parse(template).ok()?;
        let fetch = doc.root_element();
        let entity = root_entity(&doc)?;
        let existing = direct_attributes(entity);

        let mut xml = String::with_capacity(template.len() + 256);
        xml.push_str("<fetch");
        if let Some(top) = self.top {
            let _ = write!(xml, " count=\"{top}\"");
        }
        for attribute in fetch.attributes().filter(|a| !PAGING_ATTRIBUTES.contains(&a.name())) {
            let _ = write!(xml, " {}=\"{}\"", attribute.name(), escape_xml(attribute.value()));
        }
        xml.push('>');

        for child in fetch.children() {
            if child.id() != entity.id() {
                write_node(&mut xml, child);
                continue;
            }
            write_start_tag(&mut xml, entity);
            xml.push('>');
            for nested in entity.children() {
                write_node(&mut xml, nested);
            }
            xml.push_str(&self.entity_body(&existing));
            xml.push_str("</entity>");
        }
        xml.push_str("</fetch>");
        Some(xml)
    }

    fn entity_body(&self, existing: &[String]) -> String {
        let mut body = String::new();
        for attribute in self.attributes.iter().filter(|a| !existing.contains(a)) {
            let _ = write!(body, "<attribute name=\"{}\" />", escape_xml(attribute));
        }
        if let Some(order) = &self.order_by {
            let _ = write!(body, "<order attribute=\"{}\" descending=\"false\" />", escape_xml(order));
        }
        for filter in &self.filters {
            filter.write_xml(&mut body);
        }
        for fragment in &self.raw_filters {
            body.push_str(fragment);
        }
        if let Some(link) = &self.link {
            link.write_xml(&mut body);
        }
        body
    }
}

/// `<fetch>` attributes replaced by the query's own paging.
const PAGING_ATTRIBUTES: [&str; 4] = ["count", "top", "page", "paging-cookie"];

fn root_entity<'a, 'input>(doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    let fetch = doc.root_element();
    if !fetch.has_tag_name("fetch") {
        return None;
    }
    fetch.children().find(|n| n.has_tag_name("entity"))
}

fn direct_attributes(entity: Node<'_, '_>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in entity
        .children()
        .filter(|n| n.has_tag_name("attribute"))
        .filter_map(|n| n.attribute("name"))
    {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Attributes selected directly on the root `<entity>` of a FetchXML
/// document, in document order. Attributes of `<link-entity>` children are
/// not included.
///
/// Returns `None` when `fetch_xml` is not well-formed or has no root entity.
pub fn root_entity_attributes(fetch_xml: &str) -> Option<Vec<String>> {
    let doc = Document::parse(fetch_xml).ok()?;
    root_entity(&doc).map(direct_attributes)
}

fn write_start_tag(xml: &mut String, node: Node<'_, '_>) {
    let _ = write!(xml, "<{}", node.tag_name().name());
    for attribute in node.attributes() {
        let _ = write!(xml, " {}=\"{}\"", attribute.name(), escape_xml(attribute.value()));
    }
}

fn write_node(xml: &mut String, node: Node<'_, '_>) {
    if node.is_element() {
        write_start_tag(xml, node);
        if node.has_children() {
            xml.push('>');
            for child in node.children() {
                write_node(xml, child);
            }
            let _ = write!(xml, "</{}>", node.tag_name().name());
        } else {
            xml.push_str(" />");
        }
    } else if node.is_text() {
        if let Some(text) = node.text() {
            xml.push_str(&escape_xml(text));
        }
    }
}

/// Escape a value for use inside an XML attribute.
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
