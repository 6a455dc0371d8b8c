//! [`DataApi`] implementation over a Dataverse-style Web API.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{
    ApiError, ApiResult, DataApi, EntityDefinition, ManyToManyRelationshipMetadata,
    OneToManyRelationshipMetadata, RecordQuery, Row, SavedQuery,
};
use crate::constants::{PREFER_ANNOTATIONS, PUBLIC_VIEW_QUERY_TYPE};

const ENTITY_SELECT: &str = "LogicalName,PrimaryIdAttribute,PrimaryNameAttribute,EntitySetName,DisplayName,IsQuickCreateEnabled";
const MANY_TO_MANY_CAST: &str = "Microsoft.Dynamics.CRM.ManyToManyRelationshipMetadata";
const ONE_TO_MANY_CAST: &str = "Microsoft.Dynamics.CRM.OneToManyRelationshipMetadata";

#[derive(Deserialize)]
struct Collection<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ODataErrorBody {
    error: ODataError,
}

#[derive(Deserialize)]
struct ODataError {
    #[serde(default)]
    message: String,
}

/// HTTP client for the Web API of one environment.
///
/// # Examples
///
/// ```rust,no_run
/// use polylookup::api::{DataApi, WebApiClient};
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = WebApiClient::new(
///     "https://org.crm.dynamics.com",
///     "9.2",
///     Some("eyJ0eXAi...".to_string()),
///     Duration::from_secs(30),
/// )?;
/// let contact = client.entity_definition("contact").await?;
/// println!("{}", contact.entity_set_name);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WebApiClient {
    http: Client,
    base: String,
    access_token: Option<String>,
}

impl WebApiClient {
    /// Create a client for `base_url` (the environment root, e.g.
    /// `https://org.crm.dynamics.com`).
    pub fn new(
        base_url: &str,
        api_version: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("OData-MaxVersion", HeaderValue::from_static("4.0"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));

        let http = Client::builder().default_headers(headers).timeout(timeout).build().map_err(
            |e| ApiError::Transport {
                url: base_url.to_string(),
                reason: e.to_string(),
            },
        )?;

        Ok(Self {
            http,
            base: format!("{}/api/data/v{}", base_url.trim_end_matches('/'), api_version),
            access_token,
        })
    }

    /// Root of the versioned Web API (`.../api/data/v9.2`).
    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> ApiResult<Response> {
        let response = self.authorize(request).send().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ODataErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        debug!(target: "api", "HTTP {} from {}: {}", status, url, message);
        Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, url: &str) -> ApiResult<T> {
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = self.url(path);
        debug!(target: "api", "GET {}", url);
        let response = self.send(self.http.get(&url), &url).await?;
        Self::decode(response, &url).await
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        match self.get_json(path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn relationship<T: DeserializeOwned>(
        &self,
        schema_name: &str,
        cast: &str,
    ) -> ApiResult<Option<T>> {
        self.get_optional(&format!(
            "RelationshipDefinitions(SchemaName='{}')/{}",
            quote_literal(schema_name),
            cast
        ))
        .await
    }
}

/// Double single quotes inside an OData string literal.
fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Extract the id from an `OData-EntityId` header value.
fn entity_id_from_header(value: &str) -> Option<String> {
    super::parse_bind_value(value).map(|(_, id)| id.to_string())
}

#[async_trait]
impl DataApi for WebApiClient {
    async fn many_to_many_relationship(
        &self,
        schema_name: &str,
    ) -> ApiResult<Option<ManyToManyRelationshipMetadata>> {
        self.relationship(schema_name, MANY_TO_MANY_CAST).await
    }

    async fn one_to_many_relationship(
        &self,
        schema_name: &str,
    ) -> ApiResult<Option<OneToManyRelationshipMetadata>> {
        self.relationship(schema_name, ONE_TO_MANY_CAST).await
    }

    async fn entity_definition(&self, logical_name: &str) -> ApiResult<EntityDefinition> {
        self.get_json(&format!(
            "EntityDefinitions(LogicalName='{}')?$select={}",
            quote_literal(logical_name),
            ENTITY_SELECT
        ))
        .await
    }

    async fn saved_view(
        &self,
        entity: &str,
        view_name: Option<&str>,
    ) -> ApiResult<Option<SavedQuery>> {
        let selector = match view_name {
            Some(name) => format!("name eq '{}'", quote_literal(name)),
            None => "isdefault eq true".to_string(),
        };
        let path = format!(
            "savedqueries?$select=savedqueryid,name,fetchxml,layoutxml,isdefault\
             &$filter=returnedtypecode eq '{}' and querytype eq {} and {}",
            quote_literal(entity),
            PUBLIC_VIEW_QUERY_TYPE,
            selector
        );
        let views: Collection<SavedQuery> = self.get_json(&path).await?;
        Ok(views.value.into_iter().next())
    }

    async fn retrieve_multiple(
        &self,
        entity_set: &str,
        query: &RecordQuery,
    ) -> ApiResult<Vec<Row>> {
        let url = self.url(entity_set);
        let fetch_xml = query.to_fetch_xml();
        debug!(target: "api", "GET {} fetchXml={}", url, fetch_xml);

        let request = self
            .http
            .get(&url)
            .header("Prefer", PREFER_ANNOTATIONS)
            .query(&[("fetchXml", fetch_xml.as_str())]);
        let response = self.send(request, &url).await?;
        let rows: Collection<Row> = Self::decode(response, &url).await?;
        Ok(rows.value)
    }

    async fn create_record(&self, entity_set: &str, record: Row) -> ApiResult<String> {
        let url = self.url(entity_set);
        debug!(target: "api", "POST {}", url);
        let request = self.http.post(&url).header(CONTENT_TYPE, "application/json").json(&record);
        let response = self.send(request, &url).await?;

        response
            .headers()
            .get("OData-EntityId")
            .and_then(|v| v.to_str().ok())
            .and_then(entity_id_from_header)
            .ok_or_else(|| ApiError::Decode {
                url,
                reason: "response carried no OData-EntityId header".to_string(),
            })
    }

    async fn delete_record(&self, entity_set: &str, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("{entity_set}({id})"));
        debug!(target: "api", "DELETE {}", url);
        match self.send(self.http.delete(&url), &url).await {
            Ok(_) => Ok(()),
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(ApiError::RecordNotFound {
                    entity_set: entity_set.to_string(),
                    id: id.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn associate(
        &self,
        entity_set: &str,
        id: &str,
        navigation_property: &str,
        target_set: &str,
        target_id: &str,
    ) -> ApiResult<()> {
        let url = self.url(&format!("{entity_set}({id})/{navigation_property}/$ref"));
        let body = json!({ "@odata.id": self.url(&format!("{target_set}({target_id})")) });
        debug!(target: "api", "POST {}", url);
        let request = self.http.post(&url).header(CONTENT_TYPE, "application/json").json(&body);
        self.send(request, &url).await.map(|_| ())
    }

    async fn disassociate(
        &self,
        entity_set: &str,
        id: &str,
        navigation_property: &str,
        target_id: &str,
    ) -> ApiResult<()> {
        let url = self.url(&format!("{entity_set}({id})/{navigation_property}({target_id})/$ref"));
        debug!(target: "api", "DELETE {}", url);
        self.send(self.http.delete(&url), &url).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let client =
            WebApiClient::new("https://org.example/", "9.2", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.base(), "https://org.example/api/data/v9.2");
        assert_eq!(client.url("/contacts"), "https://org.example/api/data/v9.2/contacts");
        assert_eq!(client.url("contacts(1)"), "https://org.example/api/data/v9.2/contacts(1)");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien's view"), "O''Brien''s view");
    }

    #[test]
    fn test_entity_id_from_header() {
        assert_eq!(
            entity_id_from_header(
                "https://org.example/api/data/v9.2/new_links(7b7f3c4e-0000-0000-0000-000000000001)"
            )
            .as_deref(),
            Some("7b7f3c4e-0000-0000-0000-000000000001")
        );
        assert_eq!(entity_id_from_header("garbage"), None);
    }
}
