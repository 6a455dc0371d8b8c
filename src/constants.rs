//! Global constants used throughout the polylookup codebase.
//!
//! This module contains page sizes, Web API naming conventions, timeouts and
//! other values that are used across multiple modules. Defining them
//! centrally makes magic numbers and magic strings discoverable.

use std::time::Duration;

/// Default number of candidate rows shown per search page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Upper bound accepted for a configured page size.
///
/// The platform caps `count` on a FetchXML query at 5000 rows; one row is
/// reserved for the look-ahead used to compute `has_more`.
pub const MAX_PAGE_SIZE: usize = 4999;

/// Web API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "9.2";

/// Default timeout for a single Web API request (30 seconds).
pub fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Annotation suffix carrying the formatted (display) value of a column.
pub const FORMATTED_VALUE_ANNOTATION: &str = "@OData.Community.Display.V1.FormattedValue";

/// `Prefer` header value asking the Web API to return every annotation.
pub const PREFER_ANNOTATIONS: &str = "odata.include-annotations=\"*\"";

/// Suffix of a single-valued navigation binding in a create payload.
pub const ODATA_BIND_SUFFIX: &str = "@odata.bind";

/// Logical name of the platform's built-in connection entity.
pub const CONNECTION_ENTITY: &str = "connection";

/// Alias given to the intersect entity's `link-entity` in association queries.
pub const INTERSECT_ALIAS: &str = "link";

/// `querytype` of a public (main list) saved view.
pub const PUBLIC_VIEW_QUERY_TYPE: i32 = 0;

/// Environment variable overriding the global config file location.
pub const CONFIG_PATH_ENV: &str = "POLYLOOKUP_CONFIG";

/// Environment variable overriding the configured environment URL.
pub const BASE_URL_ENV: &str = "POLYLOOKUP_URL";

/// Environment variable overriding the configured access token.
pub const ACCESS_TOKEN_ENV: &str = "POLYLOOKUP_TOKEN";
