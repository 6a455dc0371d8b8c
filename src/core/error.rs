//! Error handling for polylookup
//!
//! This module provides the strongly-typed error used throughout the library
//! and the user-friendly rendering used by the command-line front-end.
//!
//! # Architecture
//!
//! - [`LookupError`] - Enumerated error kinds for every failure the core can report
//! - [`ErrorContext`] - Wrapper that adds user-facing details and suggestions
//!
//! # Error Categories
//!
//! - **Resolution**: [`LookupError::RelationshipNotFound`],
//!   [`LookupError::UnsupportedRelationship`], [`LookupError::MetadataFetch`]
//! - **Reads**: [`LookupError::QueryError`]
//! - **Mutations**: [`LookupError::AssociationError`]
//! - **Configuration**: [`LookupError::ConfigError`], [`LookupError::InvalidRecordId`]
//!
//! Resolution errors propagate to the caller unchanged. Read failures are
//! reported as [`LookupError::QueryError`]; the session layer degrades them to
//! empty results. Mutation failures are never swallowed.
//!
//! # Examples
//!
//! ```rust,no_run
//! use polylookup::core::{LookupError, user_friendly_error};
//!
//! let error = LookupError::RelationshipNotFound {
//!     entity: "account".to_string(),
//!     relationship: "account_contacts".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::api::ApiError;

/// The main error type for lookup operations.
///
/// Every variant carries owned strings only, so the type is `Clone`. The
/// resolver relies on this to hand the same failure to every caller that
/// shared one in-flight resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The named relationship is not declared for the source entity.
    ///
    /// This is a configuration error: the control is bound to a relationship
    /// schema name that does not exist, or exists but does not involve the
    /// source entity.
    #[error("Relationship '{relationship}' not found for entity '{entity}'")]
    RelationshipNotFound {
        /// Logical name of the source entity
        entity: String,
        /// Schema name of the relationship that could not be found
        relationship: String,
    },

    /// The relationship exists but no query/mutation strategy applies to it.
    #[error("Relationship '{relationship}' is not supported: {reason}")]
    UnsupportedRelationship {
        /// Schema name of the offending relationship
        relationship: String,
        /// Why the relationship cannot be used
        reason: String,
    },

    /// A remote metadata lookup failed while resolving a relationship.
    #[error("Failed to fetch metadata for {subject}: {reason}")]
    MetadataFetch {
        /// What was being fetched (entity, relationship or view)
        subject: String,
        /// Underlying remote failure
        reason: String,
    },

    /// An associate or disassociate call failed.
    #[error("Failed to {operation}: {reason}")]
    AssociationError {
        /// The mutation that failed ("associate" or "disassociate")
        operation: String,
        /// Underlying failure
        reason: String,
    },

    /// A read or search query failed.
    #[error("Query against '{entity}' failed: {reason}")]
    QueryError {
        /// Logical name of the queried entity
        entity: String,
        /// Underlying failure
        reason: String,
    },

    /// Control or global configuration is invalid.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// A record identifier was empty or malformed.
    #[error("Invalid record id: '{id}'")]
    InvalidRecordId {
        /// The rejected identifier
        id: String,
    },
}

impl LookupError {
    /// Build a [`LookupError::MetadataFetch`] from a remote failure.
    pub fn metadata_fetch(subject: impl Into<String>, source: &ApiError) -> Self {
        Self::MetadataFetch {
            subject: subject.into(),
            reason: source.to_string(),
        }
    }

    /// Build a [`LookupError::QueryError`] from a remote failure.
    pub fn query(entity: impl Into<String>, source: &ApiError) -> Self {
        Self::QueryError {
            entity: entity.into(),
            reason: source.to_string(),
        }
    }

    /// Build a [`LookupError::AssociationError`] with a plain reason.
    pub fn association(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AssociationError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is a failed mutation.
    pub const fn is_association_error(&self) -> bool {
        matches!(self, Self::AssociationError { .. })
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Mirrors what the command-line front-end prints: the error itself, optional
/// details explaining it, and an optional actionable suggestion.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying lookup error
    pub error: LookupError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: LookupError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] suitable for terminal display.
///
/// Known error types found anywhere in the `anyhow` chain get tailored
/// suggestions; everything else is wrapped as a generic configuration error
/// carrying the full chain as details.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(ctx) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: ctx.error.clone(),
            suggestion: ctx.suggestion.clone(),
            details: ctx.details.clone(),
        };
    }

    for cause in error.chain() {
        if let Some(lookup) = cause.downcast_ref::<LookupError>() {
            return create_error_context(lookup);
        }
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return create_api_error_context(api);
        }
    }

    let details = error.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>().join(": ");
    let ctx = ErrorContext::new(LookupError::ConfigError {
        message: error.to_string(),
    });
    if details.is_empty() { ctx } else { ctx.with_details(details) }
}

fn create_error_context(error: &LookupError) -> ErrorContext {
    match error {
        LookupError::RelationshipNotFound { entity, .. } => ErrorContext::new(error.clone())
            .with_details(format!(
                "The relationship must be declared on '{entity}' (many-to-many), or be a \
                 one-to-many where '{entity}' is the referenced entity when a link \
                 relationship is configured"
            ))
            .with_suggestion("Check the relationship schema name in the control configuration"),
        LookupError::UnsupportedRelationship { .. } => ErrorContext::new(error.clone())
            .with_suggestion(
                "Configure a link relationship that is a many-to-one from the intersect entity to a different entity",
            ),
        LookupError::MetadataFetch { .. } | LookupError::QueryError { .. } => {
            ErrorContext::new(error.clone())
                .with_details("The data API could not be reached or rejected the request")
                .with_suggestion("Check the environment URL, access token and network connectivity")
        }
        LookupError::AssociationError { .. } => ErrorContext::new(error.clone()).with_details(
            "The remote store may not reflect the requested change; refresh the associated records before retrying",
        ),
        LookupError::ConfigError { .. } => ErrorContext::new(error.clone()).with_suggestion(format!(
            "Check ~/.polylookup/config.toml or the {} / {} environment variables",
            crate::constants::BASE_URL_ENV,
            crate::constants::ACCESS_TOKEN_ENV
        )),
        LookupError::InvalidRecordId { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Record ids are the primary key values (GUIDs) of existing records"),
    }
}

fn create_api_error_context(error: &ApiError) -> ErrorContext {
    let ctx = ErrorContext::new(LookupError::QueryError {
        entity: "web api".to_string(),
        reason: error.to_string(),
    });
    match error {
        ApiError::Status { status: 401 | 403, .. } => {
            ctx.with_suggestion(format!("Refresh the access token in {}", crate::constants::ACCESS_TOKEN_ENV))
        }
        _ => ctx.with_suggestion("Check the environment URL and network connectivity"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LookupError::RelationshipNotFound {
            entity: "account".to_string(),
            relationship: "account_contacts".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Relationship 'account_contacts' not found for entity 'account'"
        );

        let error = LookupError::association("disassociate", "relationship not supported");
        assert_eq!(error.to_string(), "Failed to disassociate: relationship not supported");
        assert!(error.is_association_error());
    }

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new(LookupError::ConfigError {
            message: "missing base_url".to_string(),
        })
        .with_suggestion("Set POLYLOOKUP_URL");

        let display = format!("{ctx}");
        assert!(display.contains("missing base_url"));
        assert!(display.contains("Suggestion: Set POLYLOOKUP_URL"));
    }

    #[test]
    fn test_user_friendly_error_finds_lookup_error_in_chain() {
        let error = anyhow::Error::from(LookupError::UnsupportedRelationship {
            relationship: "rel".to_string(),
            reason: "self-referential".to_string(),
        })
        .context("Failed to resolve control");

        let ctx = user_friendly_error(error);
        assert!(matches!(ctx.error, LookupError::UnsupportedRelationship { .. }));
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_user_friendly_error_unauthorized() {
        let error = anyhow::Error::from(ApiError::Status {
            status: 401,
            url: "https://org.example/api/data/v9.2/accounts".to_string(),
            message: "token expired".to_string(),
        });

        let ctx = user_friendly_error(error);
        assert!(ctx.suggestion.unwrap().contains("POLYLOOKUP_TOKEN"));
    }

    #[test]
    fn test_user_friendly_error_generic() {
        let error = anyhow::anyhow!("disk full").context("Failed to write output");
        let ctx = user_friendly_error(error);
        assert_eq!(ctx.details.as_deref(), Some("disk full"));
    }
}
