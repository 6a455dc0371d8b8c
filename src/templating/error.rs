//! Template expansion errors.

use thiserror::Error;

/// Failure to expand a query template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Tera rejected the template or failed while rendering it.
    #[error("Template rendering failed: {message}")]
    Render {
        /// Cleaned-up Tera error chain
        message: String,
    },
}
