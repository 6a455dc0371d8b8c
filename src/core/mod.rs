//! Core types for polylookup
//!
//! This module holds the error type shared by every layer of the crate and the
//! user-facing rendering of those errors.
//!
//! ## `error` - Error Handling
//!
//! - [`LookupError`] - Enumerated error kinds covering resolution, reads and mutations
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to the user-friendly format
//!
//! # Examples
//!
//! ```rust
//! use polylookup::core::{LookupError, user_friendly_error};
//! use anyhow::Result;
//!
//! fn example_operation() -> Result<String> {
//!     Err(LookupError::ConfigError { message: "no base_url".to_string() }.into())
//! }
//!
//! if let Err(e) = example_operation() {
//!     let friendly = user_friendly_error(e);
//!     assert!(friendly.suggestion.is_some());
//! }
//! ```

pub mod error;

pub use error::{ErrorContext, LookupError, user_friendly_error};

/// Result alias used by the library layers.
pub type LookupResult<T> = std::result::Result<T, LookupError>;
