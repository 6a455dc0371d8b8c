//! polylookup - relationship resolution and association queries for
//! polymorphic lookup controls
//!
//! A lookup control lets a user pick many target records for one host
//! (source) record. Behind it sits one of three relationship shapes:
//!
//! - **native many-to-many**: the platform's intersect table links source and
//!   target; associations are created and removed by target id
//! - **custom intersect entity**: a regular entity with one lookup to the
//!   source and one to the target; each association is a row of that entity
//! - **connection**: the built-in `connection` entity with its polymorphic
//!   `record1id` / `record2id` lookups
//!
//! The crate resolves which shape applies from entity and relationship
//! metadata and then lists, searches, creates and removes associations the
//! way that shape requires.
//!
//! # Architecture Overview
//!
//! ```text
//! ControlConfig ──► RelationshipResolver ──► MetadataDescriptor
//!                     (memoized per key)            │
//!                                                   ▼
//!   RecordContext ──► AssociationQueryBuilder ──► DataApi (Web API / in-memory)
//!                              ▲
//!                        LookupSession (caches, staleness, field watching)
//! ```
//!
//! # Core Modules
//!
//! - [`api`] - the [`DataApi`](api::DataApi) seam, the Web API client, FetchXML queries
//! - [`metadata`] - descriptor keys, relationship shapes and the resolved descriptor
//! - [`resolver`] - memoized relationship resolution
//! - [`association`] - list, search, associate and disassociate queries
//! - [`session`] - per-control state: cached results, staleness, pending selections
//!
//! ## Supporting Modules
//!
//! - [`templating`] - `{{ field }}` placeholder expansion against the host record
//! - [`watch`] - field-change notification with scoped subscriptions
//! - [`config`] - global (`~/.polylookup/config.toml`) and per-control configuration
//! - [`core`] - error types and user-facing error rendering
//! - [`cli`] - the `polylookup` command-line front-end
//! - [`constants`] - shared limits and Web API naming conventions
//!
//! # Example
//!
//! ```rust,no_run
//! use polylookup::api::WebApiClient;
//! use polylookup::config::ControlConfig;
//! use polylookup::session::LookupSession;
//! use polylookup::templating::RecordContext;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let api = Arc::new(WebApiClient::new(
//!     "https://org.crm.dynamics.com",
//!     "9.2",
//!     Some("token".to_string()),
//!     Duration::from_secs(30),
//! )?);
//! let session = LookupSession::new(api, ControlConfig::new("account", "account_contacts"), 10)?;
//!
//! let linked = session.associated(Some("a0000000-0000-0000-0000-000000000001")).await?;
//! let page = session.search("ann", &RecordContext::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod association;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod metadata;
pub mod resolver;
pub mod session;
pub mod templating;
pub mod watch;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
