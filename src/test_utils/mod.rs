//! Test utilities for polylookup
//!
//! This module provides an in-memory [`DataApi`](crate::api::DataApi)
//! implementation, ready-made metadata fixtures for the supported relationship
//! shapes, and logging setup for tests.
//!
//! It is compiled for unit tests and, behind the `test-utils` feature, for
//! integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use polylookup::metadata::DescriptorKey;
//! use polylookup::resolver::RelationshipResolver;
//! use polylookup::test_utils::StoreFixture;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let api = Arc::new(StoreFixture::sample().build());
//! let resolver = RelationshipResolver::new(api.clone());
//! let descriptor = resolver.resolve(&DescriptorKey::many_to_many("account", "account_contacts")).await?;
//! assert_eq!(descriptor.target_entity.logical_name, "contact");
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod memory;

pub use fixtures::{ids, StoreFixture};
pub use memory::InMemoryDataApi;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. `level` takes precedence over
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=resolver=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
