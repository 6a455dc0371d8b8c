//! Configuration management for polylookup
//!
//! Two layers of configuration exist:
//!
//! 1. **Global configuration** ([`GlobalConfig`], `~/.polylookup/config.toml`)
//!    - which environment to talk to and how: URL, API version, access
//!    token, default page size, request timeout. Environment variables
//!    override the file.
//! 2. **Control configuration** ([`ControlConfig`]) - the parameters a single
//!    lookup control is bound with: source entity, relationship, optional link
//!    relationship and shape, view, custom filter, search columns, page size.
//!    Loaded from TOML or built from command-line flags.
//!
//! Both are validated before use; validation failures are
//! [`LookupError::ConfigError`](crate::core::LookupError::ConfigError).

pub mod control;
pub mod global;

pub use control::ControlConfig;
pub use global::GlobalConfig;
