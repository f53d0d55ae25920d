//! imgsync core library: domain types, destination naming, configuration.
//!
//! - [`types`]: sync keys, image specs, digest records
//! - [`naming`]: deterministic source → destination reference mapping
//! - [`config`]: image list loading and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

pub use error::ConfigError;
pub use naming::{Destination, DEFAULT_DESTINATION_HOST, NAMESPACE_ENV};
pub use types::{DigestRecord, ImageSpec, SyncKey, TargetReference, VersionKind};
