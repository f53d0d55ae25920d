//! Registry client capability.
//!
//! The engine only needs each call to succeed or fail deterministically and
//! a returned digest to be content-addressable. [`docker::DockerCli`] shells
//! out to a container tool; [`memory::MemoryRegistry`] keeps everything in
//! process for tests.

pub mod docker;
pub mod memory;

use std::fmt;

use crate::error::ClientError;

/// Operations the sync engine performs against registries and local storage.
pub trait RegistryClient {
    /// Whether `reference` (`<repo>:<tag>`) exists in its remote registry.
    ///
    /// `Ok(false)` means the registry answered that the tag is unknown; any
    /// other failure is an `Err`.
    fn manifest_exists(&self, reference: &str) -> Result<bool, ClientError>;

    /// Fetch `reference` into local storage.
    fn pull(&self, reference: &str) -> Result<(), ClientError>;

    /// Whether `reference` is present in local storage.
    fn local_exists(&self, reference: &str) -> Result<bool, ClientError>;

    /// Content digest (`<algorithm>:<hex>`) of the local image `reference`.
    fn local_digest(&self, reference: &str) -> Result<Option<String>, ClientError>;

    /// Point the local reference `target` at the content of `source`.
    fn tag(&self, source: &str, target: &str) -> Result<(), ClientError>;

    /// Publish the local `reference` to its registry.
    fn push(&self, reference: &str) -> Result<(), ClientError>;
}

/// Discriminant of a [`RegistryClient`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryOp {
    ManifestExists,
    Pull,
    LocalExists,
    LocalDigest,
    Tag,
    Push,
}

impl fmt::Display for RegistryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistryOp::ManifestExists => "manifest-exists",
            RegistryOp::Pull => "pull",
            RegistryOp::LocalExists => "local-exists",
            RegistryOp::LocalDigest => "local-digest",
            RegistryOp::Tag => "tag",
            RegistryOp::Push => "push",
        };
        f.write_str(name)
    }
}

/// `true` for `<algorithm>:<hex>` digests such as `sha256:9f86…`.
pub fn is_content_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty()
                && algorithm
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && hex.len() >= 32
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}
