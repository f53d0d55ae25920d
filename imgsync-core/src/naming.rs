//! Destination naming.
//!
//! A source reference maps to exactly one destination reference:
//!
//! ```text
//! <source>            = [<host>/]<repo path>
//! <destination>       = <dest host>/<namespace>/<flattened repo path>:<tag>
//! ```
//!
//! The first `/`-segment of a multi-segment source is treated as a registry
//! host and dropped; a single-segment source is the repository path itself.
//! Remaining `/` become `-` because the destination registry has no nested
//! namespaces. Docker Hub official images also lose the implicit `library/`
//! namespace.
//!
//! Everything here is pure: no I/O, no clock, no randomness.

use crate::error::ConfigError;
use crate::types::TargetReference;

/// Destination registry used when none is configured.
pub const DEFAULT_DESTINATION_HOST: &str = "registry.cn-hangzhou.aliyuncs.com";

/// Environment variable holding the destination namespace.
pub const NAMESPACE_ENV: &str = "ALIYUN_REGISTRY_NAMESPACE";

const DOCKER_HUB_HOSTS: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];
const OFFICIAL_NAMESPACE: &str = "library/";

/// Destination registry host plus namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    host: String,
    namespace: String,
}

impl Destination {
    /// Validate and build a destination.
    ///
    /// A missing or blank namespace is [`ConfigError::MissingNamespace`].
    pub fn new(host: &str, namespace: Option<&str>) -> Result<Self, ConfigError> {
        let namespace = namespace
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .ok_or(ConfigError::MissingNamespace { var: NAMESPACE_ENV })?;

        let trimmed = host.trim().trim_end_matches('/');
        if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidHost {
                host: host.to_string(),
            });
        }

        Ok(Self {
            host: trimmed.to_string(),
            namespace: namespace.to_string(),
        })
    }

    /// [`Destination::new`] with the namespace read from [`NAMESPACE_ENV`].
    pub fn from_env(host: &str) -> Result<Self, ConfigError> {
        let namespace = std::env::var(NAMESPACE_ENV).ok();
        Self::new(host, namespace.as_deref())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Destination reference for `<source>:<version>`.
    pub fn canonical_target(&self, source: &str, version: &str) -> TargetReference {
        TargetReference(format!(
            "{}/{}/{}:{}",
            self.host,
            self.namespace,
            flatten_repository(source),
            version
        ))
    }
}

/// Repository path of `source` with the host removed and `/` replaced by `-`.
pub fn flatten_repository(source: &str) -> String {
    let (host, path) = split_host(source);
    let path = match host {
        Some(host) if is_docker_hub(host) => path.strip_prefix(OFFICIAL_NAMESPACE).unwrap_or(path),
        _ => path,
    };
    path.replace('/', "-")
}

/// Local references a container tool may file a pulled `<source>:<version>`
/// under, most specific first.
///
/// `docker pull docker.io/library/nginx:1.27` is stored as `nginx:1.27`, so
/// Docker Hub sources get a second, normalized candidate.
pub fn local_candidates(source: &str, version: &str) -> Vec<String> {
    let mut candidates = vec![format!("{source}:{version}")];
    if let (Some(host), path) = split_host(source) {
        if is_docker_hub(host) {
            let path = path.strip_prefix(OFFICIAL_NAMESPACE).unwrap_or(path);
            let normalized = format!("{path}:{version}");
            if !candidates.contains(&normalized) {
                candidates.push(normalized);
            }
        }
    }
    candidates
}

fn split_host(source: &str) -> (Option<&str>, &str) {
    match source.split_once('/') {
        Some((host, rest)) => (Some(host), rest),
        None => (None, source),
    }
}

fn is_docker_hub(host: &str) -> bool {
    DOCKER_HUB_HOSTS.contains(&host)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
