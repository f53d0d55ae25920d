//! Domain types for imgsync.
//!
//! Configuration entries ([`ImageSpec`]) are immutable for the duration of a
//! run. Sync history is keyed by [`SyncKey`] and stored as [`DigestRecord`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identity under which sync history is tracked: `<source reference>:<tag>`.
///
/// The source reference is used exactly as configured (with `registry`
/// prefixed when the entry has one), for always-sync and one-time tags alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncKey(pub String);

impl SyncKey {
    pub fn new(source: &str, version: &str) -> Self {
        Self(format!("{source}:{version}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SyncKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SyncKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Fully-qualified destination reference, `<host>/<namespace>/<repo>:<tag>`.
///
/// Derived on demand by [`crate::naming::Destination::canonical_target`];
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetReference(pub String);

impl TargetReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How a configured tag is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionKind {
    /// Re-checked every run; re-pushed whenever the content digest changes.
    Always,
    /// Synced at most once ever.
    OneTime,
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionKind::Always => write!(f, "always"),
            VersionKind::OneTime => write!(f, "one-time"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One configured source repository and the tags to mirror from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Source repository, optionally qualified with a registry host.
    #[serde(alias = "source")]
    pub name: String,
    /// Registry host prefixed to `name` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default, rename = "sync-one-time")]
    pub one_time_versions: Vec<String>,
}

impl ImageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: None,
            versions: Vec::new(),
            one_time_versions: Vec::new(),
        }
    }

    pub fn with_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_one_time_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_time_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Fully-qualified source reference, without a tag.
    pub fn source_reference(&self) -> String {
        match self.registry.as_deref().map(|r| r.trim_end_matches('/')) {
            Some(registry) if !registry.is_empty() => format!("{registry}/{}", self.name),
            _ => self.name.clone(),
        }
    }

    pub fn sync_key(&self, version: &str) -> SyncKey {
        SyncKey::new(&self.source_reference(), version)
    }

    /// Every configured tag in schedule order: `versions` first, then the
    /// one-time tags that are not also listed as always-sync.
    pub fn scheduled_versions(&self) -> Vec<(&str, VersionKind)> {
        let mut out: Vec<(&str, VersionKind)> = self
            .versions
            .iter()
            .map(|v| (v.as_str(), VersionKind::Always))
            .collect();
        for version in &self.one_time_versions {
            if !self.versions.contains(version) {
                out.push((version.as_str(), VersionKind::OneTime));
            }
        }
        out
    }
}

/// Last successful sync of one [`SyncKey`].
///
/// Serialized as `{"digest": "...", "lastSyncTime": "<RFC 3339 UTC>"}`;
/// unknown fields are ignored on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestRecord {
    pub digest: String,
    pub last_sync_time: DateTime<Utc>,
}

impl DigestRecord {
    pub fn new(digest: impl Into<String>, last_sync_time: DateTime<Utc>) -> Self {
        Self {
            digest: digest.into(),
            last_sync_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_key_joins_source_and_tag() {
        let key = SyncKey::new("docker.io/library/redis", "7");
        assert_eq!(key.as_str(), "docker.io/library/redis:7");
        assert_eq!(key.to_string(), "docker.io/library/redis:7");
    }

    #[test]
    fn source_reference_prefixes_registry() {
        let mut spec = ImageSpec::new("grafana/grafana");
        assert_eq!(spec.source_reference(), "grafana/grafana");

        spec.registry = Some("quay.io/".to_string());
        assert_eq!(spec.source_reference(), "quay.io/grafana/grafana");
        assert_eq!(spec.sync_key("10").as_str(), "quay.io/grafana/grafana:10");
    }

    #[test]
    fn scheduled_versions_prefers_always_for_duplicates() {
        let spec = ImageSpec::new("docker.io/library/nginx")
            .with_versions(["1.27", "latest"])
            .with_one_time_versions(["1.25", "latest"]);
        assert_eq!(
            spec.scheduled_versions(),
            vec![
                ("1.27", VersionKind::Always),
                ("latest", VersionKind::Always),
                ("1.25", VersionKind::OneTime),
            ]
        );
    }

    #[test]
    fn image_spec_accepts_source_alias_and_one_time_field() {
        let json = r#"{"source":"ghcr.io/org/app","versions":["1"],"sync-one-time":["0.9"]}"#;
        let spec: ImageSpec = serde_json::from_str(json).expect("deserialize");
        assert_eq!(spec.name, "ghcr.io/org/app");
        assert_eq!(spec.versions, vec!["1"]);
        assert_eq!(spec.one_time_versions, vec!["0.9"]);
    }

    #[test]
    fn digest_record_ignores_unknown_fields() {
        let json = r#"{"digest":"sha256:ab","lastSyncTime":"2024-05-01T10:00:00Z","pushedBy":"ci"}"#;
        let record: DigestRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.digest, "sha256:ab");
        assert_eq!(record.last_sync_time.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn version_kind_display() {
        assert_eq!(VersionKind::Always.to_string(), "always");
        assert_eq!(VersionKind::OneTime.to_string(), "one-time");
    }
}
