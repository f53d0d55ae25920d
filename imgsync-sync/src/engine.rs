//! Per-pair sync engine.
//!
//! ## `sync` stage protocol
//!
//! 0. One-time tag already recorded → `SkippedUnchanged`, no registry call.
//! 1. `exists`: source tag must exist upstream, else `SkippedMissing`.
//! 2. `pull`: fetch the source locally.
//! 3. `verify-local`: confirm which local reference the pull produced.
//! 4. `digest`: read the content digest of that local reference.
//! 5. `compare`: stored digest equal → `SkippedUnchanged` (no tag, no push).
//! 6. `tag`: point the destination reference at the local content.
//! 7. `push`: publish the destination reference.
//! 8. `record`: store `{digest, now}` under the sync key.
//!
//! Each stage starts only after the previous one succeeded. Errors never
//! escape: they become `SyncOutcome::Failed { stage, .. }`.

use std::fmt;

use chrono::Utc;
use serde::Serialize;

use imgsync_core::{
    naming::{local_candidates, Destination},
    types::{DigestRecord, ImageSpec, SyncKey, TargetReference, VersionKind},
};

use crate::client::{is_content_digest, RegistryClient};
use crate::digest_store::DigestStore;
use crate::error::ClientError;
use crate::observer::{SyncEvent, SyncObserver};

// ---------------------------------------------------------------------------
// Stage / outcome
// ---------------------------------------------------------------------------

/// A step of the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Exists,
    Pull,
    VerifyLocal,
    Digest,
    Compare,
    Tag,
    Push,
    Record,
    /// The sync panicked; set by the coordinator.
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Exists => "exists",
            Stage::Pull => "pull",
            Stage::VerifyLocal => "verify-local",
            Stage::Digest => "digest",
            Stage::Compare => "compare",
            Stage::Tag => "tag",
            Stage::Push => "push",
            Stage::Record => "record",
            Stage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Result of syncing one `(image, tag)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SyncOutcome {
    /// Pushed; the digest store now holds `digest`.
    Synced { digest: String },
    /// Content identical to the last push, or a one-time tag already synced.
    SkippedUnchanged,
    /// The source tag does not exist upstream.
    SkippedMissing,
    Failed { stage: Stage, reason: String },
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Synced { .. } => "synced",
            SyncOutcome::SkippedUnchanged => "unchanged",
            SyncOutcome::SkippedMissing => "missing",
            SyncOutcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Synced { digest } => write!(f, "synced ({digest})"),
            SyncOutcome::SkippedUnchanged => write!(f, "unchanged, skipped"),
            SyncOutcome::SkippedMissing => write!(f, "missing upstream, skipped"),
            SyncOutcome::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}

fn failed(stage: Stage, reason: impl fmt::Display) -> SyncOutcome {
    SyncOutcome::Failed {
        stage,
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives single `(image, tag)` pairs through the stage protocol.
pub struct SyncEngine<'a> {
    client: &'a dyn RegistryClient,
    destination: &'a Destination,
    observer: &'a dyn SyncObserver,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        client: &'a dyn RegistryClient,
        destination: &'a Destination,
        observer: &'a dyn SyncObserver,
    ) -> Self {
        Self {
            client,
            destination,
            observer,
        }
    }

    pub fn destination(&self) -> &Destination {
        self.destination
    }

    /// Destination reference for `image:version`.
    pub fn target_for(&self, image: &ImageSpec, version: &str) -> TargetReference {
        self.destination
            .canonical_target(&image.source_reference(), version)
    }

    /// Sync `image:version`, updating `store` only after a successful push.
    pub fn sync(
        &self,
        image: &ImageSpec,
        version: &str,
        kind: VersionKind,
        store: &mut DigestStore,
    ) -> SyncOutcome {
        let key = image.sync_key(version);
        let outcome = self.run_stages(image, version, kind, &key, store);
        self.observer.on_event(&SyncEvent::Finished {
            key,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn run_stages(
        &self,
        image: &ImageSpec,
        version: &str,
        kind: VersionKind,
        key: &SyncKey,
        store: &mut DigestStore,
    ) -> SyncOutcome {
        // One-time tags are sync-once-ever, whatever upstream does later.
        if kind == VersionKind::OneTime && store.contains(key) {
            return SyncOutcome::SkippedUnchanged;
        }

        let source = image.source_reference();
        let requested = format!("{source}:{version}");
        let target = self.destination.canonical_target(&source, version);

        self.enter(key, Stage::Exists, &requested);
        match self.client.manifest_exists(&requested) {
            Ok(true) => {}
            Ok(false) => return SyncOutcome::SkippedMissing,
            Err(err) => return failed(Stage::Exists, err),
        }

        self.enter(key, Stage::Pull, &requested);
        if let Err(err) = self.client.pull(&requested) {
            return failed(Stage::Pull, err);
        }

        self.enter(key, Stage::VerifyLocal, &requested);
        let candidates = local_candidates(&source, version);
        let local = match self.confirm_local(&candidates) {
            Ok(Some(local)) => local,
            Ok(None) => {
                return failed(
                    Stage::VerifyLocal,
                    format!("pulled image not found locally as {}", candidates.join(" or ")),
                )
            }
            Err(err) => return failed(Stage::VerifyLocal, err),
        };

        self.enter(key, Stage::Digest, &local);
        let digest = match self.client.local_digest(&local) {
            Ok(Some(digest)) if is_content_digest(&digest) => digest,
            Ok(Some(digest)) => {
                return failed(Stage::Digest, format!("'{digest}' is not a content digest"))
            }
            Ok(None) => return failed(Stage::Digest, format!("no repo digest for {local}")),
            Err(err) => return failed(Stage::Digest, err),
        };

        self.enter(key, Stage::Compare, &digest);
        if let Some(previous) = store.get(key) {
            if previous.digest == digest {
                return SyncOutcome::SkippedUnchanged;
            }
        }

        self.enter(key, Stage::Tag, &format!("{local} -> {target}"));
        if let Err(err) = self.client.tag(&local, target.as_str()) {
            return failed(Stage::Tag, err);
        }

        self.enter(key, Stage::Push, target.as_str());
        if let Err(err) = self.client.push(target.as_str()) {
            return failed(Stage::Push, err);
        }

        self.enter(key, Stage::Record, &digest);
        store.put(key.clone(), DigestRecord::new(digest.clone(), Utc::now()));
        SyncOutcome::Synced { digest }
    }

    /// First candidate present in local storage.
    fn confirm_local(&self, candidates: &[String]) -> Result<Option<String>, ClientError> {
        for candidate in candidates {
            if self.client.local_exists(candidate)? {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    fn enter(&self, key: &SyncKey, stage: Stage, detail: &str) {
        self.observer.on_event(&SyncEvent::Stage {
            key: key.clone(),
            stage,
            detail: detail.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use imgsync_core::naming::DEFAULT_DESTINATION_HOST;

    use crate::client::memory::MemoryRegistry;
    use crate::client::RegistryOp;
    use crate::observer::RecordingObserver;

    const REDIS: &str = "docker.io/library/redis";
    const REDIS_TARGET: &str = "registry.cn-hangzhou.aliyuncs.com/mirror/redis:7";

    fn mirror() -> Destination {
        Destination::new(DEFAULT_DESTINATION_HOST, Some("mirror")).unwrap()
    }

    fn redis() -> ImageSpec {
        ImageSpec::new(REDIS).with_versions(["7"])
    }

    #[test]
    fn first_sync_pushes_and_records() {
        let registry = MemoryRegistry::new();
        let digest = registry.publish("docker.io/library/redis:7", "redis 7.0");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();

        let outcome = engine.sync(&redis(), "7", VersionKind::Always, &mut store);

        assert_eq!(outcome, SyncOutcome::Synced { digest: digest.clone() });
        assert_eq!(registry.pushed(REDIS_TARGET), Some(digest.clone()));
        let record = store.get(&SyncKey::from("docker.io/library/redis:7")).unwrap();
        assert_eq!(record.digest, digest);
        assert_eq!(
            observer.stages(&SyncKey::from("docker.io/library/redis:7")),
            vec![
                Stage::Exists,
                Stage::Pull,
                Stage::VerifyLocal,
                Stage::Digest,
                Stage::Compare,
                Stage::Tag,
                Stage::Push,
                Stage::Record,
            ]
        );
    }

    #[test]
    fn second_sync_with_same_content_is_skipped_without_tag_or_push() {
        let registry = MemoryRegistry::new();
        registry.publish("docker.io/library/redis:7", "redis 7.0");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();

        let first = engine.sync(&redis(), "7", VersionKind::Always, &mut store);
        assert!(matches!(first, SyncOutcome::Synced { .. }));
        let after_first = registry.pushed(REDIS_TARGET);
        registry.clear_calls();

        let second = engine.sync(&redis(), "7", VersionKind::Always, &mut store);
        assert_eq!(second, SyncOutcome::SkippedUnchanged);
        assert_eq!(registry.count(RegistryOp::Tag), 0);
        assert_eq!(registry.count(RegistryOp::Push), 0);
        assert_eq!(registry.pushed(REDIS_TARGET), after_first);
    }

    #[test]
    fn changed_digest_is_pushed_and_record_overwritten() {
        let registry = MemoryRegistry::new();
        let new_digest = registry.publish("docker.io/library/redis:7", "redis 7.2");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);

        let key = SyncKey::from("docker.io/library/redis:7");
        let old_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut store = DigestStore::new();
        store.put(
            key.clone(),
            DigestRecord::new(format!("sha256:{}", "0".repeat(64)), old_time),
        );

        let outcome = engine.sync(&redis(), "7", VersionKind::Always, &mut store);

        assert_eq!(outcome, SyncOutcome::Synced { digest: new_digest.clone() });
        assert_eq!(registry.count(RegistryOp::Push), 1);
        let record = store.get(&key).unwrap();
        assert_eq!(record.digest, new_digest);
        assert!(record.last_sync_time > old_time);
        assert!(record.last_sync_time <= Utc::now() + Duration::seconds(1));
    }

    #[test]
    fn recorded_one_time_version_is_never_reattempted() {
        let registry = MemoryRegistry::new();
        registry.publish("docker.io/library/redis:6", "changed since");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let image = ImageSpec::new(REDIS).with_one_time_versions(["6"]);

        let mut store = DigestStore::new();
        store.put(
            SyncKey::from("docker.io/library/redis:6"),
            DigestRecord::new(format!("sha256:{}", "1".repeat(64)), Utc::now()),
        );

        let outcome = engine.sync(&image, "6", VersionKind::OneTime, &mut store);
        assert_eq!(outcome, SyncOutcome::SkippedUnchanged);
        assert!(registry.calls().is_empty(), "no registry call expected");
    }

    #[test]
    fn unrecorded_one_time_version_syncs_once() {
        let registry = MemoryRegistry::new();
        registry.publish("docker.io/library/redis:6", "redis 6");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let image = ImageSpec::new(REDIS).with_one_time_versions(["6"]);
        let mut store = DigestStore::new();

        let first = engine.sync(&image, "6", VersionKind::OneTime, &mut store);
        assert!(matches!(first, SyncOutcome::Synced { .. }));

        registry.publish("docker.io/library/redis:6", "redis 6 rebuilt");
        registry.clear_calls();
        let second = engine.sync(&image, "6", VersionKind::OneTime, &mut store);
        assert_eq!(second, SyncOutcome::SkippedUnchanged);
        assert!(registry.calls().is_empty());
    }

    #[test]
    fn missing_upstream_tag_is_skipped() {
        let registry = MemoryRegistry::new();
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();

        let outcome = engine.sync(&redis(), "7", VersionKind::Always, &mut store);
        assert_eq!(outcome, SyncOutcome::SkippedMissing);
        assert_eq!(registry.count(RegistryOp::Pull), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn existence_check_error_is_a_failure() {
        let registry = MemoryRegistry::new();
        registry.fail_on(RegistryOp::ManifestExists, "docker.io/library/redis:7");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();

        let outcome = engine.sync(&redis(), "7", VersionKind::Always, &mut store);
        assert!(matches!(
            outcome,
            SyncOutcome::Failed {
                stage: Stage::Exists,
                ..
            }
        ));
    }

    #[test]
    fn failure_at_each_mutating_stage_leaves_store_untouched() {
        let cases = [
            (RegistryOp::Pull, "docker.io/library/redis:7", Stage::Pull),
            (
                RegistryOp::Tag,
                "redis:7 -> registry.cn-hangzhou.aliyuncs.com/mirror/redis:7",
                Stage::Tag,
            ),
            (RegistryOp::Push, REDIS_TARGET, Stage::Push),
        ];
        for (op, reference, stage) in cases {
            let registry = MemoryRegistry::new();
            registry.publish("docker.io/library/redis:7", "redis");
            registry.fail_on(op, reference);
            let dest = mirror();
            let observer = RecordingObserver::new();
            let engine = SyncEngine::new(&registry, &dest, &observer);
            let mut store = DigestStore::new();

            let outcome = engine.sync(&redis(), "7", VersionKind::Always, &mut store);
            match outcome {
                SyncOutcome::Failed { stage: got, .. } => assert_eq!(got, stage, "{op}"),
                other => panic!("expected failure at {stage}, got {other:?}"),
            }
            assert!(store.is_empty(), "store must not change on {op} failure");
        }
    }

    #[test]
    fn local_presence_falls_back_to_short_name() {
        let registry = MemoryRegistry::new();
        registry.publish("docker.io/library/redis:7", "redis");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();

        engine.sync(&redis(), "7", VersionKind::Always, &mut store);
        let tags: Vec<_> = registry
            .calls()
            .into_iter()
            .filter(|c| c.op == RegistryOp::Tag)
            .map(|c| c.reference)
            .collect();
        assert_eq!(tags, vec![format!("redis:7 -> {REDIS_TARGET}")]);
    }

    #[test]
    fn pull_that_leaves_nothing_locally_fails_verification() {
        let registry = MemoryRegistry::new();
        registry.publish("ghcr.io/org/app:1", "app");
        registry.ghost_pull("ghcr.io/org/app:1");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();
        let image = ImageSpec::new("ghcr.io/org/app").with_versions(["1"]);

        let outcome = engine.sync(&image, "1", VersionKind::Always, &mut store);
        assert!(matches!(
            outcome,
            SyncOutcome::Failed {
                stage: Stage::VerifyLocal,
                ..
            }
        ));
        assert_eq!(registry.count(RegistryOp::LocalDigest), 0);
    }

    #[test]
    fn unreadable_digest_fails_digest_stage() {
        let registry = MemoryRegistry::new();
        registry.publish("ghcr.io/org/app:1", "app");
        registry.fail_on(RegistryOp::LocalDigest, "ghcr.io/org/app:1");
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();
        let image = ImageSpec::new("ghcr.io/org/app").with_versions(["1"]);

        let outcome = engine.sync(&image, "1", VersionKind::Always, &mut store);
        assert!(matches!(
            outcome,
            SyncOutcome::Failed {
                stage: Stage::Digest,
                ..
            }
        ));
        assert_eq!(registry.count(RegistryOp::Tag), 0);
    }

    #[test]
    fn finished_event_carries_outcome() {
        let registry = MemoryRegistry::new();
        let dest = mirror();
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(&registry, &dest, &observer);
        let mut store = DigestStore::new();

        engine.sync(&redis(), "7", VersionKind::Always, &mut store);
        assert_eq!(
            observer.events().last(),
            Some(&SyncEvent::Finished {
                key: SyncKey::from("docker.io/library/redis:7"),
                outcome: SyncOutcome::SkippedMissing,
            })
        );
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(SyncOutcome::Failed {
            stage: Stage::VerifyLocal,
            reason: "gone".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "verify-local");
        assert_eq!(json["reason"], "gone");
    }
}
