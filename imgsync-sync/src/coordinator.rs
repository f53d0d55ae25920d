//! Run coordination: every configured pair, one at a time.
//!
//! Pairs are planned up front in configuration order (per image: always-sync
//! tags, then one-time tags not yet recorded). Each pair runs to completion
//! before the next starts. A failing or panicking pair becomes a `Failed`
//! entry in the [`RunSummary`]; it never stops the run.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::Serialize;

use imgsync_core::types::{ImageSpec, VersionKind};

use crate::digest_store::{self, DigestStore};
use crate::engine::{Stage, SyncEngine, SyncOutcome};
use crate::notify::Notifier;
use crate::observer::{SyncEvent, SyncObserver};

/// One `(image, tag)` pair scheduled for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSync<'a> {
    pub image: &'a ImageSpec,
    pub version: &'a str,
    pub kind: VersionKind,
}

/// Schedule every pair that needs attention this run.
///
/// One-time tags already present in `store` are left out.
pub fn plan<'a>(images: &'a [ImageSpec], store: &DigestStore) -> Vec<PlannedSync<'a>> {
    images
        .iter()
        .flat_map(|image| {
            image
                .scheduled_versions()
                .into_iter()
                .filter(move |(version, kind)| {
                    *kind == VersionKind::Always || !store.contains(&image.sync_key(version))
                })
                .map(move |(version, kind)| PlannedSync {
                    image,
                    version,
                    kind,
                })
        })
        .collect()
}

/// Summary line for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncDetail {
    pub image: String,
    pub tag: String,
    pub kind: VersionKind,
    pub target: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub details: Vec<SyncDetail>,
    /// Set when the digest store could not be written at the end of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_error: Option<String>,
}

impl RunSummary {
    pub fn record(&mut self, detail: SyncDetail) {
        if detail.outcome.is_failure() {
            self.failure_count += 1;
        } else {
            self.success_count += 1;
        }
        self.details.push(detail);
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count > 0
    }

    /// Number of details whose outcome has `label` (see [`SyncOutcome::label`]).
    pub fn count(&self, label: &str) -> usize {
        self.details
            .iter()
            .filter(|d| d.outcome.label() == label)
            .count()
    }
}

/// Runs the engine over a configuration and persists / reports the result.
pub struct RunCoordinator<'a> {
    engine: SyncEngine<'a>,
    notifier: &'a dyn Notifier,
    observer: &'a dyn SyncObserver,
    state_path: PathBuf,
    checkpoint: bool,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        engine: SyncEngine<'a>,
        notifier: &'a dyn Notifier,
        observer: &'a dyn SyncObserver,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            notifier,
            observer,
            state_path: state_path.into(),
            checkpoint: true,
        }
    }

    /// Save the digest store after every successful push (default `true`).
    pub fn with_checkpoint(mut self, checkpoint: bool) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Sync every planned pair, save `store`, then notify.
    pub fn run(&self, images: &[ImageSpec], store: &mut DigestStore) -> RunSummary {
        let mut summary = RunSummary::default();

        for planned in plan(images, store) {
            let outcome = self.sync_guarded(&planned, store);
            if self.checkpoint && matches!(outcome, SyncOutcome::Synced { .. }) {
                self.save(store);
            }
            summary.record(SyncDetail {
                image: planned.image.source_reference(),
                tag: planned.version.to_string(),
                kind: planned.kind,
                target: self
                    .engine
                    .target_for(planned.image, planned.version)
                    .to_string(),
                outcome,
            });
        }

        summary.state_error = self.save(store);
        self.observer.on_event(&SyncEvent::RunFinished {
            succeeded: summary.success_count,
            failed: summary.failure_count,
        });

        if let Err(err) = self.notifier.notify(&summary) {
            self.observer.on_event(&SyncEvent::NotifyFailed {
                error: err.to_string(),
            });
        }
        summary
    }

    fn sync_guarded(&self, planned: &PlannedSync<'_>, store: &mut DigestStore) -> SyncOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine
                .sync(planned.image, planned.version, planned.kind, store)
        }));
        match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                let outcome = SyncOutcome::Failed {
                    stage: Stage::Aborted,
                    reason,
                };
                self.observer.on_event(&SyncEvent::Finished {
                    key: planned.image.sync_key(planned.version),
                    outcome: outcome.clone(),
                });
                outcome
            }
        }
    }

    /// Returns the error text on failure; never aborts the run.
    fn save(&self, store: &DigestStore) -> Option<String> {
        match digest_store::save_at(&self.state_path, store) {
            Ok(()) => {
                self.observer.on_event(&SyncEvent::StateSaved {
                    path: self.state_path.clone(),
                    records: store.len(),
                });
                None
            }
            Err(err) => {
                let error = err.to_string();
                self.observer.on_event(&SyncEvent::StateSaveFailed {
                    path: self.state_path.clone(),
                    error: error.clone(),
                });
                Some(error)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgsync_core::types::SyncKey;

    #[test]
    fn plan_orders_images_then_always_then_one_time() {
        let images = vec![
            ImageSpec::new("docker.io/library/redis")
                .with_versions(["7"])
                .with_one_time_versions(["6"]),
            ImageSpec::new("ghcr.io/org/app").with_versions(["2", "1"]),
        ];
        let planned: Vec<(String, &str, VersionKind)> = plan(&images, &DigestStore::new())
            .into_iter()
            .map(|p| (p.image.name.clone(), p.version, p.kind))
            .collect();
        assert_eq!(
            planned,
            vec![
                ("docker.io/library/redis".to_string(), "7", VersionKind::Always),
                ("docker.io/library/redis".to_string(), "6", VersionKind::OneTime),
                ("ghcr.io/org/app".to_string(), "2", VersionKind::Always),
                ("ghcr.io/org/app".to_string(), "1", VersionKind::Always),
            ]
        );
    }

    #[test]
    fn plan_skips_recorded_one_time_versions_only() {
        let images = vec![ImageSpec::new("alpine")
            .with_versions(["3.20"])
            .with_one_time_versions(["3.18", "3.19"])];
        let mut store = DigestStore::new();
        store.put(
            SyncKey::from("alpine:3.18"),
            imgsync_core::types::DigestRecord::new("sha256:x", chrono::Utc::now()),
        );
        store.put(
            SyncKey::from("alpine:3.20"),
            imgsync_core::types::DigestRecord::new("sha256:y", chrono::Utc::now()),
        );

        let versions: Vec<&str> = plan(&images, &store).iter().map(|p| p.version).collect();
        assert_eq!(versions, vec!["3.20", "3.19"]);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "panic with non-string payload");
    }
}
