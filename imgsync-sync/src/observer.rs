//! Injected observability for the engine and coordinator.
//!
//! Neither [`crate::SyncEngine`] nor [`crate::RunCoordinator`] logs on its
//! own; they report [`SyncEvent`]s to a [`SyncObserver`]. The CLI passes a
//! [`TracingObserver`]; tests pass a [`RecordingObserver`] and assert on the
//! exact event sequence.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use imgsync_core::types::SyncKey;

use crate::engine::{Stage, SyncOutcome};

/// Something worth a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// `stage` is starting for `key`; `detail` names the references involved.
    Stage {
        key: SyncKey,
        stage: Stage,
        detail: String,
    },
    /// The sync of `key` finished with `outcome`.
    Finished { key: SyncKey, outcome: SyncOutcome },
    /// The digest store was written.
    StateSaved { path: PathBuf, records: usize },
    /// Writing the digest store failed; in-memory results are kept.
    StateSaveFailed { path: PathBuf, error: String },
    /// Webhook delivery failed; the run result is unaffected.
    NotifyFailed { error: String },
    /// Every planned pair has been processed.
    RunFinished { succeeded: usize, failed: usize },
}

pub trait SyncObserver {
    fn on_event(&self, event: &SyncEvent);
}

/// Forwards events to `tracing`, one line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Stage { key, stage, detail } => {
                tracing::info!("[{key}] {stage}: {detail}");
            }
            SyncEvent::Finished { key, outcome } => match outcome {
                SyncOutcome::Failed { .. } => tracing::error!("[{key}] {outcome}"),
                SyncOutcome::SkippedMissing => tracing::warn!("[{key}] {outcome}"),
                _ => tracing::info!("[{key}] {outcome}"),
            },
            SyncEvent::StateSaved { path, records } => {
                tracing::debug!("saved {records} digest record(s) to {}", path.display());
            }
            SyncEvent::StateSaveFailed { path, error } => {
                tracing::error!("failed to save digest store {}: {error}", path.display());
            }
            SyncEvent::NotifyFailed { error } => {
                tracing::warn!("notification not delivered: {error}");
            }
            SyncEvent::RunFinished { succeeded, failed } => {
                tracing::info!("run finished: {succeeded} succeeded, {failed} failed");
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stages started for `key`, in order.
    pub fn stages(&self, key: &SyncKey) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SyncEvent::Stage { key: k, stage, .. } if &k == key => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
