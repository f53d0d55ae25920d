//! # imgsync-sync
//!
//! Digest-gated image mirroring.
//!
//! [`SyncEngine`] drives one `(image, tag)` pair through
//! exists → pull → verify-local → digest → compare → tag → push → record,
//! and [`RunCoordinator`] runs it over every configured pair, persisting the
//! [`DigestStore`] and handing a [`RunSummary`] to a [`Notifier`].
//!
//! Registry access goes through the [`RegistryClient`] trait; logging goes
//! through an injected [`SyncObserver`].

pub mod client;
pub mod coordinator;
pub mod digest_store;
pub mod engine;
pub mod error;
pub mod notify;
pub mod observer;

pub use client::{docker::DockerCli, memory::MemoryRegistry, RegistryClient};
pub use coordinator::{plan, PlannedSync, RunCoordinator, RunSummary, SyncDetail};
pub use digest_store::DigestStore;
pub use engine::{Stage, SyncEngine, SyncOutcome};
pub use error::{ClientError, NotifyError, SyncError};
pub use notify::{render_report, webhook_payload, NoopNotifier, Notifier};
pub use observer::{RecordingObserver, SyncEvent, SyncObserver, TracingObserver};
