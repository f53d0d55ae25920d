//! Run report rendering and the notification seam.

use serde_json::{json, Value};

use crate::coordinator::RunSummary;
use crate::engine::SyncOutcome;
use crate::error::NotifyError;

/// Delivers a finished run's summary somewhere humans look.
///
/// Delivery is best-effort: the coordinator logs an `Err` and carries on.
pub trait Notifier {
    fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError>;
}

/// Used when no notification channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _summary: &RunSummary) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Multi-line, human-readable report of a run.
pub fn render_report(summary: &RunSummary) -> String {
    let mut lines = vec![
        format!(
            "Image sync finished: {} succeeded, {} failed",
            summary.success_count, summary.failure_count
        ),
        format!(
            "synced {} · unchanged {} · missing {}",
            summary.count("synced"),
            summary.count("unchanged"),
            summary.count("missing")
        ),
    ];

    for detail in &summary.details {
        let source = format!("{}:{}", detail.image, detail.tag);
        let line = match &detail.outcome {
            SyncOutcome::Synced { .. } => format!("✓ {source} -> {}", detail.target),
            SyncOutcome::SkippedUnchanged => format!("· {source} unchanged"),
            SyncOutcome::SkippedMissing => format!("? {source} not found upstream"),
            SyncOutcome::Failed { stage, reason } => {
                format!("✗ {source} failed at {stage}: {reason}")
            }
        };
        lines.push(line);
    }

    if let Some(error) = &summary.state_error {
        lines.push(format!("⚠ digest store not saved: {error}"));
    }
    lines.join("\n")
}

/// Webhook body: `{"msgtype": "text", "text": {"content": <report>}}`.
pub fn webhook_payload(summary: &RunSummary) -> Value {
    json!({
        "msgtype": "text",
        "text": { "content": render_report(summary) },
    })
}
