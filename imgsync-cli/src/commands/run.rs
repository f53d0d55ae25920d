//! `imgsync run` — sync every configured image tag.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use imgsync_sync::{
    digest_store, render_report, DockerCli, NoopNotifier, Notifier, RunCoordinator, RunSummary,
    SyncEngine, TracingObserver,
};

use super::{ConfigArgs, DestinationArgs, StateArgs};
use crate::webhook::WebhookNotifier;

/// Arguments for `imgsync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub destination: DestinationArgs,

    #[command(flatten)]
    pub state: StateArgs,

    /// Webhook receiving the run report.
    #[arg(long, env = "SYNC_WEBHOOK_URL", hide_env_values = true)]
    pub webhook_url: Option<String>,

    /// Container CLI used for pull / tag / push.
    #[arg(long, default_value = "docker")]
    pub container_tool: String,

    /// Seconds before a single container CLI call is killed.
    #[arg(long, default_value_t = 900)]
    pub command_timeout: u64,

    /// Save the digest store only once, at the end of the run.
    #[arg(long)]
    pub no_checkpoint: bool,

    /// Exit non-zero when any image tag failed to sync.
    #[arg(long)]
    pub fail_on_error: bool,

    /// Also write the run summary as JSON to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    finished_at: DateTime<Utc>,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let images = self.config.load()?;
        let destination = self.destination.resolve()?;

        let client = DockerCli::new(self.container_tool.as_str())
            .with_timeout(Duration::from_secs(self.command_timeout));
        let webhook = self
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(WebhookNotifier::new);
        let notifier: &dyn Notifier = match &webhook {
            Some(webhook) => webhook,
            None => &NoopNotifier,
        };

        let state_path = &self.state.state;
        let mut store = digest_store::load_at(state_path);
        tracing::info!(
            "syncing {} image(s) to {}/{} ({} digest record(s) loaded)",
            images.len(),
            destination.host(),
            destination.namespace(),
            store.len()
        );

        let observer = TracingObserver;
        let engine = SyncEngine::new(&client, &destination, &observer);
        let summary = RunCoordinator::new(engine, notifier, &observer, state_path)
            .with_checkpoint(!self.no_checkpoint)
            .run(&images, &mut store);

        println!("{}", render_report(&summary));

        if let Some(path) = &self.report {
            write_report(path, &summary)?;
        }

        if let Some(error) = &summary.state_error {
            bail!(
                "digest store {} was not saved: {error}",
                state_path.display()
            );
        }
        if self.fail_on_error && summary.has_failures() {
            bail!("{} image tag(s) failed to sync", summary.failure_count);
        }
        if summary.has_failures() {
            println!(
                "{}",
                format!("{} image tag(s) failed; see the log above.", summary.failure_count)
                    .yellow()
            );
        }
        Ok(())
    }
}

fn write_report(path: &Path, summary: &RunSummary) -> Result<()> {
    let report = RunReport {
        finished_at: Utc::now(),
        summary,
    };
    let json = serde_json::to_string_pretty(&report).context("failed to serialize run report")?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(path, json)
        .with_context(|| format!("failed to write run report {}", path.display()))
}
