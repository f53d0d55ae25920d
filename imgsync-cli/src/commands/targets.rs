//! `imgsync targets` — where every configured image tag would be pushed.
//!
//! Pure: no registry call, no digest store access.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use imgsync_core::VersionKind;

use super::{ConfigArgs, DestinationArgs};

/// Arguments for `imgsync targets`.
#[derive(Args, Debug)]
pub struct TargetsArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub destination: DestinationArgs,

    /// Emit a JSON object keyed by `<source>:<tag>`.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TargetJson {
    target: String,
    kind: VersionKind,
}

impl TargetsArgs {
    pub fn run(self) -> Result<()> {
        let images = self.config.load()?;
        let destination = self.destination.resolve()?;

        let mut rows = Vec::new();
        for image in &images {
            let source = image.source_reference();
            for (version, kind) in image.scheduled_versions() {
                rows.push((
                    image.sync_key(version),
                    destination.canonical_target(&source, version),
                    kind,
                ));
            }
        }

        if self.json {
            let payload: BTreeMap<String, TargetJson> = rows
                .into_iter()
                .map(|(key, target, kind)| {
                    (
                        key.to_string(),
                        TargetJson {
                            target: target.to_string(),
                            kind,
                        },
                    )
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize targets")?
            );
            return Ok(());
        }

        if rows.is_empty() {
            println!("No image tags configured.");
            return Ok(());
        }
        for (key, target, kind) in rows {
            let marker = match kind {
                VersionKind::Always => String::new(),
                VersionKind::OneTime => format!(" {}", "(one-time)".bright_black()),
            };
            println!("{key} -> {target}{marker}");
        }
        Ok(())
    }
}
