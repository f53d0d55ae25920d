//! `imgsync status` — digest store contents.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use imgsync_sync::{digest_store, DigestStore};

use super::StateArgs;

/// Arguments for `imgsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRecordJson {
    key: String,
    digest: String,
    last_sync_time: DateTime<Utc>,
    last_sync_age: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "image")]
    image: String,
    #[tabled(rename = "digest")]
    digest: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let store = digest_store::load_at(&self.state.state);
        if self.json {
            return print_json(&store);
        }

        println!(
            "imgsync v{} | {} | {} record(s)",
            env!("CARGO_PKG_VERSION"),
            self.state.state.display(),
            store.len()
        );
        if store.is_empty() {
            println!("No digest records yet. Run 'imgsync run' to sync images.");
            return Ok(());
        }

        let rows: Vec<StatusTableRow> = store
            .iter()
            .map(|(key, record)| StatusTableRow {
                image: key.to_string(),
                digest: short_digest(&record.digest),
                last_sync: format!("{} ago", format_age(record.last_sync_time)),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        let unknown = store
            .iter()
            .filter(|(_, record)| record.digest.is_empty())
            .count();
        if unknown > 0 {
            println!(
                "{}",
                format!("{unknown} record(s) migrated from the legacy log carry no digest.")
                    .yellow()
            );
        }
        Ok(())
    }
}

fn print_json(store: &DigestStore) -> Result<()> {
    let records: Vec<StatusRecordJson> = store
        .iter()
        .map(|(key, record)| StatusRecordJson {
            key: key.to_string(),
            digest: record.digest.clone(),
            last_sync_time: record.last_sync_time,
            last_sync_age: format_age(record.last_sync_time),
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&records).context("failed to serialize status JSON")?
    );
    Ok(())
}

/// `sha256:0123456789ab…` → `sha256:0123456789ab`.
fn short_digest(digest: &str) -> String {
    if digest.is_empty() {
        return "-".to_string();
    }
    match digest.split_once(':') {
        Some((algorithm, hex)) => {
            format!("{algorithm}:{}", hex.chars().take(12).collect::<String>())
        }
        None => digest.chars().take(19).collect(),
    }
}

fn format_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
