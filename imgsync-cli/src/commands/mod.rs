pub mod run;
pub mod status;
pub mod targets;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use imgsync_core::{
    config, naming::DEFAULT_DESTINATION_HOST, Destination, ImageSpec, NAMESPACE_ENV,
};

/// Digest store location used when `--state` is not given.
pub const DEFAULT_STATE_FILE: &str = "sync_success.json";

/// `--config`: the image list.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Image list (JSON, or YAML for `.yaml` / `.yml` files).
    #[arg(long, short = 'c', default_value = "images.json")]
    pub config: PathBuf,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<Vec<ImageSpec>> {
        config::load_images_at(&self.config)
            .with_context(|| format!("failed to load image list {}", self.config.display()))
    }
}

/// Where synced images are pushed.
#[derive(Args, Debug, Clone)]
pub struct DestinationArgs {
    /// Destination registry host.
    #[arg(long, default_value = DEFAULT_DESTINATION_HOST)]
    pub registry_host: String,

    /// Destination namespace.
    #[arg(long, env = NAMESPACE_ENV, hide_env_values = true)]
    pub namespace: Option<String>,
}

impl DestinationArgs {
    pub fn resolve(&self) -> Result<Destination> {
        Destination::new(&self.registry_host, self.namespace.as_deref())
            .context("invalid destination registry")
    }
}

/// `--state`: the digest store file.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Digest store recording the last pushed digest per image tag.
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,
}
