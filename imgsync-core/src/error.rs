//! Error types for imgsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors. All of them abort a run before any registry call.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading the image list.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image list file did not exist at the expected path.
    #[error("image list not found at {path}")]
    NotFound { path: PathBuf },

    /// JSON parse error on load, with file path and line context.
    #[error("failed to parse image list at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error on load.
    #[error("failed to parse image list at {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A structurally valid entry with unusable values.
    #[error("invalid image entry #{index} ('{name}'): {reason}")]
    Invalid {
        index: usize,
        name: String,
        reason: String,
    },

    /// The destination namespace was not supplied.
    #[error("destination namespace is not set; pass --namespace or set ${var}")]
    MissingNamespace { var: &'static str },

    /// The destination host is empty or not a bare host name.
    #[error("invalid destination registry host '{host}'")]
    InvalidHost { host: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
