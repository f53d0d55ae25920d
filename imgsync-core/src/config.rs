//! Image list loading.
//!
//! The image list is a JSON array (YAML when the file ends in `.yaml` or
//! `.yml`):
//!
//! ```json
//! [
//!   { "name": "docker.io/library/redis", "versions": ["7"], "sync-one-time": ["6.2"] }
//! ]
//! ```
//!
//! Entries are validated and tag lists are de-duplicated on load, so the rest
//! of the run can treat every [`ImageSpec`] as well-formed.

use std::path::Path;

use crate::error::{io_err, ConfigError};
use crate::types::ImageSpec;

/// Load and validate the image list at `path`.
///
/// Returns `ConfigError::NotFound` if absent and `ConfigError::Parse` /
/// `ConfigError::ParseYaml` (with path) if malformed.
pub fn load_images_at(path: &Path) -> Result<Vec<ImageSpec>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;

    let images: Vec<ImageSpec> = if is_yaml(path) {
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })?
    } else {
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?
    };

    normalize(images)
}

/// Validate entries and collapse duplicate tags (first occurrence wins).
pub fn normalize(images: Vec<ImageSpec>) -> Result<Vec<ImageSpec>, ConfigError> {
    images
        .into_iter()
        .enumerate()
        .map(|(index, mut image)| {
            image.name = image.name.trim().to_string();
            validate_name(index, &image)?;
            image.versions = dedup_tags(index, &image.name, image.versions)?;
            image.one_time_versions = dedup_tags(index, &image.name, image.one_time_versions)?;
            Ok(image)
        })
        .collect()
}

fn validate_name(index: usize, image: &ImageSpec) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        index,
        name: image.name.clone(),
        reason: reason.to_string(),
    };

    if image.name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if image.name.contains(char::is_whitespace) {
        return Err(invalid("name contains whitespace"));
    }
    if image.name.contains('@') {
        return Err(invalid("name must not pin a digest"));
    }
    // A ':' in the last segment is a tag; earlier ones are host ports.
    let last_segment = image.name.rsplit('/').next().unwrap_or_default();
    if last_segment.contains(':') {
        return Err(invalid("name must not carry a tag; list tags under `versions`"));
    }
    if image.name.starts_with('/') || image.name.ends_with('/') || image.name.contains("//") {
        return Err(invalid("name has an empty path segment"));
    }
    Ok(())
}

fn dedup_tags(index: usize, name: &str, tags: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if tag.is_empty()
            || tag.contains(char::is_whitespace)
            || tag.contains(|c: char| c == '/' || c == ':')
        {
            return Err(ConfigError::Invalid {
                index,
                name: name.to_string(),
                reason: format!("invalid tag '{tag}'"),
            });
        }
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}
