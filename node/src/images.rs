//! Image catalog served at `/api/image`.
//!
//! Each image is a vote option; its `id` is the `target_id` a voter
//! selects. The catalog is a JSON array read once at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One vote option as the front end renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub id: u64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    images: Vec<ImageDescriptor>,
}

impl ImageCatalog {
    pub fn new(images: Vec<ImageDescriptor>) -> Self {
        Self { images }
    }

    /// Reads the catalog at `path`, or an empty catalog when no path is
    /// configured. A configured file that is missing or malformed is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read image catalog {}", path.display()))?;
        let images: Vec<ImageDescriptor> = serde_json::from_str(&raw)
            .with_context(|| format!("image catalog {} is not valid JSON", path.display()))?;
        tracing::info!(path = %path.display(), images = images.len(), "image catalog loaded");
        Ok(Self { images })
    }

    pub fn images(&self) -> &[ImageDescriptor] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_means_empty_catalog() {
        assert!(ImageCatalog::load(None).unwrap().is_empty());
    }

    #[test]
    fn loads_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "url": "https://example.org/1.png", "title": "Harbor"},
                {"id": 2, "url": "https://example.org/2.png"}]"#,
        )
        .unwrap();

        let catalog = ImageCatalog::load(Some(&path)).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.images()[0].title.as_deref(), Some("Harbor"));
        assert_eq!(catalog.images()[1].title, None);
    }

    #[test]
    fn missing_or_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageCatalog::load(Some(&dir.path().join("absent.json"))).is_err());

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ImageCatalog::load(Some(&path)).is_err());
    }
}
