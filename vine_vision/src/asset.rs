//! Uploaded image assets and MIME admission.

use crate::core_modules::raster::raster::Raster;
use crate::error::{Result, VineError};
use std::path::Path;
use std::sync::Arc;

/// MIME types admitted when nothing else is configured.
pub const DEFAULT_ACCEPTED_MIME: &[&str] = &["image/jpeg"];

/// An opaque image submitted for classification. Owned by the orchestrator for
/// the duration of one run; cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Arc<[u8]>,
    name: String,
    mime: String,
}

impl ImageAsset {
    /// Admits an in-memory upload if its MIME type is an image type on the accepted list.
    pub fn new(bytes: impl Into<Arc<[u8]>>, name: impl Into<String>, mime: impl Into<String>, accepted: &[String]) -> Result<Self> {
        let mime = mime.into();
        if !is_admissible(&mime, accepted) {
            return Err(VineError::UnsupportedMime(mime));
        }
        Ok(Self {
            bytes: bytes.into(),
            name: name.into(),
            mime,
        })
    }

    /// Reads a file from disk and sniffs its MIME type from the content.
    pub fn from_path(path: impl AsRef<Path>, accepted: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mime = image::guess_format(&bytes)
            .map(|format| format.to_mime_type().to_string())
            .map_err(|_| VineError::UnsupportedMime(format!("unrecognized content in {}", path.display())))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Self::new(bytes, name, mime, accepted)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Decodes the upload into a raster for the simulation.
    pub fn decode(&self) -> Result<Raster> {
        Ok(Raster::decode(&self.bytes)?)
    }
}

fn is_admissible(mime: &str, accepted: &[String]) -> bool {
    mime.starts_with("image/") && accepted.iter().any(|allowed| allowed.eq_ignore_ascii_case(mime))
}

/// The default accepted list as owned strings.
pub fn default_accepted_mime() -> Vec<String> {
    DEFAULT_ACCEPTED_MIME.iter().map(|mime| mime.to_string()).collect()
}
