/// Error taxonomy for model ingestion and viewport hosting
use std::time::Duration;

use thiserror::Error;

use crate::loader::MeshFormat;

/// Everything that can go wrong between a model URL and an attached model.
///
/// `Fetch` and `Parse` together form the fetch-or-parse failure class: both
/// are fatal to the load that produced them and are never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewerError {
    #[error("unsupported model format: {}", extension.as_deref().unwrap_or("<none>"))]
    UnsupportedFormat { extension: Option<String> },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to parse {format} data: {reason}")]
    Parse { format: MeshFormat, reason: String },

    #[error("degenerate geometry: largest bounding box dimension is {max_dimension}")]
    DegenerateGeometry { max_dimension: f32 },

    #[error("model is {bytes} bytes, limit is {limit}")]
    TooLarge { bytes: u64, limit: u64 },

    #[error("load of {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("mount target error: {0}")]
    Surface(String),

    #[error("screenshot encoding failed: {0}")]
    Encode(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl ViewerError {
    pub fn parse(format: MeshFormat, reason: impl Into<String>) -> Self {
        Self::Parse {
            format,
            reason: reason.into(),
        }
    }

    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<image::ImageError> for ViewerError {
    fn from(err: image::ImageError) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<std::io::Error> for ViewerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type ViewerResult<T> = Result<T, ViewerError>;
