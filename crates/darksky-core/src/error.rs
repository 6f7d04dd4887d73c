use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the dark sky engine.
///
/// "No site within radius" is not an error: searches return `Ok(None)`.
#[derive(Debug, Error)]
pub enum DarkSkyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode raster image: {0}")]
    RasterDecode(#[from] image::ImageError),

    #[error("invalid raster dimensions {width}x{height} for {len} samples")]
    RasterDimensions { width: u32, height: u32, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("search worker is unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("search worker terminated before answering request {0}")]
    WorkerTerminated(u64),

    #[error("search failed: {0}")]
    Search(String),
}

pub type Result<T> = std::result::Result<T, DarkSkyError>;
