use std::path::PathBuf;

use stem_client::ApiError;
use stem_transport::StemId;

/// Why a separation job stopped before its stems were loaded.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unsupported file type '{extension}'. Use one of: {allowed}")]
    UnsupportedFormat { extension: String, allowed: String },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Upload failed: {0}")]
    Upload(#[source] ApiError),

    #[error("Status check failed: {0}")]
    Poll(#[source] ApiError),

    #[error("Separation failed: {0}")]
    JobFailed(String),

    #[error("Failed to fetch {stem} stem: {source}")]
    Fetch { stem: StemId, source: ApiError },

    #[error("Failed to decode {stem} stem: {source}")]
    Decode { stem: StemId, source: anyhow::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Nothing to export: no completed job with loaded stems")]
    NotReady,

    #[error("Mix request failed: {0}")]
    Request(#[from] ApiError),

    #[error("Failed to save mix to '{path}': {source}")]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A store action that was refused; the state is left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("volume {0} is outside 0-100")]
    VolumeOutOfRange(i64),

    #[error("no {0} track in this session")]
    UnknownTrack(StemId),

    #[error("invalid time value {0}")]
    InvalidTime(f64),
}
