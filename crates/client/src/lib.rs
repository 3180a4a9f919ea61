//! Client side of the separation backend.
//!
//! [`SeparationApi`] is the surface the player consumes: submit a file, poll the job,
//! download stems, request a server-side mix. [`HttpApi`] speaks it over HTTP.

pub mod content_disposition;
mod error;
mod http;
mod types;

use std::collections::BTreeMap;
use std::future::Future;

use stem_transport::StemId;

pub use error::{ApiError, Result};
pub use http::HttpApi;
pub use types::{AudioInfo, Health, JobId, JobState, MixedAudio, StatusResponse, UploadResponse};

/// Operations offered by the separation backend.
pub trait SeparationApi: Send + Sync {
    /// `POST /upload`: submit `bytes` as a file named `filename`.
    fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<UploadResponse>> + Send;

    /// `GET /status/{job_id}`.
    fn status(&self, job_id: &JobId) -> impl Future<Output = Result<StatusResponse>> + Send;

    /// `GET /download/{job_id}/{stem}`: raw audio bytes of one stem.
    fn download(&self, job_id: &JobId, stem: StemId)
    -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// `POST /mix/{job_id}`: render the stems at `volumes` (linear, 0.0-1.0).
    fn mix(
        &self,
        job_id: &JobId,
        volumes: &BTreeMap<StemId, f32>,
    ) -> impl Future<Output = Result<MixedAudio>> + Send;

    /// `GET /health`.
    fn health(&self) -> impl Future<Output = Result<Health>> + Send;

    /// `DELETE /clear/{job_id}`: drop the job's stems on the server.
    fn clear(&self, job_id: &JobId) -> impl Future<Output = Result<()>> + Send;
}
