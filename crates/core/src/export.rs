use std::collections::BTreeMap;
use std::path::Path;

use stem_client::{JobId, MixedAudio, SeparationApi};
use stem_transport::StemId;

use crate::error::ExportError;
use crate::store::PlaybackState;

/// What the backend needs to render the current mix.
#[derive(Debug, Clone, PartialEq)]
pub struct MixRequest {
    pub job_id: JobId,
    /// Linear gain per stem, 0.0-1.0.
    pub volumes: BTreeMap<StemId, f32>,
}

impl MixRequest {
    /// Build a request from the current volumes, or refuse when there is nothing to mix.
    pub fn from_state(state: &PlaybackState) -> Result<Self, ExportError> {
        if !state.can_export() {
            return Err(ExportError::NotReady);
        }
        let job_id = state.job_id().cloned().ok_or(ExportError::NotReady)?;
        let volumes = state
            .tracks
            .iter()
            .map(|track| (track.id, stem_engine::volume_to_gain(track.volume)))
            .collect();

        Ok(Self { job_id, volumes })
    }
}

/// Ask the backend for a mixdown at the current volumes.
///
/// Nothing is sent when the session has no completed job with loaded stems.
pub async fn export_mix<A: SeparationApi>(
    api: &A,
    state: &PlaybackState,
) -> Result<MixedAudio, ExportError> {
    let request = MixRequest::from_state(state)?;
    request_mix(api, &request).await
}

pub async fn request_mix<A: SeparationApi>(
    api: &A,
    request: &MixRequest,
) -> Result<MixedAudio, ExportError> {
    log::info!("requesting mix for job {}", request.job_id);
    api.mix(&request.job_id, &request.volumes)
        .await
        .inspect_err(|e| log::error!("mix for job {} failed: {e}", request.job_id))
        .map_err(ExportError::from)
}

pub fn save_mix(path: &Path, mix: &MixedAudio) -> Result<(), ExportError> {
    std::fs::write(path, &mix.bytes).map_err(|source| {
        log::error!("could not write {}: {source}", path.display());
        ExportError::Save {
            path: path.to_path_buf(),
            source,
        }
    })
}
