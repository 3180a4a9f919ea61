//! The background half of a session: submit a file, follow the job, load its stems.
//!
//! The loader never touches the store directly. It reports through a channel of
//! [`Action`]s that the UI thread drains, so all state changes stay on one thread.

use std::collections::HashSet;
use std::time::Duration;

use stem_client::{JobId, JobState, SeparationApi, StatusResponse};
use stem_transport::{AudioArc, StemId, envelope};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::progress::ProgressPolicy;
use crate::store::{Action, ProcessingStatus, SourceFile, TrackUpdate};

/// Extensions the backend accepts for upload.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "m4a", "ogg"];

/// Stems come back from the backend as WAV.
const STEM_FORMAT_HINT: &str = "wav";

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub stems: Vec<StemId>,
    pub poll_interval: Duration,
    pub envelope_len: usize,
    /// Resample every stem to this rate once it is decoded.
    pub sample_rate: Option<u32>,
    pub progress: ProgressPolicy,
}

/// A spawned loader and the receiving end of its actions.
///
/// Dropping it aborts the task; anything still queued is discarded with the channel.
pub struct LoadTask {
    pub(crate) actions: tokio::sync::mpsc::UnboundedReceiver<Action>,
    pub(crate) join: JoinHandle<()>,
}

impl LoadTask {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for LoadTask {
    fn drop(&mut self) {
        self.join.abort();
    }
}

pub fn validate_extension(file: &SourceFile) -> Result<(), JobError> {
    let extension = file.extension().unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Ok(());
    }
    Err(JobError::UnsupportedFormat {
        extension,
        allowed: ALLOWED_EXTENSIONS.join(", "),
    })
}

/// Run one job to the end, reporting through `tx`.
///
/// Any failure ends in a single `ProcessingStatus::Error`; stems loaded before the
/// failure stay in the store, and `duration` always covers the stems loaded so far.
pub async fn run_job<A: SeparationApi>(
    api: &A,
    file: &SourceFile,
    options: &LoadOptions,
    tx: &UnboundedSender<Action>,
) {
    match load(api, file, options, tx).await {
        Ok(job_id) => log::info!("job {job_id} ready"),
        Err(e) => {
            log::error!("{}: {e}", file.name);
            emit(
                tx,
                Action::SetProcessingStatus(ProcessingStatus::Error {
                    message: e.to_string(),
                }),
            );
        }
    }
}

async fn load<A: SeparationApi>(
    api: &A,
    file: &SourceFile,
    options: &LoadOptions,
    tx: &UnboundedSender<Action>,
) -> Result<JobId, JobError> {
    validate_extension(file)?;

    let bytes = tokio::fs::read(file.path())
        .await
        .map_err(|source| JobError::Read {
            path: file.path.clone(),
            source,
        })?;

    let upload = api.upload(&file.name, bytes).await.map_err(JobError::Upload)?;
    let job_id = upload.job_id;
    log::info!("submitted {} as job {job_id}", file.name);

    let status = poll_until_done(api, &job_id, options, tx).await?;
    if let Some(info) = status.audio_info.clone() {
        emit(tx, Action::SetAudioInfo(info));
    }

    let stems = stems_to_load(&options.stems, &status);
    let policy = &options.progress;
    report(tx, &job_id, policy.loading(0, stems.len()), &policy.loading_message);

    let mut duration: f64 = 0.0;
    for (loaded, stem) in stems.iter().copied().enumerate() {
        let bytes = api
            .download(&job_id, stem)
            .await
            .map_err(|source| JobError::Fetch { stem, source })?;

        let (audio, envelope) = prepare(stem, bytes, options).await?;
        log::debug!("loaded {stem}: {audio:?}");
        duration = duration.max(audio.duration_secs());
        emit(
            tx,
            Action::UpdateTrack {
                id: stem,
                update: TrackUpdate::loaded(audio, envelope),
            },
        );
        emit(tx, Action::SetDuration(duration));
        report(tx, &job_id, policy.loading(loaded + 1, stems.len()), &policy.loading_message);
    }

    emit(
        tx,
        Action::SetProcessingStatus(ProcessingStatus::Completed {
            job_id: job_id.clone(),
        }),
    );
    Ok(job_id)
}

async fn poll_until_done<A: SeparationApi>(
    api: &A,
    job_id: &JobId,
    options: &LoadOptions,
    tx: &UnboundedSender<Action>,
) -> Result<StatusResponse, JobError> {
    let policy = &options.progress;
    loop {
        let status = api.status(job_id).await.map_err(JobError::Poll)?;
        log::debug!("job {job_id}: {:?} {}%", status.status, status.progress);

        match status.status {
            JobState::Completed => return Ok(status),
            JobState::Error => {
                let message = status
                    .error
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(JobError::JobFailed(message));
            }
            JobState::Processing => {
                let progress = policy.processing(status.progress);
                report(tx, job_id, progress, policy.message_for(progress));
            }
        }

        if tx.is_closed() {
            // nobody is listening anymore; leave the job to the server
            return Err(JobError::JobFailed("cancelled".to_string()));
        }
        tokio::time::sleep(options.poll_interval).await;
    }
}

/// The session's stems, narrowed to what the backend says it produced.
fn stems_to_load(stems: &[StemId], status: &StatusResponse) -> Vec<StemId> {
    let Some(available) = &status.tracks_available else {
        return stems.to_vec();
    };
    let available: HashSet<&str> = available.iter().map(String::as_str).collect();
    stems
        .iter()
        .copied()
        .filter(|stem| {
            let present = available.contains(stem.as_str());
            if !present {
                log::info!("backend produced no {stem} stem");
            }
            present
        })
        .collect()
}

/// Decode, resample and summarize one stem off the async workers.
async fn prepare(
    stem: StemId,
    bytes: Vec<u8>,
    options: &LoadOptions,
) -> Result<(AudioArc, Vec<f32>), JobError> {
    let sample_rate = options.sample_rate;
    let envelope_len = options.envelope_len;

    let prepared = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let mut audio = stem_decode::decode_bytes(bytes, Some(STEM_FORMAT_HINT))?;
        if let Some(rate) = sample_rate {
            audio = audio.resample(rate)?;
        }
        let envelope = envelope(&audio, envelope_len);
        Ok((audio, envelope))
    })
    .await
    .map_err(|e| JobError::Decode {
        stem,
        source: e.into(),
    })?;

    prepared.map_err(|source| JobError::Decode { stem, source })
}

fn report(tx: &UnboundedSender<Action>, job_id: &JobId, progress: u8, message: &str) {
    emit(
        tx,
        Action::SetProcessingStatus(ProcessingStatus::Processing {
            job_id: job_id.clone(),
            progress,
            message: message.to_string(),
        }),
    );
}

fn emit(tx: &UnboundedSender<Action>, action: Action) {
    // a closed channel means the session moved on; the task is about to be aborted
    let _ = tx.send(action);
}
