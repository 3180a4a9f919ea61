//! Player state and the reducer that mutates it.
//!
//! Every change to [`PlaybackState`] goes through [`reduce`]: it validates the whole
//! action first and only then builds the next state, so a refused action leaves the
//! previous snapshot untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stem_client::{AudioInfo, JobId};
use stem_transport::{AudioArc, StemId};

use crate::error::ActionError;

pub const MAX_VOLUME: u8 = 100;

/// The audio file the user picked.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
}

impl SourceFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercased extension, if the name has one.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingStatus {
    Idle,
    Uploading,
    Processing {
        job_id: JobId,
        progress: u8,
        message: String,
    },
    Completed {
        job_id: JobId,
    },
    Error {
        message: String,
    },
}

impl ProcessingStatus {
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            ProcessingStatus::Processing { job_id, .. } | ProcessingStatus::Completed { job_id } => {
                Some(job_id)
            }
            _ => None,
        }
    }

    pub fn progress(&self) -> u8 {
        match self {
            ProcessingStatus::Processing { progress, .. } => *progress,
            ProcessingStatus::Completed { .. } => 100,
            _ => 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Uploading | ProcessingStatus::Processing { .. }
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ProcessingStatus::Completed { .. })
    }
}

/// One stem row. The set of tracks and their order is fixed when the store is created.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: StemId,
    pub display_name: String,
    pub color: [u8; 3],
    pub volume: u8,
    pub envelope: Arc<[f32]>,
    pub audio: Option<AudioArc>,
}

impl Track {
    pub fn new(id: StemId) -> Self {
        Self {
            id,
            display_name: id.label().to_string(),
            color: id.color(),
            volume: MAX_VOLUME,
            envelope: Arc::from(Vec::new()),
            audio: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.audio.is_some()
    }
}

/// Fields of a track to replace; `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct TrackUpdate {
    pub volume: Option<u8>,
    pub envelope: Option<Arc<[f32]>>,
    pub audio: Option<AudioArc>,
}

impl TrackUpdate {
    pub fn volume(volume: u8) -> Self {
        Self {
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn loaded(audio: AudioArc, envelope: impl Into<Arc<[f32]>>) -> Self {
        Self {
            audio: Some(audio),
            envelope: Some(envelope.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub file: Option<SourceFile>,
    pub status: ProcessingStatus,
    pub audio_info: Option<AudioInfo>,
    pub tracks: Vec<Track>,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub drag_position: Option<f64>,
    pub is_dragging: bool,
}

impl PlaybackState {
    /// A fresh state with one silent, unloaded track per stem, in stem order.
    pub fn new(stems: &[StemId]) -> Self {
        let mut ids = stems.to_vec();
        ids.sort();
        ids.dedup();

        Self {
            file: None,
            status: ProcessingStatus::Idle,
            audio_info: None,
            tracks: ids.into_iter().map(Track::new).collect(),
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            drag_position: None,
            is_dragging: false,
        }
    }

    pub fn track(&self, id: StemId) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn has_loaded_audio(&self) -> bool {
        self.tracks.iter().any(Track::is_loaded)
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.status.job_id()
    }

    /// Export is offered once the job has completed; stems are all loaded by then.
    pub fn can_export(&self) -> bool {
        self.status.is_completed()
    }

    /// Where the playhead is drawn: the drag position while dragging, else the current time.
    pub fn display_time(&self) -> f64 {
        match self.drag_position {
            Some(position) if self.is_dragging => position,
            _ => self.current_time,
        }
    }

    /// Playhead position as a fraction of the duration, 0 when nothing is loaded.
    pub fn playhead_fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (self.display_time() / self.duration).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    SetFile(SourceFile),
    SetProcessingStatus(ProcessingStatus),
    SetAudioInfo(AudioInfo),
    UpdateTrack { id: StemId, update: TrackUpdate },
    SetPlaying(bool),
    SetCurrentTime(f64),
    SetDuration(f64),
    SetDragPosition(Option<f64>),
    SetDragging(bool),
    Reset,
}

/// Compute the state after `action`, or refuse it.
///
/// `initial` is the snapshot [`Action::Reset`] returns to.
pub fn reduce(
    state: &PlaybackState,
    initial: &PlaybackState,
    action: Action,
) -> Result<PlaybackState, ActionError> {
    let mut next = state.clone();

    match action {
        Action::SetFile(file) => next.file = Some(file),
        Action::SetProcessingStatus(status) => next.status = status,
        Action::SetAudioInfo(info) => next.audio_info = Some(info),
        Action::UpdateTrack { id, update } => {
            if let Some(volume) = update.volume.filter(|volume| *volume > MAX_VOLUME) {
                return Err(ActionError::VolumeOutOfRange(volume.into()));
            }
            let track = next
                .tracks
                .iter_mut()
                .find(|track| track.id == id)
                .ok_or(ActionError::UnknownTrack(id))?;

            if let Some(volume) = update.volume {
                track.volume = volume;
            }
            if let Some(envelope) = update.envelope {
                track.envelope = envelope;
            }
            if let Some(audio) = update.audio {
                track.audio = Some(audio);
            }
        }
        Action::SetPlaying(playing) => next.is_playing = playing,
        Action::SetCurrentTime(time) => {
            let time = finite(time)?;
            next.current_time = time.clamp(0.0, next.duration);
        }
        Action::SetDuration(duration) => {
            let duration = finite(duration)?;
            if duration < 0.0 {
                return Err(ActionError::InvalidTime(duration));
            }
            next.duration = duration;
            next.current_time = next.current_time.min(duration);
        }
        Action::SetDragPosition(position) => {
            next.drag_position = match position {
                Some(position) => Some(finite(position)?.clamp(0.0, next.duration)),
                None => None,
            };
        }
        Action::SetDragging(dragging) => next.is_dragging = dragging,
        Action::Reset => next = initial.clone(),
    }

    Ok(next)
}

fn finite(value: f64) -> Result<f64, ActionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ActionError::InvalidTime(value))
    }
}

/// Holds the current [`PlaybackState`] and applies actions to it.
pub struct Store {
    state: PlaybackState,
    initial: PlaybackState,
}

impl Store {
    pub fn new(stems: &[StemId]) -> Self {
        let initial = PlaybackState::new(stems);
        Self {
            state: initial.clone(),
            initial,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn dispatch(&mut self, action: Action) -> Result<(), ActionError> {
        self.state = reduce(&self.state, &self.initial, action)?;
        Ok(())
    }
}
