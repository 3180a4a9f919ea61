mod cpal_output;
mod mixer;
mod output;
mod virtual_output;

use std::collections::HashMap;
use std::sync::Arc;

use stem_transport::{AudioArc, Clock, StemId};

pub use cpal_output::CpalOutput;
pub use output::{AudioOutput, Voice};
pub use virtual_output::{VirtualOutput, VoiceLog, VoiceRecord};

/// One stem to start: its buffer and the gain to start it at.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSpec<'a> {
    pub id: StemId,
    pub audio: &'a AudioArc,
    pub gain: f32,
}

/// Convert a 0-100 volume to a linear gain.
pub fn volume_to_gain(volume: u8) -> f32 {
    volume.min(100) as f32 / 100.0
}

struct PlaybackHandle {
    voice: Box<dyn Voice>,
    gain: f32,
}

/// Keeps every loaded stem on one timeline.
///
/// All voices of a run are started against a single origin (`origin = now - offset`), so
/// the position of the whole ensemble is `now - origin` and no stem keeps its own clock.
/// The handle table is rebuilt wholesale on every start and dropped on every stop.
pub struct TransportEngine {
    output: Box<dyn AudioOutput>,
    clock: Arc<dyn Clock>,
    handles: HashMap<StemId, PlaybackHandle>,
    origin: Option<f64>,
}

impl TransportEngine {
    pub fn new(output: Box<dyn AudioOutput>, clock: Arc<dyn Clock>) -> Self {
        Self {
            output,
            clock,
            handles: HashMap::new(),
            origin: None,
        }
    }

    pub fn output_sample_rate(&self) -> Option<u32> {
        self.output.sample_rate()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Stop whatever is running and start `voices` at `offset` seconds.
    ///
    /// The voices go to the output as one batch. If the output refuses it, nothing
    /// starts and the run ends on the next completion check.
    /// Returns the number of voices started.
    pub fn start<'a>(&mut self, voices: impl IntoIterator<Item = VoiceSpec<'a>>, offset: f64) -> usize {
        self.stop();

        let offset = offset.max(0.0);
        let voices: Vec<VoiceSpec<'a>> = voices.into_iter().collect();
        match self.output.start_voices(&voices, offset) {
            Ok(started) => {
                for (spec, voice) in voices.iter().zip(started) {
                    self.handles.insert(
                        spec.id,
                        PlaybackHandle {
                            voice,
                            gain: spec.gain,
                        },
                    );
                }
            }
            Err(e) => log::warn!("could not start {} voices: {e}", voices.len()),
        }

        self.origin = Some(self.clock.now() - offset);
        log::debug!("started {} voices at {offset:.3}s", self.handles.len());
        self.handles.len()
    }

    /// Stop and drop every voice. Returns the position reached, if the engine was running.
    pub fn stop(&mut self) -> Option<f64> {
        let position = self.elapsed();

        for handle in self.handles.values_mut() {
            handle.voice.stop();
        }
        self.handles.clear();
        self.origin = None;
        self.output.collect_garbage();

        position
    }

    /// Position on the shared timeline, or `None` when stopped.
    pub fn elapsed(&self) -> Option<f64> {
        self.origin.map(|origin| (self.clock.now() - origin).max(0.0))
    }

    pub fn is_running(&self) -> bool {
        self.origin.is_some()
    }

    /// Change the gain of a running stem. No-op when the stem is not playing.
    pub fn set_gain(&mut self, id: StemId, gain: f32) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.gain = gain;
            handle.voice.set_gain(gain);
        }
    }

    pub fn gain(&self, id: StemId) -> Option<f32> {
        self.handles.get(&id).map(|handle| handle.gain)
    }

    pub fn voice_count(&self) -> usize {
        self.handles.len()
    }

    pub fn is_finished(&self, id: StemId) -> Option<bool> {
        self.handles.get(&id).map(|handle| handle.voice.is_finished())
    }

    /// True when running and every voice has reached the end of its buffer.
    ///
    /// A run with no voices counts as finished, so it never plays forever.
    pub fn all_finished(&self) -> bool {
        self.is_running() && self.handles.values().all(|handle| handle.voice.is_finished())
    }
}

impl Drop for TransportEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
