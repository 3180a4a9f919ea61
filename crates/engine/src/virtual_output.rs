//! Headless output: voices "play" against a [`Clock`] without touching an audio device.

use std::sync::{Arc, Mutex, MutexGuard};

use stem_transport::Clock;

use crate::VoiceSpec;
use crate::output::{AudioOutput, Voice};

/// What a virtual voice was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRecord {
    pub duration: f64,
    pub offset: f64,
    pub gain: f32,
    pub started_at: f64,
    pub stopped: bool,
}

impl VoiceRecord {
    /// Position inside the buffer at instant `now`, in seconds.
    pub fn position(&self, now: f64) -> f64 {
        (self.offset + (now - self.started_at)).min(self.duration)
    }

    pub fn ends_at(&self) -> f64 {
        self.started_at + (self.duration - self.offset).max(0.0)
    }

    pub fn is_finished(&self, now: f64) -> bool {
        now >= self.ends_at()
    }
}

/// Shared view of every voice a [`VirtualOutput`] has started, oldest first.
#[derive(Debug, Clone, Default)]
pub struct VoiceLog(Arc<Mutex<Vec<VoiceRecord>>>);

impl VoiceLog {
    fn lock(&self) -> MutexGuard<'_, Vec<VoiceRecord>> {
        // a panicked test thread must not hide the records from the others
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<VoiceRecord> {
        self.lock().clone()
    }

    /// Voices that have not been stopped.
    pub fn live(&self) -> Vec<VoiceRecord> {
        self.lock().iter().filter(|r| !r.stopped).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, record: VoiceRecord) -> usize {
        let mut records = self.lock();
        records.push(record);
        records.len() - 1
    }

    fn update(&self, index: usize, f: impl FnOnce(&mut VoiceRecord)) {
        if let Some(record) = self.lock().get_mut(index) {
            f(record);
        }
    }

    fn get(&self, index: usize) -> Option<VoiceRecord> {
        self.lock().get(index).cloned()
    }
}

pub struct VirtualOutput {
    clock: Arc<dyn Clock>,
    sample_rate: Option<u32>,
    log: VoiceLog,
}

impl VirtualOutput {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sample_rate: None,
            log: VoiceLog::default(),
        }
    }

    /// Pretend to be a device running at `sample_rate`.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn log(&self) -> VoiceLog {
        self.log.clone()
    }
}

impl AudioOutput for VirtualOutput {
    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn start_voices(
        &mut self,
        voices: &[VoiceSpec<'_>],
        offset: f64,
    ) -> anyhow::Result<Vec<Box<dyn Voice>>> {
        let started_at = self.clock.now();
        let handles = voices
            .iter()
            .map(|voice| {
                let index = self.log.push(VoiceRecord {
                    duration: voice.audio.duration_secs(),
                    offset,
                    gain: voice.gain,
                    started_at,
                    stopped: false,
                });
                Box::new(VirtualVoice {
                    clock: self.clock.clone(),
                    log: self.log.clone(),
                    index,
                }) as Box<dyn Voice>
            })
            .collect();
        Ok(handles)
    }
}

struct VirtualVoice {
    clock: Arc<dyn Clock>,
    log: VoiceLog,
    index: usize,
}

impl Voice for VirtualVoice {
    fn set_gain(&mut self, gain: f32) {
        self.log.update(self.index, |r| r.gain = gain);
    }

    fn stop(&mut self) {
        self.log.update(self.index, |r| r.stopped = true);
    }

    fn is_finished(&self) -> bool {
        let now = self.clock.now();
        self.log
            .get(self.index)
            .is_none_or(|r| !r.stopped && r.is_finished(now))
    }
}

impl Drop for VirtualVoice {
    fn drop(&mut self) {
        self.stop();
    }
}
