//! The part of [`CpalOutput`](crate::CpalOutput) that runs inside the audio callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use basedrop::{Handle, Shared};
use cpal::FromSample;
use stem_transport::AudioArc;

use crate::VoiceSpec;
use crate::output::Voice;

/// Voices the callback mixes at once; extra voices are dropped as finished.
const MAX_VOICES: usize = 32;

/// Control block shared between a [`MixerVoice`] and the audio callback.
struct VoiceControl {
    gain: AtomicU32,
    stopped: AtomicBool,
    finished: AtomicBool,
}

struct VoiceSource {
    audio: AudioArc,
    control: Arc<VoiceControl>,
}

/// Every voice of one run with its start frame. Sent as a single command so the whole
/// batch joins the mix on the same callback.
pub(crate) struct VoiceBatch {
    voices: Vec<(Shared<VoiceSource>, usize)>,
}

pub(crate) enum MixerCommand {
    Start(Shared<VoiceBatch>),
}

struct ActiveVoice {
    source: Shared<VoiceSource>,
    cursor: usize,
}

/// Build a batch on the UI thread. Voice handles come back in the order of `voices`.
pub(crate) fn batch(
    handle: &Handle,
    voices: &[VoiceSpec<'_>],
    offset: f64,
) -> (Shared<VoiceBatch>, Vec<Box<dyn Voice>>) {
    let offset = offset.max(0.0);
    let mut sources = Vec::with_capacity(voices.len());
    let mut handles: Vec<Box<dyn Voice>> = Vec::with_capacity(voices.len());

    for voice in voices {
        let control = Arc::new(VoiceControl {
            gain: AtomicU32::new(voice.gain.to_bits()),
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });
        let source = Shared::new(
            handle,
            VoiceSource {
                audio: voice.audio.clone(),
                control: control.clone(),
            },
        );
        let cursor = (offset * voice.audio.sample_rate() as f64).round() as usize;
        sources.push((source, cursor));
        handles.push(Box::new(MixerVoice { control }));
    }

    (Shared::new(handle, VoiceBatch { voices: sources }), handles)
}

/// Mixes every live voice into the device buffer.
///
/// Never allocates or frees: the voice list is preallocated and released sources go back
/// to the basedrop collector on the UI thread.
pub(crate) struct Mixer {
    commands: rtrb::Consumer<MixerCommand>,
    voices: Vec<ActiveVoice>,
    mixed: Vec<f32>,
}

impl Mixer {
    pub(crate) fn new(commands: rtrb::Consumer<MixerCommand>, output_channels: usize) -> Self {
        Self {
            commands,
            voices: Vec::with_capacity(MAX_VOICES),
            mixed: vec![0.0; output_channels.max(1)],
        }
    }

    /// Fill one interleaved device buffer.
    pub(crate) fn render<T: FromSample<f32>>(&mut self, data: &mut [T]) {
        self.take_commands();

        let output_channels = self.mixed.len();
        for frame in data.chunks_mut(output_channels) {
            self.mix_frame();
            for (sample, value) in frame.iter_mut().zip(self.mixed.iter()) {
                *sample = T::from_sample_(*value);
            }
        }

        self.retire();
    }

    fn take_commands(&mut self) {
        while let Ok(MixerCommand::Start(batch)) = self.commands.pop() {
            for (source, cursor) in &batch.voices {
                if self.voices.len() < MAX_VOICES {
                    self.voices.push(ActiveVoice {
                        source: source.clone(),
                        cursor: *cursor,
                    });
                } else {
                    source.control.finished.store(true, Ordering::Release);
                }
            }
        }
    }

    fn mix_frame(&mut self) {
        self.mixed.fill(0.0);

        for voice in self.voices.iter_mut() {
            let source = &*voice.source;
            if source.control.stopped.load(Ordering::Relaxed) {
                continue;
            }
            let audio = &source.audio;
            if voice.cursor >= audio.frames() {
                continue;
            }

            let gain = f32::from_bits(source.control.gain.load(Ordering::Relaxed));
            let channels = audio.channels() as usize;
            let base = voice.cursor * channels;
            for (ch, mix_sample) in self.mixed.iter_mut().enumerate() {
                *mix_sample += audio.samples()[base + ch % channels] * gain;
            }
            voice.cursor += 1;
        }
    }

    /// Drop stopped voices and flag the ones that ran off the end of their buffer.
    fn retire(&mut self) {
        self.voices.retain(|voice| {
            let control = &voice.source.control;
            if voice.cursor >= voice.source.audio.frames() {
                control.finished.store(true, Ordering::Release);
                return false;
            }
            !control.stopped.load(Ordering::Relaxed)
        });
    }
}

struct MixerVoice {
    control: Arc<VoiceControl>,
}

impl Voice for MixerVoice {
    fn set_gain(&mut self, gain: f32) {
        self.control.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn stop(&mut self) {
        self.control.stopped.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.control.finished.load(Ordering::Acquire)
    }
}

impl Drop for MixerVoice {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Collector;
    use stem_transport::StemId;

    const RATE: u32 = 100;

    fn constant(value: f32, frames: usize) -> AudioArc {
        AudioArc::new(vec![value; frames], RATE, 1)
    }

    fn mixer() -> (Mixer, rtrb::Producer<MixerCommand>, Collector) {
        let (tx, rx) = rtrb::RingBuffer::new(8);
        (Mixer::new(rx, 2), tx, Collector::new())
    }

    fn send(
        tx: &mut rtrb::Producer<MixerCommand>,
        collector: &Collector,
        voices: &[VoiceSpec<'_>],
        offset: f64,
    ) -> Vec<Box<dyn Voice>> {
        let (batch, handles) = batch(&collector.handle(), voices, offset);
        assert!(tx.push(MixerCommand::Start(batch)).is_ok());
        handles
    }

    #[test]
    fn test_batch_starts_on_the_same_frame() {
        let (mut mixer, mut tx, collector) = mixer();
        let vocals = constant(0.5, 100);
        let bass = constant(0.25, 100);

        let _handles = send(
            &mut tx,
            &collector,
            &[
                VoiceSpec { id: StemId::Vocals, audio: &vocals, gain: 1.0 },
                VoiceSpec { id: StemId::Bass, audio: &bass, gain: 1.0 },
            ],
            0.0,
        );

        let mut out = vec![0.0f32; 8];
        mixer.render(&mut out);

        assert_eq!(out, vec![0.75; 8]);
        assert_eq!(mixer.voices.len(), 2);
        assert!(mixer.voices.iter().all(|voice| voice.cursor == 4));
    }

    #[test]
    fn test_offset_sets_start_frame_and_past_end_finishes() {
        let (mut mixer, mut tx, collector) = mixer();
        let short = constant(1.0, 50);
        let long = constant(1.0, 200);

        let handles = send(
            &mut tx,
            &collector,
            &[
                VoiceSpec { id: StemId::Bass, audio: &short, gain: 1.0 },
                VoiceSpec { id: StemId::Drums, audio: &long, gain: 1.0 },
            ],
            1.0,
        );

        let mut out = vec![0.0f32; 4];
        mixer.render(&mut out);

        assert_eq!(out, vec![1.0; 4]);
        assert!(handles[0].is_finished());
        assert!(!handles[1].is_finished());
        assert_eq!(mixer.voices.len(), 1);
        assert_eq!(mixer.voices[0].cursor, 102);
    }

    #[test]
    fn test_voice_finishes_at_end_of_buffer() {
        let (mut mixer, mut tx, collector) = mixer();
        let audio = constant(1.0, 3);
        let handles = send(
            &mut tx,
            &collector,
            &[VoiceSpec { id: StemId::Piano, audio: &audio, gain: 1.0 }],
            0.0,
        );

        let mut out = vec![0.0f32; 10];
        mixer.render(&mut out);

        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(handles[0].is_finished());
        assert!(mixer.voices.is_empty());
    }

    #[test]
    fn test_gain_and_stop_reach_the_callback() {
        let (mut mixer, mut tx, collector) = mixer();
        let audio = constant(1.0, 100);
        let mut handles = send(
            &mut tx,
            &collector,
            &[VoiceSpec { id: StemId::Guitar, audio: &audio, gain: 1.0 }],
            0.0,
        );

        handles[0].set_gain(0.5);
        let mut out = vec![0.0f32; 2];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.5, 0.5]);

        handles[0].stop();
        mixer.render(&mut out);
        assert_eq!(out, vec![0.0, 0.0]);
        assert!(mixer.voices.is_empty());
        assert!(!handles[0].is_finished());
    }

    #[test]
    fn test_dropping_a_handle_silences_its_voice() {
        let (mut mixer, mut tx, collector) = mixer();
        let audio = constant(1.0, 100);
        let handles = send(
            &mut tx,
            &collector,
            &[VoiceSpec { id: StemId::Other, audio: &audio, gain: 1.0 }],
            0.0,
        );
        drop(handles);

        let mut out = vec![0.0f32; 2];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.0, 0.0]);
        assert!(mixer.voices.is_empty());
    }

    #[test]
    fn test_voices_over_capacity_are_finished() {
        let (mut mixer, mut tx, collector) = mixer();
        let audio = constant(0.0, 100);
        let voices: Vec<_> = (0..MAX_VOICES + 2)
            .map(|_| VoiceSpec { id: StemId::Vocals, audio: &audio, gain: 1.0 })
            .collect();
        let handles = send(&mut tx, &collector, &voices, 0.0);

        let mut out = vec![0.0f32; 2];
        mixer.render(&mut out);

        assert_eq!(mixer.voices.len(), MAX_VOICES);
        assert!(!handles[0].is_finished());
        assert!(handles[MAX_VOICES].is_finished());
        assert!(handles[MAX_VOICES + 1].is_finished());
    }
}
