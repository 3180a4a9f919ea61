mod clock;
mod envelope;
mod stem;

use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use envelope::{DEFAULT_ENVELOPE_LEN, envelope, summarize};
pub use stem::{StemId, UnknownStem};

/// Decoded stem audio: shared, immutable, interleaved f32 samples.
///
/// Cloning only bumps the reference count, so the same buffer can sit in the
/// state store, in the transport's handle table and on the audio thread at once.
///
/// ```text
/// AudioArc
/// ├─ samples: Arc<[f32]> ────> Heap: [L, R, L, R, ...]
/// ├─ sample_rate: u32
/// └─ channels: u16
/// ```
///
/// # Examples
///
/// ```
/// use stem_transport::AudioArc;
///
/// let audio = AudioArc::new(vec![0.0, 0.5, 1.0, 0.5], 44100, 2);
/// let shared = audio.clone();
/// assert_eq!(shared.frames(), 2);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioArc {
    /// Wrap owned interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self::from_arc(Arc::from(samples), sample_rate, channels)
    }

    /// Wrap samples that already live in an `Arc`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`AudioArc::new`].
    pub fn from_arc(samples: Arc<[f32]>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// `seconds` of silence.
    pub fn silence(seconds: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = (seconds * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel.
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Iterate one channel of the interleaved data.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is >= `self.channels()`.
    pub fn channel(&self, channel: usize) -> impl ExactSizeIterator<Item = f32> + '_ {
        assert!(
            channel < self.channels as usize,
            "channel index out of bounds"
        );
        let channels = self.channels as usize;
        (0..self.frames()).map(move |frame| self.samples[frame * channels + channel])
    }

    /// Resample to `target_sample_rate`. Returns a cheap clone when the rate already matches.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }
        resample_audio_arc(self, target_sample_rate)
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

/// Sinc-resample `audio` to `target_sample_rate`.
///
/// Stems are resampled once, right after decoding, so that the output device can play
/// them frame for frame.
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }
    if audio.sample_rate == 0 || target_sample_rate == 0 {
        anyhow::bail!(
            "cannot resample from {} Hz to {} Hz",
            audio.sample_rate,
            target_sample_rate
        );
    }

    let channels = audio.channels as usize;
    let input_frames = audio.frames();
    if input_frames == 0 {
        return Ok(AudioArc::new(Vec::new(), target_sample_rate, audio.channels));
    }

    let resample_ratio = target_sample_rate as f64 / audio.sample_rate as f64;
    let output_frames = (input_frames as f64 * resample_ratio).ceil() as usize;

    // rubato wants one Vec per channel
    let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
    for frame in audio.samples().chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            input_channels[ch].push(*sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;
    let output_channels = resampler.process(&input_channels, None)?;

    let produced = output_channels.first().map_or(0, |c| c.len());
    let mut output_samples = Vec::with_capacity(output_frames.max(produced) * channels);
    for frame_idx in 0..produced {
        for channel in &output_channels {
            output_samples.push(channel[frame_idx]);
        }
    }

    Ok(AudioArc::new(
        output_samples,
        target_sample_rate,
        audio.channels,
    ))
}
