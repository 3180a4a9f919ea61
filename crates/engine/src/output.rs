use crate::VoiceSpec;

/// A single playing stem: one buffer, one gain control.
///
/// Voices are never restarted; seeking drops them and starts new ones. Dropping a voice
/// stops it.
pub trait Voice {
    /// Linear gain, 0.0 = silent, 1.0 = unity. Applies to the running voice.
    fn set_gain(&mut self, gain: f32);
    fn stop(&mut self);
    /// True once the voice has played past the end of its buffer.
    fn is_finished(&self) -> bool;
}

/// Where voices are played.
pub trait AudioOutput {
    /// Rate the output consumes, if it has one. Stems should be resampled to it before
    /// being handed to [`AudioOutput::start_voices`].
    fn sample_rate(&self) -> Option<u32>;

    /// Start every voice of a run from `offset` seconds, all on the same output frame.
    ///
    /// Either the whole batch starts or none of it does. Handles come back in the order
    /// of `voices`.
    fn start_voices(
        &mut self,
        voices: &[VoiceSpec<'_>],
        offset: f64,
    ) -> anyhow::Result<Vec<Box<dyn Voice>>>;

    /// Reclaim memory released by the audio thread.
    fn collect_garbage(&mut self) {}
}
