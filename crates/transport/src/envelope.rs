use crate::AudioArc;

/// Default number of points in a waveform envelope.
pub const DEFAULT_ENVELOPE_LEN: usize = 1000;

/// Reduce a signal to `buckets` mean absolute amplitudes.
///
/// The signal is cut into `buckets` contiguous blocks of `len / buckets` samples; the
/// trailing remainder is dropped. A signal shorter than `buckets` (block size 0) yields an
/// empty envelope.
pub fn summarize(samples: impl ExactSizeIterator<Item = f32>, buckets: usize) -> Vec<f32> {
    let len = samples.len();
    if buckets == 0 || len < buckets {
        return Vec::new();
    }

    let block_size = len / buckets;
    let mut envelope = Vec::with_capacity(buckets);
    let mut sum = 0.0f64;
    let mut filled = 0usize;

    for sample in samples.take(block_size * buckets) {
        sum += sample.abs() as f64;
        filled += 1;
        if filled == block_size {
            envelope.push((sum / block_size as f64) as f32);
            sum = 0.0;
            filled = 0;
        }
    }

    envelope
}

/// Envelope of the first (left) channel of `audio`.
pub fn envelope(audio: &AudioArc, buckets: usize) -> Vec<f32> {
    if audio.is_empty() {
        return Vec::new();
    }
    summarize(audio.channel(0), buckets)
}
