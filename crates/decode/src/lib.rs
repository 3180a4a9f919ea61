use std::io::Cursor;

use stem_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode a stem downloaded from the separation backend.
///
/// `extension` is only a probing hint; the container is sniffed from the bytes.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> anyhow::Result<AudioArc> {
    decode_source(Box::new(Cursor::new(bytes)), extension)
}

fn decode_source(source: Box<dyn MediaSource>, extension: Option<&str>) -> anyhow::Result<AudioArc> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track"))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow::anyhow!("stream has no sample rate"))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0) as u16;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("skipping undecodable packet: {msg}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 || samples.is_empty() {
        anyhow::bail!("no audio frames decoded");
    }

    // a truncated final packet can leave a partial frame behind
    let whole = samples.len() - samples.len() % channels as usize;
    samples.truncate(whole);

    Ok(AudioArc::new(samples, sample_rate, channels))
}
