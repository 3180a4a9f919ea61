use basedrop::{Collector, Handle};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

use crate::VoiceSpec;
use crate::mixer::{self, Mixer, MixerCommand};
use crate::output::{AudioOutput, Voice};

const COMMAND_CAPACITY: usize = 64;

/// Default output device, mixing every live voice into one stream.
pub struct CpalOutput {
    commands: rtrb::Producer<MixerCommand>,
    collector: Collector,
    handle: Handle,
    sample_rate: u32,
    _stream: cpal::Stream,
}

impl CpalOutput {
    pub fn open_default() -> anyhow::Result<Self> {
        let collector = Collector::new();
        let handle = collector.handle();

        let (command_tx, command_rx) = rtrb::RingBuffer::<MixerCommand>::new(COMMAND_CAPACITY);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), command_rx)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), command_rx)?,
            sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
        };

        stream.play()?;
        log::info!("audio output running at {sample_rate} Hz");

        Ok(Self {
            commands: command_tx,
            collector,
            handle,
            sample_rate,
            _stream: stream,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    fn start_voices(
        &mut self,
        voices: &[VoiceSpec<'_>],
        offset: f64,
    ) -> anyhow::Result<Vec<Box<dyn Voice>>> {
        for voice in voices {
            if voice.audio.sample_rate() != self.sample_rate {
                log::warn!(
                    "{} at {} Hz on a {} Hz output will play off-speed",
                    voice.id,
                    voice.audio.sample_rate(),
                    self.sample_rate
                );
            }
        }

        let (batch, handles) = mixer::batch(&self.handle, voices, offset);
        self.commands
            .push(MixerCommand::Start(batch))
            .map_err(|_| anyhow::anyhow!("mixer command queue is full"))?;

        Ok(handles)
    }

    fn collect_garbage(&mut self) {
        self.collector.collect();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    command_rx: rtrb::Consumer<MixerCommand>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut mixer = Mixer::new(command_rx, config.channels as usize);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| mixer.render(data),
        |err| log::error!("stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
