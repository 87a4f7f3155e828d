//! Default-output playback through cpal.
//!
//! The device callback pops samples from a lock-free ring; the
//! application keeps the ring topped up by pumping an [`Engine`] into it
//! from a control thread. An underrun reads as silence, never a block.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Producer, RingBuffer};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::EngineError;

/// An open default-output stream fed from an engine.
pub struct OutputDevice {
    _stream: cpal::Stream,
    producer: Producer<f32>,
    channels: u32,
    sample_rate: u32,
}

impl OutputDevice {
    /// Opens the host's default output device with the given format and
    /// a ring of `capacity_frames` frames, and starts the stream.
    pub fn open_default(
        channels: u32,
        sample_rate: u32,
        capacity_frames: usize,
    ) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::DeviceFailed)?;
        let config = cpal::StreamConfig {
            channels: channels as cpal::ChannelCount,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, mut consumer) = RingBuffer::<f32>::new(capacity_frames * channels as usize);
        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in out.iter_mut() {
                        *sample = consumer.pop().unwrap_or(0.0);
                    }
                },
                |err| warn!(%err, "output stream error"),
                None,
            )
            .map_err(|err| {
                warn!(%err, "failed to build output stream");
                EngineError::DeviceFailed
            })?;
        stream.play().map_err(|err| {
            warn!(%err, "failed to start output stream");
            EngineError::DeviceFailed
        })?;

        info!(channels, sample_rate, "output device started");
        Ok(Self {
            _stream: stream,
            producer,
            channels,
            sample_rate,
        })
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames the ring can currently accept.
    pub fn writable_frames(&self) -> usize {
        self.producer.slots() / self.channels as usize
    }

    /// Pulls as many frames from the engine as the ring can accept and
    /// queues them for the device. `scratch` is reused between calls;
    /// returns the number of frames moved.
    pub fn pump(&mut self, engine: &mut Engine, scratch: &mut Vec<f32>) -> u64 {
        let frames = self.writable_frames();
        if frames == 0 {
            return 0;
        }
        let samples = frames * self.channels as usize;
        scratch.resize(samples, 0.0);
        let read = engine.read(&mut scratch[..samples]);
        for &sample in &scratch[..read as usize * self.channels as usize] {
            if self.producer.push(sample).is_err() {
                break;
            }
        }
        read
    }
}
