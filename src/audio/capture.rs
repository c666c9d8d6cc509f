use super::format::AudioFormat;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::{HeapCons, HeapRb, traits::*};

/// Somewhere interleaved samples can be pulled from while a capture runs.
///
/// Sources are opened and dropped on the capture worker's thread, so they do
/// not need to be `Send`.
pub trait SampleSource {
    /// Move every sample captured since the last call into `buf`
    fn drain_into(&mut self, buf: &mut Vec<f32>);
}

/// Opens a fresh [`SampleSource`] for each capture session
pub trait SourceFactory: Send + Sync {
    fn open(&self, format: AudioFormat) -> Result<Box<dyn SampleSource>>;
}

/// Opens a cpal input stream, optionally picking the first input device whose
/// name contains `device` (e.g. a PulseAudio/PipeWire monitor source).
pub struct DeviceSource {
    device: Option<String>,
}

impl DeviceSource {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device> {
        let Some(wanted) = &self.device else {
            return host
                .default_input_device()
                .context("No input audio device available");
        };

        let devices = host
            .input_devices()
            .context("Failed to enumerate input devices")?;

        for device in devices {
            if let Ok(name) = device.name() {
                if name.contains(wanted.as_str()) {
                    tracing::debug!("Using input device {}", name);
                    return Ok(device);
                }
            }
        }

        Err(anyhow::anyhow!("No input device matching {:?}", wanted))
    }
}

impl SourceFactory for DeviceSource {
    fn open(&self, format: AudioFormat) -> Result<Box<dyn SampleSource>> {
        // Ten seconds of headroom; the worker drains every 100 ms
        let ring = HeapRb::<f32>::new(format.samples_for_duration(10.0));
        let (mut producer, consumer) = ring.split();

        let host = cpal::default_host();
        let device = self.find_device(&host)?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    producer.push_slice(data);
                },
                move |err| {
                    tracing::warn!("Audio stream error: {}", err);
                },
                None,
            )
            .context("Failed to build input stream")?;

        stream.play().context("Failed to start audio stream")?;

        tracing::info!("Audio capture started");
        Ok(Box::new(DeviceStream {
            _stream: stream,
            consumer,
        }))
    }
}

struct DeviceStream {
    // Dropping the stream stops capture
    _stream: cpal::Stream,
    consumer: HeapCons<f32>,
}

impl SampleSource for DeviceStream {
    fn drain_into(&mut self, buf: &mut Vec<f32>) {
        let available = self.consumer.occupied_len();
        if available == 0 {
            return;
        }

        let start = buf.len();
        buf.resize(start + available, 0.0);
        let n = self.consumer.pop_slice(&mut buf[start..]);
        buf.truncate(start + n);
    }
}
