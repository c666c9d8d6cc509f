use super::format::AudioFormat;
use super::sink::AudioSink;
use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// 16-bit PCM WAV encoder writing straight to disk
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
}

impl WavSink {
    pub fn create(path: &Path, format: AudioFormat) -> Result<Self> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: AudioFormat::BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV writer: {:?}", path))?;

        Ok(Self { writer })
    }
}

impl AudioSink for WavSink {
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()> {
        for sample in samples {
            // Convert f32 (-1.0 to 1.0) to i16
            let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            self.writer
                .write_sample(amplitude)
                .context("Failed to write sample")?;
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        self.writer.finalize().context("Failed to finalize WAV")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_readable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        let format = AudioFormat {
            sample_rate: 8000,
            channels: 2,
        };

        let mut sink = Box::new(WavSink::create(&path, format).unwrap());
        sink.write_chunk(vec![0.0, 0.5, -0.5, 2.0]).unwrap();
        sink.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[3], i16::MAX);
    }
}
