// NOTE: Captured audio is handled as interleaved f32 and written out as 16-bit
// signed integer PCM.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Calculate number of interleaved samples for a given duration in seconds
    pub fn samples_for_duration(&self, seconds: f32) -> usize {
        (self.sample_rate as f32 * self.channels as f32 * seconds) as usize
    }

    /// Whole seconds of audio represented by `samples` interleaved samples
    pub fn seconds_for_samples(&self, samples: u64) -> u64 {
        samples / (self.sample_rate as u64 * self.channels as u64)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
        }
    }
}
