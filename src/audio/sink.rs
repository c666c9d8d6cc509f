use anyhow::Result;

/// Trait for streaming audio encoding
///
/// Implementations write samples as they arrive rather than buffering the whole
/// track. They run on the capture worker's own thread, so calls may block.
pub trait AudioSink: Send {
    /// Write interleaved samples. The Vec is moved to avoid copying
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()>;

    /// Finalize and close the sink
    fn finalize(self: Box<Self>) -> Result<()>;
}
