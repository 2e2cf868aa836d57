//! Sample source contract.
//!
//! A source is opened once per acquisition session on the producer thread and
//! yields fixed-size chunks of mono 16-bit samples until it fails or the
//! session is cancelled.

use crate::scope::ScopeError;

/// One hardware read worth of samples.
pub type Chunk = Vec<i16>;

/// Parameters requested when opening a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_size: 1024,
        }
    }
}

/// Something that can open an input stream.
///
/// `open` runs on the producer thread, so readers do not need to be `Send`
/// (cpal streams are not).
pub trait SampleSource: Send + Sync {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn ChunkReader>, ScopeError>;

    /// Short human-readable name used in logs and the status line.
    fn describe(&self) -> String;
}

/// An open input stream.
pub trait ChunkReader {
    /// Rate the stream actually runs at, which may differ from the request.
    fn sample_rate(&self) -> u32;

    /// Blocks until one full chunk is available.
    fn read(&mut self) -> Result<Chunk, ScopeError>;

    fn close(self: Box<Self>);
}
