//! Audio acquisition for scopeline.
//!
//! Provides the sample source contract, the cpal hardware source, a built-in
//! signal generator, and the chunk-level trigger gate.

pub mod device;
pub mod source;
pub mod synthetic;
pub mod trigger;

pub use device::{list_input_devices, CpalSource};
pub use source::{CaptureConfig, Chunk, ChunkReader, SampleSource};
pub use synthetic::SyntheticSource;
pub use trigger::{keep, TriggerConfig, TriggerMode, OVER_COUNTS, TRIGGER_LEVELS};
