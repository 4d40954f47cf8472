//! Audio assembly: segment cleanup, concatenation and encoding.

pub mod assembler;
pub mod dsp;
pub mod encode;
pub mod waveform;

pub use assembler::AudioAssembler;
pub use encode::{EncodedArtifact, Encoder, OutputFormat};
pub use waveform::{Samples, Track, Waveform};
