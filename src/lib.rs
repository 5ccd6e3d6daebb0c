//! Single-stream audio transcoder.
//!
//! Decodes the one audio stream of an input file, converts it to the
//! encoder's sample format and channel layout, re-frames it to the AAC
//! frame size and writes AAC to an output container.

pub mod config;
pub mod error;
pub mod fifo;
pub mod ffmpeg;
pub mod media;
pub mod transcode;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{LogFormat, LoggingConfig, OutputConfig, TranscodeConfig};
pub use error::{Result, TranscodeError};
pub use ffmpeg::version_info as ffmpeg_version_info;
pub use ffmpeg::{init, install_log_filter};
pub use fifo::SampleFifo;
pub use media::{AudioSpec, Decoded, EncodeOutput, EncodedPacket, RawFrame, SampleFormat};
pub use transcode::pipeline::{Pipeline, PipelineState, RunStats};
pub use transcode::{transcode_file, FrameDecoder, FrameEncoder, FrameResampler, PacketSink};
