//! Audio transcoding module
//!
//! The pipeline talks to its collaborators through four narrow traits:
//! - `FrameDecoder`: compressed input → variable-length raw frames
//! - `FrameResampler`: raw frames → frames in the encoder's format
//! - `FrameEncoder`: fixed-length raw frames → compressed packets
//! - `PacketSink`: the output container
//!
//! The FFmpeg-backed implementations live in the submodules; tests drive
//! the pipeline with scripted mocks instead.

pub mod decoder;
pub mod encoder;
pub mod muxer;
pub mod pipeline;
pub mod resampler;

use std::path::Path;

use crate::config::TranscodeConfig;
use crate::error::Result;
use crate::media::{AudioSpec, ConvertedSamples, Decoded, EncodeOutput, EncodedPacket, RawFrame};

use decoder::AudioDecoder;
use encoder::AacEncoder;
use muxer::FileMuxer;
use pipeline::{Pipeline, RunStats};
use resampler::AudioResampler;

/// Source of raw frames.
pub trait FrameDecoder {
    /// Format of the frames this decoder produces.
    fn spec(&self) -> AudioSpec;

    /// Decode the next frame.
    ///
    /// Once `end_of_stream` is returned no further frames follow, but a
    /// frame returned in the same call must still be processed.
    fn decode_next(&mut self) -> Result<Decoded>;
}

/// Converts frames into the encoder's sample format, layout and rate.
pub trait FrameResampler {
    /// Convert one frame completely. Leaving samples buffered inside the
    /// resampler after the call is a `ResampleError`.
    fn convert(&mut self, frame: RawFrame) -> Result<ConvertedSamples>;
}

/// Consumes fixed-length frames and produces compressed packets.
pub trait FrameEncoder {
    /// Format the encoder expects its input frames in.
    fn spec(&self) -> AudioSpec;

    /// Samples per channel in every frame except the last one.
    fn frame_size(&self) -> usize;

    /// Encode one frame, or with `None` drain buffered packets.
    ///
    /// A frame must hold exactly `frame_size()` samples, except one final
    /// shorter frame. While flushing, `data_present == false` signals the
    /// encoder is empty.
    fn encode(&mut self, frame: Option<RawFrame>) -> Result<EncodeOutput>;
}

/// Output container.
pub trait PacketSink {
    fn write_header(&mut self) -> Result<()>;

    fn write_packet(&mut self, packet: EncodedPacket) -> Result<()>;

    fn write_trailer(&mut self) -> Result<()>;
}

/// Transcode the single audio stream in `input` to AAC in `output`.
///
/// Container tags of the input are carried over to the output.
///
/// Resources are acquired in the order input, output container, encoder,
/// resampler, FIFO, and released in exactly the reverse order on every exit
/// path, including errors half-way through setup.
pub fn transcode_file(input: &Path, output: &Path, config: &TranscodeConfig) -> Result<RunStats> {
    tracing::info!(input = %input.display(), output = %output.display(), "transcode: starting");

    let decoder = AudioDecoder::open(input)?;
    let input_spec = decoder.spec();
    tracing::debug!(spec = %input_spec, "transcode: decoder opened");

    let mut muxer = FileMuxer::create(output)?;
    muxer.set_metadata(decoder.metadata())?;
    let encoder = AacEncoder::open(
        &config.output,
        input_spec.sample_rate,
        muxer.needs_global_header(),
    )?;
    tracing::debug!(
        spec = %encoder.spec(),
        frame_size = encoder.frame_size(),
        bit_rate = config.output.bit_rate,
        "transcode: encoder opened"
    );
    muxer.add_stream(encoder.parameters(), encoder.time_base())?;

    let resampler = AudioResampler::new(input_spec, encoder.spec())?;

    let stats = Pipeline::new(decoder, muxer, encoder, resampler)?.run()?;

    tracing::info!(
        input_samples = stats.input_samples,
        output_samples = stats.output_samples,
        packets = stats.packets_written,
        bytes = stats.bytes_written,
        "transcode: done"
    );
    Ok(stats)
}
