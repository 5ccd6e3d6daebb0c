//! Audio transcoding pipeline
//!
//! Drives `FrameDecoder` → `FrameResampler` → `SampleFifo` → `FrameEncoder`
//! → `PacketSink`. The decoder emits frames of codec-defined length, the
//! encoder wants exactly `frame_size` samples per frame; the FIFO bridges
//! the two. One loop iteration fills the FIFO until at least one encoder
//! frame is available (or the input ends), then drains every full frame.
//! After the input ends the remainder goes out as a single short frame and
//! the encoder is flushed.

use crate::error::{Result, TranscodeError};
use crate::fifo::SampleFifo;
use crate::media::EncodedPacket;

use super::{FrameDecoder, FrameEncoder, FrameResampler, PacketSink};

/// Upper bound on `encode(None)` calls while flushing. AAC holds at most a
/// couple of frames; an encoder that never reports empty is broken.
pub const MAX_FLUSH_CALLS: usize = 4096;

/// Where the orchestrator is in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Decoding until the FIFO holds an encoder frame or the input ends
    Filling,
    /// Encoding full frames, plus the short final frame at end of input
    Draining,
    /// Draining packets buffered inside the encoder
    Flushing,
    /// Trailer written
    Done,
}

/// Counters for one completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub decoded_frames: u64,
    pub input_samples: u64,
    pub encoded_frames: u64,
    pub output_samples: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
    pub flush_calls: u64,
    /// Length of the final under-sized frame, if the input did not end on
    /// a frame boundary
    pub short_final_frame: Option<usize>,
}

/// The orchestrator. Owns every adapter and the FIFO for the whole run.
pub struct Pipeline<D, R, E, S>
where
    D: FrameDecoder,
    R: FrameResampler,
    E: FrameEncoder,
    S: PacketSink,
{
    // Fields drop in declaration order, which is the reverse of the order
    // `transcode_file` acquires them in. Keep it that way: the encoder
    // must be closed before the container that holds its stream.
    fifo: SampleFifo,
    resampler: R,
    encoder: E,
    sink: S,
    decoder: D,
    frame_size: usize,
    state: PipelineState,
    finished: bool,
    next_pts: i64,
    stats: RunStats,
}

impl<D, R, E, S> Pipeline<D, R, E, S>
where
    D: FrameDecoder,
    R: FrameResampler,
    E: FrameEncoder,
    S: PacketSink,
{
    /// Take ownership of the opened adapters, listed in acquisition order.
    ///
    /// The FIFO is allocated here, last, in the encoder's format.
    pub fn new(decoder: D, sink: S, encoder: E, resampler: R) -> Result<Self> {
        let frame_size = encoder.frame_size();
        if frame_size == 0 {
            // Same release order as dropping a constructed pipeline.
            drop(resampler);
            drop(encoder);
            drop(sink);
            drop(decoder);
            return Err(TranscodeError::Encode(
                "encoder reports a frame size of 0".to_string(),
            ));
        }
        let fifo = SampleFifo::new(encoder.spec());

        Ok(Self {
            fifo,
            resampler,
            encoder,
            sink,
            decoder,
            frame_size,
            state: PipelineState::Filling,
            finished: false,
            next_pts: 0,
            stats: RunStats::default(),
        })
    }

    /// Run to completion.
    ///
    /// Consumes the pipeline: whether the run succeeds or fails part-way,
    /// every resource is released exactly once when `self` goes out of
    /// scope here. A failed run leaves the output without a trailer.
    pub fn run(mut self) -> Result<RunStats> {
        match self.execute() {
            Ok(()) => Ok(std::mem::take(&mut self.stats)),
            Err(e) => {
                tracing::error!(
                    state = ?self.state,
                    fifo_samples = self.fifo.len(),
                    "pipeline: aborted: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<()> {
        self.sink.write_header()?;

        loop {
            self.enter(PipelineState::Filling);
            self.fill()?;

            self.enter(PipelineState::Draining);
            self.drain()?;

            if self.finished {
                break;
            }
        }

        self.enter(PipelineState::Flushing);
        self.flush()?;

        self.sink.write_trailer()?;
        self.enter(PipelineState::Done);
        Ok(())
    }

    fn enter(&mut self, state: PipelineState) {
        if self.state != state {
            tracing::trace!(from = ?self.state, to = ?state, fifo_samples = self.fifo.len(), "pipeline: state");
            self.state = state;
        }
    }

    /// Decode, convert and store until the FIFO holds a full encoder frame
    /// or the input ends.
    fn fill(&mut self) -> Result<()> {
        while self.fifo.len() < self.frame_size {
            let decoded = self.decoder.decode_next()?;

            // A frame delivered together with end-of-stream is still stored.
            if let Some(frame) = decoded.frame {
                if !frame.is_empty() {
                    self.stats.decoded_frames += 1;
                    self.stats.input_samples += frame.samples() as u64;
                    let converted = self.resampler.convert(frame)?;
                    self.fifo.write_frame(&converted)?;
                }
            }

            if decoded.end_of_stream {
                tracing::debug!(
                    fifo_samples = self.fifo.len(),
                    input_samples = self.stats.input_samples,
                    "pipeline: end of input"
                );
                self.finished = true;
                break;
            }
        }
        Ok(())
    }

    /// Encode every full frame in the FIFO; at end of input also the
    /// remainder as one short frame.
    fn drain(&mut self) -> Result<()> {
        while self.fifo.len() >= self.frame_size || (self.finished && !self.fifo.is_empty()) {
            let count = self.fifo.len().min(self.frame_size);
            if count < self.frame_size {
                // Only reachable once: `finished` is set and this read
                // empties the FIFO.
                self.stats.short_final_frame = Some(count);
            }

            let mut frame = self.fifo.read_frame(count)?;
            frame.set_pts(Some(self.next_pts));
            self.next_pts += count as i64;

            let output = self.encoder.encode(Some(frame))?;
            self.stats.encoded_frames += 1;
            self.stats.output_samples += count as u64;
            self.write_packets(output.packets)?;
        }
        Ok(())
    }

    /// Feed the encoder no input until it reports nothing left.
    fn flush(&mut self) -> Result<()> {
        loop {
            if self.stats.flush_calls as usize >= MAX_FLUSH_CALLS {
                return Err(TranscodeError::Encode(format!(
                    "encoder still reports data after {} flush calls",
                    MAX_FLUSH_CALLS
                )));
            }
            let output = self.encoder.encode(None)?;
            self.stats.flush_calls += 1;
            self.write_packets(output.packets)?;
            if !output.data_present {
                break;
            }
        }
        tracing::debug!(flush_calls = self.stats.flush_calls, "pipeline: encoder flushed");
        Ok(())
    }

    fn write_packets(&mut self, packets: Vec<EncodedPacket>) -> Result<()> {
        for packet in packets {
            self.stats.packets_written += 1;
            self.stats.bytes_written += packet.len() as u64;
            self.sink.write_packet(packet)?;
        }
        Ok(())
    }
}

impl<D, R, E, S> Drop for Pipeline<D, R, E, S>
where
    D: FrameDecoder,
    R: FrameResampler,
    E: FrameEncoder,
    S: PacketSink,
{
    fn drop(&mut self) {
        tracing::debug!(state = ?self.state, "pipeline: releasing resources");
    }
}
