//! Sample FIFO between the decoder side and the encoder side
//!
//! Decoders emit frames of whatever length the codec dictates, while the
//! AAC encoder needs exactly `frame_size` samples per frame. The FIFO
//! absorbs the difference. It is measured in samples per channel, never
//! in bytes, and grows on demand.

use std::collections::VecDeque;

use crate::error::{Result, TranscodeError};
use crate::media::{AudioSpec, RawFrame};

/// Growable queue of samples in a fixed `AudioSpec`.
///
/// Single owner, single thread. `len() == total_written() - total_read()`
/// after every operation.
pub struct SampleFifo {
    spec: AudioSpec,
    /// One byte queue per plane, all holding `len * stride` bytes
    planes: Vec<VecDeque<u8>>,
    stride: usize,
    len: usize,
    total_written: u64,
    total_read: u64,
}

impl SampleFifo {
    pub fn new(spec: AudioSpec) -> Self {
        Self {
            spec,
            planes: (0..spec.planes()).map(|_| VecDeque::new()).collect(),
            stride: spec.plane_stride(),
            len: 0,
            total_written: 0,
            total_read: 0,
        }
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Buffered samples per channel.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    /// Append `count` samples taken from the front of each plane slice.
    pub fn write(&mut self, planes: &[&[u8]], count: usize) -> Result<()> {
        if planes.len() != self.planes.len() {
            return Err(TranscodeError::FrameLayout(format!(
                "FIFO holds {} planes, write supplied {}",
                self.planes.len(),
                planes.len()
            )));
        }
        let bytes = count * self.stride;
        if let Some(short) = planes.iter().position(|p| p.len() < bytes) {
            return Err(TranscodeError::FrameLayout(format!(
                "plane {} holds {} bytes, {} samples need {}",
                short,
                planes[short].len(),
                count,
                bytes
            )));
        }

        // Reserve every plane before touching any, so a failed allocation
        // leaves the FIFO unchanged.
        for queue in self.planes.iter_mut() {
            queue
                .try_reserve(bytes)
                .map_err(|_| TranscodeError::OutOfMemory { requested: count })?;
        }
        for (queue, data) in self.planes.iter_mut().zip(planes) {
            queue.extend(&data[..bytes]);
        }

        self.len += count;
        self.total_written += count as u64;
        Ok(())
    }

    /// Append a whole frame. The frame must be in the FIFO's spec.
    pub fn write_frame(&mut self, frame: &RawFrame) -> Result<()> {
        if frame.spec() != self.spec {
            return Err(TranscodeError::FrameLayout(format!(
                "frame is {}, FIFO is {}",
                frame.spec(),
                self.spec
            )));
        }
        let planes: Vec<&[u8]> = frame.planes().iter().map(Vec::as_slice).collect();
        self.write(&planes, frame.samples())
    }

    /// Remove exactly `count` samples from the front, one buffer per plane.
    pub fn read(&mut self, count: usize) -> Result<Vec<Vec<u8>>> {
        if count > self.len {
            return Err(TranscodeError::Underflow {
                requested: count,
                available: self.len,
            });
        }
        let bytes = count * self.stride;
        let out = self
            .planes
            .iter_mut()
            .map(|queue| queue.drain(..bytes).collect())
            .collect();

        self.len -= count;
        self.total_read += count as u64;
        Ok(out)
    }

    /// Remove exactly `count` samples as a frame in the FIFO's spec.
    pub fn read_frame(&mut self, count: usize) -> Result<RawFrame> {
        let planes = self.read(count)?;
        RawFrame::new(self.spec, count, planes)
    }
}

impl std::fmt::Debug for SampleFifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleFifo")
            .field("spec", &self.spec)
            .field("len", &self.len)
            .field("total_written", &self.total_written)
            .field("total_read", &self.total_read)
            .finish()
    }
}
