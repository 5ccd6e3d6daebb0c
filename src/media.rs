//! Raw and compressed audio data passed between pipeline stages
//!
//! These types are independent of FFmpeg so the orchestrator can be driven
//! by any decoder/encoder implementation. Conversion to and from FFmpeg
//! frames lives in `crate::ffmpeg::helpers`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscodeError};

/// Sample representation, packed (interleaved) or planar.
///
/// Serialized names match FFmpeg's `sample_fmt` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    #[serde(rename = "u8")]
    U8,
    #[serde(rename = "s16")]
    S16,
    #[serde(rename = "s32")]
    S32,
    #[serde(rename = "flt")]
    F32,
    #[serde(rename = "dbl")]
    F64,
    #[serde(rename = "u8p")]
    U8P,
    #[serde(rename = "s16p")]
    S16P,
    #[serde(rename = "s32p")]
    S32P,
    #[serde(rename = "fltp")]
    F32P,
    #[serde(rename = "dblp")]
    F64P,
}

impl SampleFormat {
    /// Size of one sample of one channel.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::U8P => 1,
            SampleFormat::S16 | SampleFormat::S16P => 2,
            SampleFormat::S32 | SampleFormat::S32P | SampleFormat::F32 | SampleFormat::F32P => 4,
            SampleFormat::F64 | SampleFormat::F64P => 8,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(
            self,
            SampleFormat::U8P
                | SampleFormat::S16P
                | SampleFormat::S32P
                | SampleFormat::F32P
                | SampleFormat::F64P
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "flt",
            SampleFormat::F64 => "dbl",
            SampleFormat::U8P => "u8p",
            SampleFormat::S16P => "s16p",
            SampleFormat::S32P => "s32p",
            SampleFormat::F32P => "fltp",
            SampleFormat::F64P => "dblp",
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Format, channel count and rate shared by every frame of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioSpec {
    pub fn new(format: SampleFormat, channels: u16, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
        }
    }

    /// Number of data planes: one per channel when planar, one otherwise.
    pub fn planes(&self) -> usize {
        if self.format.is_planar() {
            self.channels as usize
        } else {
            1
        }
    }

    /// Bytes one sample occupies within a single plane.
    pub fn plane_stride(&self) -> usize {
        if self.format.is_planar() {
            self.format.bytes_per_sample()
        } else {
            self.format.bytes_per_sample() * self.channels as usize
        }
    }
}

impl std::fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.sample_rate, self.channels, self.format
        )
    }
}

/// One block of uncompressed samples, owning its plane buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    spec: AudioSpec,
    samples: usize,
    planes: Vec<Vec<u8>>,
    pts: Option<i64>,
}

impl RawFrame {
    /// Build a frame from owned planes.
    ///
    /// Each plane must hold exactly `samples * spec.plane_stride()` bytes.
    pub fn new(spec: AudioSpec, samples: usize, planes: Vec<Vec<u8>>) -> Result<Self> {
        if planes.len() != spec.planes() {
            return Err(TranscodeError::FrameLayout(format!(
                "expected {} planes for {}, got {}",
                spec.planes(),
                spec,
                planes.len()
            )));
        }
        let plane_bytes = samples * spec.plane_stride();
        if let Some((index, plane)) = planes
            .iter()
            .enumerate()
            .find(|(_, p)| p.len() != plane_bytes)
        {
            return Err(TranscodeError::FrameLayout(format!(
                "plane {} holds {} bytes, expected {} for {} samples",
                index,
                plane.len(),
                plane_bytes,
                samples
            )));
        }
        Ok(Self {
            spec,
            samples,
            planes,
            pts: None,
        })
    }

    /// A zero-filled frame.
    pub fn silence(spec: AudioSpec, samples: usize) -> Self {
        let plane_bytes = samples * spec.plane_stride();
        Self {
            spec,
            samples,
            planes: vec![vec![0u8; plane_bytes]; spec.planes()],
            pts: None,
        }
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Samples per channel.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn plane(&self, index: usize) -> &[u8] {
        &self.planes[index]
    }

    pub fn planes(&self) -> &[Vec<u8>] {
        &self.planes
    }

    /// Presentation timestamp in samples, if known.
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }
}

/// Resampler output: a frame already in the encoder's spec.
pub type ConvertedSamples = RawFrame;

/// Result of one decoder call.
///
/// A frame may accompany `end_of_stream`; it must still be processed.
#[derive(Debug, Default)]
pub struct Decoded {
    pub frame: Option<RawFrame>,
    pub end_of_stream: bool,
}

impl Decoded {
    pub fn frame(frame: RawFrame) -> Self {
        Self {
            frame: Some(frame),
            end_of_stream: false,
        }
    }

    pub fn end() -> Self {
        Self {
            frame: None,
            end_of_stream: true,
        }
    }
}

/// One compressed packet. Timestamps are in the encoder time base
/// (1 / sample_rate).
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPacket {
    pub data: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
}

impl EncodedPacket {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Result of one encoder call.
///
/// While flushing, `data_present == false` means the encoder has nothing
/// left buffered.
#[derive(Debug, Default)]
pub struct EncodeOutput {
    pub packets: Vec<EncodedPacket>,
    pub data_present: bool,
}

impl EncodeOutput {
    pub fn from_packets(packets: Vec<EncodedPacket>) -> Self {
        let data_present = !packets.is_empty();
        Self {
            packets,
            data_present,
        }
    }

    pub fn drained() -> Self {
        Self::default()
    }
}
