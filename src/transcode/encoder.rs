//! AAC encoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to encode fixed-size PCM frames to
//! AAC-LC packets, and drains the codec's delay line on flush.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;

use crate::config::OutputConfig;
use crate::error::{Result, TranscodeError};
use crate::ffmpeg::helpers::{
    channel_layout_for, encoder_codec_parameters, raw_to_frame, sample_format_from_ffmpeg,
    sample_format_to_ffmpeg,
};
use crate::media::{AudioSpec, EncodeOutput, EncodedPacket, RawFrame, SampleFormat};

use super::FrameEncoder;

/// AAC encoder frame size, used when the codec does not report one
pub const AAC_FRAME_SIZE: usize = 1024;

/// AAC encoder backed by a real FFmpeg codec context
pub struct AacEncoder {
    encoder: ffmpeg::encoder::Audio,
    spec: AudioSpec,
    frame_size: usize,
    time_base: ffmpeg::Rational,
    next_pts: i64,
    /// A frame shorter than `frame_size` has been sent; it must be the last
    short_frame_seen: bool,
    /// EOF has been sent
    flushing: bool,
}

impl AacEncoder {
    /// Open an AAC encoder for `sample_rate` with the configured channel
    /// count and bit rate.
    ///
    /// `global_header` must be set when the output container stores codec
    /// extradata out of band (MP4, M4A, Matroska).
    pub fn open(config: &OutputConfig, sample_rate: u32, global_header: bool) -> Result<Self> {
        let codec = codec::encoder::find(codec::Id::AAC)
            .ok_or_else(|| TranscodeError::Open("could not find an AAC encoder".to_string()))?;

        let supported: Vec<SampleFormat> = codec
            .audio()
            .ok()
            .and_then(|audio| audio.formats())
            .map(|formats| formats.filter_map(sample_format_from_ffmpeg).collect())
            .unwrap_or_default();
        let format = negotiate_format(&supported, config.sample_format).ok_or_else(|| {
            TranscodeError::Open("AAC encoder reports no usable sample format".to_string())
        })?;
        if let Some(requested) = config.sample_format {
            if requested != format {
                tracing::warn!(
                    %requested,
                    using = %format,
                    "encoder: requested sample format not supported, falling back"
                );
            }
        }

        let spec = AudioSpec::new(format, config.channels, sample_rate);
        let time_base = ffmpeg::Rational::new(1, sample_rate as i32);

        // Build context and configure the audio encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            TranscodeError::Open(format!("cannot get audio encoder handle: {}", e))
        })?;

        audio_enc.set_rate(sample_rate as i32);
        audio_enc.set_format(sample_format_to_ffmpeg(format));
        audio_enc.set_channel_layout(channel_layout_for(config.channels));
        audio_enc.set_bit_rate(config.bit_rate as usize);
        if global_header {
            audio_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = audio_enc
            .open_as(codec)
            .map_err(|e| TranscodeError::Open(format!("could not open AAC encoder: {}", e)))?;

        let frame_size = match encoder.frame_size() as usize {
            0 => AAC_FRAME_SIZE,
            n => n,
        };

        Ok(Self {
            encoder,
            spec,
            frame_size,
            time_base,
            next_pts: 0,
            short_frame_seen: false,
            flushing: false,
        })
    }

    /// The encoder time base (1 / sample_rate).
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Codec parameters for the encoded stream (for muxer stream setup).
    pub fn parameters(&self) -> ffmpeg::codec::Parameters {
        encoder_codec_parameters(&self.encoder)
    }

    /// Receive one encoded packet, or `None` if the encoder needs more
    /// input or is fully drained.
    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(EncodedPacket {
                data: bytes::Bytes::copy_from_slice(packet.data().unwrap_or_default()),
                pts: packet.pts(),
                dts: packet.dts(),
                duration: packet.duration(),
            })),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(TranscodeError::Encode(format!(
                "AAC encoder receive_packet error: {}",
                e
            ))),
        }
    }

    fn check_frame(&mut self, frame: &RawFrame) -> Result<()> {
        if frame.spec() != self.spec {
            return Err(TranscodeError::FrameLayout(format!(
                "frame is {}, encoder expects {}",
                frame.spec(),
                self.spec
            )));
        }
        if self.flushing {
            return Err(TranscodeError::Encode(
                "frame sent after flushing started".to_string(),
            ));
        }
        let samples = frame.samples();
        if samples == 0 || samples > self.frame_size {
            return Err(TranscodeError::Encode(format!(
                "frame holds {} samples, encoder frame size is {}",
                samples, self.frame_size
            )));
        }
        if self.short_frame_seen {
            return Err(TranscodeError::Encode(format!(
                "frame of {} samples after the final short frame",
                samples
            )));
        }
        if samples < self.frame_size {
            self.short_frame_seen = true;
        }
        Ok(())
    }
}

impl FrameEncoder for AacEncoder {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn encode(&mut self, frame: Option<RawFrame>) -> Result<EncodeOutput> {
        let Some(frame) = frame else {
            if !self.flushing {
                self.flushing = true;
                match self.encoder.send_eof() {
                    Ok(()) | Err(ffmpeg::Error::Eof) => {}
                    Err(e) => {
                        return Err(TranscodeError::Encode(format!(
                            "AAC encoder send_eof error: {}",
                            e
                        )))
                    }
                }
            }
            return Ok(match self.receive_packet()? {
                Some(packet) => EncodeOutput::from_packets(vec![packet]),
                None => EncodeOutput::drained(),
            });
        };

        self.check_frame(&frame)?;

        let pts = frame.pts().unwrap_or(self.next_pts);
        let mut av_frame = raw_to_frame(&frame)?;
        av_frame.set_pts(Some(pts));
        self.next_pts = pts + frame.samples() as i64;

        self.encoder.send_frame(&av_frame).map_err(|e| {
            TranscodeError::Encode(format!("AAC encoder send_frame error: {}", e))
        })?;

        let mut packets = Vec::new();
        while let Some(packet) = self.receive_packet()? {
            packets.push(packet);
        }
        Ok(EncodeOutput::from_packets(packets))
    }
}

/// Pick the encoder input format: the requested one when the codec
/// supports it, otherwise the codec's first (preferred) format.
pub fn negotiate_format(
    supported: &[SampleFormat],
    requested: Option<SampleFormat>,
) -> Option<SampleFormat> {
    match requested {
        Some(format) if supported.contains(&format) => Some(format),
        _ => supported.first().copied(),
    }
}

/// Check whether the FFmpeg build includes an AAC encoder.
pub fn is_aac_encoder_available() -> bool {
    codec::encoder::find(codec::Id::AAC).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_format() {
        let native = [SampleFormat::F32P];
        assert_eq!(negotiate_format(&native, None), Some(SampleFormat::F32P));
        assert_eq!(
            negotiate_format(&native, Some(SampleFormat::S16)),
            Some(SampleFormat::F32P)
        );

        let both = [SampleFormat::S16, SampleFormat::F32P];
        assert_eq!(
            negotiate_format(&both, Some(SampleFormat::F32P)),
            Some(SampleFormat::F32P)
        );
        assert_eq!(negotiate_format(&[], Some(SampleFormat::S16)), None);
    }

    #[test]
    fn test_aac_encoder_creation() {
        let _ = ffmpeg::init();
        if !is_aac_encoder_available() {
            return;
        }
        let enc = AacEncoder::open(&OutputConfig::default(), 44100, true);
        assert!(enc.is_ok(), "AAC encoder should open: {:?}", enc.err());
        let enc = enc.unwrap();
        assert_eq!(enc.frame_size(), AAC_FRAME_SIZE);
        assert_eq!(enc.spec().channels, 2);
        assert_eq!(enc.time_base(), ffmpeg::Rational::new(1, 44100));
    }

    #[test]
    fn test_frame_size_contract() {
        let _ = ffmpeg::init();
        if !is_aac_encoder_available() {
            return;
        }
        let mut enc = AacEncoder::open(&OutputConfig::default(), 48000, false).unwrap();
        let spec = enc.spec();

        let oversized = RawFrame::silence(spec, enc.frame_size() + 1);
        assert!(matches!(
            enc.encode(Some(oversized)),
            Err(TranscodeError::Encode(_))
        ));

        for _ in 0..4 {
            enc.encode(Some(RawFrame::silence(spec, enc.frame_size())))
                .unwrap();
        }
        enc.encode(Some(RawFrame::silence(spec, 300))).unwrap();
        assert!(matches!(
            enc.encode(Some(RawFrame::silence(spec, 300))),
            Err(TranscodeError::Encode(_))
        ));
    }

    #[test]
    fn test_flush_terminates() {
        let _ = ffmpeg::init();
        if !is_aac_encoder_available() {
            return;
        }
        let mut enc = AacEncoder::open(&OutputConfig::default(), 48000, false).unwrap();
        let spec = enc.spec();

        let mut packets = 0;
        for _ in 0..5 {
            packets += enc
                .encode(Some(RawFrame::silence(spec, enc.frame_size())))
                .unwrap()
                .packets
                .len();
        }

        let mut calls = 0;
        loop {
            calls += 1;
            assert!(calls < 100, "flush did not terminate");
            let out = enc.encode(None).unwrap();
            packets += out.packets.len();
            if !out.data_present {
                break;
            }
        }
        // Five input frames plus the encoder priming frame
        assert!(packets >= 5, "got {} packets", packets);
    }
}
