//! Audio resampler for the transcoding pipeline
//!
//! Converts decoded frames to the encoder's sample format and channel
//! layout. The sample rate is kept, so every `convert` call must hand back
//! exactly as many samples as it received.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;

use crate::error::{Result, TranscodeError};
use crate::ffmpeg::helpers::{
    channel_layout_for, frame_to_raw, raw_to_frame, resampler_pending_samples,
    sample_format_to_ffmpeg,
};
use crate::media::{AudioSpec, ConvertedSamples, RawFrame};

use super::FrameResampler;

/// Audio resampler wrapping FFmpeg's `SwrContext`, or a pass-through when
/// the decoder already produces the encoder's format.
pub struct AudioResampler {
    context: Option<resampling::Context>,
    input: AudioSpec,
    output: AudioSpec,
}

impl AudioResampler {
    pub fn new(input: AudioSpec, output: AudioSpec) -> Result<Self> {
        let context = if needs_resampling(&input, &output) {
            let context = resampling::Context::get(
                sample_format_to_ffmpeg(input.format),
                channel_layout_for(input.channels),
                input.sample_rate,
                sample_format_to_ffmpeg(output.format),
                channel_layout_for(output.channels),
                output.sample_rate,
            )
            .map_err(|e| {
                TranscodeError::Open(format!("could not create resampling context: {}", e))
            })?;
            tracing::debug!(%input, %output, "resampler: converting");
            Some(context)
        } else {
            tracing::debug!(spec = %input, "resampler: pass-through");
            None
        };

        Ok(Self {
            context,
            input,
            output,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.context.is_none()
    }
}

impl FrameResampler for AudioResampler {
    fn convert(&mut self, frame: RawFrame) -> Result<ConvertedSamples> {
        if frame.spec() != self.input {
            return Err(TranscodeError::Resample(format!(
                "frame is {}, resampler was built for {}",
                frame.spec(),
                self.input
            )));
        }

        // Ownership moves straight through; nothing else can alias the planes.
        let Some(context) = self.context.as_mut() else {
            return Ok(frame);
        };

        let src = raw_to_frame(&frame)?;
        // Left empty: swr_convert_frame allocates it from the context config.
        let mut out = ffmpeg::util::frame::Audio::empty();
        context
            .run(&src, &mut out)
            .map_err(|e| TranscodeError::Resample(format!("could not convert samples: {}", e)))?;

        let pending = resampler_pending_samples(context, self.output.sample_rate);
        if pending > 0 || out.samples() != frame.samples() {
            return Err(TranscodeError::Resample(format!(
                "converted samples left over: {} in, {} out, {} pending",
                frame.samples(),
                out.samples(),
                pending
            )));
        }

        let converted = frame_to_raw(&out)?;
        if converted.spec() != self.output {
            return Err(TranscodeError::Resample(format!(
                "resampler produced {}, expected {}",
                converted.spec(),
                self.output
            )));
        }
        Ok(converted.with_pts(frame.pts()))
    }
}

/// Whether converting from `input` to `output` needs an actual resampler.
pub fn needs_resampling(input: &AudioSpec, output: &AudioSpec) -> bool {
    input != output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SampleFormat;

    fn s16_ramp(spec: AudioSpec, samples: usize) -> RawFrame {
        let plane: Vec<u8> = (0..samples * spec.channels as usize)
            .flat_map(|i| ((i % 2000) as i16 - 1000).to_ne_bytes())
            .collect();
        RawFrame::new(spec, samples, vec![plane]).unwrap()
    }

    #[test]
    fn test_passthrough_when_formats_match() {
        let spec = AudioSpec::new(SampleFormat::S16, 2, 44100);
        let mut resampler = AudioResampler::new(spec, spec).unwrap();
        assert!(resampler.is_passthrough());

        let frame = s16_ramp(spec, 1152);
        let out = resampler.convert(frame.clone()).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_format_and_layout_conversion() {
        let _ = ffmpeg::init();
        let input = AudioSpec::new(SampleFormat::S16, 1, 44100);
        let output = AudioSpec::new(SampleFormat::F32P, 2, 44100);
        let mut resampler = AudioResampler::new(input, output).unwrap();
        assert!(!resampler.is_passthrough());

        let out = resampler.convert(s16_ramp(input, 1152)).unwrap();
        assert_eq!(out.spec(), output);
        assert_eq!(out.samples(), 1152);
        assert_eq!(out.planes().len(), 2);
        assert_eq!(out.plane(0).len(), 1152 * 4);
    }

    #[test]
    fn test_rejects_frame_in_other_format() {
        let input = AudioSpec::new(SampleFormat::S16, 2, 44100);
        let mut resampler = AudioResampler::new(input, input).unwrap();
        let other = RawFrame::silence(AudioSpec::new(SampleFormat::S16, 1, 44100), 64);
        assert!(matches!(
            resampler.convert(other),
            Err(TranscodeError::Resample(_))
        ));
    }

    #[test]
    fn test_needs_resampling() {
        let a = AudioSpec::new(SampleFormat::F32P, 2, 48000);
        assert!(!needs_resampling(&a, &a));
        assert!(needs_resampling(&a, &AudioSpec { channels: 1, ..a }));
        assert!(needs_resampling(&a, &AudioSpec { sample_rate: 44100, ..a }));
    }
}
