//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call. All `unsafe`
//! blocks are contained here with explicit safety arguments.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};

use crate::error::{Result, TranscodeError};
use crate::media::{AudioSpec, RawFrame, SampleFormat};

// ── Sample format and layout mapping ────────────────────────────────────────

/// Map an FFmpeg sample format to ours. `None` for formats the pipeline
/// does not carry (`s64`, unset).
pub fn sample_format_from_ffmpeg(sample: Sample) -> Option<SampleFormat> {
    let format = match sample {
        Sample::U8(Type::Packed) => SampleFormat::U8,
        Sample::I16(Type::Packed) => SampleFormat::S16,
        Sample::I32(Type::Packed) => SampleFormat::S32,
        Sample::F32(Type::Packed) => SampleFormat::F32,
        Sample::F64(Type::Packed) => SampleFormat::F64,
        Sample::U8(Type::Planar) => SampleFormat::U8P,
        Sample::I16(Type::Planar) => SampleFormat::S16P,
        Sample::I32(Type::Planar) => SampleFormat::S32P,
        Sample::F32(Type::Planar) => SampleFormat::F32P,
        Sample::F64(Type::Planar) => SampleFormat::F64P,
        _ => return None,
    };
    Some(format)
}

pub fn sample_format_to_ffmpeg(format: SampleFormat) -> Sample {
    match format {
        SampleFormat::U8 => Sample::U8(Type::Packed),
        SampleFormat::S16 => Sample::I16(Type::Packed),
        SampleFormat::S32 => Sample::I32(Type::Packed),
        SampleFormat::F32 => Sample::F32(Type::Packed),
        SampleFormat::F64 => Sample::F64(Type::Packed),
        SampleFormat::U8P => Sample::U8(Type::Planar),
        SampleFormat::S16P => Sample::I16(Type::Planar),
        SampleFormat::S32P => Sample::I32(Type::Planar),
        SampleFormat::F32P => Sample::F32(Type::Planar),
        SampleFormat::F64P => Sample::F64(Type::Planar),
    }
}

/// Default channel layout for a channel count.
pub fn channel_layout_for(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        n => ChannelLayout::default(n as i32),
    }
}

// ── Frame plane access ──────────────────────────────────────────────────────

/// Extract an audio plane slice from an `AVFrame`.
///
/// Works around `ffmpeg-next`'s `Audio::data(index)` stopping at planes
/// whose `linesize` is zero: FFmpeg only fills `linesize[0]` for audio and
/// it applies to every plane.
pub fn audio_plane_data(frame: &ffmpeg::util::frame::Audio, index: usize) -> &[u8] {
    // SAFETY: `frame.as_ptr()` is valid for the lifetime of `frame`. The
    // plane index is bounds-checked against the channel count (planar) or
    // against the single data plane (packed) before `extended_data` is
    // indexed, and null pointers are rejected.
    unsafe {
        let f = frame.as_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;

        if frame.format().is_planar() {
            if index >= channels {
                return &[];
            }
        } else if index > 0 {
            return &[];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &[];
        }

        let size = (*f).linesize[0] as usize;
        std::slice::from_raw_parts(plane_ptr, size)
    }
}

/// Mutable version of `audio_plane_data`.
pub fn audio_plane_data_mut(frame: &mut ffmpeg::util::frame::Audio, index: usize) -> &mut [u8] {
    // SAFETY: as in `audio_plane_data`; the frame is borrowed mutably so no
    // other slice into its planes can exist.
    unsafe {
        let is_planar = frame.format().is_planar();
        let f = frame.as_mut_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;

        if is_planar {
            if index >= channels {
                return &mut [];
            }
        } else if index > 0 {
            return &mut [];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &mut [];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &mut [];
        }

        let size = (*f).linesize[0] as usize;
        std::slice::from_raw_parts_mut(plane_ptr, size)
    }
}

/// Describe a decoded FFmpeg frame as an `AudioSpec`.
pub fn frame_spec(frame: &ffmpeg::util::frame::Audio) -> Result<AudioSpec> {
    let format = sample_format_from_ffmpeg(frame.format()).ok_or_else(|| {
        TranscodeError::FrameLayout(format!("unsupported sample format {:?}", frame.format()))
    })?;
    Ok(AudioSpec::new(format, frame.channels() as u16, frame.rate()))
}

/// Copy an FFmpeg frame into an owned `RawFrame`, dropping buffer padding.
pub fn frame_to_raw(frame: &ffmpeg::util::frame::Audio) -> Result<RawFrame> {
    let spec = frame_spec(frame)?;
    let samples = frame.samples();
    let bytes = samples * spec.plane_stride();

    let mut planes = Vec::with_capacity(spec.planes());
    for index in 0..spec.planes() {
        let data = audio_plane_data(frame, index);
        if data.len() < bytes {
            return Err(TranscodeError::FrameLayout(format!(
                "plane {} holds {} bytes, {} samples of {} need {}",
                index,
                data.len(),
                samples,
                spec,
                bytes
            )));
        }
        planes.push(data[..bytes].to_vec());
    }

    Ok(RawFrame::new(spec, samples, planes)?.with_pts(frame.pts()))
}

/// Allocate an FFmpeg frame holding a copy of `raw`.
pub fn raw_to_frame(raw: &RawFrame) -> Result<ffmpeg::util::frame::Audio> {
    let spec = raw.spec();
    let mut frame = ffmpeg::util::frame::Audio::new(
        sample_format_to_ffmpeg(spec.format),
        raw.samples(),
        channel_layout_for(spec.channels),
    );
    frame.set_rate(spec.sample_rate);
    frame.set_pts(raw.pts());

    let bytes = raw.samples() * spec.plane_stride();
    for (index, src) in raw.planes().iter().enumerate() {
        let dst = audio_plane_data_mut(&mut frame, index);
        if dst.len() < bytes {
            return Err(TranscodeError::FrameLayout(format!(
                "allocated plane {} holds {} bytes, need {}",
                index,
                dst.len(),
                bytes
            )));
        }
        dst[..bytes].copy_from_slice(src);
    }

    Ok(frame)
}

// ── Codec and stream parameters ─────────────────────────────────────────────

/// Allocate a fresh `AVCodecParameters`, copy the encoder context into it,
/// and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to describe the output stream from the opened encoder.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::codec::encoder::Audio,
) -> ffmpeg::codec::Parameters {
    use std::ops::Deref;
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer or null on
    // OOM. `avcodec_parameters_from_context` copies fields from a live,
    // open encoder context.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Zero out `codec_tag` on an output stream so the muxer picks the tag
/// that is valid for the target container.
///
/// Must be called after `set_parameters(...)` and before `write_header`.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `out_stream.as_mut_ptr()` is valid for the lifetime of the
    // stream and `codecpar` is set by `set_parameters`.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}

// ── Resampler state ─────────────────────────────────────────────────────────

/// Samples still buffered inside a resampling context, expressed at
/// `output_rate`.
///
/// `resampling::Context::delay()` rounds to whole seconds and reports
/// `None` for anything shorter, so it cannot detect a few leftover samples.
pub fn resampler_pending_samples(context: &resampling::Context, output_rate: u32) -> i64 {
    // SAFETY: the context pointer is valid for the lifetime of `context`.
    // `swr_get_delay` only reads resampler state.
    unsafe { ffmpeg::ffi::swr_get_delay(context.as_ptr() as *mut _, output_rate as i64) }
}
