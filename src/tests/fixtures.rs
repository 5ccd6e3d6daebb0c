//! Test fixtures for end-to-end tests
//!
//! Synthesizes input files on the fly so no media assets are checked in,
//! and reads back produced M4A files with the `mp4` crate.

use std::f32::consts::PI;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::ffmpeg::helpers::{channel_layout_for, encoder_codec_parameters};

/// Write `samples` frames of a 440 Hz tone as 16-bit PCM WAV.
pub fn write_tone_wav(path: &Path, sample_rate: u32, channels: u16, samples: usize) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for n in 0..samples {
        let t = n as f32 / sample_rate as f32;
        let value = ((2.0 * PI * 440.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Write `samples` frames of a 440 Hz tone as 32-bit float WAV.
pub fn write_tone_wav_float(path: &Path, sample_rate: u32, channels: u16, samples: usize) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for n in 0..samples {
        let t = n as f32 / sample_rate as f32;
        let value = (2.0 * PI * 440.0 * t).sin() * 0.5;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Write a Matroska file with two mono PCM audio streams.
pub fn write_two_stream_file(path: &Path) {
    write_pcm_mka(path, 2, 8000, 1, &[]);
}

/// Write a single-stream Matroska file of silence carrying `tags` as
/// container metadata.
pub fn write_tagged_file(path: &Path, sample_rate: u32, tags: &[(&str, &str)]) {
    write_pcm_mka(path, 1, sample_rate, 100, tags);
}

/// Matroska with `streams` mono s16 PCM streams, each holding `packets`
/// packets of 160 samples.
fn write_pcm_mka(
    path: &Path,
    streams: usize,
    sample_rate: u32,
    packets: usize,
    tags: &[(&str, &str)],
) {
    const PACKET_SAMPLES: i64 = 160;

    let _ = ffmpeg::init();
    let mut octx = ffmpeg::format::output(&path).unwrap();
    let time_base = ffmpeg::Rational::new(1, sample_rate as i32);

    for _ in 0..streams {
        let codec = ffmpeg::codec::encoder::find(ffmpeg::codec::Id::PCM_S16LE).unwrap();
        let mut audio_enc = ffmpeg::codec::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .unwrap();
        audio_enc.set_rate(sample_rate as i32);
        audio_enc.set_format(ffmpeg::util::format::sample::Sample::I16(
            ffmpeg::util::format::sample::Type::Packed,
        ));
        audio_enc.set_channel_layout(channel_layout_for(1));
        audio_enc.set_time_base(time_base);
        let encoder = audio_enc.open_as(codec).unwrap();

        let mut stream = octx
            .add_stream(ffmpeg::codec::encoder::find(ffmpeg::codec::Id::PCM_S16LE))
            .unwrap();
        stream.set_parameters(encoder_codec_parameters(&encoder));
        stream.set_time_base(time_base);
    }

    let mut metadata = ffmpeg::Dictionary::new();
    for (key, value) in tags {
        metadata.set(key, value);
    }
    octx.set_metadata(metadata);

    octx.write_header().unwrap();
    for n in 0..packets {
        for index in 0..streams {
            let stream_time_base = octx.stream(index).unwrap().time_base();
            let mut packet =
                ffmpeg::codec::packet::Packet::copy(&[0u8; 2 * PACKET_SAMPLES as usize]);
            packet.set_stream(index);
            packet.set_pts(Some(n as i64 * PACKET_SAMPLES));
            packet.set_dts(Some(n as i64 * PACKET_SAMPLES));
            packet.set_duration(PACKET_SAMPLES);
            packet.rescale_ts(time_base, stream_time_base);
            packet.write_interleaved(&mut octx).unwrap();
        }
    }
    octx.write_trailer().unwrap();
}

/// Container-level tags of any file FFmpeg can open.
pub fn read_tags(path: &Path) -> Vec<(String, String)> {
    let _ = ffmpeg::init();
    let input = ffmpeg::format::input(&path).unwrap();
    let tags = input
        .metadata()
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.to_string()))
        .collect();
    tags
}

/// What the produced M4A says about its single track
#[derive(Debug)]
pub struct M4aInfo {
    pub tracks: usize,
    pub is_audio: bool,
    pub is_aac: bool,
    pub channel_config: Option<mp4::ChannelConfig>,
    pub sample_count: u32,
}

/// Parse an M4A file's header. Fails on files without a `moov` box, i.e.
/// files whose trailer was never written.
pub fn inspect_m4a(path: &Path) -> mp4::Result<M4aInfo> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let reader = mp4::Mp4Reader::read_header(BufReader::new(file), size)?;

    let tracks = reader.tracks().len();
    let track = reader
        .tracks()
        .values()
        .next()
        .ok_or(mp4::Error::InvalidData("no tracks"))?;

    Ok(M4aInfo {
        tracks,
        is_audio: matches!(track.track_type(), Ok(mp4::TrackType::Audio)),
        is_aac: matches!(track.media_type(), Ok(mp4::MediaType::AAC)),
        channel_config: track.channel_config().ok(),
        sample_count: track.sample_count(),
    })
}
