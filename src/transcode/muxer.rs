//! Output container writer
//!
//! Owns the output format context (and through it the opened file). The
//! container is chosen from the output file extension.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use crate::error::{Result, TranscodeError};
use crate::ffmpeg::helpers::stream_reset_codec_tag;
use crate::media::EncodedPacket;

use super::PacketSink;

/// Single-stream muxer writing to a file
pub struct FileMuxer {
    output: ffmpeg::format::context::Output,
    path: PathBuf,
    /// Time base of packets handed to `write_packet`
    encoder_time_base: ffmpeg::Rational,
    /// Time base the muxer chose for the stream in `write_header`
    stream_time_base: ffmpeg::Rational,
    stream_added: bool,
    header_written: bool,
    trailer_written: bool,
}

impl FileMuxer {
    /// Open `path` for writing and allocate a format context for it.
    pub fn create(path: &Path) -> Result<Self> {
        let output = ffmpeg::format::output(&path).map_err(|e| {
            TranscodeError::Open(format!("could not open output {:?}: {}", path, e))
        })?;

        tracing::debug!(path = %path.display(), format = output.format().name(), "muxer: created");

        Ok(Self {
            output,
            path: path.to_path_buf(),
            encoder_time_base: ffmpeg::Rational::new(0, 1),
            stream_time_base: ffmpeg::Rational::new(0, 1),
            stream_added: false,
            header_written: false,
            trailer_written: false,
        })
    }

    /// Whether encoders feeding this container must emit global headers.
    pub fn needs_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    }

    /// Set container-level tags. Only takes effect before the header is
    /// written.
    pub fn set_metadata(&mut self, metadata: ffmpeg::Dictionary<'static>) -> Result<()> {
        if self.header_written {
            return Err(TranscodeError::Open(
                "cannot set metadata after the header is written".to_string(),
            ));
        }
        tracing::debug!(tags = metadata.iter().count(), "muxer: metadata set");
        self.output.set_metadata(metadata);
        Ok(())
    }

    /// Add the single audio stream.
    pub fn add_stream(
        &mut self,
        params: ffmpeg::codec::Parameters,
        time_base: ffmpeg::Rational,
    ) -> Result<()> {
        if self.stream_added {
            return Err(TranscodeError::Open(
                "output already has an audio stream".to_string(),
            ));
        }

        let mut out_stream = self
            .output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| TranscodeError::Open(format!("could not create new stream: {}", e)))?;

        out_stream.set_parameters(params);
        stream_reset_codec_tag(&mut out_stream);
        out_stream.set_time_base(time_base);

        self.encoder_time_base = time_base;
        self.stream_time_base = time_base;
        self.stream_added = true;

        tracing::debug!(index = out_stream.index(), "muxer: added audio stream");
        Ok(())
    }
}

impl PacketSink for FileMuxer {
    fn write_header(&mut self) -> Result<()> {
        if !self.stream_added {
            return Err(TranscodeError::Open(
                "cannot write header without a stream".to_string(),
            ));
        }
        self.output
            .write_header()
            .map_err(|e| TranscodeError::io("could not write output file header", e))?;
        self.header_written = true;

        // The muxer may replace the requested time base (MP4 keeps it,
        // others pick their own).
        if let Some(stream) = self.output.stream(0) {
            self.stream_time_base = stream.time_base();
        }
        tracing::debug!(
            time_base = %self.stream_time_base,
            "muxer: header written"
        );
        Ok(())
    }

    fn write_packet(&mut self, packet: EncodedPacket) -> Result<()> {
        let mut av_packet = ffmpeg::codec::packet::Packet::copy(&packet.data);
        av_packet.set_pts(packet.pts);
        av_packet.set_dts(packet.dts);
        av_packet.set_duration(packet.duration);
        av_packet.set_stream(0);
        av_packet.set_position(-1);
        av_packet.rescale_ts(self.encoder_time_base, self.stream_time_base);

        av_packet
            .write_interleaved(&mut self.output)
            .map_err(|e| TranscodeError::io("could not write frame", e))
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.output
            .write_trailer()
            .map_err(|e| TranscodeError::io("could not write output file trailer", e))?;
        self.trailer_written = true;
        tracing::debug!(path = %self.path.display(), "muxer: trailer written");
        Ok(())
    }
}

impl Drop for FileMuxer {
    fn drop(&mut self) {
        if self.header_written && !self.trailer_written {
            tracing::warn!(
                path = %self.path.display(),
                "muxer: closing without trailer, output is incomplete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::tests::fixtures::inspect_m4a;
    use crate::transcode::encoder::{is_aac_encoder_available, AacEncoder};

    #[test]
    fn test_unknown_extension_is_open_error() {
        let _ = ffmpeg::init();
        let dir = tempfile::tempdir().unwrap();
        let result = FileMuxer::create(&dir.path().join("out.not-a-container"));
        assert!(matches!(result, Err(TranscodeError::Open(_))));
    }

    #[test]
    fn test_m4a_needs_global_header() {
        let _ = ffmpeg::init();
        let dir = tempfile::tempdir().unwrap();
        let muxer = FileMuxer::create(&dir.path().join("out.m4a")).unwrap();
        assert!(muxer.needs_global_header());
    }

    #[test]
    fn test_header_requires_stream() {
        let _ = ffmpeg::init();
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = FileMuxer::create(&dir.path().join("out.m4a")).unwrap();
        assert!(muxer.write_header().is_err());
    }

    fn aac_muxer(path: &Path) -> Option<FileMuxer> {
        let _ = ffmpeg::init();
        if !is_aac_encoder_available() {
            return None;
        }
        let mut muxer = FileMuxer::create(path).unwrap();
        let encoder =
            AacEncoder::open(&OutputConfig::default(), 44100, muxer.needs_global_header())
                .unwrap();
        muxer
            .add_stream(encoder.parameters(), encoder.time_base())
            .unwrap();
        Some(muxer)
    }

    #[test]
    fn test_dropped_after_header_leaves_incomplete_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aborted.m4a");
        let Some(mut muxer) = aac_muxer(&path) else {
            return;
        };
        muxer.write_header().unwrap();
        drop(muxer);

        // The header reached the file, the moov box never did
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        assert!(inspect_m4a(&path).is_err());
    }

    #[test]
    fn test_metadata_rejected_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.m4a");
        let Some(mut muxer) = aac_muxer(&path) else {
            return;
        };
        let mut early = ffmpeg::Dictionary::new();
        early.set("title", "Early");
        muxer.set_metadata(early).unwrap();
        muxer.write_header().unwrap();

        let mut late = ffmpeg::Dictionary::new();
        late.set("title", "Late");
        assert!(matches!(
            muxer.set_metadata(late),
            Err(TranscodeError::Open(_))
        ));
    }
}
