//! Audio decoder for the transcoding pipeline
//!
//! Owns the input format context and the FFmpeg decoder for its only
//! stream, and turns compressed packets into raw frames one at a time.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::{Result, TranscodeError};
use crate::ffmpeg::helpers::{frame_to_raw, sample_format_from_ffmpeg};
use crate::media::{AudioSpec, Decoded};

use super::FrameDecoder;

/// Audio decoder backed by an FFmpeg input and codec context
pub struct AudioDecoder {
    // Declared before `input`: the codec context is closed before the
    // format context that owns its stream is freed.
    decoder: ffmpeg::decoder::Audio,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    spec: AudioSpec,
    /// EOF has been sent to the decoder
    draining: bool,
}

impl AudioDecoder {
    /// Open `path` and a decoder for its audio stream.
    ///
    /// The file must hold exactly one stream, and it must be audio. Both
    /// checks happen before any codec is opened.
    pub fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(path).map_err(|e| {
            TranscodeError::Open(format!("could not open input {:?}: {}", path, e))
        })?;

        require_single_stream(input.nb_streams() as usize)?;

        let stream = input
            .stream(0)
            .ok_or_else(|| TranscodeError::Usage("input has no stream 0".to_string()))?;
        let stream_index = stream.index();
        let medium = stream.parameters().medium();
        if medium != ffmpeg::media::Type::Audio {
            return Err(TranscodeError::Usage(format!(
                "expected an audio stream, found {:?}",
                medium
            )));
        }

        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                TranscodeError::Open(format!(
                    "could not create codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;
        let decoder = context.decoder().audio().map_err(|e| {
            TranscodeError::Open(format!(
                "could not open audio decoder for stream {}: {}",
                stream_index, e
            ))
        })?;

        let format = sample_format_from_ffmpeg(decoder.format()).ok_or_else(|| {
            TranscodeError::Open(format!(
                "decoder reports unsupported sample format {:?}",
                decoder.format()
            ))
        })?;
        let spec = AudioSpec::new(format, decoder.channels() as u16, decoder.rate());
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(TranscodeError::Open(format!(
                "decoder reports an unusable stream layout: {}",
                spec
            )));
        }

        tracing::debug!(
            stream_index,
            codec = ?decoder.id(),
            %spec,
            "decoder: opened"
        );

        Ok(Self {
            decoder,
            input,
            stream_index,
            spec,
            draining: false,
        })
    }

    /// Container-level tags of the input (title, artist, album, ...). For
    /// MP3 input this includes the ID3v2 tag.
    pub fn metadata(&self) -> ffmpeg::Dictionary<'static> {
        self.input.metadata().to_owned()
    }

    /// Read the next packet of our stream and send it to the decoder, or
    /// send EOF once the input is exhausted.
    fn feed(&mut self) -> Result<()> {
        loop {
            let mut packet = ffmpeg::codec::packet::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    return self.decoder.send_packet(&packet).map_err(|e| {
                        TranscodeError::Decode(format!(
                            "send_packet error on stream {}: {}",
                            self.stream_index, e
                        ))
                    });
                }
                Err(ffmpeg::Error::Eof) => {
                    tracing::debug!(stream_index = self.stream_index, "decoder: input exhausted");
                    self.draining = true;
                    return match self.decoder.send_eof() {
                        Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
                        Err(e) => Err(TranscodeError::Decode(format!(
                            "send_eof error on stream {}: {}",
                            self.stream_index, e
                        ))),
                    };
                }
                Err(e) => return Err(TranscodeError::io("could not read input packet", e)),
            }
        }
    }
}

impl FrameDecoder for AudioDecoder {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn decode_next(&mut self) -> Result<Decoded> {
        loop {
            let mut frame = ffmpeg::util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Decoded::frame(frame_to_raw(&frame)?)),
                Err(ffmpeg::Error::Eof) => return Ok(Decoded::end()),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    // A drained decoder never asks for more input
                    if self.draining {
                        return Ok(Decoded::end());
                    }
                }
                Err(e) => {
                    return Err(TranscodeError::Decode(format!(
                        "receive_frame error on stream {}: {}",
                        self.stream_index, e
                    )))
                }
            }
            self.feed()?;
        }
    }
}

/// The transcoder handles exactly one stream per input file.
pub fn require_single_stream(count: usize) -> Result<()> {
    if count != 1 {
        return Err(TranscodeError::Usage(format!(
            "expected one audio input stream, but found {}",
            count
        )));
    }
    Ok(())
}
