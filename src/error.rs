use thiserror::Error;

/// Main error type for the transcoder
///
/// Every variant is fatal to a run: the pipeline never retries and never
/// keeps a partially written output as a success.
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// Bad command line, or an input that does not hold exactly one audio stream
    #[error("Usage error: {0}")]
    Usage(String),

    /// Failure opening the input, the output or one of the codecs
    #[error("Open error: {0}")]
    Open(String),

    /// The decoder rejected the input bitstream
    #[error("Decode error: {0}")]
    Decode(String),

    /// The resampler failed or left converted samples behind
    #[error("Resample error: {0}")]
    Resample(String),

    /// The encoder rejected a frame or failed to produce packets
    #[error("Encode error: {0}")]
    Encode(String),

    /// Read, write or seek failure on the input or output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The sample FIFO could not grow to hold the requested samples
    #[error("Out of memory: cannot buffer {requested} more samples")]
    OutOfMemory { requested: usize },

    /// More samples were read from the FIFO than it holds
    #[error("Sample FIFO underflow: requested {requested}, available {available}")]
    Underflow { requested: usize, available: usize },

    /// A frame does not have the shape its consumer was built for
    #[error("Frame layout mismatch: {0}")]
    FrameLayout(String),

    /// Invalid or unreadable configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    /// FFmpeg library initialization failed
    #[error("FFmpeg initialization failed: {0}")]
    Init(String),
}

impl TranscodeError {
    /// Wrap an FFmpeg read/write failure as an IO error.
    pub fn io(context: &str, err: impl std::fmt::Display) -> Self {
        TranscodeError::Io(std::io::Error::other(format!("{}: {}", context, err)))
    }

    /// True for internal invariant violations. These are bugs in the
    /// orchestration, never a property of the user's input.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            TranscodeError::Underflow { .. } | TranscodeError::FrameLayout(_)
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TranscodeError>;
