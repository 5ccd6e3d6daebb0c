//! FFmpeg module - library initialization, log forwarding and the small set
//! of unsafe helpers the transcoding adapters need.

pub mod helpers;

pub use ffmpeg_next as ffmpeg;

use crate::error::{Result, TranscodeError};

/// Initialize the FFmpeg library.
///
/// Must be called once at startup before any adapter is opened.
pub fn init() -> Result<()> {
    ffmpeg::init().map_err(|e| TranscodeError::Init(format!("ffmpeg::init() failed: {}", e)))?;

    tracing::info!("FFmpeg initialized");

    Ok(())
}

/// Route FFmpeg's own log output through `tracing`.
///
/// Messages at `AV_LOG_WARNING` and above are forwarded with the matching
/// tracing level under the `ffmpeg` target. Known-benign messages are
/// dropped.
///
/// Must be called after `init()` and before any other thread touches FFmpeg,
/// because the log callback is global state.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state; the transcoder is
    // single-threaded and calls this once at startup.
    unsafe {
        ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_WARNING as i32);
        ffmpeg::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that carry no information for a single-file transcode.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Estimating duration from bitrate, this may be inaccurate",
    "Could not update timestamps for skipped samples",
    "Could not update timestamps for discarded samples",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg::ffi::va_list,
) {
    use std::ffi::CStr;

    if level > unsafe { ffmpeg::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() || SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s)) {
        return;
    }

    if level <= ffmpeg::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg::ffi::AV_LOG_WARNING as std::ffi::c_int {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg::ffi::AV_LOG_INFO as std::ffi::c_int {
        tracing::info!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::debug!(target: "ffmpeg", "{}", msg);
    }
}

/// Get FFmpeg version information
pub fn version_info() -> String {
    let version = unsafe { ffmpeg::ffi::avcodec_version() };
    format!(
        "libavcodec {}.{}.{}",
        version >> 16,
        (version >> 8) & 0xff,
        version & 0xff
    )
}
