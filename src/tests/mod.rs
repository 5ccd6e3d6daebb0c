//! Integration testing module
//!
//! - Scripted collaborators for the orchestrator
//! - Orchestrator scenarios: re-framing, final short frame, flush, teardown
//! - End-to-end FFmpeg transcodes of synthesized WAV input

pub mod fixtures;
