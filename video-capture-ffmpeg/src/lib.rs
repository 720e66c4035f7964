//! # video-capture-ffmpeg
//!
//! ffmpeg command line backend for video-capture-core.
//!
//! Provides:
//! - `FfmpegProgram`: the `EncoderProgram` that builds ffmpeg arguments for
//!   raw video encode, raw PCM encode, raw video decode, and audio/video mux
//! - `VideoCodec`: the video encoder choice
//! - `locate`: finds the ffmpeg executable (explicit path, bundled copy, `PATH`)
//!
//! ## Platform Notes
//! On Windows the encoder is spawned without a console window.
//!
//! ## Usage
//! ```ignore
//! use video_capture_core::{Recorder, RecorderConfig};
//! use video_capture_ffmpeg::FfmpegProgram;
//!
//! let mut recorder = Recorder::new(FfmpegProgram::default(), RecorderConfig::default())?;
//! recorder.start_capture(Path::new("capture.mp4"), 48_000, true, false, 30.0)?;
//! ```

pub mod codec;
pub mod locate;
pub mod program;

pub use codec::{UnknownCodec, VideoCodec};
pub use program::{FfmpegOptions, FfmpegProgram};
