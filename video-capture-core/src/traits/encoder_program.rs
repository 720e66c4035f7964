use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::models::error::CaptureError;
use crate::models::media::{FrameSize, StreamMode};

/// One invocation of the encoder: what flows through the pipe and where.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub mode: StreamMode,
    /// Input: `pipe:0` when encoding, a file path when decoding.
    pub input: String,
    /// Output: a file path when encoding, `pipe:1` when decoding.
    pub output: String,
    pub size: FrameSize,
    /// Frames per second for video, samples per second for audio.
    pub rate: f64,
}

impl EncodeJob {
    pub fn encode_video(output: &Path, size: FrameSize, fps: f64) -> Self {
        Self {
            mode: StreamMode::VideoEncode,
            input: StreamMode::VideoEncode.pipe_endpoint().into(),
            output: output.to_string_lossy().into_owned(),
            size,
            rate: fps,
        }
    }

    pub fn encode_audio(output: &Path, sample_rate: u32) -> Self {
        Self {
            mode: StreamMode::AudioEncode,
            input: StreamMode::AudioEncode.pipe_endpoint().into(),
            output: output.to_string_lossy().into_owned(),
            size: FrameSize::new(0, 0),
            rate: sample_rate as f64,
        }
    }

    pub fn decode_video(input: &Path, size: FrameSize, fps: f64) -> Self {
        Self {
            mode: StreamMode::VideoDecode,
            input: input.to_string_lossy().into_owned(),
            output: StreamMode::VideoDecode.pipe_endpoint().into(),
            size,
            rate: fps,
        }
    }

    /// The file this job produces, if any.
    pub fn output_file(&self) -> Option<&str> {
        if self.mode.is_reading() {
            None
        } else {
            Some(&self.output)
        }
    }
}

/// An external encoder executable and how to talk to it.
///
/// The core never names a concrete encoder; backends implement this trait
/// and the recorder is generic over it.
pub trait EncoderProgram: Send + Sync {
    /// Locate the executable.
    fn executable(&self) -> Result<PathBuf, CaptureError>;

    /// Arguments for a streaming job.
    fn args(&self, job: &EncodeJob) -> Vec<OsString>;

    /// Arguments for a stream-copy merge of `audio` and `video` into `output`.
    fn mux_args(&self, audio: &Path, video: &Path, output: &Path) -> Vec<OsString>;

    /// Platform tweaks applied before spawning (console flags and the like).
    fn configure(&self, _command: &mut Command) {}
}
