//! Test doubles: a `/bin/sh` stand-in for the encoder.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::media::StreamMode;
use crate::traits::encoder_program::{EncodeJob, EncoderProgram};

/// Unique path under the system temp directory.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vcc_{}_{}", uuid::Uuid::new_v4().simple(), name))
}

/// Encoder that copies bytes with `cat`: stdin to the output file when
/// encoding, the input file to stdout when decoding, and both inputs into the
/// output when muxing.
#[derive(Debug, Clone)]
pub struct ShellProgram {
    executable: PathBuf,
    encode: String,
    decode: String,
    mux: String,
}

impl ShellProgram {
    pub fn new() -> Self {
        Self {
            executable: PathBuf::from("/bin/sh"),
            encode: r#"exec cat > "$1""#.into(),
            decode: r#"exec cat "$1""#.into(),
            mux: r#"cat "$1" "$2" > "$3""#.into(),
        }
    }

    /// Never reads its input and never exits on its own.
    pub fn stuck() -> Self {
        Self {
            encode: "exec sleep 30".into(),
            decode: "exec sleep 30".into(),
            mux: "exec sleep 30".into(),
            ..Self::new()
        }
    }

    /// Prints `message` to stderr and exits with an error.
    pub fn failing(message: &str) -> Self {
        let script = format!("echo '{}' >&2; exit 1", message);
        Self {
            encode: script.clone(),
            decode: script.clone(),
            mux: script,
            ..Self::new()
        }
    }

    pub fn missing() -> Self {
        Self {
            executable: PathBuf::from("/nonexistent/encoder"),
            ..Self::new()
        }
    }

    /// Waits `secs` before it starts reading its input.
    pub fn slow_start(secs: f32) -> Self {
        Self {
            encode: format!(r#"sleep {}; exec cat > "$1""#, secs),
            ..Self::new()
        }
    }

    /// Keeps running for `secs` after its input closes.
    pub fn slow_exit(secs: f32) -> Self {
        Self {
            encode: format!(r#"cat > "$1"; sleep {}"#, secs),
            ..Self::new()
        }
    }
}

impl Default for ShellProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderProgram for ShellProgram {
    fn executable(&self) -> Result<PathBuf, CaptureError> {
        Ok(self.executable.clone())
    }

    fn args(&self, job: &EncodeJob) -> Vec<OsString> {
        let (script, arg) = match job.mode {
            StreamMode::VideoEncode | StreamMode::AudioEncode => (&self.encode, &job.output),
            StreamMode::VideoDecode => (&self.decode, &job.input),
        };
        vec!["-c".into(), script.into(), "sh".into(), arg.into()]
    }

    fn mux_args(&self, audio: &Path, video: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-c".into(),
            self.mux.as_str().into(),
            "sh".into(),
            audio.into(),
            video.into(),
            output.into(),
        ]
    }
}
