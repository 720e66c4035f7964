use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use video_capture_core::{CaptureError, EncodeJob, EncoderProgram, StreamMode};

use crate::codec::VideoCodec;
use crate::locate;

/// How ffmpeg is found and invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegOptions {
    /// Use this executable instead of searching for one.
    pub executable: Option<PathBuf>,

    /// Application root holding the bundled copy (default: current directory).
    pub root: Option<PathBuf>,

    pub codec: VideoCodec,

    /// Flip frames vertically, for renderers that read back bottom-up (default: false).
    pub vflip: bool,

    /// Encoder threads for video (default: 8).
    pub threads: u32,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            executable: None,
            root: None,
            codec: VideoCodec::H264,
            vflip: false,
            threads: 8,
        }
    }
}

/// [`EncoderProgram`] backed by the ffmpeg command line tool.
///
/// Video is piped in as raw `rgba` and encoded to yuv420p, audio as
/// interleaved stereo `f32le` encoded to AAC. Decoding emits raw `rgba`
/// without audio.
#[derive(Debug, Clone, Default)]
pub struct FfmpegProgram {
    options: FfmpegOptions,
}

impl FfmpegProgram {
    pub fn new(options: FfmpegOptions) -> Self {
        Self { options }
    }

    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self::new(FfmpegOptions {
            executable: Some(path.into()),
            ..FfmpegOptions::default()
        })
    }

    pub fn options(&self) -> &FfmpegOptions {
        &self.options
    }

    fn flip_args(&self, args: &mut Vec<OsString>) {
        if self.options.vflip {
            args.extend(["-vf".into(), "vflip".into()]);
        }
    }
}

fn os(s: impl AsRef<std::ffi::OsStr>) -> OsString {
    s.as_ref().to_os_string()
}

impl EncoderProgram for FfmpegProgram {
    fn executable(&self) -> Result<PathBuf, CaptureError> {
        let root = match &self.options.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().unwrap_or_default(),
        };
        locate::locate(self.options.executable.as_deref(), &root)
    }

    fn args(&self, job: &EncodeJob) -> Vec<OsString> {
        let rate = job.rate.to_string();
        let (rate, input, output) = (rate.as_str(), job.input.as_str(), job.output.as_str());
        let mut args = Vec::new();
        match job.mode {
            StreamMode::VideoEncode => {
                args.extend(
                    ["-y", "-r", rate, "-f", "rawvideo", "-codec", "rawvideo", "-s"]
                        .into_iter()
                        .map(os),
                );
                args.push(os(format!("{}x{}", job.size.width, job.size.height)));
                args.extend(["-pixel_format", "rgba", "-i", input].into_iter().map(os));
                self.flip_args(&mut args);
                args.extend(["-r", rate, "-threads"].into_iter().map(os));
                args.push(os(self.options.threads.max(1).to_string()));
                args.push(os("-c:v"));
                args.extend(self.options.codec.encoder_args().iter().map(os));
                args.extend(["-pix_fmt", "yuv420p", output].into_iter().map(os));
            }
            StreamMode::AudioEncode => {
                args.extend(
                    [
                        "-y", "-f", "f32le", "-acodec", "pcm_f32le", "-ar", rate, "-ac", "2", "-i", input, "-ar",
                        rate, "-c:a", "aac", output,
                    ]
                    .into_iter()
                    .map(os),
                );
            }
            StreamMode::VideoDecode => {
                args.extend(["-i", input, "-an"].into_iter().map(os));
                self.flip_args(&mut args);
                args.extend(["-f", "rawvideo", "-pix_fmt", "rgba", output].into_iter().map(os));
            }
        }
        args
    }

    fn mux_args(&self, audio: &Path, video: &Path, output: &Path) -> Vec<OsString> {
        vec![
            os("-y"),
            os("-i"),
            os(audio),
            os("-i"),
            os(video),
            os("-c:v"),
            os("copy"),
            os("-c:a"),
            os("copy"),
            os(output),
        ]
    }

    fn configure(&self, command: &mut Command) {
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            use windows::Win32::System::Threading::CREATE_NO_WINDOW;
            command.creation_flags(CREATE_NO_WINDOW.0);
        }
        #[cfg(not(target_os = "windows"))]
        let _ = command;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_capture_core::FrameSize;

    fn joined(args: &[OsString]) -> String {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn video_encode_args() {
        let program = FfmpegProgram::default();
        let job = EncodeJob::encode_video(Path::new("out.mp4"), FrameSize::new(1920, 1080), 30.0);
        assert_eq!(
            joined(&program.args(&job)),
            "-y -r 30 -f rawvideo -codec rawvideo -s 1920x1080 -pixel_format rgba -i pipe:0 \
             -r 30 -threads 8 -c:v libx264 -preset faster -crf 23 -pix_fmt yuv420p out.mp4"
        );
    }

    #[test]
    fn flipped_video_encode_args() {
        let program = FfmpegProgram::new(FfmpegOptions {
            vflip: true,
            codec: VideoCodec::H265,
            threads: 2,
            ..FfmpegOptions::default()
        });
        let job = EncodeJob::encode_video(Path::new("clip.mkv"), FrameSize::new(640, 360), 29.97);
        assert_eq!(
            joined(&program.args(&job)),
            "-y -r 29.97 -f rawvideo -codec rawvideo -s 640x360 -pixel_format rgba -i pipe:0 -vf vflip \
             -r 29.97 -threads 2 -c:v libx265 -preset faster -crf 28 -pix_fmt yuv420p clip.mkv"
        );
    }

    #[test]
    fn audio_encode_args() {
        let job = EncodeJob::encode_audio(Path::new("out.mp4.tmp.m4a"), 48_000);
        assert_eq!(
            joined(&FfmpegProgram::default().args(&job)),
            "-y -f f32le -acodec pcm_f32le -ar 48000 -ac 2 -i pipe:0 -ar 48000 -c:a aac out.mp4.tmp.m4a"
        );
    }

    #[test]
    fn decode_args() {
        let job = EncodeJob::decode_video(Path::new("saved.mp4"), FrameSize::new(4, 2), 30.0);
        assert_eq!(
            joined(&FfmpegProgram::default().args(&job)),
            "-i saved.mp4 -an -f rawvideo -pix_fmt rgba pipe:1"
        );

        let flipped = FfmpegProgram::new(FfmpegOptions {
            vflip: true,
            ..FfmpegOptions::default()
        });
        assert_eq!(
            joined(&flipped.args(&job)),
            "-i saved.mp4 -an -vf vflip -f rawvideo -pix_fmt rgba pipe:1"
        );
    }

    #[test]
    fn mux_args_copy_both_streams() {
        let args = FfmpegProgram::default().mux_args(
            Path::new("a.m4a"),
            Path::new("v.mp4"),
            Path::new("with space.mp4"),
        );
        assert_eq!(args.last().unwrap(), &OsString::from("with space.mp4"));
        assert_eq!(
            joined(&args),
            "-y -i a.m4a -i v.mp4 -c:v copy -c:a copy with space.mp4"
        );
    }

    #[test]
    fn missing_explicit_executable() {
        let program = FfmpegProgram::with_executable("/nonexistent/ffmpeg");
        assert!(matches!(program.executable(), Err(CaptureError::ExecutableNotFound(_))));
    }

    #[test]
    fn options_from_json() {
        let options: FfmpegOptions = serde_json::from_str(r#"{"codec": "h265", "vflip": true}"#).unwrap();
        assert_eq!(options.codec, VideoCodec::H265);
        assert!(options.vflip);
        assert_eq!(options.threads, 8);
    }
}
