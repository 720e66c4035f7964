mod source;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use video_capture_core::{CaptureDelegate, CaptureError, Recorder, RecorderConfig, RecordingResult, SessionPhase};
use video_capture_ffmpeg::{FfmpegOptions, FfmpegProgram, VideoCodec};

use source::{Gradient, Tone};

/// Record a synthetic scene and a stereo tone through ffmpeg.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Destination file.
    #[arg(default_value = "synthetic.mp4")]
    output: PathBuf,

    /// Recorder configuration (JSON). Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to record.
    #[arg(long, default_value_t = 3.0)]
    seconds: f64,

    /// Capture rate; the configuration's `fps` when omitted.
    #[arg(long)]
    fps: Option<f64>,

    /// Audio sample rate.
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Record video only.
    #[arg(long)]
    no_audio: bool,

    /// Wait for the encoder instead of dropping frames.
    #[arg(long)]
    blocking: bool,

    /// ffmpeg executable; searched for when omitted.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Video codec (h.264, h.265).
    #[arg(long, default_value = "h.264")]
    codec: String,

    /// Discard the recording instead of saving it.
    #[arg(long)]
    discard: bool,
}

/// Logs recorder events.
struct LogDelegate;

impl CaptureDelegate for LogDelegate {
    fn on_state_changed(&self, phase: SessionPhase) {
        log::info!("Recorder is now {:?}", phase);
    }

    fn on_frame_dropped(&self, frames_dropped: u64) {
        log::warn!("{} frames dropped so far", frames_dropped);
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("Recorder error: {}", error);
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        log::info!(
            "Finished {} ({:.2}s, sha256 {})",
            result.file_path.display(),
            result.duration_secs,
            result.checksum
        );
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn capture_rate(args: &Args, config: &RecorderConfig) -> f64 {
    args.fps.unwrap_or(config.fps)
}

fn run(args: &Args) -> Result<(), CaptureError> {
    let config = match &args.config {
        Some(path) => RecorderConfig::from_json_file(path)?,
        None => RecorderConfig {
            width: 640,
            height: 360,
            ..RecorderConfig::default()
        },
    };
    let size = config.output_size();
    let fps = capture_rate(args, &config);

    let program = FfmpegProgram::new(FfmpegOptions {
        executable: args.ffmpeg.clone(),
        codec: VideoCodec::from_friendly_name(&args.codec),
        ..FfmpegOptions::default()
    });

    let mut recorder = Recorder::new(program, config)?;
    recorder.set_delegate(Arc::new(LogDelegate));
    recorder.start_capture(&args.output, args.sample_rate, !args.no_audio, args.blocking, fps)?;

    let mut scene = Gradient::new(size);
    let mut tone = Tone::new(args.sample_rate, 440.0);
    let started = Instant::now();
    let length = Duration::from_secs_f64(args.seconds.max(0.0));

    while started.elapsed() < length && recorder.is_capturing() {
        if recorder.capture(&scene) {
            scene.advance();
            recorder.readback();
        }
        recorder.update();

        if !args.no_audio {
            for _ in 0..tone.pending(started.elapsed().as_secs_f64()) {
                let (left, right) = tone.next_pair();
                recorder.process_audio(left, right);
            }
        }
        thread::sleep(Duration::from_millis(2));
    }

    if !recorder.is_capturing() {
        log::warn!("Encoder stopped early");
    }
    let diagnostics = recorder.diagnostics();
    recorder.stop_capture(!args.discard)?;
    recorder.wait_for_background_tasks();

    log::info!(
        "Captured {} frames, {} dropped, {} overwritten",
        diagnostics.frames_captured,
        diagnostics.frames_dropped,
        diagnostics.frames_overwritten
    );

    if let Some(result) = recorder.last_result() {
        let json = serde_json::to_string_pretty(&result.metadata)
            .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
        println!("{}", json);
    }
    Ok(())
}
