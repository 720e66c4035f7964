use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::media::FrameSize;

/// Configuration for a [`Recorder`](crate::session::recorder::Recorder).
///
/// Durations are stored in milliseconds so the struct reads cleanly from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Source frame width before resolution scaling (default: 1920).
    pub width: u32,

    /// Source frame height before resolution scaling (default: 1080).
    pub height: u32,

    /// Capture rate used when the caller does not pick one (default: 30).
    pub fps: f64,

    /// Output size multiplier, applied before rounding to even (default: 1.0).
    pub resolution_scale: f32,

    /// Byte budget of frames waiting for the encoder (default: 8 GiB).
    pub max_queue_bytes: u64,

    /// How long a new encoder is watched for an immediate exit (default: 200 ms).
    pub startup_grace_ms: u64,

    /// How long a blocking submission waits for the writer (default: 5 s).
    pub blocking_wait_ms: u64,

    /// How long a saving stop keeps draining queued frames (default: 60 s).
    pub drain_timeout_ms: u64,

    /// How long to wait for an encoder to exit before killing it (default: 20 s).
    pub exit_timeout_ms: u64,

    /// Hard limit on the audio/video mux step (default: 60 s).
    pub mux_timeout_ms: u64,

    /// How many times a recording is looped during playback (default: 3).
    pub playback_loops: u32,

    /// Decoded frames buffered ahead of the playback consumer (default: 5).
    pub playback_ring_capacity: usize,

    /// Seconds of audio held per channel (default: 4).
    pub audio_buffer_secs: u32,

    /// Container extension for the intermediate video file (default: "mp4").
    pub container: String,

    /// Write a `.metadata.json` sidecar next to saved recordings (default: true).
    pub write_metadata: bool,
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid frame size: {}x{}", self.width, self.height));
        }
        if !(self.fps > 0.0) {
            return Err(format!("fps must be positive, got {}", self.fps));
        }
        if !(self.resolution_scale > 0.0) {
            return Err(format!("resolution scale must be positive, got {}", self.resolution_scale));
        }
        if self.max_queue_bytes == 0 {
            return Err("queue budget must be non-zero".into());
        }
        if self.playback_ring_capacity == 0 {
            return Err("playback ring capacity must be non-zero".into());
        }
        if self.audio_buffer_secs == 0 {
            return Err("audio buffer must hold at least one second".into());
        }
        if self.container.is_empty() || self.container.contains(['.', '/', '\\']) {
            return Err(format!("invalid container extension: {:?}", self.container));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to parse config: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn source_size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Encoded frame size: source size scaled and rounded down to even.
    pub fn output_size(&self) -> FrameSize {
        self.source_size().scaled(self.resolution_scale)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn blocking_wait(&self) -> Duration {
        Duration::from_millis(self.blocking_wait_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    pub fn mux_timeout(&self) -> Duration {
        Duration::from_millis(self.mux_timeout_ms)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30.0,
            resolution_scale: 1.0,
            max_queue_bytes: 8 * 1024 * 1024 * 1024,
            startup_grace_ms: 200,
            blocking_wait_ms: 5_000,
            drain_timeout_ms: 60_000,
            exit_timeout_ms: 20_000,
            mux_timeout_ms: 60_000,
            playback_loops: 3,
            playback_ring_capacity: 5,
            audio_buffer_secs: 4,
            container: "mp4".into(),
            write_metadata: true,
        }
    }
}

/// Settings read by the [`CaptureController`](crate::session::controller::CaptureController).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Live capture rate (default: 30).
    pub fps: f64,

    /// Rate used for offline (camera path) renders (default: 60).
    pub offline_fps: f64,

    /// Audio sample rate, or `None` to record video only.
    pub audio_sample_rate: Option<u32>,

    /// Save the recorded camera path next to the video (default: true).
    pub save_camera_path: bool,

    /// Extension of the saved camera path file (default: "usda").
    pub camera_path_extension: String,

    /// Camera path played back during offline renders.
    pub camera_path_to_render: Option<PathBuf>,

    /// Render quality forced while capturing, or `None` to leave it alone.
    pub debug_quality_level: Option<i32>,

    /// Super-sampling factor applied while capturing (default: 2.0).
    pub capture_super_sampling: f32,

    /// Headset resolution scale applied while capturing (default: 1.0).
    pub resolution_scale: f32,
}

impl VideoSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.fps > 0.0) {
            return Err(format!("fps must be positive, got {}", self.fps));
        }
        if !(self.offline_fps > 0.0) {
            return Err(format!("offline fps must be positive, got {}", self.offline_fps));
        }
        if self.audio_sample_rate == Some(0) {
            return Err("audio sample rate must be positive".into());
        }
        if !(self.capture_super_sampling > 0.0) || !(self.resolution_scale > 0.0) {
            return Err("scale factors must be positive".into());
        }
        Ok(())
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: 30.0,
            offline_fps: 60.0,
            audio_sample_rate: Some(48_000),
            save_camera_path: true,
            camera_path_extension: "usda".into(),
            camera_path_to_render: None,
            debug_quality_level: None,
            capture_super_sampling: 2.0,
            resolution_scale: 1.0,
        }
    }
}
