use std::path::Path;

use crate::models::error::CaptureError;

/// Render knobs the controller adjusts while a capture is running.
pub trait RenderSettings: Send {
    fn quality_level(&self) -> i32;
    fn set_quality_level(&mut self, level: i32);

    /// Supersampling factor for the captured image.
    fn super_sampling(&self) -> f32;
    fn set_super_sampling(&mut self, factor: f32);

    /// Headset eye-texture resolution scale.
    fn hmd_resolution_scale(&self) -> f32;
    fn set_hmd_resolution_scale(&mut self, scale: f32);
}

/// Records a camera path during live capture, or plays one back for offline renders.
pub trait CameraPathRecorder: Send {
    fn start_recording(&mut self);

    /// Load `path` and start playing it back.
    fn start_playback(&mut self, path: &Path) -> Result<(), CaptureError>;

    /// Stop recording or playback.
    fn stop(&mut self);

    fn is_recording(&self) -> bool;

    /// Write the recorded path to `path`.
    fn save(&mut self, path: &Path) -> Result<(), CaptureError>;
}
