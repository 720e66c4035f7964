use std::fs;
use std::path::{Path, PathBuf};

use crate::models::config::VideoSettings;
use crate::models::error::CaptureError;
use crate::traits::encoder_program::EncoderProgram;
use crate::traits::render_settings::{CameraPathRecorder, RenderSettings};

use super::recorder::Recorder;

/// Render settings that were overridden for the active capture.
#[derive(Debug, Clone)]
struct ActiveCapture {
    path: PathBuf,
    camera_path_file: Option<PathBuf>,
    previous_quality: Option<i32>,
    previous_super_sampling: f32,
}

/// Owns the recorder and keeps one video capture running at a time.
///
/// Starting a capture lowers render cost (quality level, headset resolution
/// scale, super-sampling) and hooks up the camera path: live captures record
/// it, offline renders play a saved one back at a fixed framerate. Stopping
/// puts every setting back.
pub struct CaptureController<P: EncoderProgram + 'static, R: RenderSettings> {
    recorder: Recorder<P>,
    render: R,
    camera_path: Option<Box<dyn CameraPathRecorder>>,
    settings: VideoSettings,
    active: Option<ActiveCapture>,
}

impl<P: EncoderProgram + 'static, R: RenderSettings> CaptureController<P, R> {
    pub fn new(recorder: Recorder<P>, render: R, settings: VideoSettings) -> Result<Self, CaptureError> {
        settings.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(Self {
            recorder,
            render,
            camera_path: None,
            settings,
            active: None,
        })
    }

    pub fn with_camera_path(mut self, camera_path: Box<dyn CameraPathRecorder>) -> Self {
        self.camera_path = Some(camera_path);
        self
    }

    /// Start capturing to `path`.
    ///
    /// The recorder is started before any render setting is touched, so a
    /// failed start leaves everything as it was.
    pub fn start_video_capture(&mut self, path: &Path, offline: bool) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CaptureError::storage("failed to start video capture", e))?;
        }

        let sample_rate = self.settings.audio_sample_rate.unwrap_or(0);
        let capture_audio = self.settings.audio_sample_rate.is_some();
        let fps = if offline { self.settings.offline_fps } else { self.settings.fps };
        self.recorder.start_capture(path, sample_rate, capture_audio, offline, fps)?;

        let previous_quality = self.settings.debug_quality_level.map(|level| {
            let previous = self.render.quality_level();
            self.render.set_quality_level(level);
            previous
        });
        self.render.set_hmd_resolution_scale(self.settings.resolution_scale);
        let previous_super_sampling = self.render.super_sampling();
        self.render.set_super_sampling(self.settings.capture_super_sampling);

        let mut camera_path_file = None;
        if offline {
            self.recorder.set_capture_framerate(self.settings.offline_fps.round() as u32);
            self.start_camera_path_playback();
        } else if let Some(camera_path) = self.camera_path.as_mut() {
            camera_path.start_recording();
            camera_path_file = Some(path.with_extension(&self.settings.camera_path_extension));
        }

        log::info!("Video capture started: {}{}", path.display(), if offline { " (offline)" } else { "" });
        self.active = Some(ActiveCapture {
            path: path.to_path_buf(),
            camera_path_file,
            previous_quality,
            previous_super_sampling,
        });
        Ok(())
    }

    fn start_camera_path_playback(&mut self) {
        let Some(camera_path) = self.camera_path.as_mut() else {
            return;
        };
        let Some(source) = self.settings.camera_path_to_render.as_deref() else {
            log::warn!("Offline render without a camera path to play back");
            return;
        };
        if let Err(err) = camera_path.start_playback(source) {
            log::warn!("Failed to load camera path {}: {}", source.display(), err);
        }
    }

    /// Stop the active capture, restoring render settings.
    ///
    /// With `save`, the recording is finalized in the background and a
    /// recorded camera path is written next to it.
    pub fn stop_video_capture(&mut self, save: bool) -> Result<(), CaptureError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        if let Some(level) = active.previous_quality {
            self.render.set_quality_level(level);
        }
        self.render.set_hmd_resolution_scale(1.0);
        self.render.set_super_sampling(active.previous_super_sampling);

        let stopped = self.recorder.stop_capture(save);

        if let Some(camera_path) = self.camera_path.as_mut() {
            let was_recording = camera_path.is_recording();
            camera_path.stop();
            if was_recording && save && self.settings.save_camera_path {
                if let Some(file) = active.camera_path_file.as_deref() {
                    if let Err(err) = camera_path.save(file) {
                        log::error!("Failed to save camera path {}: {}", file.display(), err);
                    }
                }
            }
        }

        log::info!("Video capture stopped: {}", active.path.display());
        stopped
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    pub fn recorder(&self) -> &Recorder<P> {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder<P> {
        &mut self.recorder
    }

    pub fn render_settings(&self) -> &R {
        &self.render
    }
}
