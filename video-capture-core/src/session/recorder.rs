use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::models::config::RecorderConfig;
use crate::models::error::CaptureError;
use crate::models::media::{CaptureDiagnostics, FrameRate, FrameSize, Rgba};
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionPhase;
use crate::process::encoder_process::{EncoderProcess, PipeOptions, ReleaseCallback};
use crate::processing::frame::{Frame, FramePool};
use crate::processing::pending_queue::PendingFrameQueue;
use crate::processing::stereo_buffer::StereoBuffer;
use crate::storage::output_files::OutputFiles;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::encoder_program::{EncodeJob, EncoderProgram};
use crate::traits::frame_source::FrameSource;

use super::clock::SyncClock;
use super::finalize::Finalizer;

/// Real-time capture pipeline.
///
/// Generic over the encoder backend via `EncoderProgram`. Drives one encoder
/// for video and optionally one for audio while capturing, and a decoder for
/// loop playback of the last saved recording.
///
/// Per render tick the host calls:
/// ```text
/// should_capture? → capture(source) → readback() → post_capture()
///                                              (or update(), which also starts playback)
/// ```
/// and feeds audio with `process_audio(left, right)` from its audio thread
/// loop. Frames travel:
/// ```text
/// [FrameSource] → staging → [FramePool frame] → [PendingFrameQueue] → [EncoderProcess] → file
/// ```
/// Stopping hands the encoders to a background thread that drains, muxes, or
/// deletes, so a new capture can start right away.
pub struct Recorder<P: EncoderProgram + 'static> {
    program: Arc<P>,
    config: RecorderConfig,
    pool: Arc<FramePool>,
    delegate: Option<Arc<dyn CaptureDelegate>>,

    video: EncoderProcess,
    audio: EncoderProcess,
    reader: EncoderProcess,

    phase: SessionPhase,
    clock: SyncClock,
    files: Option<OutputFiles>,
    output_size: FrameSize,
    blocking: bool,

    // Capture
    staging: Vec<Rgba>,
    texture_pending: bool,
    ready_frame: Option<Frame>,
    pending: PendingFrameQueue,
    video_frame_count: i64,
    last_video_frame: i64,
    frames_submitted: u64,
    forced_framerate: u32,

    // Audio
    audio_buffer: StereoBuffer,
    capturing_audio: bool,
    audio_sample_rate: u32,
    next_audio_frame: i64,
    audio_frame_count: i64,
    audio_frames_required: i64,

    // Playback
    playback_requested: bool,
    playback_loops: u32,
    playback_cur_frame: i64,
    playback_frame_count: i64,
    playback_path: Option<PathBuf>,

    // Background finalization
    saving: Arc<AtomicUsize>,
    last_result: Arc<Mutex<Option<RecordingResult>>>,
    background: Vec<JoinHandle<()>>,
}

impl<P: EncoderProgram + 'static> Recorder<P> {
    pub fn new(program: P, config: RecorderConfig) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let pending = PendingFrameQueue::new(config.max_queue_bytes);
        let audio_buffer = StereoBuffer::with_capacity_secs(config.audio_buffer_secs);
        let output_size = config.output_size();
        Ok(Self {
            program: Arc::new(program),
            config,
            pool: Arc::new(FramePool::new()),
            delegate: None,
            video: EncoderProcess::new(),
            audio: EncoderProcess::new(),
            reader: EncoderProcess::new(),
            phase: SessionPhase::Idle,
            clock: SyncClock::default(),
            files: None,
            output_size,
            blocking: false,
            staging: Vec::new(),
            texture_pending: false,
            ready_frame: None,
            pending,
            video_frame_count: 0,
            last_video_frame: -1,
            frames_submitted: 0,
            forced_framerate: 0,
            audio_buffer,
            capturing_audio: false,
            audio_sample_rate: 0,
            next_audio_frame: 1,
            audio_frame_count: 0,
            audio_frames_required: 0,
            playback_requested: false,
            playback_loops: 0,
            playback_cur_frame: 0,
            playback_frame_count: 0,
            playback_path: None,
            saving: Arc::new(AtomicUsize::new(0)),
            last_result: Arc::new(Mutex::new(None)),
            background: Vec::new(),
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect at the next capture.
    pub fn set_config(&mut self, config: RecorderConfig) -> Result<(), CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        self.config = config;
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Start recording to `path`.
    ///
    /// The destination is created immediately and removed again if an encoder
    /// fails to start. With `capture_audio`, video and
    /// audio go to temporary files that are muxed into `path` on save. In
    /// `blocking` mode frame submission waits for the encoder instead of
    /// overwriting frames it has not taken yet.
    pub fn start_capture(
        &mut self,
        path: &Path,
        audio_sample_rate: u32,
        capture_audio: bool,
        blocking: bool,
        fps: f64,
    ) -> Result<(), CaptureError> {
        if self.phase.is_capturing() {
            return Err(CaptureError::AlreadyActive);
        }
        if !(fps > 0.0) {
            return Err(CaptureError::ConfigurationFailed(format!("fps must be positive, got {}", fps)));
        }
        if capture_audio && audio_sample_rate == 0 {
            return Err(CaptureError::ConfigurationFailed("audio capture needs a sample rate".into()));
        }
        if self.phase.is_playing_back() {
            self.stop_playback();
        }

        let rate = FrameRate::from_fps(fps);
        if capture_audio {
            self.audio_buffer.set_sample_rates(rate, audio_sample_rate);
        }
        self.audio_buffer.clear();
        self.next_audio_frame = 1;
        self.last_video_frame = -1;
        self.audio_frame_count = 0;
        self.audio_frames_required = 0;

        self.texture_pending = false;
        if let Some(frame) = self.ready_frame.take() {
            self.pool.release(frame);
        }
        self.video_frame_count = 0;
        self.frames_submitted = 0;
        for frame in self.pending.reset(self.config.max_queue_bytes) {
            self.pool.release(frame);
        }

        self.output_size = self.config.output_size();
        self.pool.retain_size(self.output_size);

        let files = OutputFiles::new(path, &self.config.container, capture_audio);
        files.claim()?;

        let options = PipeOptions {
            blocking,
            blocking_wait: self.config.blocking_wait(),
            ring_capacity: self.config.playback_ring_capacity,
            startup_grace: self.config.startup_grace(),
        };

        let mut video = EncoderProcess::new();
        video.set_release_callback(self.pool_release());
        if let Err(err) = video.start(
            self.program.as_ref(),
            &EncodeJob::encode_video(&files.video, self.output_size, rate.as_f64()),
            options,
        ) {
            log::error!("Video encoder failed to start: {}", err);
            if let Err(cleanup) = files.remove_all() {
                log::warn!("{}", cleanup);
            }
            return Err(err);
        }

        let mut audio = EncoderProcess::new();
        if let Some(audio_path) = files.audio.clone() {
            audio.set_release_callback(self.pool_release());
            if let Err(err) = audio.start(
                self.program.as_ref(),
                &EncodeJob::encode_audio(&audio_path, audio_sample_rate),
                options,
            ) {
                log::error!("Audio encoder failed to start: {}", err);
                let job = self.finalizer(files, video, audio);
                self.spawn_background(move || job.remove());
                return Err(err);
            }
        }

        log::info!(
            "Capturing {} at {} fps, {}{}",
            path.display(),
            rate,
            self.output_size,
            if capture_audio { " with audio" } else { "" }
        );

        self.video = video;
        self.audio = audio;
        self.files = Some(files);
        self.blocking = blocking;
        self.capturing_audio = capture_audio;
        self.audio_sample_rate = audio_sample_rate;
        self.staging = vec![Rgba::default(); self.output_size.pixel_count()];
        self.clock.start(rate);
        self.set_phase(SessionPhase::Capturing);
        Ok(())
    }

    fn pool_release(&self) -> ReleaseCallback {
        let pool = Arc::clone(&self.pool);
        Arc::new(move |frame: Frame| {
            pool.release(frame);
        })
    }

    /// Stop recording.
    ///
    /// With `save`, queued frames are drained into the encoder and the streams
    /// are muxed into the destination on a background thread. Without it, the
    /// encoders are stopped and every output file is deleted once they exit.
    pub fn stop_capture(&mut self, save: bool) -> Result<(), CaptureError> {
        if self.phase.is_playing_back() {
            log::warn!("Stopping video reader");
            self.stop_playback();
        }
        self.set_capture_framerate(0);
        if !self.phase.is_capturing() {
            return Ok(());
        }

        let Some(files) = self.files.take() else {
            return Err(CaptureError::InvalidState("capturing without output files".into()));
        };
        let video = std::mem::take(&mut self.video);
        let audio = std::mem::take(&mut self.audio);

        self.texture_pending = false;
        if let Some(frame) = self.ready_frame.take() {
            self.pool.release(frame);
        }
        let pending = self.pending.take_all();
        self.playback_frame_count = self.video_frame_count;

        let mut job = self.finalizer(files, video, audio);
        if !save {
            for frame in pending {
                self.pool.release(frame);
            }
            log::info!("Discarding {}", job.files.primary.display());
            self.spawn_background(move || job.remove());
        } else {
            self.playback_path = Some(job.files.primary.clone());
            job.begin_save();
            if pending.is_empty() {
                self.spawn_background(move || job.join());
            } else {
                self.spawn_background(move || job.drain_and_join(pending));
            }
        }

        self.clock.stop();
        self.staging = Vec::new();
        self.capturing_audio = false;
        self.set_phase(SessionPhase::Idle);
        Ok(())
    }

    /// Hand a stopped session's resources to a finalizer.
    fn finalizer(&self, files: OutputFiles, video: EncoderProcess, audio: EncoderProcess) -> Finalizer<P> {
        Finalizer {
            program: Arc::clone(&self.program),
            config: self.config.clone(),
            files,
            video,
            audio,
            pool: Arc::clone(&self.pool),
            saving: Arc::clone(&self.saving),
            last_result: Arc::clone(&self.last_result),
            delegate: self.delegate.clone(),
            size: self.output_size,
            fps: self.clock.rate().as_f64(),
            audio_sample_rate: self.capturing_audio.then_some(self.audio_sample_rate),
            frames_dropped: self.pending.dropped(),
            saving_guard: None,
        }
    }

    fn spawn_background<F>(&mut self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.background.retain(|h| !h.is_finished());
        match thread::Builder::new().name("recorder-finalize".into()).spawn(task) {
            Ok(handle) => self.background.push(handle),
            Err(e) => {
                log::error!("Failed to spawn finalize thread: {}", e);
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(&CaptureError::io("failed to spawn finalize thread", e));
                }
            }
        }
    }

    /// Whether a frame should be captured this tick.
    ///
    /// True once per real-time frame index, or every tick while a capture
    /// framerate is forced.
    pub fn should_capture(&self) -> bool {
        if !self.phase.is_capturing() {
            return false;
        }
        self.real_time_frame_count() != self.last_video_frame || self.forced_framerate != 0
    }

    /// Copy the current image from `source` into staging if this tick is due.
    pub fn capture<S: FrameSource + ?Sized>(&mut self, source: &S) -> bool {
        let do_capture = self.should_capture();
        self.last_video_frame = self.real_time_frame_count();
        if !do_capture {
            return false;
        }

        source.copy_pixels(&mut self.staging, self.output_size);
        self.texture_pending = true;
        self.video_frame_count += 1;
        true
    }

    /// Move the staged image into a pooled frame, ready to be queued.
    pub fn readback(&mut self) {
        if !self.texture_pending {
            return;
        }
        let mut frame = self.pool.checkout_pixels(self.output_size);
        if let Some(pixels) = frame.as_pixels_mut() {
            pixels.copy_from_slice(&self.staging);
        }
        if let Some(stale) = self.ready_frame.replace(frame) {
            self.pool.release(stale);
        }
        self.texture_pending = false;
    }

    /// Queue the ready frame (if any) and feed the encoder when it is free.
    pub fn post_capture(&mut self) {
        let ready = self.video.is_ready_for_input();

        let frame = if self.phase.is_capturing() { self.ready_frame.take() } else { None };
        if let Some(frame) = frame {
            if let Err(frame) = self.pending.push(frame) {
                log::warn!("Dropped frame [{}], buffer overflow", self.video_frame_count);
                self.pool.release(frame);
                if let Some(delegate) = &self.delegate {
                    delegate.on_frame_dropped(self.pending.dropped());
                }
            }
        }

        if ready {
            self.submit_next_frame();
        }
    }

    fn submit_next_frame(&mut self) {
        let Some(frame) = self.pending.pop() else {
            return;
        };
        self.frames_submitted += 1;
        if let Some(displaced) = self.video.queue_frame(frame) {
            self.pool.release(displaced);
        }
    }

    /// Feed one stereo sample pair and emit any audio window now due.
    pub fn process_audio(&mut self, left: f32, right: f32) {
        if !self.phase.is_capturing() || !self.capturing_audio {
            return;
        }
        self.audio_buffer.add(left, right);
        self.capture_audio();
    }

    fn capture_audio(&mut self) {
        if self.audio_frame_count < self.video_frame_count {
            self.audio_frames_required += 1;
            self.audio_frame_count += 1;
        }
        if self.audio_frames_required == 0 {
            return;
        }

        let cur_frame = self.next_audio_frame;
        let real_time = self.real_time_frame_count();
        if real_time - self.next_audio_frame > 4 {
            self.next_audio_frame = real_time - 1;
        }

        if self.audio_buffer.is_frame_ready(cur_frame) {
            let samples = self.audio_buffer.pop_frame(cur_frame);
            let mut frame = self.pool.checkout_samples(samples.len());
            frame.set_samples(samples);
            if let Some(displaced) = self.audio.queue_frame(frame) {
                self.pool.release(displaced);
            }
            self.audio_frames_required -= 1;
            self.next_audio_frame += 1;
        }
    }

    /// Ask for the last saved recording to be played back.
    ///
    /// Playback starts from [`update`](Self::update) once nothing is capturing or saving.
    pub fn request_playback(&mut self) {
        self.playback_requested = true;
        self.playback_loops = 0;
    }

    /// Per-tick housekeeping: feeds the encoder and starts requested playback.
    pub fn update(&mut self) {
        self.post_capture();

        if self.playback_requested && !self.is_saving() && !self.phase.is_capturing() {
            self.playback_requested = false;
            self.start_playback_reader();
        }
    }

    fn start_playback_reader(&mut self) {
        self.playback_cur_frame = 0;

        if self.playback_loops >= self.config.playback_loops {
            self.set_phase(SessionPhase::Idle);
            return;
        }
        let Some(path) = self.playback_path.clone() else {
            log::warn!("Nothing recorded to play back");
            return;
        };
        self.playback_loops += 1;

        if let Err(err) = self.reader.wait_for_exit(self.config.exit_timeout()) {
            log::warn!("Previous playback reader did not exit cleanly: {}", err);
        }
        let rate = self.clock.rate();
        let options = PipeOptions {
            blocking: false,
            blocking_wait: self.config.blocking_wait(),
            ring_capacity: self.config.playback_ring_capacity,
            startup_grace: self.config.startup_grace(),
        };
        match self.reader.start(
            self.program.as_ref(),
            &EncodeJob::decode_video(&path, self.output_size, rate.as_f64()),
            options,
        ) {
            Ok(()) => {
                self.clock.start(rate);
                self.set_phase(SessionPhase::PlayingBack);
            }
            Err(err) => {
                log::error!("Playback failed to start: {}", err);
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(&err);
                }
                self.set_phase(SessionPhase::Idle);
            }
        }
    }

    /// The next decoded frame, if one is due on the playback clock.
    ///
    /// Restarts the decoder at the end of each loop until `playback_loops`
    /// loops have played. Hand frames back with
    /// [`recycle_playback_frame`](Self::recycle_playback_frame).
    pub fn playback_frame(&mut self) -> Option<Frame> {
        if !self.phase.is_playing_back() {
            return None;
        }
        if self.reader.did_exit() && self.reader.decoded_len() == 0 {
            self.start_playback_reader();
            if !self.phase.is_playing_back() {
                return None;
            }
        }
        if self.playback_cur_frame >= self.real_time_frame_count() {
            return None;
        }

        let frame = self.reader.next_frame()?;
        if frame.is_empty() {
            log::warn!("No data.");
            self.reader.recycle(frame);
            return None;
        }
        self.playback_cur_frame += 1;
        Some(frame)
    }

    pub fn recycle_playback_frame(&self, frame: Frame) {
        self.reader.recycle(frame);
    }

    pub fn stop_playback(&mut self) {
        self.playback_requested = false;
        if !self.phase.is_playing_back() {
            return;
        }
        self.set_phase(SessionPhase::Idle);
        if let Err(err) = self.reader.wait_for_exit(self.config.exit_timeout()) {
            log::warn!("Playback reader did not exit cleanly: {}", err);
        }
    }

    /// Force a fixed capture rate: every tick captures a frame. Zero turns it off.
    pub fn set_capture_framerate(&mut self, framerate: u32) {
        self.forced_framerate = framerate;
    }

    pub fn capture_framerate(&self) -> u32 {
        self.forced_framerate
    }

    /// Frames captured this session, including frames dropped later.
    pub fn frame_count(&self) -> i64 {
        self.video_frame_count
    }

    /// Frame index due now on the session clock (or the capture count when forced).
    pub fn real_time_frame_count(&self) -> i64 {
        if self.forced_framerate != 0 {
            self.video_frame_count
        } else {
            self.clock.frame_index()
        }
    }

    /// How far captured frames lag behind real time.
    pub fn video_delay_frame_count(&self) -> i64 {
        self.real_time_frame_count() - self.video_frame_count
    }

    /// Frames handed to the video encoder this session.
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn dropped_frames(&self) -> u64 {
        self.pending.dropped()
    }

    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// True while capturing and the video writer is still alive.
    pub fn is_capturing(&self) -> bool {
        self.phase.is_capturing() && !self.video.did_exit()
    }

    pub fn is_capturing_audio(&self) -> bool {
        self.is_capturing() && self.capturing_audio
    }

    /// True while a stopped session is still being drained or muxed.
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst) > 0
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn is_playing_back(&self) -> bool {
        self.phase.is_playing_back()
    }

    pub fn playback_frame_count(&self) -> i64 {
        self.playback_cur_frame
    }

    /// Fraction of the current playback loop shown so far.
    pub fn playback_percent(&self) -> f32 {
        if self.playback_frame_count == 0 {
            return 1.0;
        }
        self.playback_cur_frame as f32 / self.playback_frame_count as f32
    }

    /// Result of the most recent successful save.
    pub fn last_result(&self) -> Option<RecordingResult> {
        self.last_result.lock().clone()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        CaptureDiagnostics {
            frames_captured: self.video_frame_count.max(0) as u64,
            frames_written: self.video.frames_written(),
            frames_dropped: self.pending.dropped(),
            frames_overwritten: self.video.frames_overwritten(),
            audio_frames_written: self.audio.frames_written(),
            pending_frames: self.pending.len(),
            pending_bytes: self.pending.bytes(),
        }
    }

    /// Block until every background drain, mux, or delete has finished.
    pub fn wait_for_background_tasks(&mut self) {
        for handle in self.background.drain(..) {
            if handle.join().is_err() {
                log::error!("finalize thread panicked");
            }
        }
    }

    /// Save an active capture (or stop playback) and wait for finalization.
    pub fn shutdown(&mut self) -> Result<(), CaptureError> {
        let result = if self.phase.is_capturing() {
            self.stop_capture(true)
        } else {
            self.stop_playback();
            Ok(())
        };
        self.wait_for_background_tasks();
        result
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase == phase {
            return;
        }
        self.phase = phase;
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(phase);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::sync::atomic::AtomicU64;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::storage::metadata::metadata_path;
    use crate::storage::output_files::sha256_file;
    use crate::testing::{temp_path, ShellProgram};
    use crate::traits::frame_source::PixelBuffer;

    #[derive(Default)]
    struct Events {
        phases: Mutex<Vec<SessionPhase>>,
        dropped: AtomicU64,
        finished: Mutex<Vec<RecordingResult>>,
        errors: Mutex<Vec<String>>,
    }

    impl CaptureDelegate for Events {
        fn on_state_changed(&self, phase: SessionPhase) {
            self.phases.lock().push(phase);
        }

        fn on_frame_dropped(&self, frames_dropped: u64) {
            self.dropped.store(frames_dropped, Ordering::SeqCst);
        }

        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.to_string());
        }

        fn on_capture_finished(&self, result: &RecordingResult) {
            self.finished.lock().push(result.clone());
        }
    }

    fn config(width: u32, height: u32) -> RecorderConfig {
        RecorderConfig {
            width,
            height,
            exit_timeout_ms: 5_000,
            drain_timeout_ms: 5_000,
            mux_timeout_ms: 5_000,
            playback_loops: 1,
            startup_grace_ms: 50,
            ..RecorderConfig::default()
        }
    }

    fn tick<P: EncoderProgram + 'static>(recorder: &mut Recorder<P>, value: u8) {
        let size = recorder.config().output_size();
        let source = PixelBuffer::filled(size, Rgba::new(value, 0, 0, 255));
        assert!(recorder.capture(&source));
        recorder.readback();
        recorder.post_capture();
    }

    fn cleanup(path: &Path) {
        let _ = fs::remove_file(path);
        let _ = fs::remove_file(metadata_path(path));
    }

    #[test]
    fn saves_video_in_capture_order() {
        let path = temp_path("video.mp4");
        let events = Arc::new(Events::default());
        let mut recorder = Recorder::new(ShellProgram::new(), config(4, 2)).unwrap();
        recorder.set_delegate(events.clone());

        recorder.start_capture(&path, 0, false, false, 30.0).unwrap();
        assert!(path.exists());
        recorder.set_capture_framerate(30);
        for i in 0..3 {
            tick(&mut recorder, i);
        }
        assert_eq!(recorder.frame_count(), 3);

        recorder.stop_capture(true).unwrap();
        assert!(recorder.is_saving());
        recorder.wait_for_background_tasks();
        assert!(!recorder.is_saving());

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 3 * 32);
        for i in 0..3 {
            assert_eq!(bytes[i * 32], i as u8);
        }

        let result = recorder.last_result().unwrap();
        assert_eq!(result.frames_written, 3);
        assert_eq!(result.checksum, sha256_file(&path).unwrap());
        assert!(metadata_path(&path).exists());
        assert_eq!(events.finished.lock().len(), 1);
        assert_eq!(*events.phases.lock(), vec![SessionPhase::Capturing, SessionPhase::Idle]);
        cleanup(&path);
    }

    #[test]
    fn muxes_audio_with_video() {
        let path = temp_path("av.mp4");
        let mut recorder = Recorder::new(ShellProgram::new(), config(4, 2)).unwrap();

        recorder.start_capture(&path, 300, true, true, 30.0).unwrap();
        assert!(recorder.is_capturing_audio());
        recorder.set_capture_framerate(30);
        for i in 0..3 {
            tick(&mut recorder, i);
        }
        // 300 Hz at 30 fps: 10 sample pairs per video frame.
        for i in 0..30 {
            recorder.process_audio(i as f32, -(i as f32));
        }

        recorder.stop_capture(true).unwrap();
        recorder.wait_for_background_tasks();

        // Test muxer concatenates audio then video.
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 3 * 80 + 3 * 32);
        let first = f32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(first, 1.0);

        let files = OutputFiles::new(&path, "mp4", true);
        assert!(!files.video.exists());
        assert!(!files.audio.as_ref().unwrap().exists());
        assert_eq!(recorder.last_result().unwrap().metadata.audio_sample_rate, Some(300));
        cleanup(&path);
    }

    #[test]
    fn discard_removes_file_after_encoder_exits() {
        let path = temp_path("discard.mp4");
        let mut recorder = Recorder::new(ShellProgram::slow_exit(0.5), config(4, 2)).unwrap();

        recorder.start_capture(&path, 0, false, false, 30.0).unwrap();
        recorder.set_capture_framerate(30);
        tick(&mut recorder, 1);
        tick(&mut recorder, 2);

        recorder.stop_capture(false).unwrap();
        assert!(!recorder.is_saving());
        assert!(path.exists());

        recorder.wait_for_background_tasks();
        assert!(!path.exists());
        assert!(recorder.last_result().is_none());
    }

    #[test]
    fn saving_stop_drains_queued_frames() {
        let path = temp_path("drain.mp4");
        let mut recorder = Recorder::new(ShellProgram::slow_start(0.5), config(256, 256)).unwrap();

        recorder.start_capture(&path, 0, false, false, 30.0).unwrap();
        recorder.set_capture_framerate(30);
        for i in 0..5 {
            tick(&mut recorder, i);
        }
        assert!(recorder.pending_frames() >= 2);

        recorder.stop_capture(true).unwrap();
        recorder.wait_for_background_tasks();

        let frame_bytes = 256 * 256 * 4;
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 5 * frame_bytes);
        for i in 0..5 {
            assert_eq!(bytes[i * frame_bytes], i as u8);
        }
        assert_eq!(recorder.last_result().unwrap().frames_written, 5);
        cleanup(&path);
    }

    #[test]
    fn drain_gives_up_on_stuck_encoder() {
        let path = temp_path("stuck.mp4");
        let config = RecorderConfig {
            drain_timeout_ms: 300,
            exit_timeout_ms: 300,
            ..config(256, 256)
        };
        let mut recorder = Recorder::new(ShellProgram::stuck(), config).unwrap();

        recorder.start_capture(&path, 0, false, false, 30.0).unwrap();
        recorder.set_capture_framerate(30);
        for i in 0..4 {
            tick(&mut recorder, i);
        }

        let started = Instant::now();
        recorder.stop_capture(true).unwrap();
        recorder.wait_for_background_tasks();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(recorder.last_result().unwrap().frames_written, 0);
        cleanup(&path);
    }

    #[test]
    fn queue_stays_within_budget() {
        let path = temp_path("budget.mp4");
        let frame_bytes = 256 * 256 * 4;
        let config = RecorderConfig {
            max_queue_bytes: 2 * frame_bytes as u64,
            exit_timeout_ms: 300,
            ..config(256, 256)
        };
        let events = Arc::new(Events::default());
        let mut recorder = Recorder::new(ShellProgram::stuck(), config).unwrap();
        recorder.set_delegate(events.clone());

        recorder.start_capture(&path, 0, false, false, 30.0).unwrap();
        recorder.set_capture_framerate(30);
        for i in 0..5 {
            tick(&mut recorder, i);
            std::thread::sleep(Duration::from_millis(20));
            let diagnostics = recorder.diagnostics();
            assert!(diagnostics.pending_bytes <= 2 * frame_bytes as u64);
            assert!(diagnostics.pending_frames <= 2);
        }
        assert_eq!(recorder.frame_count(), 5);
        assert!(recorder.dropped_frames() >= 1);
        assert_eq!(events.dropped.load(Ordering::SeqCst), recorder.dropped_frames());

        // The queue holds the oldest frames not yet handed to the encoder, in
        // capture order; every refused frame is newer than all of them.
        let kept: Vec<u8> = recorder
            .pending
            .take_all()
            .into_iter()
            .map(|frame| {
                let value = frame.as_pixels().unwrap()[0].r;
                recorder.pool.release(frame);
                value
            })
            .collect();
        let submitted = recorder.frames_submitted() as u8;
        let expected: Vec<u8> = (submitted..submitted + kept.len() as u8).collect();
        assert_eq!(kept, expected);
        assert_eq!(u64::from(submitted) + kept.len() as u64 + recorder.dropped_frames(), 5);
        assert!(!kept.is_empty());

        recorder.stop_capture(false).unwrap();
        recorder.wait_for_background_tasks();
        assert!(!path.exists());
    }

    #[test]
    fn rejects_second_start() {
        let path = temp_path("twice.mp4");
        let mut recorder = Recorder::new(ShellProgram::new(), config(4, 2)).unwrap();
        recorder.start_capture(&path, 0, false, false, 30.0).unwrap();
        assert!(matches!(
            recorder.start_capture(&path, 0, false, false, 30.0),
            Err(CaptureError::AlreadyActive)
        ));
        recorder.stop_capture(false).unwrap();
        recorder.wait_for_background_tasks();
        assert!(!path.exists());
    }

    #[test]
    fn missing_encoder_leaves_recorder_idle() {
        let path = temp_path("missing.mp4");
        let mut recorder = Recorder::new(ShellProgram::missing(), config(4, 2)).unwrap();
        assert!(matches!(
            recorder.start_capture(&path, 0, false, false, 30.0),
            Err(CaptureError::ExecutableNotFound(_))
        ));
        assert!(!recorder.is_capturing());
        assert_eq!(recorder.phase(), SessionPhase::Idle);
        assert!(!path.exists());
    }

    #[test]
    fn encoder_that_exits_on_launch_fails_start() {
        let path = temp_path("rejected.mp4");
        let config = RecorderConfig {
            startup_grace_ms: 5_000,
            ..config(4, 2)
        };
        let events = Arc::new(Events::default());
        let mut recorder = Recorder::new(ShellProgram::failing("unknown encoder"), config).unwrap();
        recorder.set_delegate(events.clone());

        let err = recorder.start_capture(&path, 48_000, true, false, 30.0).unwrap_err();
        assert_eq!(err, CaptureError::StartFailed("unknown encoder".into()));
        assert!(!recorder.is_capturing());
        assert_eq!(recorder.phase(), SessionPhase::Idle);
        assert!(events.phases.lock().is_empty());

        let files = OutputFiles::new(&path, "mp4", true);
        assert!(!path.exists());
        assert!(!files.video.exists());
    }

    #[test]
    fn captures_once_per_clock_frame() {
        let path = temp_path("throttle.mp4");
        let mut recorder = Recorder::new(ShellProgram::new(), config(4, 2)).unwrap();
        let source = PixelBuffer::new(FrameSize::new(4, 2));
        assert!(!recorder.should_capture());

        recorder.start_capture(&path, 0, false, false, 5.0).unwrap();
        assert!(recorder.capture(&source));
        assert!(!recorder.capture(&source));
        std::thread::sleep(Duration::from_millis(250));
        assert!(recorder.capture(&source));
        assert_eq!(recorder.frame_count(), 2);

        recorder.stop_capture(false).unwrap();
        recorder.wait_for_background_tasks();
    }

    #[test]
    fn plays_back_last_recording() {
        let path = temp_path("playback.mp4");
        let mut recorder = Recorder::new(ShellProgram::new(), config(4, 2)).unwrap();

        recorder.start_capture(&path, 0, false, false, 100.0).unwrap();
        recorder.set_capture_framerate(100);
        for i in 0..3 {
            tick(&mut recorder, i + 10);
        }
        recorder.stop_capture(true).unwrap();

        recorder.request_playback();
        recorder.wait_for_background_tasks();
        recorder.update();
        assert!(recorder.is_playing_back());

        let mut shown = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.is_playing_back() && Instant::now() < deadline {
            if let Some(frame) = recorder.playback_frame() {
                shown.push(frame.as_pixels().unwrap()[0].r);
                recorder.recycle_playback_frame(frame);
            } else {
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        assert_eq!(shown, vec![10, 11, 12]);
        assert!(!recorder.is_playing_back());
        cleanup(&path);
    }
}
