use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::config::RecorderConfig;
use crate::models::error::CaptureError;
use crate::models::media::FrameSize;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::process::encoder_process::EncoderProcess;
use crate::processing::frame::{Frame, FramePool};
use crate::storage::metadata::write_metadata;
use crate::storage::output_files::{sha256_file, OutputFiles};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::encoder_program::EncoderProgram;

/// Poll interval while waiting for the writer to accept the next drained frame.
const DRAIN_WAIT: Duration = Duration::from_millis(50);

/// Everything a stopped session hands to its background finalize thread.
pub(crate) struct Finalizer<P: EncoderProgram> {
    pub program: Arc<P>,
    pub config: RecorderConfig,
    pub files: OutputFiles,
    pub video: EncoderProcess,
    pub audio: EncoderProcess,
    pub pool: Arc<FramePool>,
    pub saving: Arc<AtomicUsize>,
    pub last_result: Arc<Mutex<Option<RecordingResult>>>,
    pub delegate: Option<Arc<dyn CaptureDelegate>>,
    pub size: FrameSize,
    pub fps: f64,
    pub audio_sample_rate: Option<u32>,
    pub frames_dropped: u64,
    pub saving_guard: Option<SavingGuard>,
}

/// Decrements the saving counter when the finalizer is dropped, however it ends.
pub(crate) struct SavingGuard(Arc<AtomicUsize>);

impl Drop for SavingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<P: EncoderProgram> Finalizer<P> {
    /// Mark a save in progress until this finalizer is dropped.
    pub fn begin_save(&mut self) {
        if self.saving_guard.is_none() {
            self.saving.fetch_add(1, Ordering::SeqCst);
            self.saving_guard = Some(SavingGuard(Arc::clone(&self.saving)));
        }
    }

    /// Feed queued frames to the encoder until the queue is empty or the drain
    /// timeout passes, then finish like [`join`](Self::join).
    pub fn drain_and_join(mut self, mut pending: VecDeque<Frame>) {
        log::info!("Draining {} buffered frames into {}", pending.len(), self.files.video.display());

        let timeout = self.config.drain_timeout();
        let started = Instant::now();
        while !pending.is_empty() {
            if started.elapsed() > timeout {
                log::warn!("Drain timed out with {} frames left", pending.len());
                break;
            }
            if self.video.did_exit() {
                log::warn!("Encoder exited with {} frames left to drain", pending.len());
                break;
            }
            if self.video.is_ready_for_input() {
                if let Some(frame) = pending.pop_front() {
                    if let Some(displaced) = self.video.queue_frame(frame) {
                        self.pool.release(displaced);
                    }
                }
            } else {
                self.video.wait_until_idle(DRAIN_WAIT);
            }
        }
        for frame in pending {
            self.pool.release(frame);
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        self.finish(remaining);
    }

    /// Flush, stop, wait for both encoders, mux, and record the result.
    pub fn join(mut self) {
        let flush = self.config.drain_timeout();
        self.finish(flush);
    }

    fn finish(&mut self, flush: Duration) {
        if !self.video.wait_until_idle(flush) {
            log::warn!("Last video frame was not written before stopping");
        }
        self.audio.wait_until_idle(flush.min(self.config.exit_timeout()));
        self.video.stop();
        self.audio.stop();

        match self.complete() {
            Ok(result) => {
                log::info!(
                    "Saved {} ({} frames, {} dropped)",
                    result.file_path.display(),
                    result.frames_written,
                    result.frames_dropped
                );
                *self.last_result.lock() = Some(result.clone());
                if let Some(delegate) = &self.delegate {
                    delegate.on_capture_finished(&result);
                }
            }
            Err(err) => {
                log::error!("Failed to finalize {}: {}", self.files.primary.display(), err);
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(&err);
                }
            }
        }
    }

    fn complete(&mut self) -> Result<RecordingResult, CaptureError> {
        let exit_timeout = self.config.exit_timeout();
        if let Err(err) = self.video.wait_for_exit(exit_timeout) {
            log::warn!("Video encoder did not exit cleanly: {}", err);
        }

        if let Some(audio_path) = &self.files.audio {
            if let Err(err) = self.audio.wait_for_exit(exit_timeout) {
                log::warn!("Audio encoder did not exit cleanly: {}", err);
            }
            EncoderProcess::mux(
                self.program.as_ref(),
                audio_path,
                &self.files.video,
                &self.files.primary,
                self.config.mux_timeout(),
            )?;
            self.files.remove_temporaries()?;
        }

        let frames_written = self.video.frames_written();
        let checksum = sha256_file(&self.files.primary)?;
        let metadata = RecordingMetadata::new(
            &self.files.primary.to_string_lossy(),
            self.size,
            self.fps,
            frames_written,
            self.frames_dropped,
            self.audio_sample_rate,
            &checksum,
        );
        if self.config.write_metadata {
            write_metadata(&metadata, &self.files.primary)?;
        }
        Ok(RecordingResult::from_metadata(self.files.primary.clone(), metadata))
    }

    /// Stop both encoders, wait for them to exit, then delete every output file.
    ///
    /// Files are only deleted once the processes holding them are gone.
    pub fn remove(mut self) {
        self.video.stop();
        self.audio.stop();

        let exit_timeout = self.config.exit_timeout();
        if let Err(err) = self.video.wait_for_exit(exit_timeout) {
            log::warn!("Video encoder did not exit cleanly: {}", err);
        }
        if self.files.has_audio() {
            if let Err(err) = self.audio.wait_for_exit(exit_timeout) {
                log::warn!("Audio encoder did not exit cleanly: {}", err);
            }
        }

        match self.files.remove_all() {
            Ok(()) => log::info!("Discarded {}", self.files.primary.display()),
            Err(err) => {
                log::error!("{}", err);
                if let Some(delegate) = &self.delegate {
                    delegate.on_error(&err);
                }
            }
        }
    }
}
