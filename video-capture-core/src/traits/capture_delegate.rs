use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionPhase;

/// Event delegate for recorder notifications.
///
/// `on_capture_finished` and errors raised while finalizing are delivered from
/// the background finalize thread, not the capture thread. Implementations
/// should marshal to their UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the recorder's foreground phase changes.
    fn on_state_changed(&self, phase: SessionPhase);

    /// Called when a captured frame could not be queued.
    fn on_frame_dropped(&self, _frames_dropped: u64) {}

    /// Called when an error occurs during capture or finalization.
    fn on_error(&self, error: &CaptureError);

    /// Called when a saved recording has been muxed and finalized.
    fn on_capture_finished(&self, result: &RecordingResult);
}
