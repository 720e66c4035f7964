//! # video-capture-core
//!
//! Platform-agnostic real-time capture core library.
//!
//! Streams raw video frames and stereo audio windows into external encoder
//! processes while the host keeps rendering at its own pace, and decodes saved
//! recordings back for loop playback. Encoder backends (the ffmpeg CLI, or a
//! test stand-in) implement the `EncoderProgram` trait and plug into the
//! generic `Recorder`.
//!
//! ## Architecture
//!
//! ```text
//! video-capture-core (this crate)
//! ├── traits/       ← EncoderProgram, CaptureDelegate, FrameSource, RenderSettings, CameraPathRecorder
//! ├── models/       ← CaptureError, PipeState, SessionPhase, RecorderConfig, FrameRate, etc.
//! ├── processing/   ← Frame + FramePool, RingBuffer, StereoBuffer, PendingFrameQueue
//! ├── process/      ← EncoderProcess (subprocess + worker threads), Event signals
//! ├── session/      ← Recorder (capture pipeline), CaptureController, SyncClock
//! └── storage/      ← output file naming and cleanup, checksums, metadata sidecars
//! ```

pub mod models;
pub mod process;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::config::{RecorderConfig, VideoSettings};
pub use models::error::CaptureError;
pub use models::media::{CaptureDiagnostics, FrameRate, FrameSize, Rgba, StreamMode};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{PipeState, SessionPhase};
pub use process::encoder_process::{EncoderProcess, PipeOptions};
pub use processing::frame::{Frame, FrameData, FramePool};
pub use processing::pending_queue::PendingFrameQueue;
pub use processing::ring_buffer::RingBuffer;
pub use processing::stereo_buffer::StereoBuffer;
pub use session::clock::SyncClock;
pub use session::controller::CaptureController;
pub use session::recorder::Recorder;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::encoder_program::{EncodeJob, EncoderProgram};
pub use traits::frame_source::{FrameSource, PixelBuffer};
pub use traits::render_settings::{CameraPathRecorder, RenderSettings};
