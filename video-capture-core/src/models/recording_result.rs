use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::media::FrameSize;

/// Result produced when a saved session has been drained, muxed, and finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Metadata describing a finished recording.
///
/// Serializable so it can be written as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub file_path: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub has_audio: bool,
    pub audio_sample_rate: Option<u32>,
    pub checksum: String,
    pub created_at: String,
}

impl RecordingMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_path: &str,
        size: FrameSize,
        fps: f64,
        frames_written: u64,
        frames_dropped: u64,
        audio_sample_rate: Option<u32>,
        checksum: &str,
    ) -> Self {
        let duration_secs = if fps > 0.0 {
            frames_written as f64 / fps
        } else {
            0.0
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.to_string(),
            width: size.width,
            height: size.height,
            fps,
            duration_secs,
            frames_written,
            frames_dropped,
            has_audio: audio_sample_rate.is_some(),
            audio_sample_rate,
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl RecordingResult {
    pub fn from_metadata(file_path: PathBuf, metadata: RecordingMetadata) -> Self {
        Self {
            file_path,
            duration_secs: metadata.duration_secs,
            frames_written: metadata.frames_written,
            frames_dropped: metadata.frames_dropped,
            checksum: metadata.checksum.clone(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_written_frames() {
        let meta = RecordingMetadata::new("out.mp4", FrameSize::new(4, 2), 30.0, 90, 3, Some(48000), "abc");
        assert!((meta.duration_secs - 3.0).abs() < 1e-9);
        assert!(meta.has_audio);
        assert_eq!(meta.width, 4);

        let result = RecordingResult::from_metadata(PathBuf::from("out.mp4"), meta);
        assert_eq!(result.frames_dropped, 3);
        assert_eq!(result.checksum, "abc");
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let meta = RecordingMetadata::new("out.mp4", FrameSize::new(4, 2), 30.0, 1, 0, None, "00");
        let json = serde_json::to_string(&meta).unwrap();
        let back: RecordingMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
        assert!(!back.has_audio);
    }
}
