use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;

/// Files produced by one capture session.
///
/// With audio, video and audio are encoded to temporary files next to the
/// destination and muxed into it at the end. Without audio, video is encoded
/// straight to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    pub primary: PathBuf,
    pub video: PathBuf,
    pub audio: Option<PathBuf>,
}

impl OutputFiles {
    pub fn new(primary: &Path, container: &str, capture_audio: bool) -> Self {
        if capture_audio {
            Self {
                primary: primary.to_path_buf(),
                video: suffixed(primary, &format!(".tmp.{}", container)),
                audio: Some(suffixed(primary, ".tmp.m4a")),
            }
        } else {
            Self {
                primary: primary.to_path_buf(),
                video: primary.to_path_buf(),
                audio: None,
            }
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Create the destination if missing and bump its modification time.
    ///
    /// Claims the name so a concurrent session picks a different one.
    pub fn claim(&self) -> Result<(), CaptureError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.primary)
            .map_err(|e| CaptureError::storage("failed to create output file", e))?;
        file.set_modified(std::time::SystemTime::now())
            .map_err(|e| CaptureError::storage("failed to touch output file", e))?;
        Ok(())
    }

    /// Delete temporary files first and the destination last.
    pub fn remove_all(&self) -> Result<(), CaptureError> {
        remove_if_exists(&self.video)?;
        if let Some(audio) = &self.audio {
            remove_if_exists(audio)?;
            remove_if_exists(&self.primary)?;
        }
        Ok(())
    }

    /// Delete the temporary parts after a successful mux.
    pub fn remove_temporaries(&self) -> Result<(), CaptureError> {
        if let Some(audio) = &self.audio {
            remove_if_exists(&self.video)?;
            remove_if_exists(audio)?;
        }
        Ok(())
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn remove_if_exists(path: &Path) -> Result<(), CaptureError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CaptureError::storage(&format!("failed to delete {}", path.display()), e)),
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = fs::File::open(path).map_err(|e| CaptureError::storage("failed to open file for checksum", e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| CaptureError::storage("failed to read file for checksum", e))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("video_capture_test_{}_{}", uuid::Uuid::new_v4().simple(), name))
    }

    #[test]
    fn names_temporaries_after_destination() {
        let files = OutputFiles::new(Path::new("/out/clip.mp4"), "mp4", true);
        assert_eq!(files.video, PathBuf::from("/out/clip.mp4.tmp.mp4"));
        assert_eq!(files.audio, Some(PathBuf::from("/out/clip.mp4.tmp.m4a")));

        let files = OutputFiles::new(Path::new("/out/clip.mp4"), "mkv", false);
        assert_eq!(files.video, files.primary);
        assert!(!files.has_audio());
    }

    #[test]
    fn claim_keeps_existing_contents() {
        let path = temp_file_path("claim.mp4");
        fs::write(&path, b"keep").unwrap();
        let files = OutputFiles::new(&path, "mp4", false);
        files.claim().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"keep");
        fs::remove_file(&path).ok();
    }

    #[test]
    fn remove_all_deletes_every_part() {
        let path = temp_file_path("remove.mp4");
        let files = OutputFiles::new(&path, "mp4", true);
        files.claim().unwrap();
        fs::write(&files.video, b"v").unwrap();
        fs::write(files.audio.as_ref().unwrap(), b"a").unwrap();

        files.remove_all().unwrap();
        assert!(!files.video.exists());
        assert!(!files.audio.as_ref().unwrap().exists());
        assert!(!path.exists());

        // Already gone is fine.
        files.remove_all().unwrap();
    }

    #[test]
    fn checksum_of_known_content() {
        let path = temp_file_path("sum.bin");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        fs::remove_file(&path).ok();
        assert!(matches!(sha256_file(&path), Err(CaptureError::StorageError(_))));
    }
}
