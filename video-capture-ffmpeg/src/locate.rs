//! ffmpeg executable discovery.
//!
//! Lookup order: an explicitly configured path, the copy bundled with the
//! application under [`BUNDLED_DIR`], then every directory on `PATH`.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use video_capture_core::CaptureError;

/// Where the application ships its own ffmpeg build, relative to its root.
pub const BUNDLED_DIR: &str = "Support/ThirdParty/ffmpeg";

#[cfg(target_os = "windows")]
pub const EXECUTABLE_NAME: &str = "ffmpeg.exe";
#[cfg(not(target_os = "windows"))]
pub const EXECUTABLE_NAME: &str = "ffmpeg";

/// Path of the bundled executable under `root`.
pub fn bundled_path(root: &Path) -> PathBuf {
    root.join(BUNDLED_DIR).join("bin").join(EXECUTABLE_NAME)
}

/// First `name` found in the directories of `path_var`.
pub fn find_in_path(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Resolve the executable to launch.
///
/// An explicit path must exist. Otherwise the bundled copy under `root` wins
/// over one found on `PATH`.
pub fn locate(explicit: Option<&Path>, root: &Path) -> Result<PathBuf, CaptureError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(CaptureError::ExecutableNotFound(path.to_path_buf()));
    }

    let bundled = bundled_path(root);
    if bundled.is_file() {
        return Ok(bundled);
    }

    let path_var = env::var_os("PATH");
    if let Some(found) = find_in_path(EXECUTABLE_NAME, path_var.as_deref()) {
        log::debug!("Using ffmpeg from PATH: {}", found.display());
        return Ok(found);
    }

    log::error!("{} could not be found.", EXECUTABLE_NAME);
    Err(CaptureError::ExecutableNotFound(bundled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_root(name: &str) -> PathBuf {
        env::temp_dir().join(format!("ffmpeg_locate_{}_{}", uuid::Uuid::new_v4().simple(), name))
    }

    #[test]
    fn explicit_path_must_exist() {
        let missing = Path::new("/nonexistent/ffmpeg");
        assert_eq!(
            locate(Some(missing), Path::new("/")),
            Err(CaptureError::ExecutableNotFound(missing.to_path_buf()))
        );
    }

    #[test]
    fn prefers_bundled_copy() {
        let root = temp_root("bundled");
        let exe = bundled_path(&root);
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, b"").unwrap();

        assert_eq!(locate(None, &root).unwrap(), exe);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn searches_path_directories() {
        let first = temp_root("first");
        let second = temp_root("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(second.join("encoder-bin"), b"").unwrap();

        let joined = env::join_paths([&first, &second]).unwrap();
        assert_eq!(
            find_in_path("encoder-bin", Some(&joined)),
            Some(second.join("encoder-bin"))
        );
        assert_eq!(find_in_path("other-bin", Some(&joined)), None);
        assert_eq!(find_in_path("encoder-bin", None), None);

        fs::remove_dir_all(&first).ok();
        fs::remove_dir_all(&second).ok();
    }
}
