//! Producers of encoded frames.

use std::fs;
use std::path::{Path, PathBuf};

use occusense_types::OccuError;
use tracing::debug;

/// File extensions picked up by [`DirectorySource`].
const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// An encoded frame together with a label identifying where it came from.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    /// e.g. the file name the frame was read from.
    pub label: String,
    /// Encoded image bytes, as received from the camera.
    pub bytes: Vec<u8>,
}

/// A camera or any other producer of encoded frames.
pub trait FrameSource: Send {
    /// Stable identifier for this source, e.g. `"front_door"`.
    fn id(&self) -> &str;

    /// Return the next frame, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Source`] if the frame cannot be read.
    fn next_frame(&mut self) -> Result<Option<SourceFrame>, OccuError>;
}

/// Replays the image files of a directory in file-name order.
#[derive(Debug)]
pub struct DirectorySource {
    id: String,
    pending: std::vec::IntoIter<PathBuf>,
}

impl DirectorySource {
    /// Scan `dir` for image files.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Source`] when the directory cannot be listed.
    pub fn open(id: &str, dir: &Path) -> Result<Self, OccuError> {
        let entries = fs::read_dir(dir).map_err(|e| OccuError::Source {
            source_id: id.to_string(),
            details: format!("cannot list {}: {e}", dir.display()),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        paths.sort();
        debug!(source = id, frames = paths.len(), dir = %dir.display(), "directory source opened");

        Ok(Self {
            id: id.to_string(),
            pending: paths.into_iter(),
        })
    }

    /// Number of frames not yet returned.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame>, OccuError> {
        let Some(path) = self.pending.next() else {
            return Ok(None);
        };
        let bytes = fs::read(&path).map_err(|e| OccuError::Source {
            source_id: self.id.clone(),
            details: format!("cannot read {}: {e}", path.display()),
        })?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(SourceFrame { label, bytes }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_returned_in_name_order() {
        let dir = tempfile::tempdir().expect("tmp dir");
        fs::write(dir.path().join("frame_002.jpg"), b"two").unwrap();
        fs::write(dir.path().join("frame_001.png"), b"one").unwrap();
        fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

        let mut src = DirectorySource::open("door", dir.path()).unwrap();
        assert_eq!(src.id(), "door");
        assert_eq!(src.remaining(), 2);

        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(first.label, "frame_001.png");
        assert_eq!(first.bytes, b"one");
        let second = src.next_frame().unwrap().unwrap();
        assert_eq!(second.label, "frame_002.jpg");
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_frame_file(Path::new("a/b/FRAME.JPG")));
        assert!(!is_frame_file(Path::new("a/b/frame")));
    }

    #[test]
    fn missing_directory_is_a_source_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = DirectorySource::open("door", &dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, OccuError::Source { .. }));
    }
}
