//! Scoped scratch audio files.

use crate::error::AssistantError;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Owns the scratch file of one speech job and deletes it when dropped.
///
/// Dropping covers every exit path of the job task: normal completion,
/// cancellation, synthesis errors and task abort.
#[derive(Debug)]
pub struct ScratchAudio {
    path: PathBuf,
}

impl ScratchAudio {
    /// Take ownership of `path`, creating its parent directory if needed.
    pub fn prepare(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("could not create scratch dir {}: {e}", parent.display());
            }
        }
        Self { path }
    }

    /// Location the synthesis collaborator may write to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remove(&self) -> crate::error::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AssistantError::Cleanup(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}

impl Drop for ScratchAudio {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn drop_removes_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.mp3");
        {
            let scratch = ScratchAudio::prepare(path.clone());
            std::fs::write(scratch.path(), b"audio").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn drop_without_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-written.mp3");
        drop(ScratchAudio::prepare(path.clone()));
        assert!(!path.exists());
    }

    #[test]
    fn prepare_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("speech.mp3");
        let scratch = ScratchAudio::prepare(path);
        assert!(scratch.path().parent().unwrap().is_dir());
    }
}
