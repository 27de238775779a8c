//! Scoped on-disk staging for attachments.
//!
//! Transcription providers read audio from a file. The staged file lives as
//! long as the [`AudioScratch`] value and is removed when it drops, on every
//! exit path.

use crate::error::DispatchError;
use relaybot_ai::{AudioClip, AudioFormat};
use rootcause::prelude::Report;
use std::path::Path;
use tempfile::NamedTempFile;

/// A temporary audio file.
#[derive(Debug)]
pub struct AudioScratch {
    file: NamedTempFile,
    format: AudioFormat,
}

impl AudioScratch {
    /// Writes `bytes` to a fresh temporary file with the format's extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub async fn stage(bytes: &[u8], format: AudioFormat) -> Result<Self, Report<DispatchError>> {
        let file = tempfile::Builder::new()
            .prefix("relaybot-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile()
            .map_err(|err| DispatchError::Scratch {
                reason: err.to_string(),
            })?;
        tokio::fs::write(file.path(), bytes)
            .await
            .map_err(|err| DispatchError::Scratch {
                reason: err.to_string(),
            })?;
        Ok(Self { file, format })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Borrows the staged file as a provider clip.
    #[must_use]
    pub fn clip(&self, duration_seconds: u64) -> AudioClip<'_> {
        AudioClip {
            path: self.file.path(),
            format: self.format,
            duration_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_file_has_contents_and_extension() {
        let scratch = AudioScratch::stage(b"OggS", AudioFormat::Ogg).await.expect("stage");

        assert_eq!(scratch.path().extension().and_then(|ext| ext.to_str()), Some("ogg"));
        assert_eq!(std::fs::read(scratch.path()).expect("read"), b"OggS");

        let clip = scratch.clip(7);
        assert_eq!(clip.duration_seconds, 7);
        assert_eq!(clip.format, AudioFormat::Ogg);
    }

    #[tokio::test]
    async fn dropping_removes_file() {
        let scratch = AudioScratch::stage(b"ID3", AudioFormat::Mp3).await.expect("stage");
        let path = scratch.path().to_path_buf();
        assert!(path.exists());

        drop(scratch);

        assert!(!path.exists());
    }
}
