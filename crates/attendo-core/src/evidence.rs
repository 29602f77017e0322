//! Storage for frames captured alongside suspicious matches.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("unrecognised image data: {0}")]
    UnknownFormat(#[from] image::ImageError),
    #[error("image format has no file extension")]
    NoExtension,
    #[error("failed to write evidence: {0}")]
    Io(#[from] std::io::Error),
}

/// Where captured frames go. Returns a reference stored on the case.
pub trait EvidenceSink: Send + Sync {
    fn store(&self, image: &[u8], captured_at: NaiveDateTime) -> Result<String, EvidenceError>;
}

/// Writes each frame to its own file under a directory.
#[derive(Debug, Clone)]
pub struct EvidenceDir {
    root: PathBuf,
}

impl EvidenceDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl EvidenceSink for EvidenceDir {
    fn store(&self, image: &[u8], captured_at: NaiveDateTime) -> Result<String, EvidenceError> {
        let format = image::guess_format(image)?;
        let ext = format
            .extensions_str()
            .first()
            .ok_or(EvidenceError::NoExtension)?;

        std::fs::create_dir_all(&self.root)?;
        let name = format!(
            "suspect_{}_{}.{ext}",
            captured_at.format("%Y%m%dT%H%M%S"),
            Uuid::new_v4().simple()
        );
        let path = self.root.join(name);
        std::fs::write(&path, image)?;

        tracing::debug!(path = %path.display(), bytes = image.len(), "evidence stored");
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("attendo-evidence-{}", Uuid::new_v4().simple()))
    }

    #[test]
    fn test_png_written_with_extension() {
        let dir = scratch_dir();
        let sink = EvidenceDir::new(&dir);
        let path = sink.store(PNG_MAGIC, at()).unwrap();
        assert!(path.ends_with(".png"));
        assert_eq!(std::fs::read(&path).unwrap(), PNG_MAGIC);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_garbage_rejected() {
        let dir = scratch_dir();
        let sink = EvidenceDir::new(&dir);
        assert!(matches!(
            sink.store(b"not an image", at()),
            Err(EvidenceError::UnknownFormat(_))
        ));
        assert!(!dir.exists());
    }
}
