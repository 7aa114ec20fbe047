//! Saving gallery images to disk.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use doppel_types::ImageArtifact;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("image payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Save a gallery image under `dir` as `ai-twin-<n>.jpg`, where `n` is the
/// 1-based position of the image in the gallery.
pub fn save_artifact(
    artifact: &ImageArtifact,
    index: usize,
    dir: &Path,
) -> Result<PathBuf, DownloadError> {
    save_artifact_as(artifact, &format!("ai-twin-{}.jpg", index + 1), dir)
}

/// Save an artifact under `dir` with an explicit file name, for results that
/// sit outside the numbered gallery.
pub fn save_artifact_as(
    artifact: &ImageArtifact,
    file_name: &str,
    dir: &Path,
) -> Result<PathBuf, DownloadError> {
    let bytes = BASE64.decode(artifact.payload())?;
    let path = dir.join(file_name);
    std::fs::write(&path, bytes).map_err(|source| DownloadError::Write {
        path: path.clone(),
        source,
    })?;

    tracing::info!(path = %path.display(), "Saved image");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_with_one_based_filename() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ImageArtifact::from_png_payload("aGVsbG8=").unwrap();

        let path = save_artifact(&artifact, 0, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "ai-twin-1.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        let path = save_artifact(&artifact, 3, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "ai-twin-4.jpg");
    }

    #[test]
    fn saves_under_an_explicit_name() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ImageArtifact::from_png_payload("aGVsbG8=").unwrap();

        let path = save_artifact_as(&artifact, "ai-twin-recreated.jpg", dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "ai-twin-recreated.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn invalid_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ImageArtifact::from_png_payload("not base64!!!").unwrap();

        assert!(matches!(
            save_artifact(&artifact, 0, dir.path()),
            Err(DownloadError::Payload(_))
        ));
    }

    #[test]
    fn unwritable_directory_is_an_io_error() {
        let artifact = ImageArtifact::from_png_payload("aGVsbG8=").unwrap();
        let missing = Path::new("/nonexistent/doppel-test");

        assert!(matches!(
            save_artifact(&artifact, 0, missing),
            Err(DownloadError::Write { .. })
        ));
    }
}
