//! Image codec adapter: source photos in, transport-safe payloads out.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use doppel_types::{EncodedImage, ImageMime, WizardError};

/// A user-selected source photo: raw bytes plus the MIME type inferred from
/// its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    path: PathBuf,
    bytes: Vec<u8>,
    mime: ImageMime,
}

impl Photo {
    /// Load a photo from disk. Only jpeg/png files are accepted; an
    /// unreadable file surfaces as an encoding error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, WizardError> {
        let path = path.as_ref();

        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageMime::from_extension)
            .ok_or_else(|| {
                WizardError::Validation(format!(
                    "{}: only image/jpeg and image/png files are accepted",
                    path.display()
                ))
            })?;

        let bytes = fs::read(path)
            .map_err(|e| WizardError::Encoding(format!("{}: {e}", path.display())))?;
        if bytes.is_empty() {
            return Err(WizardError::Encoding(format!(
                "{}: file is empty",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            mime,
        })
    }

    /// In-memory constructor for tests and non-filesystem callers.
    pub fn from_bytes(bytes: Vec<u8>, mime: ImageMime) -> Result<Self, WizardError> {
        if bytes.is_empty() {
            return Err(WizardError::Encoding("photo has no bytes".to_string()));
        }
        Ok(Self {
            path: PathBuf::new(),
            bytes,
            mime,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn mime(&self) -> ImageMime {
        self.mime
    }
}

/// Encode a photo into its base64 transport form.
pub fn encode(photo: &Photo) -> Result<EncodedImage, WizardError> {
    let payload = BASE64.encode(&photo.bytes);
    EncodedImage::new(payload, photo.mime)
        .map_err(|e| WizardError::Encoding(e.to_string()))
}

/// Strip the `data:<mime>;base64,` transport prefix from a data URI and keep
/// only the raw payload. Bare payloads without a prefix pass through as jpeg.
pub fn strip_data_uri(uri: &str) -> Result<EncodedImage, WizardError> {
    let (mime, payload) = match uri.split_once(',') {
        Some((prefix, payload)) => {
            let mime = prefix
                .strip_prefix("data:")
                .and_then(|rest| rest.split(';').next())
                .and_then(ImageMime::parse)
                .unwrap_or(ImageMime::Jpeg);
            (mime, payload)
        }
        None => (ImageMime::Jpeg, uri),
    };

    EncodedImage::new(payload, mime)
        .map_err(|_| WizardError::Encoding("reference image has no payload".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_photo_bytes_as_base64() {
        let photo = Photo::from_bytes(b"hello".to_vec(), ImageMime::Jpeg).unwrap();
        let encoded = encode(&photo).unwrap();
        assert_eq!(encoded.payload(), "aGVsbG8=");
        assert_eq!(encoded.mime(), ImageMime::Jpeg);
    }

    #[test]
    fn rejects_empty_photo() {
        assert!(Photo::from_bytes(Vec::new(), ImageMime::Png).is_err());
    }

    #[test]
    fn from_path_reads_jpeg_and_png_only() {
        let dir = tempfile::tempdir().unwrap();

        let jpg = dir.path().join("face.jpg");
        std::fs::write(&jpg, b"jpegdata").unwrap();
        let photo = Photo::from_path(&jpg).unwrap();
        assert_eq!(photo.mime(), ImageMime::Jpeg);

        let gif = dir.path().join("face.gif");
        std::fs::write(&gif, b"gifdata").unwrap();
        assert!(matches!(
            Photo::from_path(&gif),
            Err(WizardError::Validation(_))
        ));
    }

    #[test]
    fn from_path_surfaces_unreadable_file_as_encoding_error() {
        let err = Photo::from_path("/nonexistent/face.png").unwrap_err();
        assert!(matches!(err, WizardError::Encoding(_)));
    }

    #[test]
    fn strips_data_uri_prefix() {
        let encoded = strip_data_uri("data:image/png;base64,Zm9v").unwrap();
        assert_eq!(encoded.payload(), "Zm9v");
        assert_eq!(encoded.mime(), ImageMime::Png);
    }

    #[test]
    fn bare_payload_passes_through() {
        let encoded = strip_data_uri("Zm9v").unwrap();
        assert_eq!(encoded.payload(), "Zm9v");
        assert_eq!(encoded.mime(), ImageMime::Jpeg);
    }

    #[test]
    fn empty_payload_is_an_error() {
        assert!(strip_data_uri("data:image/png;base64,").is_err());
        assert!(strip_data_uri("").is_err());
    }
}
