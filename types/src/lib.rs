//! Core domain types for Doppel.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the application.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Domain Constants
// ============================================================================

/// Minimum number of uploaded photos required to proceed to payment.
pub const MIN_PHOTOS: usize = 5;
/// Maximum number of uploaded photos the session will hold.
pub const MAX_PHOTOS: usize = 10;
/// Number of portraits in a generated gallery.
pub const GALLERY_SIZE: usize = 4;
/// Coin balance every fresh session starts with.
pub const STARTING_COINS: u32 = 20;
/// Coin cost of one recompose request.
pub const RECOMPOSE_COST: u32 = 10;
/// Promo code that waives the payment step (matched case-insensitively).
pub const PROMO_CODE: &str = "TWIN";

// ============================================================================
// Wizard Step Tags
// ============================================================================

/// The five wizard steps. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Upload,
    Payment,
    Generating,
    Results,
    Subscribe,
}

impl WizardStep {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            WizardStep::Upload => "upload",
            WizardStep::Payment => "payment",
            WizardStep::Generating => "generating",
            WizardStep::Results => "results",
            WizardStep::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Image Types
// ============================================================================

/// MIME type of a source image accepted by the upload boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMime {
    Jpeg,
    Png,
}

impl ImageMime {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
        }
    }

    /// Map a file extension to a supported MIME type.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageMime::Jpeg),
            "png" => Some(ImageMime::Png),
            _ => None,
        }
    }

    /// Parse a MIME string such as `image/png`.
    #[must_use]
    pub fn parse(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            _ => None,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for constructors that reject empty payloads.
#[derive(Debug, Error)]
#[error("image payload must not be empty")]
pub struct EmptyPayloadError;

/// A transport-safe encoded image: the raw base64 payload with no data-URI
/// prefix, plus the MIME type it was encoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    payload: String,
    mime: ImageMime,
}

impl EncodedImage {
    pub fn new(payload: impl Into<String>, mime: ImageMime) -> Result<Self, EmptyPayloadError> {
        let payload = payload.into();
        if payload.trim().is_empty() {
            Err(EmptyPayloadError)
        } else {
            Ok(Self { payload, mime })
        }
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    #[must_use]
    pub const fn mime(&self) -> ImageMime {
        self.mime
    }
}

/// A generated image artifact carried as a `data:image/png;base64,...` URI,
/// ready for display or download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact(String);

impl ImageArtifact {
    /// Wrap a raw base64 PNG payload in a data URI.
    pub fn from_png_payload(payload: impl AsRef<str>) -> Result<Self, EmptyPayloadError> {
        let payload = payload.as_ref();
        if payload.trim().is_empty() {
            return Err(EmptyPayloadError);
        }
        Ok(Self(format!("data:image/png;base64,{payload}")))
    }

    /// The full data URI.
    #[must_use]
    pub fn as_uri(&self) -> &str {
        &self.0
    }

    /// The base64 payload portion, with the transport prefix stripped.
    #[must_use]
    pub fn payload(&self) -> &str {
        self.0.split_once(',').map_or(self.0.as_str(), |(_, p)| p)
    }
}

impl fmt::Display for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Twin Description & Gallery
// ============================================================================

/// Textual characterization of a person's appearance. Produced once per
/// session by the describe call and immutable afterwards; every later
/// synthesis and recompose request reuses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwinDescription(String);

#[derive(Debug, Error)]
#[error("twin description must not be empty")]
pub struct EmptyDescriptionError;

impl TwinDescription {
    pub fn new(text: impl Into<String>) -> Result<Self, EmptyDescriptionError> {
        let text = text.into();
        if text.trim().is_empty() {
            Err(EmptyDescriptionError)
        } else {
            Ok(Self(text))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TwinDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of four generated portraits. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gallery([ImageArtifact; GALLERY_SIZE]);

#[derive(Debug, Error)]
#[error("gallery requires exactly {GALLERY_SIZE} images, got {got}")]
pub struct GallerySizeError {
    pub got: usize,
}

impl Gallery {
    pub fn new(images: Vec<ImageArtifact>) -> Result<Self, GallerySizeError> {
        let got = images.len();
        let array: [ImageArtifact; GALLERY_SIZE] =
            images.try_into().map_err(|_| GallerySizeError { got })?;
        Ok(Self(array))
    }

    #[must_use]
    pub fn images(&self) -> &[ImageArtifact; GALLERY_SIZE] {
        &self.0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ImageArtifact> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageArtifact> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Gallery {
    type Item = &'a ImageArtifact;
    type IntoIter = std::slice::Iter<'a, ImageArtifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Request Tokens
// ============================================================================

/// Identifies the pipeline run an asynchronous result belongs to.
///
/// Each side-effecting transition mints a fresh token; a completion is
/// applied only while its token is still the session's active one. Results
/// carrying a superseded token are discarded as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(u64);

impl RequestToken {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Coin Packs
// ============================================================================

/// The two recognized coin purchase denominations. Purchases always succeed
/// immediately; there is no real payment processing behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinPack {
    Starter,
    Creator,
}

impl CoinPack {
    #[must_use]
    pub const fn coins(self) -> u32 {
        match self {
            CoinPack::Starter => 20,
            CoinPack::Creator => 100,
        }
    }

    /// Display price, fixed per denomination.
    #[must_use]
    pub const fn price(self) -> &'static str {
        match self {
            CoinPack::Starter => "$4.99",
            CoinPack::Creator => "$14.99",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CoinPack::Starter => "Starter Pack",
            CoinPack::Creator => "Creator Pack",
        }
    }
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Session-level error taxonomy.
///
/// Remote failures are deliberately opaque: the specific cause is logged at
/// the pipeline boundary, never surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    /// Recoverable input validation failure, shown inline.
    #[error("{0}")]
    Validation(String),

    /// Any generation-service call failed or returned no payload.
    #[error("An error occurred while generating your AI Twin. Please try again.")]
    RemoteService,

    /// Ledger debit guard failed; no mutation happened.
    #[error("You need {needed} coins to recreate. Please purchase more.")]
    InsufficientCredits { needed: u32, balance: u32 },

    /// A source image could not be read or decoded.
    #[error("could not read image: {0}")]
    Encoding(String),

    /// The event is not valid in the current step.
    #[error("event '{event}' is not accepted in step '{step}'")]
    InvalidEvent {
        event: &'static str,
        step: WizardStep,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_image_rejects_empty_payload() {
        assert!(EncodedImage::new("", ImageMime::Jpeg).is_err());
        assert!(EncodedImage::new("   ", ImageMime::Png).is_err());
        assert!(EncodedImage::new("aGVsbG8=", ImageMime::Jpeg).is_ok());
    }

    #[test]
    fn artifact_wraps_payload_in_data_uri() {
        let artifact = ImageArtifact::from_png_payload("Zm9v").unwrap();
        assert_eq!(artifact.as_uri(), "data:image/png;base64,Zm9v");
        assert_eq!(artifact.payload(), "Zm9v");
    }

    #[test]
    fn artifact_rejects_empty_payload() {
        assert!(ImageArtifact::from_png_payload("").is_err());
    }

    #[test]
    fn gallery_requires_exactly_four_images() {
        let img = || ImageArtifact::from_png_payload("Zm9v").unwrap();

        let err = Gallery::new(vec![img(); 3]).unwrap_err();
        assert_eq!(err.got, 3);

        let err = Gallery::new(vec![img(); 5]).unwrap_err();
        assert_eq!(err.got, 5);

        let gallery = Gallery::new(vec![img(); 4]).unwrap();
        assert_eq!(gallery.iter().count(), GALLERY_SIZE);
    }

    #[test]
    fn mime_from_extension_is_case_insensitive() {
        assert_eq!(ImageMime::from_extension("JPG"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_extension("jpeg"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_extension("PNG"), Some(ImageMime::Png));
        assert_eq!(ImageMime::from_extension("gif"), None);
    }

    #[test]
    fn coin_packs_carry_fixed_denominations() {
        assert_eq!(CoinPack::Starter.coins(), 20);
        assert_eq!(CoinPack::Creator.coins(), 100);
        assert_eq!(CoinPack::Starter.price(), "$4.99");
        assert_eq!(CoinPack::Creator.price(), "$14.99");
    }

    #[test]
    fn description_rejects_blank_text() {
        assert!(TwinDescription::new("\n \t").is_err());
        assert!(TwinDescription::new("brown hair, green eyes").is_ok());
    }
}
