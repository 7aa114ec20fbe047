//! Typed structures for Gemini generateContent responses.
//!
//! Parse errors happen at the serde boundary, not scattered through the
//! calling code. Optional fields use `Option`/`#[serde(default)]` so that
//! partial responses deserialize instead of erroring.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub candidates: Option<Vec<Candidate>>,
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    pub parts: Option<Vec<Part>>,
}

/// A content part. Text and inline image data are mutually exclusive in
/// practice, but the wire format allows either to be absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorInfo {
    pub message: Option<String>,
    pub code: Option<i32>,
}

impl ErrorInfo {
    #[must_use]
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }
}

impl Response {
    /// First text part of the first candidate, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.first_parts()?.iter().find_map(|part| {
            part.text
                .as_deref()
                .filter(|text| !text.trim().is_empty())
        })
    }

    /// Base64 data of the first inline-image part of the first candidate.
    #[must_use]
    pub fn first_inline_image(&self) -> Option<&str> {
        self.first_parts()?.iter().find_map(|part| {
            part.inline_data
                .as_ref()
                .and_then(|inline| inline.data.as_deref())
                .filter(|data| !data.is_empty())
        })
    }

    fn first_parts(&self) -> Option<&[Part]> {
        self.candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_deref()
    }
}
