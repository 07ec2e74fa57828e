//! Attachment to text conversion.
//!
//! [`extract`] never fails: parser errors are rendered into the returned
//! text so the model still sees what was attached.

mod csv;
mod docx;
mod pdf;

use thiserror::Error;
use tracing::warn;

use crate::rchain::human::Attachment;
use crate::rchain::message::{ContentPart, ImageRef};

pub use self::csv::extract_csv;
pub use self::docx::extract_docx;
pub use self::pdf::{extract_pdf, format_pages};

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const LEGACY_WORD_MIME: &str = "application/msword";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Csv(#[from] ::csv::Error),
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("{0}")]
    Xml(String),
    #[error("{0}")]
    Pdf(#[from] lopdf::Error),
}

/// Text rendering of a non-image attachment, with its provenance header.
pub fn extract(attachment: &Attachment) -> String {
    let name = &attachment.filename;
    let bytes = attachment.bytes.as_slice();
    match attachment.media_type.as_str() {
        "text/plain" => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => format!("Text Document: {name}\n\n{text}"),
            Err(err) => {
                warn!(filename = %name, error = %err, "text attachment is not UTF-8");
                format!("Error processing document {name}: {err}")
            }
        },
        "text/csv" => format!("CSV Document: {name}\n\n{}", extract_csv(bytes)),
        "application/json" => format!("JSON Document: {name}\n\n{}", extract_json(bytes)),
        "application/pdf" => format!(
            "PDF Document: {name}\n\nExtracted Content:\n{}",
            extract_pdf(bytes)
        ),
        DOCX_MIME => format!(
            "Word Document: {name}\n\nExtracted Content:\n{}",
            extract_docx(bytes)
        ),
        LEGACY_WORD_MIME => format!(
            "Legacy Word Document: {name}\n\n[Legacy .doc requires conversion to .docx for full analysis]"
        ),
        other => format!("Document: {name} (Type: {other})\n[Unsupported type]"),
    }
}

/// Re-serializes JSON with two-space indentation, keeping key order.
pub fn extract_json(bytes: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => format!("JSON Data:\n{pretty}"),
            Err(err) => format!("Error processing JSON: {err}"),
        },
        Err(err) => format!("Invalid JSON: {err}"),
    }
}

/// Message part for an attachment: images stay images, everything else
/// becomes extracted text.
pub fn content_part(attachment: &Attachment) -> ContentPart {
    if !attachment.is_image() {
        return ContentPart::Text(extract(attachment));
    }
    match &attachment.url {
        Some(url) if attachment.bytes.is_empty() => {
            ContentPart::Image(ImageRef::url(attachment.media_type.clone(), url.clone()))
        }
        _ => ContentPart::Image(ImageRef::inline(
            attachment.media_type.clone(),
            attachment.bytes.clone(),
        )),
    }
}
