//! Document text extraction.
//!
//! Opaque "bytes in, text out" collaborator. Text-like payloads (UTF-8)
//! pass through; binary formats we cannot read are a validation failure,
//! never a server error.

use crate::error::{AppError, AppResult};

/// Image formats accepted by the image-upload path, detected by magic bytes.
pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP") {
        Some("image/webp")
    } else {
        None
    }
}

pub fn extract_text(bytes: &[u8], filename: &str) -> AppResult<String> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".into()));
    }

    if bytes.starts_with(b"%PDF") {
        return Err(AppError::Validation(format!(
            "Cannot extract text from \"{filename}\": PDF parsing is not supported, upload a plain-text export"
        )));
    }

    let text = std::str::from_utf8(bytes).map_err(|_| {
        AppError::Validation(format!(
            "Cannot extract text from \"{filename}\": unsupported or binary format"
        ))
    })?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!(
            "\"{filename}\" contains no extractable text"
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_text_passes_through_trimmed() {
        let text = extract_text(b"  Photosynthesis converts light to energy.  \n", "notes.txt")
            .unwrap();
        assert_eq!(text, "Photosynthesis converts light to energy.");
    }

    #[test]
    fn binary_payload_is_a_validation_error() {
        let err = extract_text(&[0x00, 0xFF, 0xFE, 0x01], "blob.bin").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn empty_and_whitespace_files_are_rejected() {
        assert!(matches!(
            extract_text(b"", "empty.txt"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            extract_text(b"   \n\t ", "blank.txt"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn image_magic_bytes_are_detected() {
        assert_eq!(
            detect_image_mime(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]),
            Some("image/png")
        );
        assert_eq!(
            detect_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some("image/jpeg")
        );
        assert_eq!(detect_image_mime(b"GIF89a"), None);
    }
}
