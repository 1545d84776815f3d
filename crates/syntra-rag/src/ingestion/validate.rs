//! Upload validation

use crate::error::{Error, Result};

/// Require a `.pdf` file name (any case)
pub fn validate_pdf(filename: Option<&str>) -> Result<()> {
    match filename {
        Some(name) if name.to_lowercase().ends_with(".pdf") => Ok(()),
        _ => Err(Error::validation("File must be a PDF")),
    }
}

/// Reject uploads larger than `max_bytes`
pub fn validate_size(len: usize, max_bytes: usize) -> Result<()> {
    if len > max_bytes {
        return Err(Error::PayloadTooLarge {
            max_mb: max_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

/// File name without directories or extension, used as the provisional title
pub fn file_stem(filename: &str) -> String {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };
    let stem = stem.trim();
    if stem.is_empty() {
        "Untitled".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_extension_any_case() {
        assert!(validate_pdf(Some("paper.pdf")).is_ok());
        assert!(validate_pdf(Some("PAPER.PDF")).is_ok());
        let err = validate_pdf(Some("paper.docx")).unwrap_err();
        assert_eq!(err.to_string(), "File must be a PDF");
        assert!(validate_pdf(None).is_err());
    }

    #[test]
    fn test_size_limit_message() {
        let max = 50 * 1024 * 1024;
        assert!(validate_size(max, max).is_ok());
        let err = validate_size(max + 1, max).unwrap_err();
        assert_eq!(err.to_string(), "File too large. Maximum size: 50MB");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("My Paper.final.pdf"), "My Paper.final");
        assert_eq!(file_stem("C:\\docs\\a.pdf"), "a");
        assert_eq!(file_stem(".pdf"), ".pdf");
        assert_eq!(file_stem("  .pdf"), "Untitled");
    }
}
