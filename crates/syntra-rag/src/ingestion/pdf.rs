//! Raw PDF text extraction, page by page

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Text of one PDF page (1-based)
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_number: i64,
    pub text: String,
}

/// Whole-document text plus the per-page split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPdfText {
    pub text: String,
    pub pages: Vec<PageText>,
}

impl RawPdfText {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

const PDF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Extract text with lopdf per page, falling back to pdf-extract for the whole document
///
/// Never fails: an unreadable PDF gives empty text and the pipeline continues
/// with whatever GROBID produced.
pub fn extract_pages(data: &[u8]) -> RawPdfText {
    let pages = extract_with_lopdf(data);
    if pages.iter().any(|p| !p.text.is_empty()) {
        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        return RawPdfText { text, pages };
    }

    match extract_with_timeout(data) {
        Some(text) if !text.trim().is_empty() => {
            let text = cleanup_pdf_text(&text);
            RawPdfText {
                pages: vec![PageText {
                    page_number: 1,
                    text: text.clone(),
                }],
                text,
            }
        }
        _ => {
            tracing::warn!("No text could be extracted from PDF");
            RawPdfText::default()
        }
    }
}

fn extract_with_lopdf(data: &[u8]) -> Vec<PageText> {
    let doc = match lopdf::Document::load_mem(data) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!("lopdf could not load PDF: {}", e);
            return Vec::new();
        }
    };

    doc.get_pages()
        .keys()
        .map(|&page_number| {
            let text = match doc.extract_text(&[page_number]) {
                Ok(text) => cleanup_pdf_text(&text),
                Err(e) => {
                    tracing::debug!("lopdf failed on page {}: {}", page_number, e);
                    String::new()
                }
            };
            PageText {
                page_number: i64::from(page_number),
                text,
            }
        })
        .collect()
}

/// Run pdf-extract on a separate thread; some fonts make it hang
fn extract_with_timeout(data: &[u8]) -> Option<String> {
    let data_vec = data.to_vec();
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let result = pdf_extract::extract_text_from_mem(&data_vec);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(PDF_EXTRACT_TIMEOUT) {
        Ok(Ok(text)) => {
            let _ = handle.join();
            Some(text)
        }
        Ok(Err(e)) => {
            let _ = handle.join();
            tracing::warn!("pdf-extract failed: {}", e);
            None
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::error!("PDF extraction timeout after {:?}", PDF_EXTRACT_TIMEOUT);
            None
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            tracing::error!("PDF extraction thread crashed");
            None
        }
    }
}

/// Normalise ligatures, typographic punctuation and stray whitespace
fn cleanup_pdf_text(text: &str) -> String {
    let replaced = text
        .replace('\0', "")
        .replace('\u{00A0}', " ")
        .replace('\u{2010}', "-")
        .replace('\u{2011}', "-")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl");

    replaced
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_ligatures_and_spacing() {
        let text = "e\u{FB03}cient   \u{201C}model\u{201D}\n\n\n  second\u{00A0}line\0";
        assert_eq!(cleanup_pdf_text(text), "efficient \"model\"\nsecond line");
    }

    #[test]
    fn test_garbage_input_gives_empty_text() {
        let raw = extract_pages(b"definitely not a pdf");
        assert!(raw.is_empty());
        assert!(raw.pages.is_empty());
    }
}
