//! Word-window chunking with page estimates and section awareness

use serde_json::json;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::providers::Section;
use crate::types::{ChunkType, ExtractedMetadata, NewChunk};

use super::metadata::is_default_title;
use super::pdf::PageText;

/// Words of a chunk's opening used to locate it in the PDF pages
const PAGE_MATCH_WORDS: usize = 8;
const PAGE_MATCH_MIN_WORDS: usize = 4;

/// Text chunker with configurable size and overlap, both in words
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    words_per_page: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize, words_per_page: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
            words_per_page: words_per_page.max(1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.words_per_page)
    }

    /// Split text into overlapping word windows
    pub fn chunk_text(&self, text: &str, document_title: Option<&str>) -> Vec<NewChunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let total_words = words.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < total_words {
            let end = (start + self.chunk_size).min(total_words);
            let content = words[start..end].join(" ");

            chunks.push(self.body_chunk(
                chunks.len() as i64,
                content,
                start,
                end,
                total_words,
                document_title,
            ));

            start = if end < total_words {
                end.saturating_sub(self.overlap).max(start + 1)
            } else {
                total_words
            };
        }

        chunks
    }

    fn body_chunk(
        &self,
        chunk_index: i64,
        content: String,
        word_start: usize,
        word_end: usize,
        total_words: usize,
        document_title: Option<&str>,
    ) -> NewChunk {
        let word_count = word_end - word_start;
        let relative_position = if total_words > 0 {
            ((word_start as f64 / total_words as f64) * 1000.0).round() / 1000.0
        } else {
            0.0
        };

        NewChunk {
            chunk_index,
            content,
            token_count: word_count as i64,
            page_number: Some((word_start / self.words_per_page + 1) as i64),
            chunk_type: ChunkType::Paragraph,
            chunk_metadata: json!({
                "source_document": document_title,
                "word_start": word_start,
                "word_end": word_end,
                "total_words": total_words,
                "relative_position": relative_position,
                "chunk_size": word_count,
                "has_overlap": word_start > 0,
            }),
            ..Default::default()
        }
    }

    /// Lead chunk holding the document title
    pub fn title_chunk(title: &str, creator: Option<&str>, doi: Option<&str>) -> NewChunk {
        NewChunk {
            chunk_index: 0,
            content: title.to_string(),
            token_count: title.split_whitespace().count() as i64,
            chunk_type: ChunkType::Title,
            page_number: Some(1),
            section_title: Some("Title".to_string()),
            chunk_metadata: json!({
                "source_document": title,
                "section": "title",
                "is_header": true,
                "authors": creator,
                "doi": doi,
            }),
            ..Default::default()
        }
    }

    /// Lead chunk holding the abstract
    pub fn abstract_chunk(abstract_text: &str, document_title: Option<&str>) -> NewChunk {
        let word_count = abstract_text.split_whitespace().count();
        NewChunk {
            chunk_index: 0,
            content: abstract_text.to_string(),
            token_count: word_count as i64,
            chunk_type: ChunkType::Abstract,
            page_number: Some(1),
            section_title: Some("Abstract".to_string()),
            chunk_metadata: json!({
                "source_document": document_title,
                "section": "abstract",
                "is_summary": true,
                "word_count": word_count,
            }),
            ..Default::default()
        }
    }

    /// Number chunks 0..n in their current order
    pub fn reindex(chunks: &mut [NewChunk]) {
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.chunk_index = i as i64;
        }
    }

    /// Title and abstract chunks for the document, in that order
    pub fn lead_chunks(meta: &ExtractedMetadata) -> Vec<NewChunk> {
        let title = meta
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !is_default_title(t));

        let mut lead = Vec::new();
        if let Some(title) = title {
            lead.push(Self::title_chunk(
                title,
                meta.creator.as_deref(),
                meta.doi.as_deref(),
            ));
        }
        if let Some(abstract_text) = meta
            .abstract_text
            .as_deref()
            .filter(|a| !a.trim().is_empty())
        {
            lead.push(Self::abstract_chunk(abstract_text, title));
        }
        lead
    }

    /// Title, abstract, then body windows of the plain fulltext
    pub fn legacy_chunks(&self, body_text: &str, meta: &ExtractedMetadata) -> Vec<NewChunk> {
        let mut chunks = Self::lead_chunks(meta);
        chunks.extend(self.chunk_text(body_text, meta.title.as_deref()));
        Self::reindex(&mut chunks);
        chunks
    }
}

/// Chunker that keeps GROBID sections apart and locates chunks on real pages
#[derive(Debug, Clone)]
pub struct SmartChunker {
    chunker: TextChunker,
}

impl SmartChunker {
    pub fn new(chunker: TextChunker) -> Self {
        Self { chunker }
    }

    /// Chunk each section separately; empty when no section yields text
    pub fn chunk_sections(
        &self,
        sections: &[Section],
        meta: &ExtractedMetadata,
        pages: &[PageText],
    ) -> Vec<NewChunk> {
        let locator = PageLocator::new(pages);
        let document_title = meta.title.as_deref();
        let mut body = Vec::new();
        let mut last_page: Option<i64> = None;

        for (section_index, section) in sections.iter().enumerate() {
            for mut chunk in self.chunker.chunk_text(&section.text(), document_title) {
                let page = locator
                    .locate(&chunk.content, last_page)
                    .or(last_page)
                    .or(chunk.page_number);
                last_page = page;

                chunk.page_number = page;
                chunk.section_title = section.title.clone();
                if let Some(obj) = chunk.chunk_metadata.as_object_mut() {
                    obj.insert("section".to_string(), json!(section.title));
                    obj.insert("section_index".to_string(), json!(section_index));
                }
                body.push(chunk);
            }
        }

        if body.is_empty() {
            return body;
        }

        let mut chunks = TextChunker::lead_chunks(meta);
        chunks.extend(body);
        TextChunker::reindex(&mut chunks);
        chunks
    }
}

/// Normalised page texts for locating chunk openings
struct PageLocator {
    pages: Vec<(i64, String)>,
}

fn normalize_words(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

impl PageLocator {
    fn new(pages: &[PageText]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|p| (p.page_number, format!(" {} ", normalize_words(&p.text).join(" "))))
                .collect(),
        }
    }

    /// Page whose text contains the chunk's opening words
    ///
    /// Pages at or after `from_page` are tried first since chunks arrive in
    /// reading order.
    fn locate(&self, content: &str, from_page: Option<i64>) -> Option<i64> {
        if self.pages.is_empty() {
            return None;
        }

        let words = normalize_words(content);
        if words.is_empty() {
            return None;
        }
        let longest = words.len().min(PAGE_MATCH_WORDS);

        let from = from_page.unwrap_or(1);
        for len in (PAGE_MATCH_MIN_WORDS.min(longest)..=longest).rev() {
            let needle = format!(" {} ", words[..len].join(" "));
            let mut forward = self
                .pages
                .iter()
                .filter(|(n, _)| *n >= from)
                .chain(self.pages.iter().filter(|(n, _)| *n < from));
            if let Some((page, _)) = forward.find(|(_, text)| text.contains(&needle)) {
                return Some(*page);
            }
        }
        None
    }
}
