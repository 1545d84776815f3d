//! Dublin Core metadata assembly, completeness checks and merging

use chrono::NaiveDate;

use crate::providers::HeaderMetadata;
use crate::types::ExtractedMetadata;

/// Title used when nothing better is known
pub const DEFAULT_TITLE: &str = "Untitled";

const MAX_DOI_CHARS: usize = 150;
const MAX_RELATION_REFERENCES: usize = 10;

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// "untitled" or "untitled document", any case
pub fn is_default_title(title: &str) -> bool {
    matches!(
        title.trim().to_lowercase().as_str(),
        "untitled" | "untitled document"
    )
}

fn is_placeholder_title(title: &str) -> bool {
    matches!(
        title.trim().to_lowercase().as_str(),
        "" | "untitled" | "title" | "untitled document"
    )
}

/// Parse the date shapes GROBID emits
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let attempts = [
        (raw.to_string(), "%Y-%m-%d"),
        (format!("{}-01", raw), "%Y-%m-%d"),
        (format!("{}-01-01", raw), "%Y-%m-%d"),
        (raw.to_string(), "%d %B %Y"),
        (format!("1 {}", raw), "%d %B %Y"),
    ];
    attempts
        .iter()
        .find_map(|(value, fmt)| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Map GROBID's header and reference list to document fields
pub fn format_for_database(header: &HeaderMetadata, references: &[String]) -> ExtractedMetadata {
    let creator = header.authors.first().cloned();
    let contributor = if header.authors.len() > 1 {
        Some(header.authors[1..].join(", "))
    } else {
        None
    };

    let title = header
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !is_placeholder_title(t))
        .unwrap_or(DEFAULT_TITLE)
        .to_string();

    let keywords = if header.keywords.is_empty() {
        None
    } else {
        Some(header.keywords.join(", "))
    };

    let relation = if references.is_empty() {
        None
    } else {
        Some(
            references
                .iter()
                .take(MAX_RELATION_REFERENCES)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        )
    };

    ExtractedMetadata {
        title: Some(title),
        creator,
        keywords,
        description: header.abstract_text.clone(),
        publisher: header.publisher.clone(),
        contributor,
        publication_date: header.publication_date.as_deref().and_then(parse_date),
        format: Some("application/pdf".to_string()),
        identifier: header.doi.clone(),
        source: header.journal.clone(),
        language: Some("en".to_string()),
        relation,
        coverage: None,
        doi: header.doi.clone(),
        abstract_text: header.abstract_text.clone(),
        citation_count: references.len() as i64,
    }
}

/// Whether the LLM fallback should run
///
/// True when a critical field (title, abstract, keywords, creator) is missing,
/// the title is a default, or two or more of description, publisher and
/// language are missing.
pub fn is_metadata_incomplete(meta: &ExtractedMetadata) -> bool {
    match meta.title.as_deref() {
        None => return true,
        Some(title) if title.trim().is_empty() || is_default_title(title) => return true,
        _ => {}
    }

    if is_blank(&meta.abstract_text) || is_blank(&meta.keywords) || is_blank(&meta.creator) {
        return true;
    }

    let missing_secondary = [&meta.description, &meta.publisher, &meta.language]
        .into_iter()
        .filter(|v| is_blank(v))
        .count();
    missing_secondary >= 2
}

/// Fields worth asking the LLM for
pub fn missing_fields(meta: &ExtractedMetadata) -> Vec<&'static str> {
    let mut missing = Vec::new();

    let title_missing = meta
        .title
        .as_deref()
        .map_or(true, |t| t.trim().is_empty() || t.to_lowercase().contains("untitled"));
    if title_missing {
        missing.push("title");
    }

    let fields: [(&'static str, bool); 9] = [
        ("abstract", is_blank(&meta.abstract_text)),
        ("keywords", is_blank(&meta.keywords)),
        ("creator", is_blank(&meta.creator)),
        ("contributor", is_blank(&meta.contributor)),
        ("publisher", is_blank(&meta.publisher)),
        ("language", is_blank(&meta.language)),
        ("description", is_blank(&meta.description)),
        ("date", meta.publication_date.is_none()),
        ("source", is_blank(&meta.source)),
    ];
    missing.extend(fields.iter().filter(|(_, m)| *m).map(|(name, _)| *name));

    if is_blank(&meta.coverage) {
        missing.push("coverage");
    }
    missing
}

fn fill(target: &mut Option<String>, value: Option<String>) {
    if is_blank(target) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            *target = Some(value);
        }
    }
}

/// Fill empty fields of `base` from `llm`; existing values win except default titles
pub fn merge_metadata(mut base: ExtractedMetadata, llm: ExtractedMetadata) -> ExtractedMetadata {
    if let Some(title) = llm.title.filter(|t| !t.trim().is_empty()) {
        let replace = base
            .title
            .as_deref()
            .map_or(true, |t| t.trim().is_empty() || is_default_title(t));
        if replace {
            tracing::debug!("LLM filled title: {}", title);
            base.title = Some(title);
        }
    }

    fill(&mut base.creator, llm.creator);
    fill(&mut base.keywords, llm.keywords);
    fill(&mut base.description, llm.description);
    fill(&mut base.publisher, llm.publisher);
    fill(&mut base.contributor, llm.contributor);
    fill(&mut base.format, llm.format);
    fill(&mut base.identifier, llm.identifier);
    fill(&mut base.source, llm.source);
    fill(&mut base.language, llm.language);
    fill(&mut base.relation, llm.relation);
    fill(&mut base.coverage, llm.coverage);
    fill(&mut base.doi, llm.doi);
    fill(&mut base.abstract_text, llm.abstract_text);
    if base.publication_date.is_none() {
        base.publication_date = llm.publication_date;
    }
    base
}

/// First line of raw text that reads like a title
fn title_from_text(raw_text: &str) -> Option<String> {
    raw_text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|line| {
            let len = line.chars().count();
            (10..=300).contains(&len)
                && line.chars().filter(|c| c.is_alphabetic()).count() * 2 >= len
                && !is_placeholder_title(line)
        })
}

/// Guarantee a usable title and a bounded DOI before persisting
pub fn validate_metadata(
    mut meta: ExtractedMetadata,
    raw_text: &str,
    fallback_title: &str,
) -> ExtractedMetadata {
    let needs_title = meta
        .title
        .as_deref()
        .map_or(true, is_placeholder_title);
    if needs_title {
        let title = title_from_text(raw_text)
            .or_else(|| Some(fallback_title.trim().to_string()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        tracing::info!("Using derived title: {}", title);
        meta.title = Some(title);
    }

    meta.doi = meta.doi.take().and_then(|doi| {
        let trimmed = doi.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.chars().take(MAX_DOI_CHARS).collect())
        }
    });

    meta
}
