//! LLM fallback for metadata GROBID could not find

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::generation::PromptBuilder;
use crate::providers::LlmProvider;
use crate::types::ExtractedMetadata;

use super::metadata::{missing_fields, parse_date};

const MIN_TEXT_CHARS: usize = 100;
const MAX_SAMPLE_CHARS: usize = 8000;

fn fenced_object() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

fn bare_object() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").ok()).as_ref()
}

/// Decode JSON from a model reply: the whole reply, then a fenced block, then a bare match
pub(crate) fn parse_json_reply<T: DeserializeOwned>(
    reply: &str,
    fenced: Option<&Regex>,
    bare: Option<&Regex>,
) -> Option<T> {
    if let Ok(value) = serde_json::from_str(reply.trim()) {
        return Some(value);
    }

    if let Some(caps) = fenced.and_then(|re| re.captures(reply)) {
        if let Some(m) = caps.get(1) {
            if let Ok(value) = serde_json::from_str(m.as_str()) {
                return Some(value);
            }
        }
    }

    if let Some(m) = bare.and_then(|re| re.find(reply)) {
        if let Ok(value) = serde_json::from_str(m.as_str()) {
            return Some(value);
        }
    }

    None
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prompt asking only for what `existing` lacks; `None` when there is nothing to ask
pub fn build_extraction_prompt(text: &str, existing: &ExtractedMetadata) -> Option<String> {
    if text.trim().chars().count() < MIN_TEXT_CHARS {
        tracing::warn!("Text too short for LLM metadata extraction");
        return None;
    }

    let missing = missing_fields(existing);
    if missing.is_empty() {
        return None;
    }
    tracing::debug!("Missing fields for LLM: {:?}", missing);

    Some(PromptBuilder::build_metadata_prompt(
        truncate_chars(text, MAX_SAMPLE_CHARS),
        &missing,
    ))
}

fn value_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(text)
    }
}

/// Parse the model's JSON object into metadata fields
pub fn parse_metadata_response(reply: &str) -> Option<ExtractedMetadata> {
    let Some(map) = parse_json_reply::<Map<String, Value>>(reply, fenced_object(), bare_object())
    else {
        tracing::warn!(
            "Could not parse LLM response as JSON: {}",
            truncate_chars(reply, 200)
        );
        return None;
    };

    let field = |name: &str| map.get(name).and_then(value_to_string);

    Some(ExtractedMetadata {
        title: field("title"),
        creator: field("creator"),
        keywords: field("keywords"),
        description: field("description"),
        publisher: field("publisher"),
        contributor: field("contributor"),
        publication_date: field("date").as_deref().and_then(parse_date),
        source: field("source"),
        language: field("language").map(|l| l.to_lowercase()),
        coverage: field("coverage"),
        abstract_text: field("abstract"),
        ..Default::default()
    })
}

/// Ask the LLM for missing fields; failures are logged and give `None`
pub async fn extract_metadata_with_llm(
    llm: &dyn LlmProvider,
    text: &str,
    existing: &ExtractedMetadata,
) -> Option<ExtractedMetadata> {
    let prompt = build_extraction_prompt(text, existing)?;

    match llm.generate(&prompt).await {
        Ok(reply) => parse_metadata_response(&reply),
        Err(e) => {
            tracing::warn!("LLM metadata extraction failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_direct_json() {
        let meta = parse_metadata_response(
            r#"{"title": "Rice Blast Detection", "keywords": ["rice", "blast"], "date": "2020", "language": "EN", "creator": null}"#,
        )
        .unwrap();
        assert_eq!(meta.title.as_deref(), Some("Rice Blast Detection"));
        assert_eq!(meta.keywords.as_deref(), Some("rice, blast"));
        assert_eq!(meta.publication_date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.creator, None);
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "Here you go:\n```json\n{\"title\": \"Fenced\", \"abstract\": \"Text\"}\n```\nThanks";
        let meta = parse_metadata_response(reply).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Fenced"));
        assert_eq!(meta.abstract_text.as_deref(), Some("Text"));
    }

    #[test]
    fn test_parse_embedded_object() {
        let reply = "Sure! {\"title\": \"Embedded\", \"coverage\": \"West Java\"} Hope this helps.";
        let meta = parse_metadata_response(reply).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Embedded"));
        assert_eq!(meta.coverage.as_deref(), Some("West Java"));
    }

    #[test]
    fn test_unparseable_reply() {
        assert!(parse_metadata_response("I cannot help with that.").is_none());
    }

    #[test]
    fn test_prompt_skipped_for_short_text() {
        assert!(build_extraction_prompt("short", &ExtractedMetadata::default()).is_none());
    }

    #[test]
    fn test_prompt_lists_only_missing_fields() {
        let text = "word ".repeat(50);
        let existing = ExtractedMetadata {
            title: Some("Known Title".to_string()),
            creator: Some("Someone".to_string()),
            ..Default::default()
        };
        let prompt = build_extraction_prompt(&text, &existing).unwrap();
        let fields_line = prompt
            .lines()
            .find(|l| l.starts_with("Extract the following metadata"))
            .unwrap();
        assert!(!fields_line.contains("title"));
        assert!(!fields_line.contains("creator"));
        assert!(fields_line.contains("keywords"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
