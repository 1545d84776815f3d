//! Hypothetical question generation for chunks

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::generation::PromptBuilder;
use crate::providers::LlmProvider;

use super::llm_metadata::parse_json_reply;

const MIN_CONTENT_CHARS: usize = 30;
const MAX_SAMPLE_CHARS: usize = 4000;
const MIN_LINE_QUESTION_CHARS: usize = 10;

fn fenced_array() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\[.*?\])\s*```").ok())
        .as_ref()
}

fn bare_array() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").ok()).as_ref()
}

fn list_marker() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+[.)]\s*)?(?:[-*]\s*)?").ok())
        .as_ref()
}

fn strings_of(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect()
}

/// Questions from a model reply
///
/// Tries a JSON array, a fenced array, the first bracketed array, then
/// numbered or bulleted lines that end in `?`.
pub fn parse_questions(reply: &str) -> Vec<String> {
    if let Some(values) = parse_json_reply::<Vec<Value>>(reply, fenced_array(), bare_array()) {
        return strings_of(values);
    }

    reply
        .lines()
        .map(str::trim)
        .map(|line| match list_marker() {
            Some(re) => re.replace(line, "").trim().to_string(),
            None => line.to_string(),
        })
        .filter(|q| q.ends_with('?') && q.chars().count() > MIN_LINE_QUESTION_CHARS)
        .collect()
}

/// Generate up to `count` questions the chunk answers
///
/// Short content and LLM failures give an empty list.
pub async fn generate_questions(
    llm: &dyn LlmProvider,
    content: &str,
    section_title: Option<&str>,
    document_title: Option<&str>,
    count: usize,
) -> Vec<String> {
    if content.trim().chars().count() < MIN_CONTENT_CHARS {
        return Vec::new();
    }

    let sample: String = content.chars().take(MAX_SAMPLE_CHARS).collect();
    let prompt =
        PromptBuilder::build_questions_prompt(&sample, section_title, document_title, count);

    match llm.generate(&prompt).await {
        Ok(reply) => {
            let mut questions = parse_questions(&reply);
            questions.truncate(count);
            questions
        }
        Err(e) => {
            tracing::warn!("Question generation failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_array() {
        assert_eq!(
            parse_questions(r#"["What is NDVI?", "  ", 3, "How is yield measured?"]"#),
            vec!["What is NDVI?", "How is yield measured?"]
        );
    }

    #[test]
    fn test_fenced_array() {
        let reply = "```json\n[\"Why does rainfall matter?\"]\n```";
        assert_eq!(parse_questions(reply), vec!["Why does rainfall matter?"]);
    }

    #[test]
    fn test_embedded_array() {
        let reply = "Questions: [\"Which sensor was used?\"] done";
        assert_eq!(parse_questions(reply), vec!["Which sensor was used?"]);
    }

    #[test]
    fn test_line_fallback() {
        let reply = "Here are questions:\n1. What model predicts rice yield?\n2) Short?\n- How was the data collected?\n* Not a question\n";
        assert_eq!(
            parse_questions(reply),
            vec![
                "What model predicts rice yield?",
                "How was the data collected?"
            ]
        );
    }
}
