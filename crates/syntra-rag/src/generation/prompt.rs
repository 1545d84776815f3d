//! Prompt templates for chat answers, metadata extraction and question generation

/// System instruction prepended to every chat prompt
pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant for knowledge base queries. \
     Use the following context to answer the user's question. \
     If the answer is not in the context, say you don't know.";

/// Prompt builder for LLM calls
pub struct PromptBuilder;

impl PromptBuilder {
    /// Chat prompt over retrieved chunk texts
    pub fn build_chat_prompt<S: AsRef<str>>(contexts: &[S], message: &str) -> String {
        let context = contexts
            .iter()
            .map(|c| c.as_ref())
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{}\n\nContext:\n{}\n\nUser: {}\nAssistant:",
            CHAT_SYSTEM_PROMPT, context, message
        )
    }

    /// Ask for the listed metadata fields as a JSON object
    pub fn build_metadata_prompt(text_sample: &str, missing_fields: &[&str]) -> String {
        format!(
            r#"You extract bibliographic metadata from academic and scientific documents.

DOCUMENT TEXT:
"""
{text}
"""

TASK:
Extract the following metadata from the document above: {fields}

FIELD RULES:
1. "title": REQUIRED. The title is usually at the start of the document, before the abstract.
   If it is not stated clearly, write a descriptive title based on the main topic. Never return null.
2. "abstract": the summary or abstract of the document.
3. "keywords": main keywords separated by commas. If none are given, write 3-5 based on the topic.
4. "creator": the name of the first author.
5. "contributor": the other authors, separated by commas.
6. "publisher": the publisher, journal or institution.
7. "language": main language code ("en" for English, "id" for Indonesian, ...).
8. "description": a one or two sentence summary of the content.
9. "date": the publication date as YYYY-MM-DD or YYYY.
10. "source": the journal, conference or other publication venue.
11. "coverage": geographic or temporal scope of the research, if stated.

OUTPUT RULES:
- Answer ONLY with valid JSON.
- "title" and "keywords" must never be null.
- Use null for any other field that cannot be found.
- Do not invent information, except for title and keywords.

RESPONSE FORMAT (JSON ONLY):
{{
    "title": "...",
    "abstract": "...",
    "keywords": "keyword1, keyword2, keyword3",
    "creator": "...",
    "contributor": "...",
    "publisher": "...",
    "language": "...",
    "description": "...",
    "date": "...",
    "source": "...",
    "coverage": "..."
}}"#,
            text = text_sample,
            fields = missing_fields.join(", ")
        )
    }

    /// Ask for `count` questions the chunk answers, as a JSON array
    pub fn build_questions_prompt(
        text_sample: &str,
        section_title: Option<&str>,
        document_title: Option<&str>,
        count: usize,
    ) -> String {
        let mut context_info = String::new();
        if let Some(title) = document_title {
            context_info.push_str(&format!("Document: {}\n", title));
        }
        if let Some(section) = section_title {
            context_info.push_str(&format!("Section: {}\n", section));
        }

        let example: Vec<String> = (1..=count)
            .map(|i| format!("    \"Question {}?\"", i))
            .collect();

        format!(
            r#"You write hypothetical questions for passages of academic documents.
The questions are used for SEMANTIC SEARCH (embedding-based retrieval), so their wording matters.

{context_info}
TEXT:
"""
{text}
"""

TASK:
Write {count} questions that the text above answers.

RULES:
1. Questions must be SPECIFIC and tied directly to the content of the text.
2. Vary the question forms (what, how, why, who, when, ...).
3. Each question must be answerable ONLY from the text.
4. Use the same language as the text.
5. Avoid generic or irrelevant questions.
6. Questions should sound natural, like a reader would ask them.
7. VERY IMPORTANT: never use vague references such as "this paper", "this study", "the text" or "it".
   Always name the specific subject from the text. Vague references make embeddings that cannot
   tell passages apart.

RESPONSE FORMAT (JSON array only, no markdown):
[
{example}
]"#,
            context_info = context_info,
            text = text_sample,
            count = count,
            example = example.join(",\n")
        )
    }
}
