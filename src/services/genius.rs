//! Gemini collaborator.
//!
//! The generative-AI integration is an opaque request/response contract: we
//! send role-tagged content, we get text back. Everything here is thin glue
//! over the `generateContent` REST endpoint; conversation state lives in the
//! session records, not in this client.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::session::{ChatMessage, Role};

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Clone)]
pub struct GeniusClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeniusClient {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{GEMINI_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }

    async fn post_contents(&self, contents: Value) -> AppResult<String> {
        if self.api_key.is_empty() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Gemini API key not configured"
            )));
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "contents": contents }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Gemini API error");
            return Err(AppError::Upstream(format!("Gemini API error {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Gemini response parse failed: {e}")))?;

        extract_text(&payload)
            .ok_or_else(|| AppError::Upstream("Gemini response had no text".into()))
    }

    /// One-shot generation for a single prompt.
    pub async fn generate(&self, prompt: &str) -> AppResult<String> {
        self.post_contents(json!([{
            "role": "user",
            "parts": [{ "text": prompt }],
        }]))
        .await
    }

    /// Continue a conversation: the stored history plus the new user turn.
    pub async fn chat(&self, history: &[ChatMessage], message: &str) -> AppResult<String> {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Model => "model",
                    },
                    "parts": [{ "text": m.content }],
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": message }],
        }));

        self.post_contents(Value::Array(contents)).await
    }

    /// Image understanding: inline base64 data plus an instruction.
    pub async fn describe_image(
        &self,
        mime_type: &str,
        bytes: &[u8],
        prompt: &str,
    ) -> AppResult<String> {
        self.post_contents(json!([{
            "role": "user",
            "parts": [
                { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(bytes) } },
                { "text": prompt },
            ],
        }]))
        .await
    }
}

/// Navigate candidates[0].content.parts[].text, joining multi-part answers.
fn extract_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        return None;
    }
    Some(texts.join("\n\n").trim().to_string())
}

pub fn study_pack_prompt(extracted_text: &str) -> String {
    format!(
        "Generate a concise, easy-to-understand summary and then create \
         a 5-question multiple-choice quiz. Provide an answer key at the end.\
         \n\nTEXT:\n{extracted_text}"
    )
}

pub fn exam_analysis_prompt(document_name: &str, text: &str) -> String {
    format!(
        "You are an exam preparation coach. Analyze the following study \
         material from \"{document_name}\" and identify the topics most \
         likely to be examined, common pitfalls, and a suggested revision \
         order.\n\nTEXT:\n{text}"
    )
}

/// Short human-readable title from the first user message: first five words,
/// title-cased, punctuation stripped, capped at 60 characters.
pub fn session_title(user_message: &str) -> String {
    let cleaned: String = user_message
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.is_empty() {
        return "New Chat".into();
    }

    let take = if words.len() <= 3 { words.len() } else { 5 };
    let title = words
        .iter()
        .take(take)
        .map(|w| title_case(w))
        .collect::<Vec<_>>()
        .join(" ");

    title.chars().take(60).collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_candidate_parts() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "part one" }, { "text": "part two" }],
                    "role": "model",
                }
            }]
        });
        assert_eq!(
            extract_text(&payload).unwrap(),
            "part one\n\npart two"
        );
    }

    #[test]
    fn missing_candidates_yields_none() {
        assert!(extract_text(&json!({"error": {"code": 400}})).is_none());
        assert!(extract_text(&json!({"candidates": []})).is_none());
    }

    #[test]
    fn short_message_titles_whole_text() {
        assert_eq!(session_title("explain photosynthesis"), "Explain Photosynthesis");
    }

    #[test]
    fn long_message_takes_first_five_words() {
        assert_eq!(
            session_title("what is the difference between mitosis and meiosis?"),
            "What Is The Difference Between"
        );
    }

    #[test]
    fn punctuation_is_stripped_and_empty_falls_back() {
        assert_eq!(session_title("?!..."), "New Chat");
        assert_eq!(session_title(""), "New Chat");
        assert_eq!(session_title("hello, world!"), "Hello World");
    }

    #[test]
    fn titles_are_capped_at_sixty_chars() {
        let long = "supercalifragilisticexpialidocious ".repeat(5);
        assert!(session_title(&long).chars().count() <= 60);
    }
}
