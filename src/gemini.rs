use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::error::AiError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";

const CHAT_SYSTEM_INSTRUCTION: &str = "You are a friendly and helpful marketing assistant. \
Your role is to help users refine their email campaigns. You can suggest alternative copy, \
answer marketing questions, or brainstorm ideas. Keep your responses concise and actionable.";

/// One turn of a Gemini conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part { text: text.to_string() }],
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part { text: text.to_string() }],
        }
    }
}

/// Structured campaign copy returned by the text stage. `image_prompt`
/// feeds the image stage and is never shown to the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignContent {
    pub subject: String,
    pub body: String,
    pub image_prompt: String,
}

/// Handle for the multi-turn assistant conversation. Owned by the state
/// machine; a turn is committed only after its reply streams to completion.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    history: Vec<Content>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the conversation with `message` appended as the next
    /// user turn, ready to send.
    pub fn contents_with(&self, message: &str) -> Vec<Content> {
        let mut contents = self.history.clone();
        contents.push(Content::user(message));
        contents
    }

    /// Commit a completed exchange.
    pub fn record_turn(&mut self, user: &str, reply: &str) {
        self.history.push(Content::user(user));
        self.history.push(Content::model(reply));
    }

    pub fn turn_count(&self) -> usize {
        self.history.len()
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: String,
    mime_type: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
            text_model: config
                .text_model
                .clone()
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: config
                .image_model
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        }
    }

    /// Reads the API key from `GEMINI_API_KEY`, falling back to the config
    /// file. Without a key the adapter cannot be constructed at all.
    pub fn from_env(config: &Config) -> Result<Self, AiError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| config.gemini_api_key.clone())
            .ok_or_else(|| {
                AiError::Initialization(
                    "GEMINI_API_KEY is not set. Export it or add it to the config file."
                        .to_string(),
                )
            })?;
        Ok(Self::new(&api_key, config))
    }

    /// Opens the singleton assistant conversation. Called once at startup.
    pub fn start_chat(&self) -> ChatSession {
        ChatSession::new()
    }

    /// Generates the structured subject/body/imagePrompt triple for a
    /// campaign brief.
    pub async fn generate_campaign_content(
        &self,
        prompt: &str,
    ) -> Result<CampaignContent, AiError> {
        if prompt.trim().is_empty() {
            return Err(AiError::Generation(
                "The campaign prompt is empty.".to_string(),
            ));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.text_model, self.api_key
        );
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!(
                    "Generate a complete email marketing campaign based on this prompt: \"{}\". \
                     The tone should be professional yet engaging.",
                    prompt
                )}],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": campaign_content_schema(),
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Generation(format!("Could not reach the text model: {}", e)))?;

        if !response.status().is_success() {
            return Err(AiError::Generation(format!(
                "Failed to generate campaign text. The model might be unavailable \
                 or the request was invalid (status {}).",
                response.status()
            )));
        }

        let decoded: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AiError::Generation(format!("Malformed text model response: {}", e)))?;

        let payload = first_text(decoded).ok_or_else(|| {
            AiError::Generation("The model returned no campaign text.".to_string())
        })?;

        parse_campaign_content(&payload)
    }

    /// Generates exactly one 16:9 marketing image and returns it as a
    /// self-contained data URI.
    pub async fn generate_image(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!(
            "{}/models/{}:predict?key={}",
            self.base_url, self.image_model, self.api_key
        );
        let body = json!({
            "instances": [{
                "prompt": format!(
                    "Create a photorealistic, high-quality marketing image for an email campaign. \
                     Prompt: {}",
                    prompt
                ),
            }],
            "parameters": { "sampleCount": 1, "aspectRatio": "16:9" },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Generation(format!("Could not reach the image model: {}", e)))?;

        if !response.status().is_success() {
            return Err(AiError::Generation(format!(
                "Failed to generate image. The model might be unavailable \
                 or the prompt was rejected (status {}).",
                response.status()
            )));
        }

        let decoded: PredictResponse = response
            .json()
            .await
            .map_err(|e| AiError::Generation(format!("Malformed image model response: {}", e)))?;

        let prediction = decoded
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Generation("No image was generated.".to_string()))?;

        let mime = prediction
            .mime_type
            .unwrap_or_else(|| "image/png".to_string());
        Ok(format!("data:{};base64,{}", mime, prediction.bytes_base64_encoded))
    }

    /// Streams the assistant's reply, invoking `on_fragment` for each text
    /// chunk in arrival order. Returns the concatenated reply.
    pub async fn stream_message<F>(
        &self,
        contents: &[Content],
        mut on_fragment: F,
    ) -> Result<String, AiError>
    where
        F: FnMut(String),
    {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.text_model, self.api_key
        );
        let body = json!({
            "systemInstruction": { "parts": [{ "text": CHAT_SYSTEM_INSTRUCTION }] },
            "contents": contents,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Streaming(format!("Could not reach the assistant: {}", e)))?;

        if !response.status().is_success() {
            return Err(AiError::Streaming(format!(
                "The assistant is unavailable (status {}).",
                response.status()
            )));
        }

        let mut reply = String::new();
        let mut buffer = SseBuffer::default();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk
                .map_err(|e| AiError::Streaming(format!("The reply was interrupted: {}", e)))?;
            for payload in buffer.push(&bytes) {
                if let Some(text) = fragment_text(&payload) {
                    reply.push_str(&text);
                    on_fragment(text);
                }
            }
        }

        if reply.is_empty() {
            return Err(AiError::Streaming(
                "The assistant returned an empty reply.".to_string(),
            ));
        }

        Ok(reply)
    }
}

/// Response schema the text stage must satisfy; validated again on our side
/// after decoding.
fn campaign_content_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "subject": {
                "type": "STRING",
                "description": "A compelling, concise email subject line (max 15 words)."
            },
            "body": {
                "type": "STRING",
                "description": "The full email body copy, formatted with markdown. It should be \
                                engaging, persuasive, and include a clear call to action."
            },
            "imagePrompt": {
                "type": "STRING",
                "description": "A detailed, descriptive prompt for an image generator to create a \
                                relevant and visually appealing marketing image for the email. \
                                This should describe a scene, not just keywords."
            }
        },
        "required": ["subject", "body", "imagePrompt"]
    })
}

fn parse_campaign_content(payload: &str) -> Result<CampaignContent, AiError> {
    let content: CampaignContent = serde_json::from_str(payload.trim()).map_err(|e| {
        AiError::Generation(format!("The model returned malformed campaign data: {}", e))
    })?;

    if content.subject.trim().is_empty()
        || content.body.trim().is_empty()
        || content.image_prompt.trim().is_empty()
    {
        return Err(AiError::Generation(
            "The model returned an incomplete campaign. Please try again.".to_string(),
        ));
    }

    Ok(content)
}

fn first_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn fragment_text(payload: &str) -> Option<String> {
    let response: GenerateContentResponse = serde_json::from_str(payload).ok()?;
    first_text(response)
}

/// Line buffer for `text/event-stream` bodies. Bytes arrive in arbitrary
/// chunks; complete `data:` payloads come out in arrival order.
#[derive(Default)]
struct SseBuffer {
    buf: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_campaign_content() {
        let payload = r#"{
            "subject": "Brew a Better Tomorrow",
            "body": "**Good coffee** should not cost the earth.",
            "imagePrompt": "a rustic coffee farm at sunrise"
        }"#;

        let content = parse_campaign_content(payload).unwrap();
        assert_eq!(content.subject, "Brew a Better Tomorrow");
        assert_eq!(content.image_prompt, "a rustic coffee farm at sunrise");
    }

    #[test]
    fn test_parse_campaign_content_missing_field() {
        let payload = r#"{ "subject": "Hello", "body": "World" }"#;
        assert!(parse_campaign_content(payload).is_err());
    }

    #[test]
    fn test_parse_campaign_content_wrong_type() {
        let payload = r#"{ "subject": "Hello", "body": "World", "imagePrompt": 7 }"#;
        assert!(parse_campaign_content(payload).is_err());
    }

    #[test]
    fn test_parse_campaign_content_empty_field() {
        let payload = r#"{ "subject": "Hello", "body": "World", "imagePrompt": "  " }"#;
        assert!(parse_campaign_content(payload).is_err());
    }

    #[test]
    fn test_sse_buffer_reassembles_split_chunks() {
        let mut buffer = SseBuffer::default();

        // A payload split mid-line across two network chunks.
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        let payloads = buffer.push(b" 1}\n\ndata: {\"b\": 2}\n");
        assert_eq!(payloads, vec![r#"{"a": 1}"#, r#"{"b": 2}"#]);
    }

    #[test]
    fn test_sse_buffer_ignores_non_data_lines() {
        let mut buffer = SseBuffer::default();
        let payloads = buffer.push(b"event: ping\nretry: 100\ndata: x\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_fragment_text_extracts_candidate_parts() {
        let payload = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hel" }, { "text": "lo" }] }
            }]
        }"#;
        assert_eq!(fragment_text(payload), Some("Hello".to_string()));
    }

    #[test]
    fn test_fragment_text_without_candidates() {
        assert_eq!(fragment_text(r#"{ "candidates": [] }"#), None);
        assert_eq!(fragment_text("not json"), None);
    }

    #[test]
    fn test_chat_session_commits_completed_turns_only() {
        let mut session = ChatSession::new();

        let contents = session.contents_with("shorten the subject");
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].role, "user");
        // Snapshots never mutate the session.
        assert_eq!(session.turn_count(), 0);

        session.record_turn("shorten the subject", "How about \"Brew Better\"?");
        assert_eq!(session.turn_count(), 2);

        let contents = session.contents_with("even shorter");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[2].parts[0].text, "even shorter");
    }
}
