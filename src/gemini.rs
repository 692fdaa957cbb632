//! Gemini HTTP API client.
//!
//! Speaks the `generateContent` wire format directly: chat completions with
//! registered function declarations, image generation, and image editing
//! with an inline source image. Every textual fragment that comes back is
//! stripped of bold markers before anyone else sees it; the house style
//! forbids them.

use crate::config::GeminiConfig;
use crate::gateway::{CapabilityError, ChatOutcome, HistoryTurn, ImageOutcome};
use crate::keys::KeyRotator;
use crate::model::Role;
use crate::tools;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Capability roster and house-style rules appended to every chat
/// completion's system instruction
const CAPABILITIES_DIRECTIVE: &str = "\
You have access to multiple capabilities:
- Generate images using the generate_visual function
- Search the web for the latest information using the search_web function
- Create PDF/DOC documents using the generate_document function
- Summarize YouTube videos using the summarize_youtube function
- Find locations and show maps using the find_location function
- Generate eBooks/playbooks using the generate_ebook function

STRICT RULE: Never use double asterisks (**) in your output. No markdown bolding allowed.

For coding tasks, you can write code in ANY language: Python, JavaScript, TypeScript, \
React, Node.js, Java, C++, Go, Rust, etc. Always provide complete, production-ready \
code with proper structure and best practices.";

/// Strip the forbidden bold markers from returned text
pub(crate) fn strip_bold(text: &str) -> String {
    text.replace("**", "")
}

/// Drop a data-URL prefix, leaving bare base64
fn clean_base64(image: &str) -> &str {
    image.split_once(',').map(|(_, data)| data).unwrap_or(image)
}

/// Client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    http: Client,
    keys: Arc<KeyRotator>,
    chat_model: String,
    image_model: String,
}

impl GeminiClient {
    /// Build a client over a key rotator.
    ///
    /// The request timeout comes from config; a timed-out call surfaces as
    /// a network-class capability failure like any other transport error.
    pub fn new(keys: Arc<KeyRotator>, config: &GeminiConfig) -> Self {
        let mut builder = Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        // Falling back to defaults only happens if TLS init fails, which is
        // equivalent to a fatal configuration problem on first use anyway
        let http = builder.build().unwrap_or_default();

        Self {
            http,
            keys,
            chat_model: config.chat_model.clone(),
            image_model: config.image_model.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(
            Arc::new(KeyRotator::new(vec!["test-key".to_string()]).unwrap()),
            &GeminiConfig::default(),
        )
    }

    /// Chat completion with full prior history and the callable capability
    /// roster registered
    #[instrument(skip(self, history, system_instruction), fields(history_len = history.len()))]
    pub async fn chat(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        system_instruction: &str,
    ) -> Result<ChatOutcome, CapabilityError> {
        let persona = if system_instruction.is_empty() {
            "You are Rival, a professional AI assistant."
        } else {
            system_instruction
        };
        let final_instruction = format!("{}\n\n{}", persona, CAPABILITIES_DIRECTIVE);

        let mut contents: Vec<Content> = history.iter().map(Content::from_turn).collect();
        contents.push(Content::user_text(prompt));

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: "system".to_string(),
                parts: vec![Part::Text {
                    text: final_instruction,
                }],
            }),
            tools: Some(vec![ToolDeclarations {
                function_declarations: tools::declarations(),
            }]),
        };

        let response = self.generate(&self.chat_model, &request).await?;
        Ok(chat_outcome_from(response))
    }

    /// Single-shot image generation
    #[instrument(skip(self))]
    pub async fn generate_image(&self, prompt: &str) -> Result<ImageOutcome, CapabilityError> {
        let request = GenerateContentRequest {
            contents: vec![Content::user_text(prompt)],
            system_instruction: None,
            tools: None,
        };

        let response = self.generate(&self.image_model, &request).await?;
        Ok(image_outcome_from(response))
    }

    /// Image edit: the existing image travels as an inline part alongside
    /// the instruction text
    #[instrument(skip(self, image_base64))]
    pub async fn edit_image(
        &self,
        prompt: &str,
        image_base64: &str,
    ) -> Result<ImageOutcome, CapabilityError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".to_string(),
                            data: clean_base64(image_base64).to_string(),
                        },
                    },
                    Part::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
            system_instruction: None,
            tools: None,
        };

        let response = self.generate(&self.image_model, &request).await?;
        Ok(image_outcome_from(response))
    }

    /// Chat call expecting a JSON object back (used by ebook generation).
    /// Tolerates markdown code fences around the payload.
    pub async fn generate_json(&self, prompt: &str) -> Result<Value, CapabilityError> {
        let request = GenerateContentRequest {
            contents: vec![Content::user_text(prompt)],
            system_instruction: None,
            tools: None,
        };

        let response = self.generate(&self.chat_model, &request).await?;
        let text = collect_text(&response);
        extract_json_from_text(&text).ok_or_else(|| {
            CapabilityError::Malformed("expected JSON in upstream response".to_string())
        })
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, CapabilityError> {
        let key = self.keys.next_key();
        let url = format!("{BASE_URL}/{model}:generateContent?key={key}");

        debug!("Calling Gemini model {}", model);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CapabilityError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, body));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| CapabilityError::Malformed(e.to_string()))
    }
}

/// Map an HTTP failure into the adapter error taxonomy
fn classify_http_error(status: StatusCode, body: String) -> CapabilityError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .ok()
        .and_then(|w| w.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CapabilityError::InvalidCredential(message)
        }
        StatusCode::BAD_REQUEST if message.contains("API key") => {
            CapabilityError::InvalidCredential(message)
        }
        StatusCode::TOO_MANY_REQUESTS => CapabilityError::QuotaExceeded(message),
        _ => CapabilityError::Upstream(format!("{}: {}", status, message)),
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclarations>>,
}

#[derive(Debug, Serialize)]
struct ToolDeclarations {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Value,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user_text(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text {
                text: text.to_string(),
            }],
        }
    }

    /// Prior turns map onto the upstream's two roles: user stays user,
    /// assistant becomes "model"
    fn from_turn(turn: &HistoryTurn) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        Self {
            role: role.to_string(),
            parts: vec![Part::Text {
                text: turn.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<ResponseInlineData>,
    #[serde(rename = "functionCall")]
    function_call: Option<ResponseFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn first_candidate_parts(response: GenerateContentResponse) -> Vec<ResponsePart> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default()
}

/// Normalize a chat response: concatenated bold-stripped text plus the
/// parsed capability calls. An empty response is an empty outcome, not an
/// error.
fn chat_outcome_from(response: GenerateContentResponse) -> ChatOutcome {
    let mut text = String::new();
    let mut calls = Vec::new();

    for part in first_candidate_parts(response) {
        if let Some(t) = part.text {
            text.push_str(&strip_bold(&t));
        }
        if let Some(call) = part.function_call {
            match tools::parse_call(&call.name, &call.args) {
                Some(parsed) => calls.push(parsed),
                None => warn!("Ignoring unparseable function call '{}'", call.name),
            }
        }
    }

    ChatOutcome {
        text: text.trim().to_string(),
        calls,
    }
}

/// Normalize an image response: inline data becomes a base64 data URL,
/// accompanying text is bold-stripped
fn image_outcome_from(response: GenerateContentResponse) -> ImageOutcome {
    let mut image_url = None;
    let mut text = String::new();

    for part in first_candidate_parts(response) {
        if let Some(inline) = part.inline_data {
            let mime = inline.mime_type.as_deref().unwrap_or("image/png");
            image_url = Some(format!("data:{};base64,{}", mime, inline.data));
        }
        if let Some(t) = part.text {
            text.push_str(&strip_bold(&t));
        }
    }

    ImageOutcome {
        image_url,
        text: text.trim().to_string(),
    }
}

fn collect_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Try to extract JSON from text that might wrap it in markdown code fences
fn extract_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        return Some(json);
    }

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            let json_str = after_fence[..end].trim();
            if let Ok(json) = serde_json::from_str::<Value>(json_str) {
                return Some(json);
            }
        }
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if let Ok(json) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Some(json);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::CapabilityCall;
    use serde_json::json;

    fn response_from(value: Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_strip_bold() {
        assert_eq!(strip_bold("**bold** and plain"), "bold and plain");
        assert_eq!(strip_bold("untouched"), "untouched");
    }

    #[test]
    fn test_clean_base64_strips_data_url_prefix() {
        assert_eq!(clean_base64("data:image/png;base64,abc123"), "abc123");
        assert_eq!(clean_base64("abc123"), "abc123");
    }

    #[test]
    fn test_chat_outcome_strips_bold_uniformly() {
        let response = response_from(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "**Hello** " },
                        { "text": "**world**" }
                    ]
                }
            }]
        }));
        let outcome = chat_outcome_from(response);
        assert_eq!(outcome.text, "Hello world");
        assert!(outcome.calls.is_empty());
    }

    #[test]
    fn test_chat_outcome_parses_function_calls() {
        let response = response_from(json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "functionCall": {
                            "name": "generate_visual",
                            "args": { "prompt": "a lighthouse" }
                        }
                    }]
                }
            }]
        }));
        let outcome = chat_outcome_from(response);
        assert_eq!(
            outcome.calls,
            vec![CapabilityCall::GenerateVisual {
                prompt: Some("a lighthouse".to_string())
            }]
        );
    }

    #[test]
    fn test_empty_response_is_empty_outcome_not_error() {
        let outcome = chat_outcome_from(response_from(json!({})));
        assert!(outcome.text.is_empty());
        assert!(outcome.calls.is_empty());
    }

    #[test]
    fn test_image_outcome_builds_data_url() {
        let response = response_from(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "inlineData": { "mimeType": "image/png", "data": "aGk=" } },
                        { "text": "**Done**" }
                    ]
                }
            }]
        }));
        let outcome = image_outcome_from(response);
        assert_eq!(
            outcome.image_url.as_deref(),
            Some("data:image/png;base64,aGk=")
        );
        assert_eq!(outcome.text, "Done");
    }

    #[test]
    fn test_extract_json_from_text() {
        assert!(extract_json_from_text(r#"{"key": "value"}"#).is_some());

        let fenced = "Here you go:\n```json\n{\"pages\": []}\n```";
        let json = extract_json_from_text(fenced).unwrap();
        assert!(json["pages"].is_array());

        let embedded = "Sure! {\"a\": 1} as requested";
        assert_eq!(extract_json_from_text(embedded).unwrap()["a"], 1);

        assert!(extract_json_from_text("no json here").is_none());
    }

    #[test]
    fn test_classify_http_error() {
        let err = classify_http_error(StatusCode::UNAUTHORIZED, String::new());
        assert!(matches!(err, CapabilityError::InvalidCredential(_)));

        let err = classify_http_error(
            StatusCode::BAD_REQUEST,
            json!({ "error": { "message": "API key not valid" } }).to_string(),
        );
        assert!(matches!(err, CapabilityError::InvalidCredential(_)));

        let err = classify_http_error(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(err, CapabilityError::QuotaExceeded(_)));

        let err = classify_http_error(StatusCode::INTERNAL_SERVER_ERROR, String::new());
        assert!(matches!(err, CapabilityError::Upstream(_)));
    }

    #[test]
    fn test_history_maps_assistant_to_model_role() {
        let turn = HistoryTurn {
            role: Role::Assistant,
            text: "hi".to_string(),
        };
        let content = Content::from_turn(&turn);
        assert_eq!(content.role, "model");
    }
}
