//! Capability gateway.
//!
//! Thin per-capability adapters, each wrapping one upstream call and
//! normalizing its result into a typed outcome. The `CapabilityGateway`
//! trait is the orchestrator's dependency-injection seam: production code
//! wires in `GeminiGateway`, tests substitute a mock.
//!
//! The auxiliary capabilities (web search, document, youtube, location)
//! are interface-level stubs: the core only routes arguments to them and
//! folds their typed result into the assistant message.

use crate::gemini::GeminiClient;
use crate::model::{EbookData, EbookPage, MapData, Message, Role, WebSource};
use crate::tools::{CapabilityCall, DocumentFormat};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, instrument};

/// Classified adapter failure.
///
/// The classification exists for logging and diagnostics; the orchestrator
/// collapses every variant into one generic user-visible fallback message.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Invalid API credential: {0}")]
    InvalidCredential(String),

    #[error("Upstream quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// One prior turn, mapped to the upstream's two-role scheme
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            text: message.content.clone(),
        }
    }
}

/// Normalized chat completion: reply text plus any requested capability
/// calls, already validated into the typed union
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub text: String,
    pub calls: Vec<CapabilityCall>,
}

/// Normalized image generation/edit result
#[derive(Debug, Clone, Default)]
pub struct ImageOutcome {
    /// Base64 data URL when the upstream produced inline image data
    pub image_url: Option<String>,
    pub text: String,
}

/// Web search result: a summary plus the sources behind it
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub summary: String,
    pub sources: Vec<WebSource>,
}

/// The full set of upstream capabilities the orchestrator can invoke
#[async_trait]
pub trait CapabilityGateway: Send + Sync {
    async fn chat(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        system_instruction: &str,
    ) -> Result<ChatOutcome, CapabilityError>;

    async fn generate_image(&self, prompt: &str) -> Result<ImageOutcome, CapabilityError>;

    async fn edit_image(
        &self,
        prompt: &str,
        image_base64: &str,
    ) -> Result<ImageOutcome, CapabilityError>;

    async fn search_web(&self, query: &str) -> Result<SearchOutcome, CapabilityError>;

    async fn generate_document(
        &self,
        title: &str,
        content: &str,
        format: DocumentFormat,
    ) -> Result<String, CapabilityError>;

    async fn summarize_youtube(&self, url: &str) -> Result<String, CapabilityError>;

    async fn find_location(&self, query: &str) -> Result<MapData, CapabilityError>;

    async fn generate_ebook(
        &self,
        title: &str,
        topic: &str,
        pages: u32,
    ) -> Result<EbookData, CapabilityError>;
}

/// Production gateway backed by the Gemini API
pub struct GeminiGateway {
    client: GeminiClient,
}

impl GeminiGateway {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityGateway for GeminiGateway {
    async fn chat(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        system_instruction: &str,
    ) -> Result<ChatOutcome, CapabilityError> {
        self.client.chat(prompt, history, system_instruction).await
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageOutcome, CapabilityError> {
        self.client.generate_image(prompt).await
    }

    async fn edit_image(
        &self,
        prompt: &str,
        image_base64: &str,
    ) -> Result<ImageOutcome, CapabilityError> {
        self.client.edit_image(prompt, image_base64).await
    }

    // Stubbed: real search needs a search API key. The contract is the
    // interface, not the result quality.
    #[instrument(skip(self))]
    async fn search_web(&self, query: &str) -> Result<SearchOutcome, CapabilityError> {
        debug!("Serving stubbed web search");
        let sources = vec![WebSource {
            title: format!("Search results for: {}", query),
            url: format!("https://www.google.com/search?q={}", encode_query(query)),
            snippet: format!("Information about {} from trusted sources.", query),
        }];
        let summary = format!(
            "Based on a web search for \"{}\", here is what was found from trusted sources.",
            query
        );
        Ok(SearchOutcome { summary, sources })
    }

    // Stubbed: returns a data-URL handle rather than a rendered file.
    async fn generate_document(
        &self,
        _title: &str,
        content: &str,
        format: DocumentFormat,
    ) -> Result<String, CapabilityError> {
        Ok(format!(
            "data:{};base64,{}",
            format.mime_type(),
            BASE64_STANDARD.encode(content)
        ))
    }

    // Stubbed: identifies the video but has no transcript source.
    #[instrument(skip(self))]
    async fn summarize_youtube(&self, url: &str) -> Result<String, CapabilityError> {
        let Some(video_id) = extract_video_id(url) else {
            return Ok("That does not look like a valid YouTube URL. Please provide a full video link.".to_string());
        };

        Ok(format!(
            "YouTube video summary (ID: {id}):\n\n\
             This video covers the requested topic. For the full content, watch it at: {url}\n\n\
             Note: automatic transcript summarization is under development; currently the \
             system identifies the video and provides an access link.",
            id = video_id,
            url = url
        ))
    }

    // Stubbed geocoder: fixed coordinates plus a real maps link.
    async fn find_location(&self, query: &str) -> Result<MapData, CapabilityError> {
        Ok(MapData {
            latitude: -6.2088,
            longitude: 106.8456,
            place_name: query.to_string(),
            address: format!("Address for {}", query),
            maps_url: format!(
                "https://www.google.com/maps/search/?api=1&query={}",
                encode_query(query)
            ),
        })
    }

    /// Generates ebook pages through a JSON-output chat call
    #[instrument(skip(self))]
    async fn generate_ebook(
        &self,
        title: &str,
        topic: &str,
        pages: u32,
    ) -> Result<EbookData, CapabilityError> {
        let max_pages = pages.min(10);
        let prompt = format!(
            "Create a professional {max_pages}-page eBook/playbook about \"{topic}\".\n\n\
             For each page, provide:\n\
             1. Page number\n\
             2. Content (detailed, informative, well-structured)\n\
             3. A suggested image description for visual enhancement\n\n\
             Format your response as JSON with this structure:\n\
             {{\n  \"pages\": [\n    {{\n      \"pageNumber\": 1,\n      \
             \"content\": \"Page content here...\",\n      \
             \"imageDescription\": \"Description of suggested image\"\n    }}\n  ]\n}}"
        );

        let json = self.client.generate_json(&prompt).await?;
        ebook_from_json(title, &json)
    }
}

/// Fold the upstream's JSON page list into typed ebook data
fn ebook_from_json(title: &str, json: &Value) -> Result<EbookData, CapabilityError> {
    let pages = json
        .get("pages")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            CapabilityError::Malformed("ebook response has no 'pages' array".to_string())
        })?;

    let pages = pages
        .iter()
        .enumerate()
        .map(|(i, page)| EbookPage {
            page_number: page
                .get("pageNumber")
                .and_then(|n| n.as_u64())
                .map(|n| n as u32)
                .unwrap_or(i as u32 + 1),
            content: page
                .get("content")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string(),
            image_url: None,
        })
        .collect();

    Ok(EbookData {
        title: title.to_string(),
        pages,
    })
}

/// Extract the video id from the common YouTube URL shapes
fn extract_video_id(url: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&\n?#]+)").unwrap(),
            Regex::new(r"youtube\.com/embed/([^&\n?#]+)").unwrap(),
        ]
    });

    patterns
        .iter()
        .find_map(|p| p.captures(url))
        .map(|c| c[1].to_string())
}

/// Minimal query-string escaping for the stubbed link builders
fn encode_query(query: &str) -> String {
    query.trim().replace(' ', "+")
}
