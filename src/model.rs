//! Shared data models for Rival.
//!
//! This module contains the types that flow between the orchestrator,
//! the capability gateway, and the persisted session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a conversational turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Per-conversation behavioral switch selecting system instructions and
/// default capability routing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    #[default]
    General,
    Coding,
    Image,
    Websearch,
    Youtube,
    Document,
}

impl std::fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationMode::General => write!(f, "general"),
            ConversationMode::Coding => write!(f, "coding"),
            ConversationMode::Image => write!(f, "image"),
            ConversationMode::Websearch => write!(f, "websearch"),
            ConversationMode::Youtube => write!(f, "youtube"),
            ConversationMode::Document => write!(f, "document"),
        }
    }
}

/// A single web source returned by the search capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSource {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Geocoded location returned by the location capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapData {
    pub latitude: f64,
    pub longitude: f64,
    pub place_name: String,
    pub address: String,
    pub maps_url: String,
}

/// One page of a generated ebook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EbookPage {
    pub page_number: u32,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A generated ebook, paginated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EbookData {
    pub title: String,
    pub pages: Vec<EbookPage>,
}

/// One conversational turn: text plus optional structured attachments.
///
/// A message is created exactly once (at send time for user turns, at
/// response-assembly time for assistant turns) and never mutated afterwards
/// except for the `is_saved` toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Generated/edited image for assistant turns, attached input image for
    /// user turns (base64 data URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// User turns only: whether the turn carried image-edit intent
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_image_editing: bool,

    /// First fenced code block extracted from the reply, previewable as an
    /// artifact separate from the prose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapData>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebook: Option<EbookData>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<WebSource>>,

    /// The single mutable field on an otherwise-immutable message
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_saved: bool,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            image_url: None,
            is_image_editing: false,
            code_snippet: None,
            map: None,
            ebook: None,
            document_url: None,
            sources: None,
            is_saved: false,
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Mark a user turn as carrying image-edit intent
    pub fn editing_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self.is_image_editing = true;
        self
    }

    pub fn with_code_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }

    pub fn with_map(mut self, map: MapData) -> Self {
        self.map = Some(map);
        self
    }

    pub fn with_ebook(mut self, ebook: EbookData) -> Self {
        self.ebook = Some(ebook);
        self
    }

    pub fn with_document_url(mut self, url: impl Into<String>) -> Self {
        self.document_url = Some(url.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<WebSource>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// Placeholder title a session carries until its first turn (or the user)
/// renames it
pub const DEFAULT_SESSION_TITLE: &str = "New Session";

/// An ordered, append-only log of turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_mode: Option<ConversationMode>,
}

impl ChatSession {
    /// Create a fresh empty session with the placeholder title
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            updated_at: Utc::now(),
            active_mode: None,
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Daily image-operation counter, keyed by calendar date (YYYY-MM-DD).
/// Exactly one live entry exists at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserUsage {
    pub last_reset_date: String,
    pub image_count: u32,
}

impl UserUsage {
    /// Fresh counter for the given calendar date
    pub fn for_date(date: impl Into<String>) -> Self {
        Self {
            last_reset_date: date.into(),
            image_count: 0,
        }
    }
}

/// User identity, assistant persona, and presentation preferences.
///
/// Only `ai_persona` and `is_subscribed` feed into the orchestrator; the
/// rest is carried for the rendering layer through the same storage blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub ai_avatar: String,
    pub bio: String,
    pub theme: String,
    pub font: String,
    pub font_size: u32,
    pub ai_name: String,
    pub ai_persona: String,
    pub is_subscribed: bool,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "User Instance".to_string(),
            email: "user@rival.studio".to_string(),
            avatar: String::new(),
            ai_avatar: String::new(),
            bio: "Rival Intelligence Architect.".to_string(),
            theme: "white".to_string(),
            font: "inter".to_string(),
            font_size: 16,
            ai_name: "Rival".to_string(),
            ai_persona: "You are Rival, a professional and elegant AI assistant. \
                IMPORTANT: Never use double asterisks (**) for bolding. Always \
                respond in clean plain text without any markdown bold markers."
                .to_string(),
            is_subscribed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        assert_eq!(ConversationMode::General.to_string(), "general");
        assert_eq!(ConversationMode::Websearch.to_string(), "websearch");
    }

    #[test]
    fn test_message_constructors() {
        let user = Message::user("Hello").editing_image("data:image/png;base64,abc");
        assert_eq!(user.role, Role::User);
        assert!(user.is_image_editing);
        assert!(user.image_url.is_some());

        let assistant = Message::assistant("Hi").with_code_snippet("fn main() {}");
        assert_eq!(assistant.role, Role::Assistant);
        assert!(!assistant.is_saved);
    }

    #[test]
    fn test_message_serde_skips_empty_attachments() {
        let msg = Message::user("plain");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("image_url"));
        assert!(!json.contains("is_saved"));
        assert!(!json.contains("is_image_editing"));
    }

    #[test]
    fn test_session_starts_with_placeholder_title() {
        let session = ChatSession::new();
        assert_eq!(session.title, DEFAULT_SESSION_TITLE);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn test_mode_round_trips_through_serde() {
        let json = serde_json::to_string(&ConversationMode::Coding).unwrap();
        assert_eq!(json, "\"coding\"");
        let mode: ConversationMode = serde_json::from_str(&json).unwrap();
        assert_eq!(mode, ConversationMode::Coding);
    }
}
