//! Mode router and turn orchestrator.
//!
//! Each send is a fresh run of a small state machine: guard, admission
//! check, dispatch (image edit or chat completion), optional function-call
//! fan-out, assembly of the structured assistant message, persistence.
//! Capability failures never escape: the user's turn stays in the log and
//! a fixed fallback assistant message is appended instead.

use crate::config::{Config, ConfigError};
use crate::gateway::{CapabilityError, CapabilityGateway, GeminiGateway, HistoryTurn};
use crate::gemini::GeminiClient;
use crate::keys::{KeyRotator, RotationError};
use crate::model::{ConversationMode, Message, UserProfile};
use crate::session::{SessionError, SessionStore};
use crate::tools::CapabilityCall;
use crate::usage::{LedgerError, UsageLedger};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

/// Instruction used instead of the persona in coding mode
const CODING_INSTRUCTION: &str = "You are a Senior Fullstack Architect. When creating web \
    components, provide a complete, self-contained HTML/CSS/JS block inside triple backticks. \
    Focus on clean code. IMPORTANT: Never use double asterisks (**) for bolding.";

/// Default edit instruction when the user attached an image with no text
const DEFAULT_EDIT_PROMPT: &str = "Optimize this image";

/// Reply text when an image edit returned no prose
const EDIT_FALLBACK_REPLY: &str = "Visual processed.";

/// Reply text when the completion came back with no text and no calls
pub const EMPTY_REPLY: &str = "I couldn't process that.";

/// Fixed sentence substituted when the model requests a visual over quota
pub const QUOTA_REACHED_REPLY: &str = "System: Daily visual generation limit reached. \
    Subscribe to Rival Premium for unlimited access.";

/// Fixed fallback appended when a capability call fails
pub const SYSTEM_ERROR_REPLY: &str = "Error in Rival system.";

/// Errors that can escape the orchestrator.
///
/// Capability failures are not among them: those are recovered into a
/// fallback assistant message at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rotation(#[from] RotationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Internal failure inside steps 4-6; collapsed into one fallback reply
#[derive(Debug, Error)]
enum TurnFailure {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One user turn handed to the orchestrator
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: String,
    /// Attached input image (base64 data URL). Attaching an image always
    /// means "edit this image", never "chat about this image".
    pub image: Option<String>,
    pub mode: ConversationMode,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_mode(mut self, mode: ConversationMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Result of one send operation
#[derive(Debug)]
pub enum SendOutcome {
    /// The assistant message that was appended (possibly the fallback)
    Completed(Message),
    /// Daily image quota exhausted; the user turn was appended, no
    /// capability was contacted, and no assistant turn exists
    LimitReached,
    /// Empty turn, or another send is already in flight for this session
    Rejected,
}

/// Orchestrates turns against injected capability, ledger, and session
/// collaborators
pub struct ChatEngine {
    gateway: Arc<dyn CapabilityGateway>,
    ledger: Arc<UsageLedger>,
    sessions: Arc<SessionStore>,
    in_flight: Mutex<HashSet<String>>,
}

impl ChatEngine {
    pub fn new(
        gateway: Arc<dyn CapabilityGateway>,
        ledger: Arc<UsageLedger>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            sessions,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wire up the production engine: validated credentials, key rotation,
    /// the Gemini gateway, and file-backed ledger and session stores
    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        config.validate()?;

        let rotator = Arc::new(KeyRotator::new(config.credentials.api_keys.clone())?);
        let client = GeminiClient::new(rotator, &config.gemini);
        let gateway: Arc<dyn CapabilityGateway> = Arc::new(GeminiGateway::new(client));

        let ledger = match Config::default_usage_path() {
            Some(path) => UsageLedger::open(path, config.usage.daily_image_limit)?,
            None => UsageLedger::new(config.usage.daily_image_limit),
        };
        let sessions = match Config::default_sessions_path() {
            Some(path) => SessionStore::open(path)?,
            None => SessionStore::new(),
        };

        Ok(Self::new(gateway, Arc::new(ledger), Arc::new(sessions)))
    }

    /// Session store handle for the UI layer
    pub fn session_store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    /// Usage ledger handle for the UI layer
    pub fn ledger(&self) -> Arc<UsageLedger> {
        Arc::clone(&self.ledger)
    }

    /// Run one send operation against a session.
    ///
    /// At most one send may be in flight per session; a send for a session
    /// the user has navigated away from still completes and appends to its
    /// original session.
    #[instrument(skip(self, profile, turn), fields(mode = %turn.mode))]
    pub async fn send(
        &self,
        session_id: &str,
        profile: &UserProfile,
        turn: TurnInput,
    ) -> Result<SendOutcome, ChatError> {
        if turn.text.trim().is_empty() && turn.image.is_none() {
            return Ok(SendOutcome::Rejected);
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(session_id.to_string()) {
                debug!("Send already in flight for session {}", session_id);
                return Ok(SendOutcome::Rejected);
            }
        }

        let result = self.run_send(session_id, profile, &turn).await;
        self.in_flight.lock().await.remove(session_id);
        result
    }

    async fn run_send(
        &self,
        session_id: &str,
        profile: &UserProfile,
        turn: &TurnInput,
    ) -> Result<SendOutcome, ChatError> {
        let session = self
            .sessions
            .session(session_id)
            .await
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        let history: Vec<HistoryTurn> = session.messages.iter().map(HistoryTurn::from).collect();

        // The user turn renders before any network latency, and is kept
        // even if the reply later fails
        let mut user = Message::user(&turn.text);
        if let Some(image) = &turn.image {
            user = user.editing_image(image.clone());
        }
        self.sessions.append(session_id, user).await?;

        if turn.mode == ConversationMode::Image || turn.image.is_some() {
            if !self.ledger.check_admission(profile.is_subscribed).await? {
                debug!("Admission denied for session {}", session_id);
                return Ok(SendOutcome::LimitReached);
            }
        }

        let assistant = match self.produce_reply(profile, turn, &history).await {
            Ok(message) => message,
            Err(failure) => {
                error!("Turn failed, appending fallback reply: {}", failure);
                Message::assistant(SYSTEM_ERROR_REPLY)
            }
        };

        self.sessions.append(session_id, assistant.clone()).await?;
        Ok(SendOutcome::Completed(assistant))
    }

    async fn produce_reply(
        &self,
        profile: &UserProfile,
        turn: &TurnInput,
        history: &[HistoryTurn],
    ) -> Result<Message, TurnFailure> {
        // An attached image bypasses the function-calling path entirely
        if let Some(image) = &turn.image {
            let prompt = if turn.text.trim().is_empty() {
                DEFAULT_EDIT_PROMPT
            } else {
                turn.text.as_str()
            };
            let outcome = self.gateway.edit_image(prompt, image).await?;
            let text = if outcome.text.is_empty() {
                EDIT_FALLBACK_REPLY.to_string()
            } else {
                outcome.text
            };
            let mut message = assemble_reply(&text);
            if let Some(url) = outcome.image_url {
                self.record_usage(profile).await;
                message = message.with_image(url);
            }
            return Ok(message);
        }

        let instruction = mode_instruction(turn.mode, &profile.ai_persona);
        let outcome = self.gateway.chat(&turn.text, history, &instruction).await?;

        if let Some(call) = outcome.calls.first().cloned() {
            if outcome.calls.len() > 1 {
                warn!(
                    "Upstream requested {} function calls; dispatching only the first",
                    outcome.calls.len()
                );
            }
            return self.dispatch(profile, &turn.text, call).await;
        }

        let text = if outcome.text.is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            outcome.text
        };
        Ok(assemble_reply(&text))
    }

    async fn dispatch(
        &self,
        profile: &UserProfile,
        user_text: &str,
        call: CapabilityCall,
    ) -> Result<Message, TurnFailure> {
        debug!("Dispatching capability call '{}'", call.name());
        match call {
            CapabilityCall::GenerateVisual { prompt } => {
                // The model may request an image even when the explicit
                // mode didn't; re-check admission here
                if !self.ledger.check_admission(profile.is_subscribed).await? {
                    return Ok(Message::assistant(QUOTA_REACHED_REPLY));
                }
                let prompt = prompt.unwrap_or_else(|| user_text.to_string());
                let outcome = self.gateway.generate_image(&prompt).await?;
                let text = if outcome.text.is_empty() {
                    format!("Generated visual for: \"{}\"", prompt)
                } else {
                    outcome.text
                };
                let mut message = assemble_reply(&text);
                if let Some(url) = outcome.image_url {
                    self.record_usage(profile).await;
                    message = message.with_image(url);
                }
                Ok(message)
            }
            CapabilityCall::SearchWeb { query } => {
                let outcome = self.gateway.search_web(&query).await?;
                Ok(assemble_reply(&outcome.summary).with_sources(outcome.sources))
            }
            CapabilityCall::GenerateDocument {
                title,
                content,
                format,
            } => {
                let url = self
                    .gateway
                    .generate_document(&title, &content, format)
                    .await?;
                let text = format!("Document \"{}\" is ready to download.", title);
                Ok(Message::assistant(text).with_document_url(url))
            }
            CapabilityCall::SummarizeYoutube { url } => {
                let summary = self.gateway.summarize_youtube(&url).await?;
                Ok(assemble_reply(&summary))
            }
            CapabilityCall::FindLocation { query } => {
                let map = self.gateway.find_location(&query).await?;
                let text = format!("Here is the location for \"{}\".", map.place_name);
                Ok(Message::assistant(text).with_map(map))
            }
            CapabilityCall::GenerateEbook {
                title,
                topic,
                pages,
            } => {
                let ebook = self.gateway.generate_ebook(&title, &topic, pages).await?;
                let text = format!(
                    "Your eBook \"{}\" is ready ({} pages).",
                    title,
                    ebook.pages.len()
                );
                Ok(Message::assistant(text).with_ebook(ebook))
            }
        }
    }

    /// Usage is recorded only after an image actually came back; a failure
    /// to persist the counter must not fail the turn
    async fn record_usage(&self, profile: &UserProfile) {
        if let Err(e) = self.ledger.record_usage(profile.is_subscribed).await {
            error!("Failed to record image usage: {}", e);
        }
    }
}

/// System instruction for the active mode
fn mode_instruction(mode: ConversationMode, persona: &str) -> String {
    match mode {
        ConversationMode::General | ConversationMode::Image => persona.to_string(),
        ConversationMode::Coding => CODING_INSTRUCTION.to_string(),
        ConversationMode::Websearch => format!(
            "{persona}\n\nThe user is in web-search mode: prefer the search_web function \
             whenever fresh information would help."
        ),
        ConversationMode::Youtube => format!(
            "{persona}\n\nThe user is in video mode: use the summarize_youtube function \
             when given a video URL."
        ),
        ConversationMode::Document => format!(
            "{persona}\n\nThe user is in document mode: use the generate_document function \
             to deliver requested documents."
        ),
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\n(.*?)\n```").unwrap())
}

/// First fenced code block, verbatim; non-greedy, stops at the first
/// closing fence
pub fn extract_code(text: &str) -> Option<String> {
    fence_regex().captures(text).map(|c| c[1].to_string())
}

/// The display text with all fenced blocks removed and surrounding
/// whitespace trimmed
pub fn strip_code_blocks(text: &str) -> String {
    fence_regex().replace_all(text, "").trim().to_string()
}

/// Build the assistant message: prose and the extracted artifact are kept
/// separate
fn assemble_reply(text: &str) -> Message {
    match extract_code(text) {
        Some(snippet) => Message::assistant(strip_code_blocks(text)).with_code_snippet(snippet),
        None => Message::assistant(text),
    }
}
