//! Callable capability declarations and typed call parsing.
//!
//! The chat model may answer a turn by requesting one of these functions
//! instead of replying directly. Declarations are sent upstream as JSON
//! schemas; the untyped argument bags that come back are validated and
//! coerced here, at the boundary, into the `CapabilityCall` tagged union.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Output format for generated documents
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    #[default]
    Pdf,
    Doc,
}

impl DocumentFormat {
    fn from_arg(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "doc" | "docx" => DocumentFormat::Doc,
            _ => DocumentFormat::Pdf,
        }
    }

    /// MIME type for the generated handle
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Doc => "application/msword",
        }
    }
}

/// A capability request parsed from an upstream function call
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityCall {
    GenerateVisual {
        /// Image description; absent when the model called the function
        /// without arguments, in which case the user's text is used
        prompt: Option<String>,
    },
    SearchWeb {
        query: String,
    },
    GenerateDocument {
        title: String,
        content: String,
        format: DocumentFormat,
    },
    SummarizeYoutube {
        url: String,
    },
    FindLocation {
        query: String,
    },
    GenerateEbook {
        title: String,
        topic: String,
        pages: u32,
    },
}

impl CapabilityCall {
    /// Wire name of the requested capability
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityCall::GenerateVisual { .. } => "generate_visual",
            CapabilityCall::SearchWeb { .. } => "search_web",
            CapabilityCall::GenerateDocument { .. } => "generate_document",
            CapabilityCall::SummarizeYoutube { .. } => "summarize_youtube",
            CapabilityCall::FindLocation { .. } => "find_location",
            CapabilityCall::GenerateEbook { .. } => "generate_ebook",
        }
    }
}

fn str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn uint_arg(args: &Value, key: &str) -> Option<u32> {
    let value = args.get(key)?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    // The model occasionally sends numbers as strings
    value.as_str().and_then(|s| s.parse().ok())
}

/// Parse one upstream function call into a typed capability request.
/// Unknown names and calls missing required arguments are dropped.
pub fn parse_call(name: &str, args: &Value) -> Option<CapabilityCall> {
    let parsed = match name {
        "generate_visual" => Some(CapabilityCall::GenerateVisual {
            prompt: str_arg(args, "prompt"),
        }),
        "search_web" => str_arg(args, "query").map(|query| CapabilityCall::SearchWeb { query }),
        "generate_document" => {
            let title = str_arg(args, "title")?;
            let content = str_arg(args, "content").unwrap_or_default();
            let format = str_arg(args, "format")
                .map(|f| DocumentFormat::from_arg(&f))
                .unwrap_or_default();
            Some(CapabilityCall::GenerateDocument {
                title,
                content,
                format,
            })
        }
        "summarize_youtube" => {
            str_arg(args, "url").map(|url| CapabilityCall::SummarizeYoutube { url })
        }
        "find_location" => str_arg(args, "query").map(|query| CapabilityCall::FindLocation { query }),
        "generate_ebook" => {
            let title = str_arg(args, "title")?;
            let topic = str_arg(args, "topic").unwrap_or_else(|| title.clone());
            let pages = uint_arg(args, "pages").unwrap_or(5);
            Some(CapabilityCall::GenerateEbook {
                title,
                topic,
                pages,
            })
        }
        other => {
            warn!("Dropping unknown function call '{}'", other);
            None
        }
    };

    if parsed.is_none() && name != "generate_visual" {
        warn!("Function call '{}' missing required arguments: {}", name, args);
    }
    parsed
}

/// Function declarations registered with every chat completion, in the
/// Gemini `functionDeclarations` schema format
pub fn declarations() -> Value {
    json!([
        {
            "name": "generate_visual",
            "description": "Generate a new image or visual from a text description.",
            "parameters": {
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Detailed description of the image to create."
                    }
                },
                "required": ["prompt"]
            }
        },
        {
            "name": "search_web",
            "description": "Search the web for up-to-date information.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query."
                    }
                },
                "required": ["query"]
            }
        },
        {
            "name": "generate_document",
            "description": "Create a downloadable PDF or DOC document.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Document title." },
                    "content": { "type": "string", "description": "Full document body." },
                    "format": { "type": "string", "enum": ["pdf", "doc"] }
                },
                "required": ["title", "content"]
            }
        },
        {
            "name": "summarize_youtube",
            "description": "Summarize a YouTube video from its URL.",
            "parameters": {
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "The YouTube video URL." }
                },
                "required": ["url"]
            }
        },
        {
            "name": "find_location",
            "description": "Find a location and show it on a map.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Place name or address to look up." }
                },
                "required": ["query"]
            }
        },
        {
            "name": "generate_ebook",
            "description": "Generate a paginated eBook or playbook on a topic.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "eBook title." },
                    "topic": { "type": "string", "description": "Subject the eBook covers." },
                    "pages": { "type": "integer", "description": "Number of pages (max 10)." }
                },
                "required": ["title", "topic"]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_visual() {
        let call = parse_call("generate_visual", &json!({ "prompt": "a red fox" })).unwrap();
        assert_eq!(
            call,
            CapabilityCall::GenerateVisual {
                prompt: Some("a red fox".to_string())
            }
        );

        // Missing prompt still parses; the orchestrator falls back to the
        // user's text
        let call = parse_call("generate_visual", &json!({})).unwrap();
        assert_eq!(call, CapabilityCall::GenerateVisual { prompt: None });
    }

    #[test]
    fn test_parse_search_web_requires_query() {
        assert!(parse_call("search_web", &json!({})).is_none());
        let call = parse_call("search_web", &json!({ "query": "rust 1.80" })).unwrap();
        assert_eq!(call.name(), "search_web");
    }

    #[test]
    fn test_parse_document_format_coercion() {
        let call = parse_call(
            "generate_document",
            &json!({ "title": "Plan", "content": "body", "format": "DOCX" }),
        )
        .unwrap();
        assert_eq!(
            call,
            CapabilityCall::GenerateDocument {
                title: "Plan".to_string(),
                content: "body".to_string(),
                format: DocumentFormat::Doc,
            }
        );
    }

    #[test]
    fn test_parse_ebook_pages_as_string() {
        let call = parse_call(
            "generate_ebook",
            &json!({ "title": "Guide", "topic": "sourdough", "pages": "7" }),
        )
        .unwrap();
        assert_eq!(
            call,
            CapabilityCall::GenerateEbook {
                title: "Guide".to_string(),
                topic: "sourdough".to_string(),
                pages: 7,
            }
        );
    }

    #[test]
    fn test_unknown_call_is_dropped() {
        assert!(parse_call("launch_rockets", &json!({})).is_none());
    }

    #[test]
    fn test_declarations_cover_all_capabilities() {
        let decls = declarations();
        let names: Vec<&str> = decls
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "generate_visual",
                "search_web",
                "generate_document",
                "summarize_youtube",
                "find_location",
                "generate_ebook"
            ]
        );
    }
}
