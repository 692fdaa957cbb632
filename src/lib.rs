//! # Rival Core
//!
//! Core library for Rival - a mode-routing conversational AI engine.
//!
//! This crate provides:
//! - Configuration management
//! - Gemini API client with credential rotation
//! - Daily image quota tracking and enforcement
//! - Capability dispatch (visuals, search, documents, video, maps, ebooks)
//! - Session history with persistence
//! - Turn orchestration (the chat engine)
//! - Shared data models

pub mod chat;
pub mod config;
pub mod gateway;
pub mod gemini;
pub mod keys;
pub mod model;
pub mod session;
pub mod storage;
pub mod tools;
pub mod usage;

pub use chat::{ChatEngine, ChatError, SendOutcome, TurnInput};
pub use config::{Config, ConfigError, GeminiConfig, UsageConfig};
pub use gateway::{CapabilityError, CapabilityGateway, GeminiGateway};
pub use gemini::GeminiClient;
pub use keys::{KeyRotator, RotationError};
pub use model::*;
pub use session::{SessionError, SessionStore};
pub use usage::{LedgerError, UsageLedger};
