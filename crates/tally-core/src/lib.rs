//! Tally Core Library
//!
//! Statement import pipeline for the Tally personal finance tool:
//! - Statement upload state machine (upload -> parse -> review -> confirm)
//! - Summary-row filtering and category resolution for parsed lines
//! - Pluggable local AI backends for statement parsing (Ollama, OpenAI-compatible)
//! - Prompt library for customizable AI prompts
//! - Database access and migrations, with a confirmation outbox
//! - Typed event registry and cooperative cancellation

pub mod ai;
pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extract;
pub mod filter;
pub mod ledger;
pub mod models;
pub mod prompts;
pub mod resolver;
pub mod service;
pub mod statement;
pub mod storage;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIClient, MockBackend, OllamaBackend, OpenAICompatibleBackend, StatementParser};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::ImportConfig;
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use events::EventRegistry;
pub use extract::{PdfTextExtractor, TextExtractor};
pub use ledger::TransactionCreator;
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use resolver::{CategoryResolver, CategorySnapshot, MatchTier};
pub use service::ImportService;
pub use statement::{EventKind, ImportCommand, ImportConfirmed, ImportEvent, Transition};
pub use storage::{FileStorage, LocalFileStorage};
