//! Pluggable local AI backend for statement parsing
//!
//! Turns extracted statement text plus the user's category list into raw
//! candidate transactions. All backends run locally (no cloud APIs).
//!
//! # Architecture
//!
//! - `StatementParser` trait: the parsing-service contract the import pipeline depends on
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, openai_compatible, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Category, RawTransaction};
use crate::prompts::{PromptId, PromptLibrary};

/// Statement parsing service
///
/// Implementations must be Send + Sync so one client can serve concurrent
/// pipeline runs.
#[async_trait]
pub trait StatementParser: Send + Sync {
    /// Extract candidate transactions from statement text
    ///
    /// `categories` is the caller's snapshot; backends use it to steer the
    /// suggested category names but may return labels outside it.
    async fn parse_statement(
        &self,
        statement_text: &str,
        categories: &[Category],
    ) -> Result<Vec<RawTransaction>>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Model name (for logging)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Rendered prompt pair for a parse request
pub(crate) struct ParsePrompt {
    pub system: Option<String>,
    pub user: String,
}

/// Render the parse_statement prompt for one statement
pub(crate) fn render_parse_prompt(
    prompts: &RwLock<PromptLibrary>,
    statement_text: &str,
    categories: &[Category],
) -> Result<ParsePrompt> {
    let category_list = format_categories(categories);
    let mut prompts = prompts
        .write()
        .map_err(|_| Error::Config("Failed to acquire prompt library lock".into()))?;
    let template = prompts.get(PromptId::ParseStatement)?;

    let mut vars = HashMap::new();
    vars.insert("categories", category_list.as_str());
    vars.insert("statement", statement_text);

    Ok(ParsePrompt {
        system: template.system_section().map(str::to_string),
        user: template.render_user(&vars),
    })
}

fn format_categories(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| match c.description.as_deref().filter(|d| !d.is_empty()) {
            Some(desc) => format!("- {}: {}", c.name, desc),
            None => format!("- {}", c.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// OpenAI-compatible backend (vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Offline line-matching backend for tests and demos
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Returns None if the selected backend's required variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AIClient::Ollama)
            }
        }
    }

    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

#[async_trait]
impl StatementParser for AIClient {
    async fn parse_statement(
        &self,
        statement_text: &str,
        categories: &[Category],
    ) -> Result<Vec<RawTransaction>> {
        match self {
            AIClient::Ollama(b) => b.parse_statement(statement_text, categories).await,
            AIClient::OpenAICompatible(b) => b.parse_statement(statement_text, categories).await,
            AIClient::Mock(b) => b.parse_statement(statement_text, categories).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        assert!(AIClient::mock().health_check().await);
    }

    #[test]
    fn test_format_categories_includes_descriptions() {
        let mut dining = Category::system("Dining Out");
        dining.description = Some("Restaurants and takeout".into());
        let list = format_categories(&[Category::system("Groceries"), dining]);
        assert_eq!(list, "- Groceries\n- Dining Out: Restaurants and takeout");
    }

    #[test]
    fn test_render_parse_prompt_fills_both_variables() {
        let prompts = RwLock::new(PromptLibrary::embedded_only());
        let prompt = render_parse_prompt(
            &prompts,
            "01/15 WALMART 42.10",
            &[Category::system("Groceries")],
        )
        .unwrap();
        assert!(prompt.system.is_some());
        assert!(prompt.user.contains("- Groceries"));
        assert!(prompt.user.contains("01/15 WALMART 42.10"));
    }
}
