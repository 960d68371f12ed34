//! Ollama backend implementation
//!
//! HTTP client for the Ollama `/api/generate` endpoint. Requests JSON-mode
//! output and uses the prompt library for the extraction prompt.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::{Category, RawTransaction};
use crate::prompts::PromptLibrary;

use super::parsing::parse_statement_response;
use super::{render_parse_prompt, StatementParser};

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::with_prompts(base_url, model, PromptLibrary::new())
    }

    /// Create with a specific prompt library (tests use embedded prompts only)
    pub fn with_prompts(base_url: &str, model: &str, prompts: PromptLibrary) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            prompts: Arc::new(RwLock::new(prompts)),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    format: &'static str,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl StatementParser for OllamaBackend {
    async fn parse_statement(
        &self,
        statement_text: &str,
        categories: &[Category],
    ) -> Result<Vec<RawTransaction>> {
        let prompt = render_parse_prompt(&self.prompts, statement_text, categories)?;

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.user,
            system: prompt.system,
            format: "json",
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(model = %self.model, chars = ollama_response.response.len(), "Ollama response received");

        parse_statement_response(&ollama_response.response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
