//! Test utilities for tally-core
//!
//! A mock Ollama server so the HTTP parsing backend can be exercised end to
//! end without a model. `/api/generate` runs the offline mock parser over the
//! statement text embedded in the prompt and answers in the JSON shape the
//! parse_statement prompt asks for.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ai::MockBackend;

/// Marker preceding the statement text in the parse_statement prompt
const STATEMENT_MARKER: &str = "Statement text:";

#[derive(Clone)]
enum Behavior {
    /// Parse the statement out of the prompt
    Echo,
    /// Always answer with this model output
    Fixed(String),
    /// Always answer with HTTP 500
    Fail,
}

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(Behavior::Echo).await
    }

    /// Start a server whose model output is always `response`
    pub async fn start_with_response(response: impl Into<String>) -> Self {
        Self::start_with(Behavior::Fixed(response.into())).await
    }

    /// Start a server that fails every generate request
    pub async fn start_failing() -> Self {
        Self::start_with(Behavior::Fail).await
    }

    async fn start_with(behavior: Behavior) -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(Arc::new(behavior));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 4_000_000_000,
        }],
    })
}

async fn handle_generate(
    State(behavior): State<Arc<Behavior>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let response = match behavior.as_ref() {
        Behavior::Fail => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response()
        }
        Behavior::Fixed(output) => output.clone(),
        Behavior::Echo => statement_json(&request.prompt),
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
    .into_response()
}

/// Build the model output for the statement embedded in a prompt
fn statement_json(prompt: &str) -> String {
    let statement = prompt
        .find(STATEMENT_MARKER)
        .map(|i| &prompt[i + STATEMENT_MARKER.len()..])
        .unwrap_or(prompt);

    let transactions: Vec<serde_json::Value> = MockBackend::extract_lines(statement)
        .into_iter()
        .map(|tx| {
            serde_json::json!({
                "date": tx.date.format("%Y-%m-%d").to_string(),
                "description": tx.description,
                "amount": tx.amount.to_string(),
                "currency": tx.currency,
                "suggested_category": tx.suggested_category,
                "original_text": tx.original_text,
            })
        })
        .collect();

    serde_json::json!({ "transactions": transactions }).to_string()
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockOllamaServer::start().await;
        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}/api/tags", server.url()))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_failing_server_returns_500() {
        let server = MockOllamaServer::start_failing().await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/generate", server.url()))
            .json(&serde_json::json!({"model": "m", "prompt": "p", "stream": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_statement_json_reads_text_after_marker() {
        let prompt = "List purchases. Amounts like 9.99 in the instructions are ignored.\nStatement text:\n01/15/2024 WALMART $42.10";
        let json: serde_json::Value = serde_json::from_str(&statement_json(prompt)).unwrap();
        let txs = json["transactions"].as_array().unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0]["description"], "WALMART");
        assert_eq!(txs[0]["date"], "2024-01-15");
    }
}
