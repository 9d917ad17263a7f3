//! Generation provider trait and backends

use crate::retrieval::NO_CONTEXT_MARKER;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// System prompt framing the assistant as clinical decision support
pub const SYSTEM_PROMPT: &str = "You are a clinical decision support assistant. \
Answer the clinician's question using ONLY the provided context from the \
knowledge base. Cite sources by their [Source N] labels. If the context does \
not contain the information needed, say so explicitly rather than guessing. \
Your answers inform but never replace clinical judgment.";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API key environment variable {var} is not set")]
    MissingApiKey { var: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    BadResponse(String),
}

/// One generation request, carrying the question and any retrieved context
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    /// None when retrieval found nothing usable
    pub context: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Build the user-role prompt from the question and retrieved context
pub fn build_prompt(request: &GenerationRequest) -> String {
    match &request.context {
        Some(context) => format!(
            "Context from the knowledge base:\n\n{}\n\nQuestion: {}",
            context, request.question
        ),
        None => format!(
            "Context from the knowledge base:\n\n{}\n\nQuestion: {}",
            NO_CONTEXT_MARKER, request.question
        ),
    }
}

/// A backend capable of producing an answer for a request
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Configured name, used in attempt records and response attribution
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Backend for any OpenAI-compatible chat completions endpoint.
///
/// Covers both Groq and OpenAI; they differ only in base URL, model name,
/// and which environment variable holds the key.
pub struct OpenAiCompatProvider {
    name: String,
    endpoint: String,
    model: String,
    api_key_env: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key_env: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key_env: api_key_env.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<String, ProviderError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey {
                var: self.api_key_env.clone(),
            })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let prompt = build_prompt(request);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::BadResponse("no choices in response".to_string()))?;

        if answer.trim().is_empty() {
            return Err(ProviderError::BadResponse("empty completion".to_string()));
        }
        Ok(answer)
    }
}

/// Terminal stage of the chain: always succeeds, clearly marked degraded.
///
/// With context available it surfaces the retrieved excerpts verbatim so
/// the clinician still gets the source material; without context it says
/// the knowledge base had nothing relevant.
pub struct StaticFallback;

impl StaticFallback {
    pub fn render(request: &GenerationRequest) -> String {
        match &request.context {
            Some(context) => format!(
                "[Degraded mode: no language model is currently reachable.]\n\n\
                 The most relevant excerpts from the knowledge base are shown \
                 below. Please review them directly.\n\n{}",
                context
            ),
            None => format!(
                "[Degraded mode: no language model is currently reachable.]\n\n{} \
                 No answer can be generated for: {}",
                NO_CONTEXT_MARKER, request.question
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            question: "When should antibiotics be given in sepsis?".to_string(),
            context: context.map(str::to_string),
            temperature: 0.2,
            max_tokens: 512,
        }
    }

    #[test]
    fn prompt_includes_context_and_question() {
        let prompt = build_prompt(&request(Some("[Source 1] (Relevance: 0.91)\nwithin one hour")));
        assert!(prompt.contains("[Source 1]"));
        assert!(prompt.contains("within one hour"));
        assert!(prompt.contains("When should antibiotics be given in sepsis?"));
    }

    #[test]
    fn prompt_without_context_carries_the_marker() {
        let prompt = build_prompt(&request(None));
        assert!(prompt.contains(NO_CONTEXT_MARKER));
    }

    #[test]
    fn fallback_echoes_context_when_present() {
        let text = StaticFallback::render(&request(Some("excerpt body")));
        assert!(text.contains("Degraded mode"));
        assert!(text.contains("excerpt body"));
    }

    #[test]
    fn fallback_without_context_names_the_question() {
        let text = StaticFallback::render(&request(None));
        assert!(text.contains(NO_CONTEXT_MARKER));
        assert!(text.contains("antibiotics"));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let provider = OpenAiCompatProvider::new(
            "primary",
            "https://api.example.com/v1/chat/completions",
            "test-model",
            "MEDRAG_TEST_KEY_THAT_IS_NOT_SET",
        );
        assert!(matches!(
            provider.api_key(),
            Err(ProviderError::MissingApiKey { .. })
        ));
    }
}
