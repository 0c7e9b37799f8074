use crate::error::AugmentError;
use crate::models::{AugmenterConfig, SearchResult};
use crate::traits::AnswerAugmenter;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant for a university knowledge base. \
Answer the question using only the provided context. \
If the context does not contain the answer, say that the information is not available in the uploaded documents. \
Answer in the language of the question.";

pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| result.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Asks `augmenter` for an answer, bounded by `timeout`.
///
/// Returns `None` without calling out when there is nothing to ground an
/// answer on, and on any augmenter failure.
pub async fn augment_answer(
    augmenter: &dyn AnswerAugmenter,
    query: &str,
    results: &[SearchResult],
    timeout: Duration,
) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let context = build_context(results);
    let outcome = match tokio::time::timeout(timeout, augmenter.answer(query, &context)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AugmentError::Timeout(timeout)),
    };

    match outcome {
        Ok(answer) => Some(answer),
        Err(error) => {
            warn!(%error, "answer augmentation unavailable");
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct HttpAugmenter {
    client: Client,
    url: Url,
    model: String,
    api_key: Option<String>,
}

impl HttpAugmenter {
    pub fn new(config: &AugmenterConfig) -> Result<Self, AugmentError> {
        let base = format!("{}/", config.endpoint.trim_end_matches('/'));
        let url = Url::parse(&base)?.join("chat/completions")?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl AnswerAugmenter for HttpAugmenter {
    async fn answer(&self, query: &str, context: &str) -> Result<String, AugmentError> {
        let user_prompt = format!("Context:\n{context}\n\nQuestion: {query}");
        let payload = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
        };

        let mut request = self.client.post(self.url.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AugmentError::Status(response.status()));
        }

        let body = response.text().await?;
        debug!(url = %self.url, bytes = body.len(), "augmenter responded");
        parse_completion(&body)
    }
}

fn parse_completion(body: &str) -> Result<String, AugmentError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|error| AugmentError::Malformed(error.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| AugmentError::Malformed("response has no answer text".to_string()))
}
