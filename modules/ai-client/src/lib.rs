mod client;
pub mod error;
pub(crate) mod types;
pub mod util;

pub use error::{AiClientError, Result};

use client::OpenAiClient;
use types::{ChatRequest, WireMessage};

// =============================================================================
// OpenAi Agent
// =============================================================================

/// Handle on one model behind an OpenAI-compatible `/chat/completions`
/// endpoint. Cheap to clone; the wire client is rebuilt per call.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    /// Point at a non-OpenAI gateway that speaks the same wire protocol.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Single-turn chat completion with explicit sampling parameters.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .temperature(temperature)
            .top_p(0.95)
            .max_tokens(max_tokens);

        let response = self.client().chat(&request).await?;

        response.text().ok_or(AiClientError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "gemini-2.5-flash");
        assert_eq!(ai.model(), "gemini-2.5-flash");
    }

    #[test]
    fn test_openai_with_base_url() {
        let ai = OpenAi::new("sk-test", "gemini-2.5-flash")
            .with_base_url("https://gateway.example.com/v1");
        assert_eq!(
            ai.base_url,
            Some("https://gateway.example.com/v1".to_string())
        );
    }
}
