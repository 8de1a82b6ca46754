//! OpenRouter-compatible backend.
//!
//! Same chat-completions shape as OpenAI with two differences: attribution
//! headers, and error bodies that may wrap the upstream provider's message.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::provider::openai::{network_error, parse_retry_after};
use crate::provider::response::{
    error_message_from_body, parse_analysis, response_text, ChatRequest, ChatResponse,
};
use crate::provider::{Analysis, AnalysisRequest, ProviderError, VisionProvider};

const REFERER: &str = "https://github.com/altomatic/altomatic";
const TITLE: &str = "Altomatic";

pub struct OpenRouterProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl OpenRouterProvider {
    pub fn new(client: Client, base_url: String, model: String, api_key: SecretString) -> Self {
        Self {
            client,
            base_url,
            model,
            api_key,
        }
    }
}

impl VisionProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        let _span = tracing::info_span!("provider.openrouter", model = %self.model).entered();

        let payload = ChatRequest::vision(
            &self.model,
            &request.image.data_url,
            &request.prompt,
            request.vision_detail.as_str(),
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .map_err(network_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after: parse_retry_after(&response),
            });
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Auth(
                "Invalid OpenRouter API key.".to_string(),
            ));
        }

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: error_message_from_body(&body),
            });
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|e| ProviderError::MalformedResponse(format!("invalid response body: {}", e)))?;

        let content = response_text(&chat)?;
        debug!("model output: {}", content);

        parse_analysis(content, chat.usage.as_ref())
    }
}
