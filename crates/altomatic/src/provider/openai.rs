//! OpenAI-compatible backend.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::provider::response::{
    error_message_from_body, parse_analysis, response_text, ChatRequest, ChatResponse,
};
use crate::provider::{Analysis, AnalysisRequest, ProviderError, VisionProvider};

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl OpenAiProvider {
    pub fn new(client: Client, base_url: String, model: String, api_key: SecretString) -> Self {
        Self {
            client,
            base_url,
            model,
            api_key,
        }
    }
}

impl VisionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        let _span = tracing::info_span!("provider.openai", model = %self.model).entered();

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
                "Invalid OpenAI API key. Please check your settings.".to_string(),
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

pub(crate) fn network_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Network(format!("request timed out: {}", e))
    } else {
        ProviderError::Network(e.to_string())
    }
}

pub(crate) fn parse_retry_after(response: &reqwest::blocking::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
