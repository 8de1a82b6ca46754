//! Remote vision API backends.
//!
//! One [`VisionProvider`] implementation per backend kind, selected once at
//! session construction. Providers return a value and never touch shared
//! state; retries and bookkeeping belong to the orchestrator.

pub mod error;
pub mod openai;
pub mod openrouter;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

pub use error::ProviderError;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;
pub use response::Analysis;

use crate::config::schema::{ProviderKind, ProviderSettings, VisionDetail};
use crate::error::ConfigError;
use crate::processor::EncodedImage;

/// One fully-assembled request for a single image.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: EncodedImage,
    pub prompt: String,
    pub vision_detail: VisionDetail,
}

pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sends one image + prompt and parses the reply. Blocking; callers run
    /// it on worker threads, never on the event-consuming thread.
    fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Builds the provider selected by the config. Resolving the credential here
/// means a missing key aborts before any job is dispatched.
pub fn build_provider(
    settings: &ProviderSettings,
) -> Result<Arc<dyn VisionProvider>, ConfigError> {
    let api_key = settings.resolve_credential()?;

    let mut builder = reqwest::blocking::Client::builder().timeout(REQUEST_TIMEOUT);
    if let Some(proxy_url) = settings.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| ConfigError::Validation {
            message: format!("Invalid proxy URL '{}': {}", proxy_url, e),
        })?;
        builder = builder.proxy(proxy);
    }
    let client = builder.build().map_err(|e| ConfigError::Validation {
        message: format!("Failed to build HTTP client: {}", e),
    })?;

    let base_url = settings.base_url().trim_end_matches('/').to_string();
    let model = settings.model.clone();

    Ok(match settings.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(client, base_url, model, api_key)),
        ProviderKind::OpenRouter => {
            Arc::new(OpenRouterProvider::new(client, base_url, model, api_key))
        }
    })
}
