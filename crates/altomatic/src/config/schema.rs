use std::collections::HashMap;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::secrets::resolve_secret;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub ocr: OcrSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub output: OutputSettings,
    /// Extra prompt templates, merged over the built-in library.
    #[serde(default)]
    pub prompts: HashMap<String, PromptTemplateConfig>,
}

/// Which remote vision API backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    /// Direct API key value. Prefer `api_key_file` or `api_key_env` outside
    /// local testing.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Endpoint override for OpenAI-compatible gateways.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl ProviderSettings {
    /// Resolves the API credential. A missing credential is the one
    /// misconfiguration that must abort before any job starts.
    pub fn resolve_credential(&self) -> Result<SecretString, ConfigError> {
        Ok(resolve_secret(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env.as_deref(),
        )?)
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub include_subdirectories: bool,
    #[serde(default = "default_language")]
    pub filename_language: String,
    #[serde(default = "default_language")]
    pub alttext_language: String,
    #[serde(default)]
    pub detail_level: DetailLevel,
    #[serde(default)]
    pub vision_detail: VisionDetail,
    #[serde(default = "default_prompt_key")]
    pub prompt: String,
    #[serde(default)]
    pub context: Option<String>,
}

fn default_worker_count() -> usize {
    // Small by default to stay inside provider rate limits.
    num_cpus::get().min(4)
}

fn default_language() -> String {
    "English".to_string()
}

fn default_prompt_key() -> String {
    "default".to_string()
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            include_subdirectories: false,
            filename_language: default_language(),
            alttext_language: default_language(),
            detail_level: DetailLevel::default(),
            vision_detail: VisionDetail::default(),
            prompt: default_prompt_key(),
            context: None,
        }
    }
}

/// How many keywords the generated filename should carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Minimal,
    Normal,
    #[default]
    Detailed,
}

impl DetailLevel {
    /// Word budget wording used in the prompt's output requirements.
    pub fn word_budget(&self) -> &'static str {
        match self {
            DetailLevel::Minimal => "1-2",
            DetailLevel::Normal => "up to 3",
            DetailLevel::Detailed => "up to 8",
        }
    }
}

/// Image fidelity hint forwarded to the vision endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionDetail {
    #[default]
    Auto,
    Low,
    High,
}

impl VisionDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisionDetail::Auto => "auto",
            VisionDetail::Low => "low",
            VisionDetail::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ocr_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ocr_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_ocr_timeout_secs() -> u64 {
    20
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            languages: default_ocr_languages(),
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default = "default_network_retries")]
    pub max_network_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_rate_limit_retries() -> u32 {
    3
}

fn default_network_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: default_rate_limit_retries(),
            max_network_retries: default_network_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Root for session folders. When absent, sessions land next to the
    /// input (the input folder itself, or a file's parent directory).
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub write_summary: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: None,
            write_summary: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplateConfig {
    pub label: String,
    pub template: String,
}
