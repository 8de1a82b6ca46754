use std::collections::HashMap;

use crate::config::schema::{Config, OcrSettings, PromptTemplateConfig};

/// The slice of configuration each worker needs to run attempts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ocr: OcrSettings,
    pub prompt_overrides: HashMap<String, PromptTemplateConfig>,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ocr: config.ocr.clone(),
            prompt_overrides: config.prompts.clone(),
        }
    }
}
