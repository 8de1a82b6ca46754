//! Prompt assembly for the vision request.
//!
//! Pure string composition: a named template plus the batch's language,
//! detail and context settings, plus any OCR text, become the final prompt.
//! No I/O happens here so the output is fully deterministic.

use std::collections::HashMap;

use crate::config::schema::PromptTemplateConfig;
use crate::worker::job::JobOptions;

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub label: String,
    pub template: String,
}

const DEFAULT_TEMPLATE: &str = "You are Altomatic, an accessibility and SEO expert tasked with returning a lowercase, \
hyphenated image file name followed by concise, context-aware alt text. The file name \
must describe the subject in three to five keywords, use hyphens instead of spaces or \
underscores, stay in lowercase, and avoid filler words. The alt text should be a single \
sentence under 125 characters that explains the visible content and its context without \
starting with phrases like 'image of'. Incorporate supplied context naturally and include \
relevant keywords only when they make sense.";

const CONCISE_TEMPLATE: &str = "You are Altomatic, crafting streamlined image filenames and alt text for fast scanning. \
Generate a lowercase, hyphen-separated file name that captures the subject in up to four \
keywords. Then provide alt text in one sentence (under 125 characters) that highlights the \
subject and the single most important detail, keeping the wording natural, specific, and \
free of redundant openings like 'photo of'.";

const PRODUCT_TEMPLATE: &str = "You are Altomatic, preparing ecommerce-ready image filenames and alt text. Produce a \
lowercase, hyphenated file name that emphasizes product type, key attributes, and a \
relevant keyword if appropriate. For the alt text, write one sentence under 125 characters \
that clearly states the product, standout materials or finishes, notable colors, and any \
usage context that matters to shoppers, avoiding filler language.";

/// Named prompt templates: the built-in set, optionally overlaid with
/// user-supplied templates from the config file.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            "default".to_string(),
            PromptTemplate {
                label: "Balanced descriptive".to_string(),
                template: DEFAULT_TEMPLATE.to_string(),
            },
        );
        templates.insert(
            "concise".to_string(),
            PromptTemplate {
                label: "Concise captions".to_string(),
                template: CONCISE_TEMPLATE.to_string(),
            },
        );
        templates.insert(
            "product".to_string(),
            PromptTemplate {
                label: "Product focus".to_string(),
                template: PRODUCT_TEMPLATE.to_string(),
            },
        );
        Self { templates }
    }

    pub fn with_overrides(overrides: &HashMap<String, PromptTemplateConfig>) -> Self {
        let mut library = Self::builtin();
        for (key, config) in overrides {
            library.templates.insert(
                key.clone(),
                PromptTemplate {
                    label: config.label.clone(),
                    template: config.template.clone(),
                },
            );
        }
        library
    }

    /// Looks up a template by key, falling back to "default".
    pub fn get(&self, key: &str) -> &PromptTemplate {
        self.templates
            .get(key)
            .or_else(|| self.templates.get("default"))
            .expect("built-in 'default' template always present")
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Composes the final prompt sent alongside the image.
pub fn build_prompt(template: &str, options: &JobOptions, ocr_text: &str) -> String {
    let mut parts: Vec<String> = vec![template.trim().to_string()];

    if let Some(context) = options.context.as_deref() {
        let context = context.trim();
        if !context.is_empty() {
            parts.push(format!("\nContext from user:\n{}", context));
        }
    }

    parts.push(format!(
        "\nOutput requirements:\n- 'name': lowercase, dash-separated, {} words in {}.\n- 'alt': single clear sentence in {}.",
        options.detail_level.word_budget(),
        options.filename_language,
        options.alttext_language,
    ));

    let ocr_text = ocr_text.trim();
    if !ocr_text.is_empty() {
        parts.push(format!("\nText detected via OCR:\n{}", ocr_text));
    }

    parts.push("\nRespond ONLY with a valid JSON object containing 'name' and 'alt'.".to_string());

    parts.join("\n")
}
