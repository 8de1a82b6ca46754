//! Chat-completions wire types shared by both provider backends, plus the
//! tolerant parsing that turns a model reply into an [`Analysis`].

use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;

// ── Request ──

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ChatRequest {
    pub fn vision(model: &str, data_url: &str, prompt: &str, detail: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url.to_string(),
                            detail: detail.to_string(),
                        },
                    },
                ],
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

// ── Response ──

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// The model's verdict for one image, written once per successful attempt.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub title: String,
    pub alt_text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    name: String,
    alt: String,
}

/// Pulls the assistant text out of a chat response.
pub fn response_text(response: &ChatResponse) -> Result<&str, ProviderError> {
    let content = response
        .choices
        .first()
        .and_then(|c| c.message.content.as_deref())
        .map(str::trim)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(ProviderError::NoContent);
    }
    Ok(content)
}

/// Finds the first JSON object in the model output. Handles JSON wrapped in
/// Markdown code fences as well as objects embedded in surrounding prose.
pub fn extract_json(text: &str) -> Option<String> {
    static FENCED: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let fenced = FENCED.get_or_init(|| {
        regex::Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static pattern compiles")
    });
    if let Some(captures) = fenced.captures(text) {
        return Some(captures[1].to_string());
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start < end {
        Some(text[start..=end].to_string())
    } else {
        None
    }
}

/// Parses the model text plus usage block into an [`Analysis`].
pub fn parse_analysis(content: &str, usage: Option<&Usage>) -> Result<Analysis, ProviderError> {
    let json = extract_json(content).ok_or_else(|| {
        ProviderError::MalformedResponse("no JSON object in model output".to_string())
    })?;

    let raw: RawAnalysis = serde_json::from_str(&json).map_err(|e| {
        ProviderError::MalformedResponse(format!("missing or invalid 'name'/'alt': {}", e))
    })?;

    let (prompt_tokens, completion_tokens) = token_counts(usage);

    Ok(Analysis {
        title: raw.name,
        alt_text: raw.alt,
        prompt_tokens,
        completion_tokens,
    })
}

/// Itemized counts when present; otherwise the total is attributed to the
/// prompt side so session totals still add up.
fn token_counts(usage: Option<&Usage>) -> (u64, u64) {
    let Some(usage) = usage else { return (0, 0) };
    let completion = usage.completion_tokens.unwrap_or(0);
    let prompt = usage
        .prompt_tokens
        .or_else(|| usage.total_tokens.map(|t| t.saturating_sub(completion)))
        .unwrap_or(0);
    (prompt, completion)
}

/// Digs the most specific error message out of a provider error body:
/// nested provider error first, then the top-level message, then raw text.
pub fn error_message_from_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &value["error"];
        if let Some(message) = error["provider_error"]["message"].as_str() {
            return format!("Provider returned error: {}", message);
        }
        if let Some(message) = error["message"].as_str() {
            return message.to_string();
        }
    }
    body.trim().to_string()
}
