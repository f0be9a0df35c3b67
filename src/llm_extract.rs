// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::extract::{self, BillFields};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// The prompt that pins the model to the three-key JSON contract.
const SYSTEM_PROMPT: &str = r#"You are a bill data extraction assistant.
Given the raw text of an email, extract structured data and return ONLY valid JSON.

The JSON must match this schema exactly:
{
  "payee": "string or null",
  "amount_cents": integer or null,
  "due_date_iso": "string in YYYY-MM-DD form, or null"
}

Notes:
- amount_cents is the total amount due in integer cents ($125.50 -> 12550).
- Use null for any field you cannot determine.
- Return ONLY the JSON object, no markdown fences, no commentary."#;

/// Longer emails are clipped before prompting to stay within context limits.
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Seam for the generative-text collaborator, so tests can substitute a
/// canned model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, Box<dyn std::error::Error>>;
}

/// OpenAI-compatible chat endpoint with a bounded per-request timeout.
pub struct HttpChatModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    max_tokens: u32,
}

impl HttpChatModel {
    /// Capability check: `None` when no model backend is configured, which
    /// callers treat as a normal state (rule-based extraction only).
    pub fn from_config(llm: &LlmSection) -> Option<Self> {
        let (base_url, model, api_key) = match llm.backend {
            LlmBackend::Disabled => return None,
            LlmBackend::Ollama => (
                llm.ollama.base_url.clone(),
                llm.ollama.model.clone(),
                // required by the API shape but ignored by Ollama
                "ollama".to_string(),
            ),
            LlmBackend::Remote => {
                let Ok(key) = std::env::var("LLM_API_KEY") else {
                    warn!("LLM_API_KEY not set; model-based extraction disabled");
                    return None;
                };
                (llm.remote.base_url.clone(), llm.remote.model.clone(), key)
            }
        };

        info!(url = %base_url, model = %model, "Model-based extraction enabled");
        Some(Self {
            client: Client::new(),
            base_url,
            model,
            api_key,
            timeout: Duration::from_secs(llm.timeout_secs),
            max_tokens: llm.max_tokens,
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Chat API error {status}: {body}").into());
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| "Empty response from model".into())
    }
}

/// Extract bill fields from flattened email text.
///
/// Prefers the model when one is configured; any transport failure or
/// contract violation falls back to [`extract::extract_by_rules`], so
/// this never fails from the caller's point of view. Exactly one model
/// call is made per invocation; there are no retries.
pub async fn extract_bill(model: Option<&dyn ChatModel>, text: &str) -> BillFields {
    let Some(model) = model else {
        return extract::extract_by_rules(text);
    };

    let clipped = clip(text, MAX_PROMPT_CHARS);
    let user = format!("Extract bill data from the following email:\n\n{clipped}");

    match model.complete(SYSTEM_PROMPT, &user).await {
        Ok(content) => match parse_model_response(&content) {
            Some(fields) => {
                let (filled, total) = fields.coverage();
                info!(filled, total, "Model extraction result");
                fields
            }
            None => {
                warn!("Model response violated the JSON contract; using rule-based extraction");
                extract::extract_by_rules(text)
            }
        },
        Err(e) => {
            warn!(error = %e, "Model call failed; using rule-based extraction");
            extract::extract_by_rules(text)
        }
    }
}

fn clip(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Validate the strict contract. `None` is a structural failure (not a
/// JSON object, or a required key missing) and triggers full fallback.
/// Per-field type violations are softer: that field alone becomes `None`
/// while the rest of the model's answer is kept.
fn parse_model_response(content: &str) -> Option<BillFields> {
    // Strip markdown fences if the model added them despite instructions
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = extract_json_object(trimmed)?;
    let value: Value = serde_json::from_str(json_str).ok()?;
    let obj = value.as_object()?;

    for key in ["payee", "amount_cents", "due_date_iso"] {
        if !obj.contains_key(key) {
            return None;
        }
    }

    Some(BillFields {
        payee: coerce_payee(&obj["payee"]),
        amount_cents: coerce_amount(&obj["amount_cents"]),
        due_date_iso: coerce_due_date(&obj["due_date_iso"]),
    })
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text (e.g. reasoning tokens the prompt failed to suppress).
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&s[start..=end])
}

fn coerce_payee(v: &Value) -> Option<String> {
    let s = v.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn coerce_amount(v: &Value) -> Option<i64> {
    let cents = match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (cents >= 0).then_some(cents)
}

fn coerce_due_date(v: &Value) -> Option<String> {
    let s = v.as_str()?;
    extract::parse_iso_date(s).map(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubModel {
        reply: Result<String, String>,
    }

    impl StubModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                reply: Err(error.to_string()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for StubModel {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
        ) -> Result<String, Box<dyn std::error::Error>> {
            self.reply.clone().map_err(Into::into)
        }
    }

    const SAMPLE: &str = "From: ComEd <billing@comed.com>\n\
                          Subject: Electric Bill\n\n\
                          Amount Due: $125.50\nDue Date: 2025-10-15";

    #[tokio::test]
    async fn no_model_goes_straight_to_rules() {
        let fields = extract_bill(None, SAMPLE).await;
        assert_eq!(fields, extract::extract_by_rules(SAMPLE));
    }

    #[tokio::test]
    async fn malformed_response_equals_rule_output() {
        let stub = StubModel::replying("sorry, I cannot help with that");
        let fields = extract_bill(Some(&stub), SAMPLE).await;
        assert_eq!(fields, extract::extract_by_rules(SAMPLE));
    }

    #[tokio::test]
    async fn transport_error_equals_rule_output() {
        let stub = StubModel::failing("connection reset");
        let fields = extract_bill(Some(&stub), SAMPLE).await;
        assert_eq!(fields, extract::extract_by_rules(SAMPLE));
    }

    #[tokio::test]
    async fn missing_key_triggers_full_fallback() {
        let stub = StubModel::replying(r#"{"payee": "ComEd", "amount_cents": 12550}"#);
        let fields = extract_bill(Some(&stub), SAMPLE).await;
        assert_eq!(fields, extract::extract_by_rules(SAMPLE));
    }

    #[tokio::test]
    async fn valid_model_output_is_used() {
        let stub = StubModel::replying(
            r#"{"payee": "Commonwealth Edison", "amount_cents": 12550, "due_date_iso": "2025-10-15"}"#,
        );
        let fields = extract_bill(Some(&stub), SAMPLE).await;
        assert_eq!(fields.payee.as_deref(), Some("Commonwealth Edison"));
        assert_eq!(fields.amount_cents, Some(12550));
        assert_eq!(fields.due_date_iso.as_deref(), Some("2025-10-15"));
    }

    #[tokio::test]
    async fn markdown_fences_are_tolerated() {
        let stub = StubModel::replying(
            "```json\n{\"payee\": \"ComEd\", \"amount_cents\": 9000, \"due_date_iso\": null}\n```",
        );
        let fields = extract_bill(Some(&stub), SAMPLE).await;
        assert_eq!(fields.amount_cents, Some(9000));
        assert_eq!(fields.due_date_iso, None);
    }

    #[tokio::test]
    async fn bad_field_types_become_null_without_full_fallback() {
        let stub = StubModel::replying(
            r#"{"payee": "ComEd", "amount_cents": "lots", "due_date_iso": "sometime soon"}"#,
        );
        let fields = extract_bill(Some(&stub), SAMPLE).await;
        assert_eq!(fields.payee.as_deref(), Some("ComEd"));
        assert_eq!(fields.amount_cents, None);
        assert_eq!(fields.due_date_iso, None);
    }

    #[test]
    fn amount_coercion_accepts_numeric_strings_and_floats() {
        assert_eq!(coerce_amount(&serde_json::json!(12550)), Some(12550));
        assert_eq!(coerce_amount(&serde_json::json!("12550")), Some(12550));
        assert_eq!(coerce_amount(&serde_json::json!(12550.9)), Some(12550));
        assert_eq!(coerce_amount(&serde_json::json!(-5)), None);
        assert_eq!(coerce_amount(&serde_json::json!(null)), None);
    }

    #[test]
    fn due_date_coercion_requires_calendar_valid_iso() {
        assert_eq!(
            coerce_due_date(&serde_json::json!("2025-10-15")),
            Some("2025-10-15".to_string())
        );
        assert_eq!(coerce_due_date(&serde_json::json!("2025-13-02")), None);
        assert_eq!(coerce_due_date(&serde_json::json!(20251015)), None);
    }

    #[test]
    fn json_object_is_found_amid_reasoning_text() {
        let noisy = "thinking... {\"payee\": null} done";
        assert_eq!(extract_json_object(noisy), Some("{\"payee\": null}"));
        assert_eq!(extract_json_object("no braces"), None);
    }
}
