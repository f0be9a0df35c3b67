use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};

#[derive(Deserialize)]
pub struct Config {
    pub mail: MailSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub payments: PaymentsSection,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Seconds between inbox sweeps; 0 means run once and exit.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_db_path() -> String {
    "inboxpay.db".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

#[derive(Deserialize)]
pub struct MailSection {
    pub api_key: String,
    #[serde(default = "default_mail_base_url")]
    pub base_url: String,
    /// Email-shaped inbox identifier, e.g. "bills@example.agentmail.to".
    #[serde(default)]
    pub inbox_id: String,
    /// Where bill summaries are forwarded after processing.
    pub user_email: String,
    /// Mail sent from this domain is the agent's own output and is skipped.
    #[serde(default = "default_agent_domain")]
    pub agent_domain: String,
}

fn default_mail_base_url() -> String {
    "https://api.agentmail.to/v0".to_string()
}

fn default_agent_domain() -> String {
    "agentmail.to".to_string()
}

#[derive(Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default)]
    pub ollama: OllamaEndpoint,
    #[serde(default)]
    pub remote: RemoteEndpoint,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            ollama: OllamaEndpoint::default(),
            remote: RemoteEndpoint::default(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

fn default_llm_timeout_secs() -> u64 {
    10
}

fn default_llm_max_tokens() -> u32 {
    256
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// No model configured; rule-based extraction only.
    #[default]
    Disabled,
    Ollama,
    Remote,
}

#[derive(Deserialize)]
pub struct OllamaEndpoint {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaEndpoint {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

#[derive(Deserialize)]
pub struct RemoteEndpoint {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default = "default_remote_model")]
    pub model: String,
}

impl Default for RemoteEndpoint {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            model: default_remote_model(),
        }
    }
}

fn default_remote_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_remote_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Autopay thresholds. Both bounds are inclusive.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_autopay_limit_cents")]
    pub autopay_limit_cents: i64,
    #[serde(default = "default_autopay_window_days")]
    pub autopay_window_days: i64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            autopay_limit_cents: default_autopay_limit_cents(),
            autopay_window_days: default_autopay_window_days(),
        }
    }
}

fn default_autopay_limit_cents() -> i64 {
    15_000
}

fn default_autopay_window_days() -> i64 {
    10
}

#[derive(Deserialize)]
pub struct PaymentsSection {
    /// In demo mode no payment API is contacted; dry runs succeed locally.
    #[serde(default = "default_true")]
    pub demo_mode: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_payments_url")]
    pub base_url: String,
}

impl Default for PaymentsSection {
    fn default() -> Self {
        Self {
            demo_mode: true,
            api_key: String::new(),
            base_url: default_payments_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_payments_url() -> String {
    "https://api.methodfi.com".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Persist a newly provisioned inbox id back into the config file.
    pub fn update_inbox_id(
        path: impl AsRef<Path>,
        inbox_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path)?;
        let mut doc = content.parse::<DocumentMut>()?;

        doc["mail"]["inbox_id"] = value(inbox_id);

        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[mail]
api_key = "am_test"
user_email = "owner@example.com"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.mail.base_url, "https://api.agentmail.to/v0");
        assert_eq!(cfg.llm.backend, LlmBackend::Disabled);
        assert_eq!(cfg.llm.timeout_secs, 10);
        assert_eq!(cfg.policy.autopay_limit_cents, 15_000);
        assert_eq!(cfg.policy.autopay_window_days, 10);
        assert!(cfg.payments.demo_mode);
        assert_eq!(cfg.poll_interval_secs, 30);
    }

    #[test]
    fn backend_names_are_lowercase() {
        let cfg: Config = toml::from_str(
            r#"
[mail]
api_key = "k"
user_email = "u@example.com"

[llm]
backend = "ollama"
"#,
        )
        .unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Ollama);
    }
}
