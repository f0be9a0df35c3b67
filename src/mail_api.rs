// src/mail_api.rs

use crate::config::MailSection;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;
use urlencoding::encode;

/// One inbound message as the extraction pipeline sees it. Optional
/// fields are explicit here, at the collaborator boundary, so downstream
/// code never probes loosely-typed payloads.
#[derive(Debug, Clone, Default)]
pub struct EmailDocument {
    pub from: String,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
}

impl EmailDocument {
    /// Flatten headers, body text, and tag-stripped HTML into the single
    /// blob the parsers operate on.
    pub fn flatten(&self) -> String {
        let mut out = format!("From: {}\nSubject: {}\n\n", self.from, self.subject);
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        if let Some(html) = &self.html {
            out.push_str("\n\n");
            out.push_str(&strip_tags(html));
        }
        out
    }
}

/// Cheap tag removal; enough for keyword and amount scanning.
fn strip_tags(html: &str) -> String {
    let re = Regex::new(r"<[^>]*>").expect("static tag pattern");
    re.replace_all(html, " ").into_owned()
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageSummary>,
}

/// Listing entry returned by the inbox sweep. Only the id is guaranteed;
/// the full payload is fetched per id before processing.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSummary {
    pub message_id: String,
    #[serde(rename = "from", default)]
    pub from_addr: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

/// Full message payload fetched per id.
#[derive(Debug, Clone, Deserialize)]
pub struct MailMessage {
    pub message_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(rename = "from", default)]
    pub from_addr: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

impl MailMessage {
    pub fn to_document(&self) -> EmailDocument {
        EmailDocument {
            from: self.from_addr.clone().unwrap_or_default(),
            subject: self.subject.clone().unwrap_or_default(),
            text: self.text.clone(),
            html: self.html.clone(),
        }
    }
}

/// Thin client for the hosted mail API. Inbox ids are email-shaped and
/// must be percent-encoded into paths.
pub struct MailClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MailClient {
    pub fn new(mail: &MailSection) -> Result<Self, Box<dyn std::error::Error>> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: mail.base_url.trim_end_matches('/').to_string(),
            api_key: mail.api_key.clone(),
        })
    }

    /// Provision a fresh inbox; returns its id.
    pub async fn create_inbox(&self) -> Result<String, Box<dyn std::error::Error>> {
        #[derive(Deserialize)]
        struct CreatedInbox {
            inbox_id: String,
        }

        let url = format!("{}/inboxes", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({}))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let created: CreatedInbox = response.json().await?;
        info!(inbox_id = %created.inbox_id, "Inbox provisioned");
        Ok(created.inbox_id)
    }

    pub async fn list_messages(
        &self,
        inbox_id: &str,
    ) -> Result<Vec<MessageSummary>, Box<dyn std::error::Error>> {
        let url = format!("{}/inboxes/{}/messages", self.base_url, encode(inbox_id));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let list: MessageList = response.json().await?;
        Ok(list.messages)
    }

    pub async fn get_message(
        &self,
        inbox_id: &str,
        message_id: &str,
    ) -> Result<MailMessage, Box<dyn std::error::Error>> {
        let url = format!(
            "{}/inboxes/{}/messages/{}",
            self.base_url,
            encode(inbox_id),
            encode(message_id)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Reply in-thread to an existing message.
    pub async fn reply(
        &self,
        inbox_id: &str,
        message_id: &str,
        subject: &str,
        text: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let url = format!(
            "{}/inboxes/{}/messages/{}/reply",
            self.base_url,
            encode(inbox_id),
            encode(message_id)
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "subject": subject, "text": text }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Send a new message from the agent's inbox.
    pub async fn send(
        &self,
        inbox_id: &str,
        to: &str,
        subject: &str,
        text: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let url = format!("{}/inboxes/{}/messages", self.base_url, encode(inbox_id));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "to": [to], "subject": subject, "text": text }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn check(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(format!("Mail API error {status}: {body}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_prepends_header_lines() {
        let doc = EmailDocument {
            from: "billing@comed.com".to_string(),
            subject: "Your Bill".to_string(),
            text: Some("Amount Due: $10.00".to_string()),
            html: None,
        };
        let flat = doc.flatten();
        assert!(flat.starts_with("From: billing@comed.com\nSubject: Your Bill\n\n"));
        assert!(flat.contains("Amount Due: $10.00"));
    }

    #[test]
    fn flatten_strips_html_tags() {
        let doc = EmailDocument {
            from: "a@b.c".to_string(),
            subject: "s".to_string(),
            text: None,
            html: Some("<p>Total Due <b>$42.00</b></p>".to_string()),
        };
        let flat = doc.flatten();
        assert!(flat.contains("Total Due"));
        assert!(flat.contains("$42.00"));
        assert!(!flat.contains('<'));
    }

    #[test]
    fn flatten_handles_missing_bodies() {
        let doc = EmailDocument {
            from: "a@b.c".to_string(),
            subject: "hello".to_string(),
            text: None,
            html: None,
        };
        assert_eq!(doc.flatten(), "From: a@b.c\nSubject: hello\n\n");
    }
}
