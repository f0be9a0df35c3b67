// src/payments.rs

use crate::config::PaymentsSection;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

/// Result of a dry-run payment attempt. Never an error: a failed
/// provider call is an unsuccessful outcome the caller records.
#[derive(Debug)]
pub struct PaymentOutcome {
    pub ok: bool,
    pub dry_run: bool,
    pub provider_payment_id: Option<String>,
}

impl PaymentOutcome {
    pub fn status(&self) -> &'static str {
        if self.ok { "simulated" } else { "failed" }
    }
}

/// Issue a dry-run payment. In demo mode (or with no API key) no network
/// call is made and the payment is simulated locally.
pub async fn payment_dryrun(
    client: &Client,
    payments: &PaymentsSection,
    bill_id: &str,
    amount_cents: i64,
) -> PaymentOutcome {
    if payments.demo_mode || payments.api_key.is_empty() {
        info!(bill_id, amount_cents, "Simulated dry-run payment (demo mode)");
        return PaymentOutcome {
            ok: true,
            dry_run: true,
            provider_payment_id: None,
        };
    }

    let url = format!("{}/payments", payments.base_url.trim_end_matches('/'));
    let payload = json!({
        "amount": amount_cents,
        "description": format!("Payment for bill {bill_id}"),
        "dry_run": true,
    });

    match client
        .post(&url)
        .bearer_auth(&payments.api_key)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            let provider_payment_id = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str().map(str::to_string)));
            info!(bill_id, ?provider_payment_id, "Dry-run payment accepted");
            PaymentOutcome {
                ok: true,
                dry_run: true,
                provider_payment_id,
            }
        }
        Ok(response) => {
            warn!(bill_id, status = %response.status(), "Payment API returned an error");
            PaymentOutcome {
                ok: false,
                dry_run: true,
                provider_payment_id: None,
            }
        }
        Err(e) => {
            warn!(bill_id, error = %e, "Payment API unreachable");
            PaymentOutcome {
                ok: false,
                dry_run: true,
                provider_payment_id: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_mode_never_touches_the_network() {
        let payments = PaymentsSection::default();
        let outcome = payment_dryrun(&Client::new(), &payments, "bill-1", 12550).await;
        assert!(outcome.ok);
        assert!(outcome.dry_run);
        assert!(outcome.provider_payment_id.is_none());
        assert_eq!(outcome.status(), "simulated");
    }
}
