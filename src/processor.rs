// src/processor.rs
//
// Per-message pipeline: fetch -> flatten -> extract -> classify ->
// decide -> record -> pay/reply/notify. Each message is handled by one
// independent invocation; all state lives in the store.

use crate::bill_store::{BillRecord, BillStore, PaymentRecord};
use crate::classify;
use crate::config::Config;
use crate::extract::BillFields;
use crate::llm_extract::{self, ChatModel};
use crate::mail_api::{MailClient, MessageSummary};
use crate::payments;
use crate::policy::{self, Action};
use crate::notify;
use time::OffsetDateTime;
use tracing::{info, info_span, warn};

#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Already recorded; idempotency skip.
    Duplicate,
    /// The agent's own outbound mail, or nothing bill-like in the text.
    NotABill,
    Processed { bill_id: String, action: Action },
}

/// Event-log payloads are documented as JSON blobs, so error text goes
/// through serde_json escaping rather than string formatting.
fn error_payload(e: &dyn std::error::Error) -> String {
    serde_json::json!({ "error": e.to_string() }).to_string()
}

pub struct Processor<'a> {
    mail: &'a MailClient,
    store: &'a BillStore,
    model: Option<&'a dyn ChatModel>,
    cfg: &'a Config,
    http: reqwest::Client,
}

impl<'a> Processor<'a> {
    pub fn new(
        mail: &'a MailClient,
        store: &'a BillStore,
        model: Option<&'a dyn ChatModel>,
        cfg: &'a Config,
    ) -> Self {
        Self {
            mail,
            store,
            model,
            cfg,
            http: reqwest::Client::new(),
        }
    }

    /// List the inbox and run every new message through the pipeline.
    /// Per-message failures are logged and do not abort the sweep.
    pub async fn sweep_inbox(&self) -> Result<usize, Box<dyn std::error::Error>> {
        let inbox_id = &self.cfg.mail.inbox_id;
        let summaries = self.mail.list_messages(inbox_id).await?;
        info!(count = summaries.len(), inbox = %inbox_id, "Inbox listed");

        let mut processed = 0;
        for summary in &summaries {
            let span = info_span!(
                "process_message",
                message_id = %summary.message_id,
                subject = summary.subject.as_deref().unwrap_or("")
            );
            let _guard = span.enter();

            match self.process_message(summary).await {
                Ok(ProcessOutcome::Processed { bill_id, action }) => {
                    info!(bill_id = %bill_id, action = action.as_str(), "Bill processed");
                    processed += 1;
                }
                Ok(ProcessOutcome::Duplicate) => {}
                Ok(ProcessOutcome::NotABill) => {
                    info!("Skipped: not a bill");
                }
                Err(e) => {
                    warn!(error = %e, "Message processing failed");
                    let _ = self.store.log_event(
                        "processing_error",
                        Some(&summary.message_id),
                        Some(&error_payload(e.as_ref())),
                    );
                }
            }
        }
        Ok(processed)
    }

    pub async fn process_message(
        &self,
        summary: &MessageSummary,
    ) -> Result<ProcessOutcome, Box<dyn std::error::Error>> {
        let inbox_id = &self.cfg.mail.inbox_id;

        // Own replies and notifications land back in the same inbox.
        if let Some(from) = &summary.from_addr {
            if classify::is_own_message(from, &self.cfg.mail.agent_domain) {
                return Ok(ProcessOutcome::NotABill);
            }
        }

        if self
            .store
            .find_by_message_id(&summary.message_id)?
            .is_some()
        {
            return Ok(ProcessOutcome::Duplicate);
        }

        let message = self.mail.get_message(inbox_id, &summary.message_id).await?;
        info!(message_id = %message.message_id, "Message fetched");
        let document = message.to_document();
        let text = document.flatten();

        let fields = llm_extract::extract_bill(self.model, &text).await;

        if !classify::looks_like_bill(&text, &fields) {
            self.store
                .log_event("not_a_bill", Some(&summary.message_id), None)?;
            return Ok(ProcessOutcome::NotABill);
        }

        let today = OffsetDateTime::now_utc().date();
        let action = policy::decide(
            fields.amount_cents,
            fields.due_date_iso.as_deref(),
            today,
            &self.cfg.policy,
        );

        let bill_id = BillStore::generate_bill_id(inbox_id, &summary.message_id);
        let bill = BillRecord {
            id: bill_id.clone(),
            inbox_id: inbox_id.clone(),
            thread_id: message.thread_id.clone(),
            message_id: summary.message_id.clone(),
            from_email: message.from_addr.clone(),
            subject: message.subject.clone(),
            payee: fields.payee.clone(),
            amount_cents: fields.amount_cents,
            due_date_iso: fields.due_date_iso.clone(),
            status: action.as_str().to_string(),
            agent_reply_sent: false,
            user_notification_sent: false,
        };
        self.store.insert_bill(&bill)?;
        self.store.log_event(
            "bill_parsed",
            Some(&summary.message_id),
            Some(&serde_json::to_string(&fields)?),
        )?;

        if action == Action::Autopay {
            self.record_payment(&bill_id, &fields).await?;
        }

        if action != Action::Undetermined {
            self.reply_and_notify(&bill, &fields, action).await;
        }

        Ok(ProcessOutcome::Processed { bill_id, action })
    }

    async fn record_payment(
        &self,
        bill_id: &str,
        fields: &BillFields,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // Autopay implies the amount was present.
        let amount_cents = fields.amount_cents.unwrap_or_default();
        let outcome =
            payments::payment_dryrun(&self.http, &self.cfg.payments, bill_id, amount_cents).await;
        self.store.insert_payment(&PaymentRecord {
            bill_id: bill_id.to_string(),
            provider_payment_id: outcome.provider_payment_id.clone(),
            amount_cents,
            dry_run: outcome.dry_run,
            status: outcome.status().to_string(),
        })?;
        Ok(())
    }

    /// Sending is best-effort: a mail failure is logged against the bill
    /// rather than failing the already-recorded processing.
    async fn reply_and_notify(&self, bill: &BillRecord, fields: &BillFields, action: Action) {
        let inbox_id = &self.cfg.mail.inbox_id;
        let subject = bill.subject.as_deref().unwrap_or("your bill");

        let reply_text = notify::compose_reply(action, fields, &bill.id);
        match self
            .mail
            .reply(
                inbox_id,
                &bill.message_id,
                &notify::reply_subject(subject),
                &reply_text,
            )
            .await
        {
            Ok(()) => {
                if let Err(e) = self.store.set_reply_sent(&bill.id) {
                    warn!(error = %e, "Failed to flag reply as sent");
                }
            }
            Err(e) => {
                warn!(error = %e, "Agent reply failed");
                let _ = self
                    .store
                    .log_event("agent_reply_failed", Some(&bill.message_id), None);
            }
        }

        let from_email = bill.from_email.as_deref().unwrap_or("unknown");
        let (summary_subject, summary_body) =
            notify::compose_user_summary(action, fields, subject, from_email, &bill.id);
        match self
            .mail
            .send(
                inbox_id,
                &self.cfg.mail.user_email,
                &summary_subject,
                &summary_body,
            )
            .await
        {
            Ok(()) => {
                if let Err(e) = self.store.set_notification_sent(&bill.id) {
                    warn!(error = %e, "Failed to flag notification as sent");
                }
            }
            Err(e) => {
                warn!(error = %e, "User notification failed");
                let _ = self
                    .store
                    .log_event("user_notification_failed", Some(&bill.message_id), None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::error_payload;
    use crate::classify::looks_like_bill;
    use crate::config::PolicySection;
    use crate::extract::extract_by_rules;
    use crate::policy::{Action, decide};
    use time::{Duration, OffsetDateTime};

    fn iso(date: time::Date) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month() as u8,
            date.day()
        )
    }

    // The full pipeline minus I/O, on a realistic utility bill due 8 days
    // out: amount is over the autopay limit, so approval is requested.
    #[test]
    fn utility_bill_over_limit_requests_approval() {
        let today = OffsetDateTime::now_utc().date();
        let due = iso(today + Duration::days(8));
        let email = format!(
            "From: Commonwealth Edison <billing@comed.com>\n\
             Subject: Your ComEd Electric Bill is Ready\n\n\
             Total Amount Due: $186.55\n\
             Due Date: {due}\n"
        );

        let fields = extract_by_rules(&email);
        assert_eq!(fields.amount_cents, Some(18655));
        assert_eq!(fields.due_date_iso.as_deref(), Some(due.as_str()));
        assert!(
            fields
                .payee
                .as_deref()
                .is_some_and(|p| p.contains("Commonwealth Edison"))
        );

        assert!(looks_like_bill(&email, &fields));

        let action = decide(
            fields.amount_cents,
            fields.due_date_iso.as_deref(),
            today,
            &PolicySection::default(),
        );
        assert_eq!(action, Action::RequestApproval);
    }

    #[test]
    fn small_bill_due_soon_autopays() {
        let today = OffsetDateTime::now_utc().date();
        let due = iso(today + Duration::days(8));
        let email = format!(
            "From: Commonwealth Edison <billing@comed.com>\n\
             Subject: Your ComEd Electric Bill is Ready\n\n\
             Total Amount Due: $89.50\n\
             Due Date: {due}\n"
        );

        let fields = extract_by_rules(&email);
        assert_eq!(fields.amount_cents, Some(8950));

        let action = decide(
            fields.amount_cents,
            fields.due_date_iso.as_deref(),
            today,
            &PolicySection::default(),
        );
        assert_eq!(action, Action::Autopay);
    }

    #[test]
    fn error_payloads_are_valid_json_even_with_control_characters() {
        let err: Box<dyn std::error::Error> = "mail API said \"no\"\x01\nline two".into();
        let payload = error_payload(err.as_ref());
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            parsed["error"].as_str().unwrap(),
            "mail API said \"no\"\x01\nline two"
        );
    }
}
