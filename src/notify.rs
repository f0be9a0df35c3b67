// src/notify.rs
//
// Reply and notification text composition. Pure string building; the
// mail client does the sending.

use crate::extract::BillFields;
use crate::policy::Action;

pub fn reply_subject(original_subject: &str) -> String {
    format!("Re: {original_subject}")
}

/// In-thread reply to the biller, keyed off the decided action. Only
/// called for `Autopay` and `RequestApproval`; undetermined bills get no
/// reply.
pub fn compose_reply(action: Action, fields: &BillFields, bill_id: &str) -> String {
    let reference = short_reference(bill_id);
    match action {
        Action::Autopay => format!(
            "Thank you for your bill.\n\n\
             Payment of {} has been scheduled for {}.\n\n\
             Reference: DRYRUN-{reference}\n\n\
             This is an automated response from your InboxPay agent.",
            format_amount(fields.amount_cents),
            format_due_date(fields.due_date_iso.as_deref()),
        ),
        _ => format!(
            "Thank you for your bill.\n\n\
             I'm requesting either a 2-week extension or a 3-month payment plan for this bill.\n\n\
             I'll follow up once I receive confirmation.\n\n\
             Reference: APPROVAL-{reference}\n\n\
             This is an automated response from your InboxPay agent.",
        ),
    }
}

/// Summary email to the inbox owner: subject plus body.
pub fn compose_user_summary(
    action: Action,
    fields: &BillFields,
    original_subject: &str,
    from_email: &str,
    bill_id: &str,
) -> (String, String) {
    let payee = fields.payee.as_deref().unwrap_or("the vendor");
    let (subject, summary) = match action {
        Action::Autopay => (
            format!(
                "InboxPay: Payment Scheduled - {}",
                format_amount(fields.amount_cents)
            ),
            format!(
                "Your agent scheduled a payment of {} to {} for {}.",
                format_amount(fields.amount_cents),
                payee,
                format_due_date(fields.due_date_iso.as_deref()),
            ),
        ),
        _ => (
            format!("InboxPay: Extension Requested - {payee}"),
            format!("Your agent requested a payment extension for the bill from {payee}."),
        ),
    };

    let body = format!(
        "InboxPay Agent Summary\n\n\
         Bill Processed: {original_subject}\n\
         From: {from_email}\n\
         Amount: {}\n\
         Due Date: {}\n\n\
         Action Taken: {summary}\n\n\
         Reference: {bill_id}\n\n\
         Your InboxPay Agent",
        format_amount(fields.amount_cents),
        fields.due_date_iso.as_deref().unwrap_or("Unknown"),
    );

    (subject, body)
}

fn short_reference(bill_id: &str) -> &str {
    bill_id.get(..8).unwrap_or(bill_id)
}

fn format_amount(amount_cents: Option<i64>) -> String {
    match amount_cents {
        Some(cents) => format!("${}.{:02}", cents / 100, cents % 100),
        None => "the amount".to_string(),
    }
}

fn format_due_date(due_date_iso: Option<&str>) -> String {
    due_date_iso.unwrap_or("the due date").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> BillFields {
        BillFields {
            payee: Some("ComEd".to_string()),
            amount_cents: Some(12550),
            due_date_iso: Some("2025-10-15".to_string()),
        }
    }

    #[test]
    fn autopay_reply_names_amount_and_date() {
        let text = compose_reply(Action::Autopay, &fields(), "abcdef0123456789");
        assert!(text.contains("$125.50"));
        assert!(text.contains("2025-10-15"));
        assert!(text.contains("DRYRUN-abcdef01"));
    }

    #[test]
    fn approval_reply_requests_extension() {
        let text = compose_reply(Action::RequestApproval, &fields(), "abcdef0123456789");
        assert!(text.contains("extension"));
        assert!(text.contains("APPROVAL-abcdef01"));
    }

    #[test]
    fn summary_subject_reflects_action() {
        let (autopay_subject, body) =
            compose_user_summary(Action::Autopay, &fields(), "Your Bill", "b@c.com", "id-1");
        assert!(autopay_subject.contains("Payment Scheduled"));
        assert!(body.contains("Your Bill"));
        assert!(body.contains("$125.50"));

        let (approval_subject, _) = compose_user_summary(
            Action::RequestApproval,
            &fields(),
            "Your Bill",
            "b@c.com",
            "id-1",
        );
        assert!(approval_subject.contains("Extension Requested"));
        assert!(approval_subject.contains("ComEd"));
    }

    #[test]
    fn missing_fields_fall_back_to_placeholders() {
        let empty = BillFields::default();
        let text = compose_reply(Action::Autopay, &empty, "id");
        assert!(text.contains("the amount"));
        assert!(text.contains("the due date"));
    }

    #[test]
    fn amounts_format_with_two_cent_digits() {
        assert_eq!(format_amount(Some(9)), "$0.09");
        assert_eq!(format_amount(Some(125000)), "$1250.00");
    }
}
