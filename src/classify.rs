use crate::extract::BillFields;

/// Keywords that mark a message as bill-like even when no field was
/// extracted. Deliberately permissive: a false positive costs one wasted
/// parse, a false negative silently drops a real bill.
const BILL_KEYWORDS: [&str; 7] = [
    "bill",
    "invoice",
    "payment",
    "due",
    "amount",
    "balance",
    "statement",
];

/// True if the message should enter the bill pipeline: any extracted
/// amount or due date, or any trigger keyword in the flattened text.
pub fn looks_like_bill(text: &str, fields: &BillFields) -> bool {
    if fields.amount_cents.is_some() || fields.due_date_iso.is_some() {
        return true;
    }
    let lowered = text.to_lowercase();
    BILL_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// The agent's own replies and notifications come back through the same
/// inbox; they must never be processed as bills.
pub fn is_own_message(from: &str, agent_domain: &str) -> bool {
    from.to_lowercase().contains(&agent_domain.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_alone_is_enough() {
        let fields = BillFields::default();
        assert!(looks_like_bill("please find the invoice attached", &fields));
    }

    #[test]
    fn extracted_amount_alone_is_enough() {
        let fields = BillFields {
            amount_cents: Some(12550),
            ..Default::default()
        };
        assert!(looks_like_bill("no trigger words here", &fields));
    }

    #[test]
    fn extracted_date_alone_is_enough() {
        let fields = BillFields {
            due_date_iso: Some("2025-10-15".to_string()),
            ..Default::default()
        };
        assert!(looks_like_bill("no trigger words here", &fields));
    }

    #[test]
    fn no_keywords_and_no_fields_is_not_a_bill() {
        let fields = BillFields::default();
        assert!(!looks_like_bill("see you at the picnic on saturday", &fields));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let fields = BillFields::default();
        assert!(looks_like_bill("YOUR STATEMENT IS READY", &fields));
    }

    #[test]
    fn own_domain_mail_is_flagged() {
        assert!(is_own_message("bills@demo.agentmail.to", "agentmail.to"));
        assert!(!is_own_message("billing@comed.com", "agentmail.to"));
    }
}
