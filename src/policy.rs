use crate::config::PolicySection;
use crate::extract::parse_iso_date;
use time::Date;

/// What the agent does with a classified bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Small and due soon: schedule a dry-run payment and confirm in-thread.
    Autopay,
    /// Understood but outside the autopay envelope (too large, past due,
    /// or too far out): ask the biller for an extension / the user for
    /// approval.
    RequestApproval,
    /// Amount or due date could not be determined; nothing is actioned.
    Undetermined,
}

impl Action {
    /// Status string recorded on the bill row.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Autopay => "autopay",
            Action::RequestApproval => "approval",
            Action::Undetermined => "failed",
        }
    }
}

/// Pure decision function: inputs fully determine the output.
///
/// A malformed `due_date_iso` is indistinguishable from a missing one —
/// "can't tell" — while a date that parses but falls outside
/// `[0, window]` days from `today` is a definite `RequestApproval`.
/// Both policy bounds are inclusive.
pub fn decide(
    amount_cents: Option<i64>,
    due_date_iso: Option<&str>,
    today: Date,
    policy: &PolicySection,
) -> Action {
    let (Some(amount), Some(due_raw)) = (amount_cents, due_date_iso) else {
        return Action::Undetermined;
    };
    let Some(due) = parse_iso_date(due_raw) else {
        return Action::Undetermined;
    };

    let days_until_due = (due - today).whole_days();
    if amount <= policy.autopay_limit_cents
        && (0..=policy.autopay_window_days).contains(&days_until_due)
    {
        Action::Autopay
    } else {
        Action::RequestApproval
    }
}
