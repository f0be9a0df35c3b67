// src/extract/mod.rs

mod rules;

use serde::{Deserialize, Serialize};

pub use rules::{infer_payee, parse_amount_cents, parse_due_date_iso, parse_iso_date};

/// Structured fields extracted from one bill email.
///
/// Fields are independent: a missing amount says nothing about the due
/// date. `amount_cents` is non-negative when present; `due_date_iso` is a
/// calendar-valid `YYYY-MM-DD` string when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillFields {
    pub payee: Option<String>,
    pub amount_cents: Option<i64>,
    pub due_date_iso: Option<String>,
}

impl BillFields {
    /// How many fields were successfully extracted.
    pub fn coverage(&self) -> (usize, usize) {
        let filled = [
            self.payee.is_some(),
            self.amount_cents.is_some(),
            self.due_date_iso.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, 3)
    }
}

/// Deterministic rule-based extraction. Always returns a result, possibly
/// with all fields empty; this is the floor the model-based path falls
/// back to.
pub fn extract_by_rules(text: &str) -> BillFields {
    BillFields {
        payee: rules::infer_payee(text),
        amount_cents: rules::parse_amount_cents(text),
        due_date_iso: rules::parse_due_date_iso(text),
    }
}
