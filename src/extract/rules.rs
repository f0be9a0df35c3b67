use regex::Regex;
use time::{Date, Month};

// ---------------------------------------------------------------------------
// Amount parsing
// ---------------------------------------------------------------------------

/// Extract a monetary amount in integer cents.
///
/// Patterns are tried most-specific first; the first pattern that matches
/// anywhere in the text wins, and within a pattern the leftmost match is
/// used. A pattern whose captured number fails conversion yields to the
/// next pattern. No match means `None` — absence, not zero.
pub fn parse_amount_cents(text: &str) -> Option<i64> {
    let patterns = [
        // Labelled totals: "Amount Due: $125.50", "Total Due $1,250.00"
        r"(?i)(?:amount\s+due|total\s+due|minimum\s+due|balance\s+due|pay\s+amount)[:,\s]*\$?(\d+(?:,\d{3})*(?:\.\d{2})?)",
        // Bare currency-prefixed numbers, optionally qualified
        r"(?i)\$(\d+(?:,\d{3})*(?:\.\d{2})?)(?:\s+(?:due|total|amount|balance))?",
        // Generic labelled numbers: "pay 45.75", "balance: 99"
        r"(?i)\b(?:pay|amount|total|due|balance)\b[:,\s]*\$?(\d+(?:,\d{3})*(?:\.\d{2})?)",
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).expect("static amount pattern");
        if let Some(cap) = re.captures(text) {
            if let Some(cents) = cents_from_decimal(&cap[1]) {
                return Some(cents);
            }
        }
    }
    None
}

/// Convert a captured decimal like "1,250.00" to integer cents without
/// going through binary floating point.
fn cents_from_decimal(raw: &str) -> Option<i64> {
    let cleaned = raw.replace(',', "");
    let (dollars, cents) = match cleaned.split_once('.') {
        Some((d, c)) => (d, c),
        None => (cleaned.as_str(), ""),
    };
    let dollars: i64 = dollars.parse().ok()?;
    let cents: i64 = match cents.len() {
        0 => 0,
        2 => cents.parse().ok()?,
        _ => return None,
    };
    dollars.checked_mul(100)?.checked_add(cents)
}

// ---------------------------------------------------------------------------
// Due date parsing
// ---------------------------------------------------------------------------

const MONTH_NAMES: [(&str, u8); 23] = [
    ("january", 1),
    ("jan", 1),
    ("february", 2),
    ("feb", 2),
    ("march", 3),
    ("mar", 3),
    ("april", 4),
    ("apr", 4),
    ("may", 5),
    ("june", 6),
    ("jun", 6),
    ("july", 7),
    ("jul", 7),
    ("august", 8),
    ("aug", 8),
    ("september", 9),
    ("sep", 9),
    ("october", 10),
    ("oct", 10),
    ("november", 11),
    ("nov", 11),
    ("december", 12),
    ("dec", 12),
];

/// Extract a due date, normalised to `YYYY-MM-DD`.
///
/// Formats are tried in fixed order: literal ISO, US slash
/// (`M/D/YYYY`), then named month (`October 5, 2025`). A candidate that
/// is not a real calendar date (month 13, Feb 30) is discarded and the
/// remaining formats are still tried.
pub fn parse_due_date_iso(text: &str) -> Option<String> {
    let iso_re = Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static date pattern");
    if let Some(cap) = iso_re.captures(text) {
        let candidate = iso_if_valid(&cap[1], &cap[2], &cap[3]);
        if candidate.is_some() {
            return candidate;
        }
    }

    let us_re = Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("static date pattern");
    if let Some(cap) = us_re.captures(text) {
        let candidate = iso_if_valid(&cap[3], &cap[1], &cap[2]);
        if candidate.is_some() {
            return candidate;
        }
    }

    let named_re = Regex::new(
        r"(?i)\b(jan|january|feb|february|mar|march|apr|april|may|jun|june|jul|july|aug|august|sep|september|oct|october|nov|november|dec|december)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
    )
    .expect("static date pattern");
    if let Some(cap) = named_re.captures(text) {
        let name = cap[1].to_lowercase();
        let month = MONTH_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, m)| *m)?;
        return iso_if_valid(&cap[3], &month.to_string(), &cap[2]);
    }

    None
}

/// Build a zero-padded ISO date string, or `None` if the parts do not
/// form a real calendar date.
fn iso_if_valid(year: &str, month: &str, day: &str) -> Option<String> {
    let year: i32 = year.parse().ok()?;
    let month: u8 = month.parse().ok()?;
    let day: u8 = day.parse().ok()?;
    let month = Month::try_from(month).ok()?;
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month() as u8,
        date.day()
    ))
}

/// Strict `YYYY-MM-DD` parse used wherever an already-ISO string must be
/// validated (model output coercion, decision policy).
pub fn parse_iso_date(s: &str) -> Option<Date> {
    let mut parts = s.splitn(3, '-');
    let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    let day: u8 = day.parse().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

// ---------------------------------------------------------------------------
// Payee heuristic
// ---------------------------------------------------------------------------

const SENDER_ROLE_WORDS: [&str; 4] = ["no-reply", "noreply", "support", "billing"];

const BILLER_KEYWORDS: [&str; 12] = [
    "electric", "gas", "water", "internet", "phone", "cable", "credit", "utility", "wireless",
    "insurance", "power", "energy",
];

/// Best-effort biller name, scanning only the first 10 lines of the
/// flattened text. A `From:` line wins; otherwise a biller-category
/// keyword plus its preceding word is used. Callers must expect `None`.
pub fn infer_payee(text: &str) -> Option<String> {
    for line in text.lines().take(10) {
        if line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("from:")) {
            let sender = &line[5..];
            let cut = sender.find(['<', '@']).unwrap_or(sender.len());
            let mut name = sender[..cut].to_string();
            for word in SENDER_ROLE_WORDS {
                name = remove_substring_ci(&name, word);
            }
            let name = name.trim().to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    for line in text.lines().take(10) {
        let words: Vec<&str> = line.split_whitespace().collect();
        for (i, word) in words.iter().enumerate() {
            let bare = trim_word(word).to_lowercase();
            if BILLER_KEYWORDS.contains(&bare.as_str()) {
                let keyword = trim_word(word);
                if i > 0 {
                    return Some(format!("{} {}", trim_word(words[i - 1]), keyword));
                }
                return Some(keyword.to_string());
            }
        }
    }

    None
}

fn trim_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Remove every case-insensitive occurrence of `needle`. ASCII folding
/// keeps byte offsets aligned between the haystack and its lowered copy.
fn remove_substring_ci(haystack: &str, needle: &str) -> String {
    let lowered = haystack.to_ascii_lowercase();
    let needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut pos = 0;
    while let Some(found) = lowered[pos..].find(&needle) {
        out.push_str(&haystack[pos..pos + found]);
        pos += found + needle.len();
    }
    out.push_str(&haystack[pos..]);
    out
}
