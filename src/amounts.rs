// 💵 Amount Parser - Currency and percentage tokens to fixed-point decimals
//
// OCR'd statements render the same number many ways:
//   "$1,234.56"   "(1,234.56)"   "-1,234.56"   "$(1,234.56)"   "12.34%"
// Every function here is total: malformed input is the normal case, so it
// returns None instead of an error.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Tokens that mean "no value" on financial statements
const EMPTY_TOKENS: &[&str] = &["N/A", "NA", "N.A.", "-", "--", "—", "–", "NIL"];

// ============================================================================
// PARSING
// ============================================================================

/// Parse a currency token into a decimal.
///
/// Strips `$`, thousands separators and whitespace. A leading `-` or a
/// `(...)` wrapper negates. Returns None for empty strings, bare dashes,
/// `N/A` and anything that is not a number once cleaned.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    parse_signed(text, false)
}

/// Parse a percentage token ("12.34%", "(5.00%)") into a decimal percent value.
///
/// `parse_percentage("12.34%") == 12.34`, not 0.1234.
pub fn parse_percentage(text: &str) -> Option<Decimal> {
    parse_signed(text, true)
}

/// True when the token looks like a percentage rather than an amount
pub fn looks_like_percentage(text: &str) -> bool {
    text.trim().trim_end_matches(')').trim_end().ends_with('%')
}

fn parse_signed(text: &str, percent: bool) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let upper = trimmed.to_uppercase();
    if EMPTY_TOKENS.contains(&upper.as_str()) {
        return None;
    }

    let mut s: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();

    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner.to_string();
    }

    if percent {
        if let Some(stripped) = s.strip_suffix('%') {
            s = stripped.to_string();
        }
    }

    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    }

    // "$-" or "(-)" after cleaning
    if s.is_empty() {
        return None;
    }

    let mut seen_dot = false;
    for c in s.chars() {
        match c {
            '0'..='9' => {}
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }

    if s == "." {
        return None;
    }

    let value = Decimal::from_str(&s).ok()?;
    Some(if negative { -value } else { value })
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Render a decimal as statement currency: `$1,234.56`, negatives as `$(1,234.56)`
pub fn format_currency(value: Decimal) -> String {
    let negative = value.is_sign_negative() && !value.is_zero();
    let cents = format!("{:.2}", value.abs().round_dp(2));
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("$({with_commas}.{dec_part})")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

// ============================================================================
// TESTS
// ============================================================================
