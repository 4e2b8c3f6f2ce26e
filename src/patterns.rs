// 🔎 Account Pattern Matcher - Account codes and labeled header fields
//
// The matcher is deliberately naive: it returns the first token that looks
// like an account code. Domain filters (calendar years, page numbers) are
// applied by callers through `is_plausible_account_code`.

use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// ACCOUNT CODES
// ============================================================================

/// Account-code shapes in priority order: `####-####`, `####`, `###..#####-###..#####`.
/// Matches are whole tokens, never digits cut out of a longer number.
static ACCOUNT_CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b\d{4}-\d{4}\b",
        r"\b\d{4}\b",
        r"\b\d{3,5}-\d{3,5}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static account code pattern"))
    .collect()
});

/// Strict chart-of-accounts format used by the validation rules
pub static STRICT_ACCOUNT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{4}$").expect("static strict code pattern"));

/// A matched account code plus the rest of the string (candidate account name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMatch {
    pub code: String,
    pub remainder: String,
}

/// Find the first account code in `text`.
///
/// Only the first pattern that matches anywhere in the string is used.
/// The remainder has the match removed and whitespace collapsed.
pub fn find_account_code(text: &str) -> Option<CodeMatch> {
    for pattern in ACCOUNT_CODE_PATTERNS.iter() {
        if let Some(m) = pattern.find(text) {
            let mut remainder = String::with_capacity(text.len());
            remainder.push_str(&text[..m.start()]);
            remainder.push(' ');
            remainder.push_str(&text[m.end()..]);

            return Some(CodeMatch {
                code: m.as_str().to_string(),
                remainder: collapse_whitespace(&remainder),
            });
        }
    }
    None
}

/// Post-filter for matched codes: bare 4-digit calendar years (2000-2100)
/// and page numbers (< 100) are not account codes.
pub fn is_plausible_account_code(code: &str) -> bool {
    if code.contains('-') {
        return true;
    }
    match code.parse::<u32>() {
        Ok(n) => !(2000..=2100).contains(&n) && n >= 100,
        Err(_) => false,
    }
}

/// Leading numeric component of a code ("0122-0000" -> 122), used for range checks
pub fn code_prefix(code: &str) -> Option<u32> {
    code.split('-').next()?.parse().ok()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// HEADER FIELDS
// ============================================================================

pub static PERIOD_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Period\s*=\s*([A-Za-z]{3,9}\.?\s+\d{4}(?:\s*-\s*[A-Za-z]{3,9}\.?\s+\d{4})?)")
        .expect("static period pattern")
});

pub static BOOK_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Book\s*=\s*(Accrual|Cash)").expect("static book pattern"));

pub static LONG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),\s+(\d{4})\b",
    )
    .expect("static long date pattern")
});

/// "Property Name (CODE)" on a line of its own or leading a line
pub static PROPERTY_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*([A-Za-z0-9][A-Za-z0-9 &'.,/-]*?)\s*\(([A-Za-z0-9]{2,12})\)")
        .expect("static property pattern")
});

/// Statement title on a line of its own
pub static STATEMENT_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:consolidated\s+)?balance\s+sheet|income\s+statement|(?:statement\s+of\s+)?cash\s+flows?(?:\s+statement)?|rent\s+roll|mortgage\s+statement|(?:12|twelve)\s+month\s+.*|statement\s+of\s+[a-z ]+)\s*$",
    )
    .expect("static statement title pattern")
});

/// Month-name + year ("Jan 2025", "December 2024")
pub static MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)[a-z]*\.?\s+(\d{4})\b")
        .expect("static month-year pattern")
});

/// `MM/DD/YYYY` (used to detect rent-roll column misalignment)
pub static MDY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d{1,2}/\d{1,2}/\d{4}\s*$").expect("static mdy pattern"));

pub fn is_mdy_date(text: &str) -> bool {
    MDY_DATE.is_match(text)
}

/// Month number for an English month name or abbreviation
pub fn month_number(name: &str) -> Option<u32> {
    let upper = name.trim_end_matches('.').to_uppercase();
    let key = upper.get(..3)?;
    let month = match key {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_code_wins_over_four_digit() {
        let m = find_account_code("2024 Cash - Operating 0122-0000").unwrap();
        assert_eq!(m.code, "0122-0000");
        assert_eq!(m.remainder, "2024 Cash - Operating");
    }

    #[test]
    fn test_four_digit_code() {
        let m = find_account_code("4010 Base Rent").unwrap();
        assert_eq!(m.code, "4010");
        assert_eq!(m.remainder, "Base Rent");
    }

    #[test]
    fn test_variant_code() {
        let m = find_account_code("510-020 Landscaping").unwrap();
        assert_eq!(m.code, "510-020");
        let m = find_account_code("51000-200 Landscaping").unwrap();
        assert_eq!(m.code, "51000-200");
    }

    #[test]
    fn test_codes_are_whole_tokens() {
        let m = find_account_code("12345-678 Parking Income").unwrap();
        assert_eq!(m.code, "12345-678");
        assert_eq!(m.remainder, "Parking Income");

        assert!(find_account_code("Suite 12345").is_none());
        assert!(find_account_code("Invoice 123456789").is_none());
    }

    #[test]
    fn test_no_code() {
        assert!(find_account_code("Total Operating Expenses").is_none());
    }

    #[test]
    fn test_matcher_is_naive_caller_filters() {
        let m = find_account_code("Statement for 2024").unwrap();
        assert_eq!(m.code, "2024");
        assert!(!is_plausible_account_code(&m.code));
        assert!(!is_plausible_account_code("0042"));
        assert!(is_plausible_account_code("4010"));
        assert!(is_plausible_account_code("0122-0000"));
    }

    #[test]
    fn test_code_prefix() {
        assert_eq!(code_prefix("0122-0000"), Some(122));
        assert_eq!(code_prefix("4010"), Some(4010));
        assert_eq!(code_prefix("abc"), None);
    }

    #[test]
    fn test_header_patterns() {
        let text = "Sunset Plaza (SUNP)\nBalance Sheet\nPeriod = Dec 2024\nBook = Accrual\nJanuary 15, 2025";
        let period = PERIOD_FIELD.captures(text).unwrap();
        assert_eq!(&period[1], "Dec 2024");
        let book = BOOK_FIELD.captures(text).unwrap();
        assert_eq!(&book[1], "Accrual");
        let prop = PROPERTY_IDENTIFIER.captures(text).unwrap();
        assert_eq!(&prop[1], "Sunset Plaza");
        assert_eq!(&prop[2], "SUNP");
        assert!(LONG_DATE.is_match(text));
    }

    #[test]
    fn test_mdy_and_months() {
        assert!(is_mdy_date("01/31/2025"));
        assert!(!is_mdy_date("Acme Corp"));
        assert_eq!(month_number("Sept"), Some(9));
        assert_eq!(month_number("december"), Some(12));
        assert_eq!(month_number("Foo"), None);
    }
}
