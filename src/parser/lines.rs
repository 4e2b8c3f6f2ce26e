// Shared row parsing for the table path and the text-line fallback.
//
// Both paths end in the same ParsedRow, so classification downstream never
// knows which path produced a row.

use rust_decimal::Decimal;

use crate::amounts::{looks_like_percentage, parse_amount, parse_percentage};
use crate::patterns::{
    collapse_whitespace, find_account_code, is_plausible_account_code, BOOK_FIELD, LONG_DATE, PERIOD_FIELD,
    PROPERTY_IDENTIFIER, STATEMENT_TITLE,
};
use crate::statements::{BoundingBox, ExtractedLineItem, ExtractionMethod};

use super::document::{Page, TableRow};

/// Base confidence per path (0-100)
pub const TABLE_CONFIDENCE: f64 = 95.0;
pub const TEXT_CONFIDENCE: f64 = 85.0;

/// Items below this are flagged for review
pub const REVIEW_CONFIDENCE: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub code: Option<String>,
    pub name: String,
    pub amounts: Vec<Decimal>,
    pub percentages: Vec<Decimal>,
    pub page: usize,
    pub method: ExtractionMethod,
    pub bbox: Option<BoundingBox>,
    /// Row text as seen, for section detection
    pub raw: String,
}

impl ParsedRow {
    pub fn has_amount(&self) -> bool {
        !self.amounts.is_empty()
    }

    /// Row-acceptance policy: a name longer than two characters or a code.
    /// A row with no amount is kept with a zero period amount.
    pub fn is_line_item(&self) -> bool {
        self.name.chars().count() > 2 || self.code.is_some()
    }

    /// No code and no amount: a heading or a zero-valued account
    pub fn is_label_only(&self) -> bool {
        self.code.is_none() && !self.has_amount()
    }

    /// Page-heading text: property line, statement title, period/book/date fields
    pub fn is_document_heading(&self) -> bool {
        self.is_label_only()
            && (PROPERTY_IDENTIFIER.is_match(&self.raw)
                || PERIOD_FIELD.is_match(&self.raw)
                || BOOK_FIELD.is_match(&self.raw)
                || LONG_DATE.is_match(&self.raw)
                || STATEMENT_TITLE.is_match(&self.raw))
    }

    pub fn period_amount(&self) -> Decimal {
        self.amounts.first().copied().unwrap_or(Decimal::ZERO)
    }

    pub fn second_amount(&self) -> Option<Decimal> {
        self.amounts.get(1).copied()
    }

    pub fn confidence(&self) -> f64 {
        let mut confidence = match self.method {
            ExtractionMethod::Table => TABLE_CONFIDENCE,
            ExtractionMethod::Text => TEXT_CONFIDENCE,
        };
        if self.code.is_none() {
            confidence -= 5.0;
        }
        if !self.has_amount() {
            confidence -= 10.0;
        }
        if self.name.chars().count() <= 2 {
            confidence -= 10.0;
        }
        confidence
    }

    /// Unclassified line item carrying the parsed values
    pub fn to_line_item(&self) -> ExtractedLineItem {
        ExtractedLineItem::new(self.name.clone(), self.period_amount(), self.page)
            .with_code(self.code.clone())
            .with_ytd(self.second_amount())
            .with_percentages(self.percentages.first().copied(), self.percentages.get(1).copied())
            .with_method(self.method)
            .with_confidence(self.confidence())
            .with_coordinates(self.bbox)
    }
}

/// Split a label into (code, name). Implausible codes stay in the name.
fn split_code(label: &str) -> (Option<String>, String) {
    match find_account_code(label) {
        Some(m) if is_plausible_account_code(&m.code) => (Some(m.code), m.remainder),
        _ => (None, collapse_whitespace(label)),
    }
}

/// Parse one table row
pub fn parse_table_row(row: &TableRow, page: usize) -> ParsedRow {
    let mut label_parts: Vec<&str> = Vec::new();
    let mut amounts = Vec::new();
    let mut percentages = Vec::new();
    let mut leading_code: Option<String> = None;

    for (i, cell) in row.cells.iter().enumerate() {
        let Some(cell) = cell.as_deref() else { continue };

        // A first cell that is exactly a code is a code, not an amount
        if i == 0 || (leading_code.is_none() && label_parts.is_empty() && amounts.is_empty()) {
            if let Some(m) = find_account_code(cell) {
                if m.remainder.is_empty() && is_plausible_account_code(&m.code) {
                    leading_code = Some(m.code);
                    continue;
                }
            }
        }

        if looks_like_percentage(cell) {
            if let Some(p) = parse_percentage(cell) {
                percentages.push(p);
            }
        } else if let Some(a) = parse_amount(cell) {
            amounts.push(a);
        } else {
            label_parts.push(cell);
        }
    }

    let label = label_parts.join(" ");
    let (code, name) = match leading_code {
        Some(code) => (Some(code), collapse_whitespace(&label)),
        None => split_code(&label),
    };

    ParsedRow {
        code,
        name,
        amounts,
        percentages,
        page,
        method: ExtractionMethod::Table,
        bbox: row.bbox,
        raw: row.text(),
    }
}

/// Parse one raw text line: numeric tokens are taken from the right, the
/// rest is the label.
pub fn parse_text_line(line: &str, page: usize) -> ParsedRow {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut split_at = tokens.len();
    let mut amounts = Vec::new();
    let mut percentages = Vec::new();

    while split_at > 0 {
        let token = tokens[split_at - 1];
        if token == "$" {
            split_at -= 1;
            continue;
        }
        if looks_like_percentage(token) {
            match parse_percentage(token) {
                Some(p) => percentages.push(p),
                None => break,
            }
        } else {
            match parse_amount(token) {
                // A bare four-digit token belongs to the label (code or year)
                Some(a) if !is_code_token(token) => amounts.push(a),
                _ => break,
            }
        }
        split_at -= 1;
    }

    amounts.reverse();
    percentages.reverse();

    let label = tokens[..split_at].join(" ");
    let (code, name) = split_code(&label);

    ParsedRow {
        code,
        name,
        amounts,
        percentages,
        page,
        method: ExtractionMethod::Text,
        bbox: None,
        raw: line.trim().to_string(),
    }
}

/// Four plain digits with no separators: a code or a year, not a dollar figure
fn is_code_token(token: &str) -> bool {
    token.len() == 4 && token.chars().all(|c| c.is_ascii_digit())
}

/// Rows for one page: table rows when the page has tables, else text lines
pub fn page_rows(page: &Page) -> Vec<ParsedRow> {
    if page.tables.is_empty() {
        page.text_lines()
            .map(|line| parse_text_line(line, page.number))
            .collect()
    } else {
        page.tables
            .iter()
            .flat_map(|t| t.rows.iter())
            .filter(|r| !r.is_blank())
            .map(|r| parse_table_row(r, page.number))
            .collect()
    }
}

/// Assign stable 1-based line numbers and flag weak rows
pub fn finalize_items(items: Vec<ExtractedLineItem>) -> Vec<ExtractedLineItem> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let item = item.with_line_number(i + 1);
            if item.confidence < REVIEW_CONFIDENCE {
                item.with_review_flag("low extraction confidence")
            } else if item.line_subcategory.as_deref() == Some(crate::classifier::UNCLASSIFIED) {
                item.with_review_flag("unclassified account")
            } else {
                item
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_table_row_with_code_cell() {
        let row = TableRow::from_cells(&["0122-0000", "Cash - Operating", "$150,000.00"]);
        let parsed = parse_table_row(&row, 1);
        assert_eq!(parsed.code.as_deref(), Some("0122-0000"));
        assert_eq!(parsed.name, "Cash - Operating");
        assert_eq!(parsed.period_amount(), dec!(150000.00));
        assert!(parsed.is_line_item());
    }

    #[test]
    fn test_table_row_four_digit_code_not_amount() {
        let row = TableRow::from_cells(&["4010", "Base Rent", "10,000.00", "62.50%", "120,000.00", "61.00%"]);
        let parsed = parse_table_row(&row, 1);
        assert_eq!(parsed.code.as_deref(), Some("4010"));
        assert_eq!(parsed.amounts, vec![dec!(10000.00), dec!(120000.00)]);
        assert_eq!(parsed.percentages, vec![dec!(62.50), dec!(61.00)]);
        let item = parsed.to_line_item();
        assert_eq!(item.ytd_amount, Some(dec!(120000.00)));
        assert_eq!(item.ytd_percentage, Some(dec!(61.00)));
    }

    #[test]
    fn test_text_line() {
        let parsed = parse_text_line("0122-0000 Cash - Operating $ 150,000.00", 2);
        assert_eq!(parsed.code.as_deref(), Some("0122-0000"));
        assert_eq!(parsed.name, "Cash - Operating");
        assert_eq!(parsed.amounts, vec![dec!(150000.00)]);
        assert_eq!(parsed.method, ExtractionMethod::Text);
        assert_eq!(parsed.page, 2);
    }

    #[test]
    fn test_text_line_negative_and_percent() {
        let parsed = parse_text_line("Vacancy Loss (1,200.00) -5.00%", 1);
        assert_eq!(parsed.name, "Vacancy Loss");
        assert_eq!(parsed.amounts, vec![dec!(-1200.00)]);
        assert_eq!(parsed.percentages, vec![dec!(-5.00)]);
    }

    #[test]
    fn test_acceptance_policy() {
        // Amount with no name or code
        let parsed = parse_text_line("1,234.56", 1);
        assert!(!parsed.is_line_item());

        // Code without amount defaults to zero
        let parsed = parse_text_line("0510-0000 Landscaping", 1);
        assert!(parsed.is_line_item());
        assert_eq!(parsed.period_amount(), Decimal::ZERO);

        // Name without amount is kept at zero too
        let parsed = parse_text_line("Security Deposits Held", 1);
        assert!(parsed.is_line_item());
        assert!(parsed.is_label_only());
        assert!(!parsed.is_document_heading());
        assert_eq!(parsed.period_amount(), Decimal::ZERO);

        // Too short to be a name
        let parsed = parse_text_line("PG", 1);
        assert!(!parsed.is_line_item());
    }

    #[test]
    fn test_document_headings() {
        for line in ["Sunset Plaza (SUNP)", "Balance Sheet", "Period = Dec 2024", "Book = Accrual", "January 15, 2025"] {
            assert!(parse_text_line(line, 1).is_document_heading(), "{}", line);
        }
        assert!(!parse_text_line("Cash - Operating 150,000.00", 1).is_document_heading());
        assert!(!parse_text_line("0510-0000 Landscaping", 1).is_document_heading());
    }

    #[test]
    fn test_year_is_not_a_code() {
        let parsed = parse_text_line("Reserve Study 2024 500.00", 1);
        assert_eq!(parsed.code, None);
        assert_eq!(parsed.amounts, vec![dec!(500.00)]);
        assert_eq!(parsed.name, "Reserve Study 2024");
    }

    #[test]
    fn test_both_paths_same_shape() {
        let from_table = parse_table_row(&TableRow::from_cells(&["0122-0000", "Cash - Operating", "150,000.00"]), 1)
            .to_line_item();
        let from_text = parse_text_line("0122-0000 Cash - Operating 150,000.00", 1).to_line_item();
        assert_eq!(from_table.account_code, from_text.account_code);
        assert_eq!(from_table.account_name, from_text.account_name);
        assert_eq!(from_table.period_amount, from_text.period_amount);
    }
}
