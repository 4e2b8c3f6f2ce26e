// Mortgage statement: labeled fields read from page text.
// A missing label leaves its field at zero (amounts) or None.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::amounts::parse_amount;
use crate::patterns::{month_number, LONG_DATE};
use crate::statements::{MortgageStatement, StatementType};

use super::document::Document;
use super::header::extract_header;
use super::{ExtractedStatement, MortgageExtraction, StatementParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    PrincipalBalance,
    PrincipalDue,
    InterestDue,
    TaxEscrowDue,
    InsuranceEscrowDue,
    ReserveDue,
    OtherDue,
    TotalPaymentDue,
    TaxEscrowBalance,
    InsuranceEscrowBalance,
    ReserveBalance,
    YtdPrincipalPaid,
    YtdInterestPaid,
    YtdTaxDisbursement,
    YtdInsuranceDisbursement,
    YtdReserveDisbursement,
}

/// Label alternatives per field, most specific first
const FIELD_LABELS: &[(Field, &[&str])] = &[
    (Field::PrincipalBalance, &["Unpaid Principal Balance", "Outstanding Principal(?: Balance)?", "Principal Balance", "Loan Balance"]),
    (Field::PrincipalDue, &["Principal Due", "Principal Payment", "Current Principal", "Principal Amount Due"]),
    (Field::InterestDue, &["Interest Due", "Interest Payment", "Current Interest"]),
    (Field::TaxEscrowDue, &["Tax Escrow (?:Due|Payment|Deposit)", "Escrow\\s*-\\s*Tax(?:es)?"]),
    (Field::InsuranceEscrowDue, &["Insurance Escrow (?:Due|Payment|Deposit)", "Escrow\\s*-\\s*Insurance"]),
    (Field::ReserveDue, &["(?:Replacement )?Reserve (?:Due|Deposit|Payment)"]),
    (Field::OtherDue, &["Other (?:Due|Fees|Charges)", "Late Charges?"]),
    (Field::TotalPaymentDue, &["Total Payment Due", "Total Amount Due", "Total Due", "Amount Due"]),
    (Field::TaxEscrowBalance, &["Tax Escrow Balance"]),
    (Field::InsuranceEscrowBalance, &["Insurance Escrow Balance"]),
    (Field::ReserveBalance, &["(?:Replacement )?Reserve Balance"]),
    (Field::YtdPrincipalPaid, &["YTD Principal(?: Paid)?", "Principal Paid YTD", "Year[- ]to[- ]Date Principal"]),
    (Field::YtdInterestPaid, &["YTD Interest(?: Paid)?", "Interest Paid YTD", "Year[- ]to[- ]Date Interest"]),
    (Field::YtdTaxDisbursement, &["YTD Tax(?:es)? Disburse(?:ment|ments|d)", "Tax(?:es)? Disbursed YTD"]),
    (Field::YtdInsuranceDisbursement, &["YTD Insurance Disburse(?:ment|ments|d)", "Insurance Disbursed YTD"]),
    (Field::YtdReserveDisbursement, &["YTD Reserve Disburse(?:ment|ments|d)", "Reserve Disbursed YTD"]),
];

/// Amount right after the label (optional colon and dollar sign), one
/// pattern per label so the most specific label is tried first
static FIELD_PATTERNS: Lazy<Vec<(Field, Regex)>> = Lazy::new(|| {
    FIELD_LABELS
        .iter()
        .flat_map(|(field, labels)| labels.iter().map(move |label| (*field, *label)))
        .map(|(field, label)| {
            let pattern = format!(r"(?i)(?:{})\s*:?\s*(\$?\s*\(?-?\$?[\d,]+(?:\.\d{{1,2}})?\)?)", label);
            (field, Regex::new(&pattern).expect("static mortgage field pattern"))
        })
        .collect()
});

/// Words that make a following label part of another field's label
/// ("Principal Amount Due" is not "Amount Due")
const QUALIFIERS: &[&str] = &[
    "PRINCIPAL", "INTEREST", "ESCROW", "TAX", "TAXES", "INSURANCE", "RESERVE", "OTHER", "LATE", "PAST",
];

static LENDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:Lender|Servicer|Loan Servicer)\s*:?\s+(.+?)\s*$").expect("static lender pattern")
});

static LOAN_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Loan\s*(?:Number|No\.?|#)\s*:?\s*([A-Za-z0-9-]+)").expect("static loan number pattern")
});

static STATEMENT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Statement Date\s*:?\s*(\d{1,2}/\d{1,2}/\d{4})").expect("static statement date pattern")
});

fn is_qualified(before: &str) -> bool {
    let word = before
        .trim_end()
        .rsplit(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("");
    QUALIFIERS.iter().any(|q| word.eq_ignore_ascii_case(q))
}

fn field_amount(text: &str, field: Field) -> Option<Decimal> {
    FIELD_PATTERNS
        .iter()
        .filter(|(f, _)| *f == field)
        .find_map(|(_, re)| {
            re.captures_iter(text)
                .find(|caps| caps.get(0).is_some_and(|m| !is_qualified(&text[..m.start()])))
        })
        .and_then(|caps| parse_amount(&caps[1]))
}

fn statement_date(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = STATEMENT_DATE.captures(text) {
        return NaiveDate::parse_from_str(&caps[1], "%m/%d/%Y").ok();
    }
    let caps = LONG_DATE.captures(text)?;
    NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month_number(&caps[1])?, caps[2].parse().ok()?)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MortgageStatementParser;

impl MortgageStatementParser {
    pub fn new() -> Self {
        MortgageStatementParser
    }

    pub fn extract(&self, document: &Document) -> MortgageExtraction {
        let header = extract_header(document.first_page_text());
        let text = document.full_text();
        let get = |field| field_amount(&text, field).unwrap_or(Decimal::ZERO);

        let statement = MortgageStatement {
            lender: LENDER.captures(&text).map(|c| c[1].to_string()),
            loan_number: LOAN_NUMBER.captures(&text).map(|c| c[1].to_string()),
            statement_date: statement_date(&text),
            principal_balance: get(Field::PrincipalBalance),
            principal_due: get(Field::PrincipalDue),
            interest_due: get(Field::InterestDue),
            tax_escrow_due: get(Field::TaxEscrowDue),
            insurance_escrow_due: get(Field::InsuranceEscrowDue),
            reserve_due: get(Field::ReserveDue),
            other_due: get(Field::OtherDue),
            total_payment_due: get(Field::TotalPaymentDue),
            tax_escrow_balance: get(Field::TaxEscrowBalance),
            insurance_escrow_balance: get(Field::InsuranceEscrowBalance),
            reserve_balance: get(Field::ReserveBalance),
            ytd_principal_paid: get(Field::YtdPrincipalPaid),
            ytd_interest_paid: get(Field::YtdInterestPaid),
            ytd_tax_disbursement: get(Field::YtdTaxDisbursement),
            ytd_insurance_disbursement: get(Field::YtdInsuranceDisbursement),
            ytd_reserve_disbursement: get(Field::YtdReserveDisbursement),
        };

        debug!(
            lender = ?statement.lender,
            principal_balance = %statement.principal_balance,
            "parsed mortgage statement"
        );

        MortgageExtraction { header, statement }
    }
}

impl StatementParser for MortgageStatementParser {
    fn statement_type(&self) -> StatementType {
        StatementType::MortgageStatement
    }

    fn parse(&self, document: &Document) -> ExtractedStatement {
        ExtractedStatement::MortgageStatement(self.extract(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document::Page;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "Lender: Wells Fargo Bank\nLoan Number: 100-2345\nStatement Date: 01/05/2025\n\
Principal Balance: $490,000.00\nPrincipal Due: $10,000.00\nInterest Due: $2,450.00\n\
Tax Escrow Due: $1,200.00\nInsurance Escrow Due: $300.00\nReserve Deposit: $250.00\n\
Total Payment Due: $14,200.00\n\
Tax Escrow Balance: $6,000.00\nInsurance Escrow Balance: $1,500.00\nReserve Balance: $12,000.00\n\
YTD Principal Paid: $10,000.00\nYTD Interest Paid: $2,450.00\n\
YTD Tax Disbursements: $0.00\nYTD Insurance Disbursements: $3,600.00\n";

    #[test]
    fn test_labeled_fields() {
        let doc = Document::new(vec![Page::new(1, SAMPLE)]);
        let ms = MortgageStatementParser::new().extract(&doc).statement;
        assert_eq!(ms.lender.as_deref(), Some("Wells Fargo Bank"));
        assert_eq!(ms.loan_number.as_deref(), Some("100-2345"));
        assert_eq!(ms.statement_date, NaiveDate::from_ymd_opt(2025, 1, 5));
        assert_eq!(ms.principal_balance, dec!(490000.00));
        assert_eq!(ms.principal_due, dec!(10000.00));
        assert_eq!(ms.interest_due, dec!(2450.00));
        assert_eq!(ms.reserve_due, dec!(250.00));
        assert_eq!(ms.total_payment_due, dec!(14200.00));
        assert_eq!(ms.reserve_balance, dec!(12000.00));
        assert_eq!(ms.ytd_insurance_disbursement, dec!(3600.00));
        assert_eq!(ms.component_sum(), ms.total_payment_due);
    }

    #[test]
    fn test_total_label_not_taken_from_component() {
        let text = "Principal Amount Due: $10,000.00\nInterest Due: $2,000.00\nTotal Amount Due: $12,000.00\n";
        let ms = MortgageStatementParser::new()
            .extract(&Document::new(vec![Page::new(1, text)]))
            .statement;
        assert_eq!(ms.principal_due, dec!(10000.00));
        assert_eq!(ms.interest_due, dec!(2000.00));
        assert_eq!(ms.total_payment_due, dec!(12000.00));
        assert_eq!(ms.component_sum(), ms.total_payment_due);

        // Same fields on one line
        let line = "Principal Amount Due: $10,000.00 / Interest Due: $2,000.00 / Total Amount Due: $12,000.00";
        let ms = MortgageStatementParser::new()
            .extract(&Document::new(vec![Page::new(1, line)]))
            .statement;
        assert_eq!(ms.total_payment_due, dec!(12000.00));
    }

    #[test]
    fn test_bare_amount_due_label() {
        let text = "Principal Amount Due: $10,000.00\nAmount Due: $12,500.00\n";
        let ms = MortgageStatementParser::new()
            .extract(&Document::new(vec![Page::new(1, text)]))
            .statement;
        assert_eq!(ms.total_payment_due, dec!(12500.00));

        let ms = MortgageStatementParser::new()
            .extract(&Document::new(vec![Page::new(1, "Principal Amount Due: $10,000.00")]))
            .statement;
        assert_eq!(ms.total_payment_due, Decimal::ZERO);
    }

    #[test]
    fn test_missing_labels_are_zero() {
        let doc = Document::new(vec![Page::new(1, "Principal Balance 250,000.00")]);
        let ms = MortgageStatementParser::new().extract(&doc).statement;
        assert_eq!(ms.principal_balance, dec!(250000.00));
        assert_eq!(ms.interest_due, Decimal::ZERO);
        assert_eq!(ms.lender, None);
    }
}
