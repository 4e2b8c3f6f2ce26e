// Cash flow statement: line items plus the derived adjustment records,
// cash-account reconciliation rows and summary totals.
//
// Section headers are not repeated on every page, so one SectionDetector
// runs across the whole document.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::classifier::{adjustment_category, cash_account_type, classify, section_header, Section, SectionDetector};
use crate::statements::{
    Adjustment, CashAccountReconciliationRow, CashAccountType, CashFlowHeader, ExtractedLineItem,
    StatementType,
};

use super::document::Document;
use super::header::extract_header;
use super::lines::{finalize_items, page_rows, ParsedRow};
use super::{CashFlowExtraction, ExtractedStatement, StatementParser};

static DUE_TO_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bDUE\s+(?:TO|FROM)\s+(.+)$").expect("static due-to pattern"));

static PAYABLE_TO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bA/P\s*-\s*(.+)$").expect("static payable pattern"));

#[derive(Debug, Clone, Copy, Default)]
pub struct CashFlowParser;

impl CashFlowParser {
    pub fn new() -> Self {
        CashFlowParser
    }

    pub fn extract(&self, document: &Document) -> CashFlowExtraction {
        let header = extract_header(document.first_page_text());
        let mut detector = SectionDetector::new();
        let mut items = Vec::new();
        let mut adjustments = Vec::new();
        let mut cash_accounts = Vec::new();
        let mut beginning_cash: Option<Decimal> = None;
        let mut ending_cash: Option<Decimal> = None;

        for page in &document.pages {
            for row in page_rows(page) {
                let section = detector
                    .observe(&row.raw, row.has_amount())
                    .unwrap_or(Section::Income);

                let is_heading =
                    row.is_document_heading() || (row.is_label_only() && section_header(&row.raw).is_some());
                if is_heading || !row.is_line_item() {
                    debug!(page = page.number, row = %row.raw, "skipped cash flow row");
                    continue;
                }

                let upper = row.name.to_uppercase();
                // Blank-valued rows are kept as items but carry no cash figures
                if row.has_amount() {
                    if upper.contains("BEGINNING CASH") || upper.contains("CASH - BEGINNING") {
                        beginning_cash = Some(row.period_amount());
                    } else if upper.contains("ENDING CASH") || upper.contains("CASH - ENDING") {
                        ending_cash = Some(row.period_amount());
                    } else if section == Section::CashReconciliation {
                        cash_accounts.push(cash_account_row(&row));
                    }
                }

                let classification = classify(&row.name, section, row.code.as_deref());
                let line_number = items.len() + 1;

                if section == Section::Adjustments
                    && !row.is_label_only()
                    && !classification.is_total
                    && !classification.is_subtotal
                {
                    adjustments.push(adjustment(&row, line_number));
                }

                items.push(
                    row.to_line_item()
                        .with_section(Some(section.as_str().to_string()))
                        .with_classification(&classification),
                );
            }
        }

        let line_items = finalize_items(items);
        let totals = summarize(&line_items, &cash_accounts, beginning_cash, ending_cash);

        CashFlowExtraction {
            header,
            line_items,
            adjustments,
            cash_accounts,
            totals,
        }
    }
}

fn adjustment(row: &ParsedRow, line_number: usize) -> Adjustment {
    let amount = row.period_amount();
    Adjustment {
        adjustment_name: row.name.clone(),
        adjustment_category: adjustment_category(&row.name),
        amount,
        is_increase: amount > Decimal::ZERO,
        related_property: DUE_TO_FROM
            .captures(&row.name)
            .map(|c| c[1].trim().to_string()),
        related_entity: PAYABLE_TO
            .captures(&row.name)
            .map(|c| c[1].trim().to_string()),
        line_number,
        page: row.page,
    }
}

/// Columns: beginning, ending, [difference]
fn cash_account_row(row: &ParsedRow) -> CashAccountReconciliationRow {
    let beginning = row.period_amount();
    let ending = row.second_amount().unwrap_or(beginning);
    let difference = row.amounts.get(2).copied().unwrap_or(ending - beginning);
    let account_type = cash_account_type(&row.name);

    CashAccountReconciliationRow {
        account_name: row.name.clone(),
        account_type,
        beginning_balance: beginning,
        ending_balance: ending,
        difference,
        is_escrow_account: account_type == CashAccountType::Escrow,
        is_negative_balance: ending < Decimal::ZERO,
        is_total_row: row.name.to_uppercase().contains("TOTAL"),
    }
}

fn subcategory_amount(items: &[ExtractedLineItem], subcategory: &str) -> Option<Decimal> {
    items
        .iter()
        .find(|i| i.line_subcategory.as_deref() == Some(subcategory))
        .map(|i| i.period_amount)
}

/// Summary totals: explicit rows first, then the cash-account total row,
/// then the sum of account rows.
fn summarize(
    items: &[ExtractedLineItem],
    cash_accounts: &[CashAccountReconciliationRow],
    beginning_cash: Option<Decimal>,
    ending_cash: Option<Decimal>,
) -> CashFlowHeader {
    let total_row = cash_accounts.iter().find(|r| r.is_total_row);
    let detail: Vec<&CashAccountReconciliationRow> = cash_accounts.iter().filter(|r| !r.is_total_row).collect();

    let from_accounts = |f: fn(&CashAccountReconciliationRow) -> Decimal| -> Option<Decimal> {
        match total_row {
            Some(t) => Some(f(t)),
            None if !detail.is_empty() => Some(detail.iter().map(|r| f(r)).sum()),
            None => None,
        }
    };

    let beginning = beginning_cash.or_else(|| from_accounts(|r| r.beginning_balance));
    let ending = ending_cash.or_else(|| from_accounts(|r| r.ending_balance));

    let total_expenses = subcategory_amount(items, "Total Expenses").or_else(|| {
        let opex = subcategory_amount(items, "Total Operating Expenses");
        let additional = subcategory_amount(items, "Total Additional Expenses");
        match (opex, additional) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or_default() + b.unwrap_or_default()),
        }
    });

    let net_change = subcategory_amount(items, "Net Change in Cash").or(match (beginning, ending) {
        (Some(b), Some(e)) => Some(e - b),
        _ => None,
    });

    CashFlowHeader {
        beginning_cash_balance: beginning,
        ending_cash_balance: ending,
        total_income: subcategory_amount(items, "Total Income"),
        total_expenses,
        net_operating_income: subcategory_amount(items, "Net Operating Income"),
        net_income: subcategory_amount(items, "Net Income"),
        net_change_in_cash: net_change,
    }
}

impl StatementParser for CashFlowParser {
    fn statement_type(&self) -> StatementType {
        StatementType::CashFlow
    }

    fn parse(&self, document: &Document) -> ExtractedStatement {
        ExtractedStatement::CashFlow(self.extract(document))
    }
}
