// Balance sheet: assets / liabilities / capital rows with totals.

use tracing::debug;

use crate::classifier::{balance_sheet_section_header, classify_balance_sheet};
use crate::statements::StatementType;

use super::document::Document;
use super::header::extract_header;
use super::lines::{finalize_items, page_rows};
use super::{ExtractedStatement, StatementExtraction, StatementParser};

#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceSheetParser;

impl BalanceSheetParser {
    pub fn new() -> Self {
        BalanceSheetParser
    }

    pub fn extract(&self, document: &Document) -> StatementExtraction {
        let header = extract_header(document.first_page_text());
        let mut items = Vec::new();
        let mut section: Option<&'static str> = None;

        for page in &document.pages {
            for row in page_rows(page) {
                if !row.has_amount() {
                    if let Some(s) = balance_sheet_section_header(&row.raw) {
                        section = Some(s);
                    }
                }

                let is_heading =
                    row.is_document_heading() || (row.is_label_only() && balance_sheet_section_header(&row.raw).is_some());
                if is_heading || !row.is_line_item() {
                    debug!(page = page.number, row = %row.raw, "skipped balance sheet row");
                    continue;
                }

                let classification = classify_balance_sheet(&row.name, row.code.as_deref(), section);
                items.push(row.to_line_item().with_classification(&classification));
            }
        }

        StatementExtraction {
            header,
            line_items: finalize_items(items),
        }
    }
}

impl StatementParser for BalanceSheetParser {
    fn statement_type(&self) -> StatementType {
        StatementType::BalanceSheet
    }

    fn parse(&self, document: &Document) -> ExtractedStatement {
        ExtractedStatement::BalanceSheet(self.extract(document))
    }
}
