// Income statement: period / YTD amounts and percentages, classified by
// section. The section cursor carries across pages.

use tracing::debug;

use crate::classifier::{classify, section_header, Section, SectionDetector};
use crate::statements::StatementType;

use super::document::Document;
use super::header::extract_header;
use super::lines::{finalize_items, page_rows};
use super::{ExtractedStatement, StatementExtraction, StatementParser};

#[derive(Debug, Clone, Copy, Default)]
pub struct IncomeStatementParser;

impl IncomeStatementParser {
    pub fn new() -> Self {
        IncomeStatementParser
    }

    pub fn extract(&self, document: &Document) -> StatementExtraction {
        let header = extract_header(document.first_page_text());
        let mut detector = SectionDetector::new();
        let mut items = Vec::new();

        for page in &document.pages {
            for row in page_rows(page) {
                let section = detector
                    .observe(&row.raw, row.has_amount())
                    .unwrap_or(Section::Income);

                let is_heading =
                    row.is_document_heading() || (row.is_label_only() && section_header(&row.raw).is_some());
                if is_heading || !row.is_line_item() {
                    debug!(page = page.number, row = %row.raw, "skipped income statement row");
                    continue;
                }

                let classification = classify(&row.name, section, row.code.as_deref());
                items.push(
                    row.to_line_item()
                        .with_section(Some(section.as_str().to_string()))
                        .with_classification(&classification),
                );
            }
        }

        StatementExtraction {
            header,
            line_items: finalize_items(items),
        }
    }
}

impl StatementParser for IncomeStatementParser {
    fn statement_type(&self) -> StatementType {
        StatementType::IncomeStatement
    }

    fn parse(&self, document: &Document) -> ExtractedStatement {
        ExtractedStatement::IncomeStatement(self.extract(document))
    }
}
