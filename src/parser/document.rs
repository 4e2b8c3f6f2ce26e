// 📄 Document Model - Pages, tables and the PDF backend seam
//
// A backend turns PDF bytes into pages. Each page carries zero or more
// tables (grids of nullable cells) plus a plain-text rendering. Everything
// downstream reads only this shape, so any backend that fills it produces
// identical classification.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::ExtractionError;
use crate::statements::BoundingBox;

/// Two or more spaces (or a tab) separate columns in text renderings
static COLUMN_GAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}|\t").expect("static column gap pattern"));

/// Minimum multi-cell lines before a text block is treated as a table
const MIN_TABLE_LINES: usize = 3;

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub cells: Vec<Option<String>>,
    pub bbox: Option<BoundingBox>,
}

impl TableRow {
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Self {
        TableRow {
            cells: cells
                .iter()
                .map(|c| {
                    let t = c.as_ref().trim();
                    if t.is_empty() {
                        None
                    } else {
                        Some(t.to_string())
                    }
                })
                .collect(),
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).and_then(|c| c.as_deref())
    }

    /// Non-empty cells joined by a single space
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .flatten()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.is_none())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn from_rows(rows: Vec<Vec<&str>>) -> Self {
        Table {
            rows: rows.iter().map(|r| TableRow::from_cells(r)).collect(),
        }
    }

    /// Promote column-aligned text blocks to tables.
    ///
    /// Blocks are separated by blank lines. A block becomes a table when at
    /// least three of its lines split into two or more cells; single-cell
    /// lines inside it (section headers) are kept as one-cell rows.
    pub fn infer_from_text(text: &str) -> Vec<Table> {
        let mut tables = Vec::new();
        let mut block: Vec<&str> = Vec::new();

        for line in text.lines().chain(std::iter::once("")) {
            if line.trim().is_empty() {
                if let Some(table) = Self::table_from_block(&block) {
                    tables.push(table);
                }
                block.clear();
            } else {
                block.push(line);
            }
        }

        tables
    }

    fn table_from_block(block: &[&str]) -> Option<Table> {
        let rows: Vec<TableRow> = block.iter().map(|l| split_columns(l)).collect();
        let multi = rows.iter().filter(|r| r.cells.len() >= 2).count();
        if multi >= MIN_TABLE_LINES {
            Some(Table { rows })
        } else {
            None
        }
    }
}

/// Split one text line into cells on column gaps
pub fn split_columns(line: &str) -> TableRow {
    let cells: Vec<&str> = COLUMN_GAP
        .split(line.trim())
        .filter(|c| !c.trim().is_empty())
        .collect();
    TableRow::from_cells(&cells)
}

// ============================================================================
// PAGES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// 1-based
    pub number: usize,
    pub tables: Vec<Table>,
    pub text: String,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Page {
            number,
            tables: Vec::new(),
            text: text.into(),
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().filter(|l| !l.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(pages: Vec<Page>) -> Self {
        Document { pages }
    }

    /// Build pages from a text rendering; form feeds separate pages.
    pub fn from_text(text: &str) -> Self {
        let pages = text
            .split('\x0c')
            .enumerate()
            .map(|(i, page_text)| {
                let tables = Table::infer_from_text(page_text);
                debug!(page = i + 1, tables = tables.len(), "inferred tables from text");
                Page {
                    number: i + 1,
                    tables,
                    text: page_text.to_string(),
                }
            })
            .collect();

        Document { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn first_page_text(&self) -> &str {
        self.pages.first().map(|p| p.text.as_str()).unwrap_or("")
    }

    /// All page text joined by newlines
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// No page has text or a non-blank table row
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| {
            p.text.trim().is_empty()
                && p.tables.iter().all(|t| t.rows.iter().all(|r| r.is_blank()))
        })
    }
}

// ============================================================================
// BACKENDS
// ============================================================================

/// PdfBackend - turns PDF bytes into a Document
pub trait PdfBackend: Send + Sync {
    fn load(&self, bytes: &[u8]) -> Result<Document, ExtractionError>;

    fn name(&self) -> &str;
}

/// Text-layer backend: reads the PDF text layer and infers tables from
/// column alignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPdfBackend;

impl TextPdfBackend {
    pub fn new() -> Self {
        TextPdfBackend
    }
}

impl PdfBackend for TextPdfBackend {
    #[cfg(feature = "pdf")]
    fn load(&self, bytes: &[u8]) -> Result<Document, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;

        let document = Document::from_text(&text);
        if document.is_blank() {
            return Err(ExtractionError::NoContent);
        }
        Ok(document)
    }

    #[cfg(not(feature = "pdf"))]
    fn load(&self, bytes: &[u8]) -> Result<Document, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }
        Err(ExtractionError::BackendUnavailable)
    }

    fn name(&self) -> &str {
        "pdf-text"
    }
}

/// Backend over bytes that are already a text rendering (UTF-8, form-feed
/// page breaks). Used for pre-converted statements and fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextBackend;

impl PdfBackend for PlainTextBackend {
    fn load(&self, bytes: &[u8]) -> Result<Document, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }
        let text =
            std::str::from_utf8(bytes).map_err(|e| ExtractionError::Unreadable(e.to_string()))?;
        let document = Document::from_text(text);
        if document.is_blank() {
            return Err(ExtractionError::NoContent);
        }
        Ok(document)
    }

    fn name(&self) -> &str {
        "plain-text"
    }
}
