// Statement Audit - Core Library
// Extraction, cross-statement audit and single-document validation for
// real-estate financial statements. Used by the CLI and tests.

pub mod amounts;
pub mod classifier;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod parser;
pub mod patterns;
pub mod period;
pub mod reconciliation;
pub mod statements;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use amounts::{format_currency, parse_amount, parse_percentage};
pub use classifier::{classify, classify_with_conflicts, Classification, Section, TAXONOMY_VERSION};
pub use config::{AccountPatterns, AuditConfig, BeginPolicy, ContextConfig, EngineConfig, ValidationConfig};
pub use context::AlignmentContext;
pub use db::{
    export_results_csv, find_or_create_period, insert_reconciliation_results, insert_validation_results,
    replace_statement, setup_database, SqliteRuleCatalog, SqliteStore,
};
pub use error::ExtractionError;
pub use parser::{
    get_parser, Document, ExtractedStatement, ExtractionResult, FinancialTableParser, PdfBackend,
    PlainTextBackend, StatementParser, TextPdfBackend,
};
pub use period::{parse_period_label, FinancialPeriod};
pub use reconciliation::{
    audit_catalog, AuditEngine, AuditRule, AuditRun, ReconciliationResult, RuleFamily, Severity, Status,
};
pub use statements::{
    Adjustment, AdjustmentCategory, CashAccountReconciliationRow, CashFlowHeader, DocumentHeader,
    ExtractedLineItem, MortgageStatement, RentRollEntry, StatementType,
};
pub use store::{InMemoryStore, StatementLine, StatementStore};
pub use validation::{
    InMemoryRuleCatalog, RuleCatalog, ValidationReport, ValidationResult, ValidationRule, ValidationService,
    ValidationSeverity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
