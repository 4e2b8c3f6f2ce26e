// End-to-end scenarios: extraction -> store -> audit / validation

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use statement_audit::parser::document::{Page, Table};
use statement_audit::parser::{MortgageExtraction, StatementExtraction};
use statement_audit::{
    classify, get_parser, AuditEngine, AuditRun, CashFlowHeader, Document, EngineConfig, ExtractedLineItem,
    ExtractedStatement, FinancialPeriod, FinancialTableParser, InMemoryStore, MortgageStatement, PlainTextBackend,
    ReconciliationResult, RuleCatalog, Section, SqliteStore, StatementLine, StatementStore, StatementType, Status,
    ValidationService,
};

const PROPERTY: &str = "SUNP";

fn result<'a>(run: &'a AuditRun, rule_id: &str) -> &'a ReconciliationResult {
    run.results
        .iter()
        .find(|r| r.rule_id == rule_id)
        .unwrap_or_else(|| panic!("{} missing from run", rule_id))
}

fn audit(store: &dyn StatementStore, period_id: i64) -> AuditRun {
    let config = EngineConfig::default();
    AuditEngine::new(store, &config).run(PROPERTY, period_id).unwrap()
}

fn balance_sheet_table() -> Document {
    let table = Table::from_rows(vec![
        vec!["0122-0000", "Cash - Operating", "$150,000.00"],
        vec!["1999-0000", "TOTAL ASSETS", "$150,000.00"],
        vec!["2999-0000", "Total Liabilities", "$0.00"],
        vec!["3999-0000", "Total Capital", "$150,000.00"],
    ]);
    Document::new(vec![Page::new(1, "Sunset Plaza (SUNP)\nBalance Sheet\nPeriod = Dec 2024").with_table(table)])
}

fn line(code: &str, name: &str, amount: Decimal) -> ExtractedLineItem {
    ExtractedLineItem::new(name, amount, 1).with_code(Some(code.to_string()))
}

// ============================================================================
// EXTRACTION
// ============================================================================

#[test]
fn test_balance_sheet_extraction_feeds_balance_equation() {
    let extraction = get_parser(StatementType::BalanceSheet).parse(&balance_sheet_table());
    let ExtractedStatement::BalanceSheet(sheet) = &extraction else {
        panic!("expected a balance sheet");
    };

    assert_eq!(sheet.line_items.len(), 4);
    assert_eq!(sheet.line_items[0].account_code.as_deref(), Some("0122-0000"));
    assert_eq!(sheet.line_items[0].period_amount, dec!(150000.00));
    assert!(!sheet.line_items[0].is_total);
    assert!(sheet.line_items[1..].iter().all(|i| i.is_total));

    let mut store = InMemoryStore::new();
    store
        .add_period(FinancialPeriod::new(1, PROPERTY, 2024, 12))
        .load_extraction(PROPERTY, 1, &extraction);

    let run = audit(&store, 1);
    let equation = result(&run, "AUDIT-1");
    assert_eq!(equation.status, Status::Pass);
    assert_eq!(equation.difference, Some(Decimal::ZERO));
}

#[test]
fn test_plain_text_statement_round_trips_through_sqlite() {
    let text = "Sunset Plaza (SUNP)\nBalance Sheet\nPeriod = Dec 2024\n\n\
                0122-0000   Cash - Operating   150,000.00\n\
                1999-0000   TOTAL ASSETS   150,000.00\n\
                2999-0000   Total Liabilities   0.00\n";
    let parsed = FinancialTableParser::with_backend(Box::new(PlainTextBackend))
        .extract_document(text.as_bytes(), StatementType::BalanceSheet);
    assert!(parsed.success);
    assert_eq!(parsed.document_hash.len(), 64);
    let extraction = parsed.data.unwrap();
    assert_eq!(extraction.header().property_code.as_deref(), Some("SUNP"));

    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(dir.path().join("statements.db")).unwrap();
    let period = store.add_period(PROPERTY, 2024, 12).unwrap();
    let written = store.replace_statement(PROPERTY, period.id, &extraction).unwrap();

    let lines = store.balance_sheet(PROPERTY, period.id).unwrap();
    assert_eq!(written, extraction.record_count());
    assert_eq!(lines.len(), written);
    assert_eq!(lines[0].amount, dec!(150000.00));
}

#[test]
fn test_unreadable_document_is_a_soft_failure() {
    let parsed = FinancialTableParser::with_backend(Box::new(PlainTextBackend))
        .extract_document(b"", StatementType::IncomeStatement);
    assert!(!parsed.success);
    assert!(parsed.data.is_none());
    assert!(parsed.error.is_some());
}

#[test]
fn test_gross_rent_row_links_to_its_unit() {
    let table = Table::from_rows(vec![
        vec!["Unit", "Tenant", "Area", "Monthly Rent"],
        vec!["101", "Acme Corp", "1,000", "2,500.00"],
        vec!["101", "Gross Rent", "", "3,100.00"],
    ]);
    let doc = Document::new(vec![Page::new(1, "Rent Roll").with_table(table)]);
    let ExtractedStatement::RentRoll(roll) = get_parser(StatementType::RentRoll).parse(&doc) else {
        panic!("expected a rent roll");
    };

    assert_eq!(roll.entries.len(), 2);
    assert!(roll.entries[1].is_gross_rent_row);
    assert_eq!(roll.entries[1].parent_row_id, Some(roll.entries[0].row_id));
}

#[test]
fn test_classifier_is_deterministic() {
    let first = classify("Repairs & Maintenance", Section::OperatingExpense, Some("5010-0000"));
    let second = classify("Repairs & Maintenance", Section::OperatingExpense, Some("5010-0000"));
    assert_eq!(first, second);
}

// ============================================================================
// RECONCILIATION
// ============================================================================

#[test]
fn test_principal_paydown_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(dir.path().join("audit.db")).unwrap();
    let begin = store.add_period(PROPERTY, 2024, 12).unwrap();
    let end = store.add_period(PROPERTY, 2025, 1).unwrap();

    for (period, balance) in [(&begin, dec!(500000)), (&end, dec!(490000))] {
        let sheet = ExtractedStatement::BalanceSheet(StatementExtraction {
            header: Default::default(),
            line_items: vec![line("2610-0000", "Wells Fargo", balance)],
        });
        store.replace_statement(PROPERTY, period.id, &sheet).unwrap();
    }
    let mortgage = ExtractedStatement::MortgageStatement(MortgageExtraction {
        header: Default::default(),
        statement: MortgageStatement {
            principal_balance: dec!(490000),
            principal_due: dec!(10000),
            ..Default::default()
        },
    });
    store.replace_statement(PROPERTY, end.id, &mortgage).unwrap();

    let run = audit(&store, end.id);
    let paydown = result(&run, "AUDIT-21");
    assert_eq!(paydown.status, Status::Pass);
    assert_eq!(paydown.difference, Some(Decimal::ZERO));
    assert_eq!(paydown.intermediate_calculations["principal_applied"], serde_json::json!("10000"));
    assert_eq!(paydown.intermediate_calculations["bs_reduction"], serde_json::json!("10000"));
}

#[test]
fn test_extracted_mortgage_payment_ties() {
    let text = "Lender: Wells Fargo Bank\nLoan Number: 100-2345\n\
                Principal Amount Due: $10,000.00\nInterest Due: $2,000.00\nTotal Amount Due: $12,000.00\n";
    let parsed = FinancialTableParser::with_backend(Box::new(PlainTextBackend))
        .extract_document(text.as_bytes(), StatementType::MortgageStatement);
    assert!(parsed.success);

    let mut store = InMemoryStore::new();
    store
        .add_period(FinancialPeriod::new(1, PROPERTY, 2025, 1))
        .load_extraction(PROPERTY, 1, &parsed.data.unwrap());

    let run = audit(&store, 1);
    let composition = result(&run, "AUDIT-7");
    assert_eq!(composition.status, Status::Pass);
    assert_eq!(composition.difference, Some(Decimal::ZERO));
}

fn three_way_store(is_ni: Decimal, bs_end: Decimal, cf_ni: Decimal) -> InMemoryStore {
    let mut store = InMemoryStore::new();
    store
        .add_period(FinancialPeriod::new(1, PROPERTY, 2025, 2))
        .add_period(FinancialPeriod::new(2, PROPERTY, 2025, 3))
        .set_income_statement(PROPERTY, 2, vec![StatementLine::total(None, "Net Income", is_ni)])
        .set_balance_sheet(PROPERTY, 1, vec![StatementLine::detail(None, "Current Year Earnings", dec!(20000))])
        .set_balance_sheet(PROPERTY, 2, vec![StatementLine::detail(None, "Current Year Earnings", bs_end)])
        .set_cash_flow_header(
            PROPERTY,
            2,
            CashFlowHeader {
                net_income: Some(cf_ni),
                ..Default::default()
            },
        );
    store
}

#[test]
fn test_net_income_three_way_tie_symmetry() {
    let tied = audit(&three_way_store(dec!(6000), dec!(26000), dec!(6000)), 2);
    let r = result(&tied, "AUDIT-3");
    assert_eq!(r.status, Status::Pass);
    assert_eq!(r.difference, Some(Decimal::ZERO));

    // Any one leg moved by 250 shows up as exactly 250
    for (is_ni, bs_end, cf_ni) in [
        (dec!(6250), dec!(26000), dec!(6000)),
        (dec!(6000), dec!(26250), dec!(6000)),
        (dec!(6000), dec!(26000), dec!(6250)),
    ] {
        let run = audit(&three_way_store(is_ni, bs_end, cf_ni), 2);
        let r = result(&run, "AUDIT-3");
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.difference, Some(dec!(250)));
    }
}

#[test]
fn test_earliest_period_skips_comparison_rules() {
    let run = audit(&three_way_store(dec!(6000), dec!(26000), dec!(6000)), 1);
    for rule_id in ["AUDIT-3", "AUDIT-21", "AUDIT-28"] {
        assert_eq!(result(&run, rule_id).status, Status::Skip, "{}", rule_id);
    }
}

#[test]
fn test_catalog_runs_are_repeatable() {
    let store = three_way_store(dec!(6000), dec!(26000), dec!(6100));
    let first = audit(&store, 2);
    let second = audit(&store, 2);

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.results, second.results);
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_balance_sheet_validation_after_extraction() {
    let mut store = SqliteStore::in_memory().unwrap();
    let period = store.add_period(PROPERTY, 2024, 12).unwrap();
    let extraction = get_parser(StatementType::BalanceSheet).parse(&balance_sheet_table());
    store.replace_statement(PROPERTY, period.id, &extraction).unwrap();

    let config = EngineConfig::default();
    let catalog = store.rule_catalog();
    let report = ValidationService::new(&store, &catalog, &config.validation)
        .validate(PROPERTY, period.id, StatementType::BalanceSheet)
        .unwrap();

    assert_eq!(report.results.len(), 8);
    assert!(report.result("bs_balance_equation").unwrap().passed);
    assert!(report.result("bs_account_code_format").unwrap().passed);
    assert_eq!(catalog.rules().unwrap().len(), 8);
}
