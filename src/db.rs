// 🗄️ SQLite Persistence - Statement tables, rule catalog, run results
//
// Writes follow delete-and-replace: one extraction replaces every row of its
// statement type for (property, period) inside a single transaction.
// Decimals are stored as TEXT so amounts round-trip exactly.

use anyhow::{anyhow, Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::parser::ExtractedStatement;
use crate::period::FinancialPeriod;
use crate::reconciliation::AuditRun;
use crate::statements::{
    Adjustment, AdjustmentCategory, CashAccountReconciliationRow, CashAccountType, CashFlowHeader,
    ExtractedLineItem, MortgageStatement, RentRollEntry, StatementType,
};
use crate::store::{StatementLine, StatementStore};
use crate::validation::{RuleCatalog, RuleDefinition, ValidationReport, ValidationRule, ValidationSeverity};

/// Line-item tables share one layout
const LINE_TABLES: [(StatementType, &str); 3] = [
    (StatementType::BalanceSheet, "balance_sheet_data"),
    (StatementType::IncomeStatement, "income_statement_data"),
    (StatementType::CashFlow, "cash_flow_data"),
];

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS financial_periods (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(property_id, year, month)
        )",
        [],
    )?;

    // ==========================================================================
    // Statement line items
    // ==========================================================================
    for (_, table) in LINE_TABLES {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    property_id TEXT NOT NULL,
                    period_id INTEGER NOT NULL,
                    line_number INTEGER NOT NULL,
                    account_code TEXT,
                    account_name TEXT NOT NULL,
                    amount TEXT NOT NULL,
                    ytd_amount TEXT,
                    period_percentage TEXT,
                    is_total INTEGER NOT NULL,
                    is_subtotal INTEGER NOT NULL,
                    is_below_the_line INTEGER NOT NULL,
                    line_category TEXT,
                    line_subcategory TEXT,
                    line_section TEXT,
                    page INTEGER NOT NULL,
                    confidence REAL NOT NULL,
                    needs_review INTEGER NOT NULL
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_scope ON {table}(property_id, period_id)"),
            [],
        )?;
    }

    // ==========================================================================
    // Cash-flow derived records
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cash_flow_headers (
            property_id TEXT NOT NULL,
            period_id INTEGER NOT NULL,
            beginning_cash_balance TEXT,
            ending_cash_balance TEXT,
            total_income TEXT,
            total_expenses TEXT,
            net_operating_income TEXT,
            net_income TEXT,
            net_change_in_cash TEXT,
            PRIMARY KEY (property_id, period_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cash_flow_adjustments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id TEXT NOT NULL,
            period_id INTEGER NOT NULL,
            adjustment_name TEXT NOT NULL,
            adjustment_category TEXT NOT NULL,
            amount TEXT NOT NULL,
            is_increase INTEGER NOT NULL,
            related_property TEXT,
            related_entity TEXT,
            line_number INTEGER NOT NULL,
            page INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cash_account_reconciliations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id TEXT NOT NULL,
            period_id INTEGER NOT NULL,
            account_name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            beginning_balance TEXT NOT NULL,
            ending_balance TEXT NOT NULL,
            difference TEXT NOT NULL,
            is_escrow_account INTEGER NOT NULL,
            is_negative_balance INTEGER NOT NULL,
            is_total_row INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Mortgage statements and rent rolls (full record kept as JSON)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS mortgage_statement_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id TEXT NOT NULL,
            period_id INTEGER NOT NULL,
            loan_number TEXT,
            principal_balance TEXT NOT NULL,
            total_payment_due TEXT NOT NULL,
            record TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rent_roll_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id TEXT NOT NULL,
            period_id INTEGER NOT NULL,
            row_id INTEGER NOT NULL,
            unit_number TEXT NOT NULL,
            tenant_name TEXT,
            occupancy_status TEXT NOT NULL,
            monthly_rent TEXT,
            is_gross_rent_row INTEGER NOT NULL,
            parent_row_id INTEGER,
            record TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Rule catalog and run results
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS validation_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_name TEXT UNIQUE NOT NULL,
            document_type TEXT NOT NULL,
            rule_type TEXT NOT NULL,
            description TEXT NOT NULL,
            formula_text TEXT NOT NULL,
            severity TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS validation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            upload_id TEXT NOT NULL,
            rule_id INTEGER NOT NULL REFERENCES validation_rules(id),
            rule_name TEXT NOT NULL,
            passed INTEGER NOT NULL,
            expected_value TEXT,
            actual_value TEXT,
            difference TEXT,
            difference_percentage TEXT,
            error_message TEXT,
            severity TEXT NOT NULL,
            validated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reconciliation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            property_id TEXT NOT NULL,
            period_id INTEGER NOT NULL,
            rule_id TEXT NOT NULL,
            rule_name TEXT NOT NULL,
            category TEXT NOT NULL,
            status TEXT NOT NULL,
            source_value TEXT,
            target_value TEXT,
            difference TEXT,
            variance_pct TEXT,
            details TEXT NOT NULL,
            severity TEXT NOT NULL,
            formula TEXT NOT NULL,
            intermediate_calculations TEXT NOT NULL,
            detected_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reconciliation_scope ON reconciliation_results(property_id, period_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// PERIODS
// ============================================================================

/// Period id for (property, year, month), created on first use
pub fn find_or_create_period(conn: &Connection, property_id: &str, year: i32, month: u32) -> Result<FinancialPeriod> {
    conn.execute(
        "INSERT OR IGNORE INTO financial_periods (property_id, year, month) VALUES (?1, ?2, ?3)",
        params![property_id, year, month],
    )?;
    let id: i64 = conn
        .query_row(
            "SELECT id FROM financial_periods WHERE property_id = ?1 AND year = ?2 AND month = ?3",
            params![property_id, year, month],
            |row| row.get(0),
        )
        .with_context(|| format!("Failed to resolve period {:04}-{:02} for {}", year, month, property_id))?;
    Ok(FinancialPeriod::new(id, property_id, year, month))
}

// ============================================================================
// DELETE-AND-REPLACE WRITER
// ============================================================================

/// Replace every row of the extraction's statement type for (property, period)
pub fn replace_statement(
    conn: &mut Connection,
    property_id: &str,
    period_id: i64,
    extraction: &ExtractedStatement,
) -> Result<usize> {
    let tx = conn.transaction()?;
    let statement_type = extraction.statement_type();
    delete_statement(&tx, property_id, period_id, statement_type)?;

    let written = match extraction {
        ExtractedStatement::BalanceSheet(e) | ExtractedStatement::IncomeStatement(e) => {
            insert_line_items(&tx, line_table(statement_type)?, property_id, period_id, &e.line_items)?
        }
        ExtractedStatement::CashFlow(e) => {
            let lines = insert_line_items(&tx, "cash_flow_data", property_id, period_id, &e.line_items)?;
            insert_cash_flow_header(&tx, property_id, period_id, &e.totals)?;
            insert_adjustments(&tx, property_id, period_id, &e.adjustments)?;
            insert_cash_accounts(&tx, property_id, period_id, &e.cash_accounts)?;
            lines + e.adjustments.len() + e.cash_accounts.len()
        }
        ExtractedStatement::RentRoll(e) => insert_rent_roll(&tx, property_id, period_id, &e.entries)?,
        ExtractedStatement::MortgageStatement(e) => {
            insert_mortgage(&tx, property_id, period_id, &e.statement)?;
            1
        }
    };

    tx.commit().context("Failed to commit statement replacement")?;
    info!(property = property_id, period = period_id, rows = written, "replaced {}", statement_type);
    Ok(written)
}

fn line_table(statement_type: StatementType) -> Result<&'static str> {
    LINE_TABLES
        .iter()
        .find(|(t, _)| *t == statement_type)
        .map(|(_, table)| *table)
        .ok_or_else(|| anyhow!("{} has no line-item table", statement_type))
}

fn delete_statement(conn: &Connection, property_id: &str, period_id: i64, statement_type: StatementType) -> Result<()> {
    let tables: &[&str] = match statement_type {
        StatementType::BalanceSheet => &["balance_sheet_data"],
        StatementType::IncomeStatement => &["income_statement_data"],
        StatementType::CashFlow => &[
            "cash_flow_data",
            "cash_flow_headers",
            "cash_flow_adjustments",
            "cash_account_reconciliations",
        ],
        StatementType::RentRoll => &["rent_roll_data"],
        StatementType::MortgageStatement => &["mortgage_statement_data"],
    };
    for table in tables {
        let removed = conn.execute(
            &format!("DELETE FROM {table} WHERE property_id = ?1 AND period_id = ?2"),
            params![property_id, period_id],
        )?;
        debug!(table, removed, "cleared rows");
    }
    Ok(())
}

fn insert_line_items(
    conn: &Connection,
    table: &str,
    property_id: &str,
    period_id: i64,
    items: &[ExtractedLineItem],
) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} (
            property_id, period_id, line_number, account_code, account_name, amount,
            ytd_amount, period_percentage, is_total, is_subtotal, is_below_the_line,
            line_category, line_subcategory, line_section, page, confidence, needs_review
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
    ))?;

    for item in items {
        stmt.execute(params![
            property_id,
            period_id,
            item.line_number as i64,
            item.account_code,
            item.account_name,
            item.period_amount.to_string(),
            text(item.ytd_amount),
            text(item.period_percentage),
            item.is_total,
            item.is_subtotal,
            item.is_below_the_line,
            item.line_category,
            item.line_subcategory,
            item.line_section,
            item.page as i64,
            item.confidence,
            item.needs_review,
        ])?;
    }
    Ok(items.len())
}

fn insert_cash_flow_header(conn: &Connection, property_id: &str, period_id: i64, h: &CashFlowHeader) -> Result<()> {
    conn.execute(
        "INSERT INTO cash_flow_headers (
            property_id, period_id, beginning_cash_balance, ending_cash_balance, total_income,
            total_expenses, net_operating_income, net_income, net_change_in_cash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            property_id,
            period_id,
            text(h.beginning_cash_balance),
            text(h.ending_cash_balance),
            text(h.total_income),
            text(h.total_expenses),
            text(h.net_operating_income),
            text(h.net_income),
            text(h.net_change_in_cash),
        ],
    )?;
    Ok(())
}

fn insert_adjustments(conn: &Connection, property_id: &str, period_id: i64, adjustments: &[Adjustment]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO cash_flow_adjustments (
            property_id, period_id, adjustment_name, adjustment_category, amount, is_increase,
            related_property, related_entity, line_number, page
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for a in adjustments {
        stmt.execute(params![
            property_id,
            period_id,
            a.adjustment_name,
            a.adjustment_category.as_str(),
            a.amount.to_string(),
            a.is_increase,
            a.related_property,
            a.related_entity,
            a.line_number as i64,
            a.page as i64,
        ])?;
    }
    Ok(())
}

fn insert_cash_accounts(
    conn: &Connection,
    property_id: &str,
    period_id: i64,
    rows: &[CashAccountReconciliationRow],
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO cash_account_reconciliations (
            property_id, period_id, account_name, account_type, beginning_balance, ending_balance,
            difference, is_escrow_account, is_negative_balance, is_total_row
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for c in rows {
        stmt.execute(params![
            property_id,
            period_id,
            c.account_name,
            c.account_type.as_str(),
            c.beginning_balance.to_string(),
            c.ending_balance.to_string(),
            c.difference.to_string(),
            c.is_escrow_account,
            c.is_negative_balance,
            c.is_total_row,
        ])?;
    }
    Ok(())
}

fn insert_rent_roll(conn: &Connection, property_id: &str, period_id: i64, entries: &[RentRollEntry]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO rent_roll_data (
            property_id, period_id, row_id, unit_number, tenant_name, occupancy_status,
            monthly_rent, is_gross_rent_row, parent_row_id, record
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for e in entries {
        stmt.execute(params![
            property_id,
            period_id,
            e.row_id as i64,
            e.unit_number,
            e.tenant_name,
            if e.is_vacant() { "vacant" } else { "occupied" },
            text(e.monthly_rent),
            e.is_gross_rent_row,
            e.parent_row_id.map(|p| p as i64),
            serde_json::to_string(e)?,
        ])?;
    }
    Ok(entries.len())
}

fn insert_mortgage(conn: &Connection, property_id: &str, period_id: i64, m: &MortgageStatement) -> Result<()> {
    conn.execute(
        "INSERT INTO mortgage_statement_data (
            property_id, period_id, loan_number, principal_balance, total_payment_due, record
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            property_id,
            period_id,
            m.loan_number,
            m.principal_balance.to_string(),
            m.total_payment_due.to_string(),
            serde_json::to_string(m)?,
        ],
    )?;
    Ok(())
}

// ============================================================================
// COLUMN CONVERSION
// ============================================================================

fn text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn decimal(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn optional_decimal(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn json<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SqliteStore - StatementStore over the tables above
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn add_period(&self, property_id: &str, year: i32, month: u32) -> Result<FinancialPeriod> {
        find_or_create_period(&self.conn, property_id, year, month)
    }

    pub fn replace_statement(&mut self, property_id: &str, period_id: i64, extraction: &ExtractedStatement) -> Result<usize> {
        replace_statement(&mut self.conn, property_id, period_id, extraction)
    }

    pub fn rule_catalog(&self) -> SqliteRuleCatalog<'_> {
        SqliteRuleCatalog::new(&self.conn)
    }

    fn lines(&self, table: &str, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT account_code, account_name, amount, ytd_amount, period_percentage,
                    is_total, is_subtotal, is_below_the_line, line_category, line_subcategory, line_section
             FROM {table}
             WHERE property_id = ?1 AND period_id = ?2
             ORDER BY id"
        ))?;
        let lines = stmt
            .query_map(params![property_id, period_id], |row| {
                Ok(StatementLine {
                    account_code: row.get(0)?,
                    account_name: row.get(1)?,
                    amount: decimal(row, 2)?,
                    ytd_amount: optional_decimal(row, 3)?,
                    period_percentage: optional_decimal(row, 4)?,
                    is_total: row.get(5)?,
                    is_subtotal: row.get(6)?,
                    is_below_the_line: row.get(7)?,
                    category: row.get(8)?,
                    subcategory: row.get(9)?,
                    section: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read {} for {} period {}", table, property_id, period_id))?;
        Ok(lines)
    }

    fn records<T: DeserializeOwned>(&self, table: &str, property_id: &str, period_id: i64) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT record FROM {table} WHERE property_id = ?1 AND period_id = ?2 ORDER BY id"
        ))?;
        let records = stmt
            .query_map(params![property_id, period_id], |row| json(row, 0))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read {} for {} period {}", table, property_id, period_id))?;
        Ok(records)
    }
}

impl StatementStore for SqliteStore {
    fn periods(&self, property_id: &str) -> Result<Vec<FinancialPeriod>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, property_id, year, month FROM financial_periods
             WHERE property_id = ?1
             ORDER BY year, month",
        )?;
        let periods = stmt
            .query_map(params![property_id], |row| {
                Ok(FinancialPeriod::new(row.get(0)?, row.get::<_, String>(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(periods)
    }

    fn balance_sheet(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>> {
        self.lines("balance_sheet_data", property_id, period_id)
    }

    fn income_statement(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>> {
        self.lines("income_statement_data", property_id, period_id)
    }

    fn cash_flow(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>> {
        self.lines("cash_flow_data", property_id, period_id)
    }

    fn cash_flow_header(&self, property_id: &str, period_id: i64) -> Result<Option<CashFlowHeader>> {
        let header = self
            .conn
            .query_row(
                "SELECT beginning_cash_balance, ending_cash_balance, total_income, total_expenses,
                        net_operating_income, net_income, net_change_in_cash
                 FROM cash_flow_headers
                 WHERE property_id = ?1 AND period_id = ?2",
                params![property_id, period_id],
                |row| {
                    Ok(CashFlowHeader {
                        beginning_cash_balance: optional_decimal(row, 0)?,
                        ending_cash_balance: optional_decimal(row, 1)?,
                        total_income: optional_decimal(row, 2)?,
                        total_expenses: optional_decimal(row, 3)?,
                        net_operating_income: optional_decimal(row, 4)?,
                        net_income: optional_decimal(row, 5)?,
                        net_change_in_cash: optional_decimal(row, 6)?,
                    })
                },
            )
            .optional()?;
        Ok(header)
    }

    fn adjustments(&self, property_id: &str, period_id: i64) -> Result<Vec<Adjustment>> {
        let mut stmt = self.conn.prepare(
            "SELECT adjustment_name, adjustment_category, amount, is_increase, related_property,
                    related_entity, line_number, page
             FROM cash_flow_adjustments
             WHERE property_id = ?1 AND period_id = ?2
             ORDER BY id",
        )?;
        let adjustments = stmt
            .query_map(params![property_id, period_id], |row| {
                let category: String = row.get(1)?;
                Ok(Adjustment {
                    adjustment_name: row.get(0)?,
                    adjustment_category: AdjustmentCategory::parse(&category),
                    amount: decimal(row, 2)?,
                    is_increase: row.get(3)?,
                    related_property: row.get(4)?,
                    related_entity: row.get(5)?,
                    line_number: row.get::<_, i64>(6)? as usize,
                    page: row.get::<_, i64>(7)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(adjustments)
    }

    fn cash_accounts(&self, property_id: &str, period_id: i64) -> Result<Vec<CashAccountReconciliationRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT account_name, account_type, beginning_balance, ending_balance, difference,
                    is_escrow_account, is_negative_balance, is_total_row
             FROM cash_account_reconciliations
             WHERE property_id = ?1 AND period_id = ?2
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![property_id, period_id], |row| {
                let account_type: String = row.get(1)?;
                Ok(CashAccountReconciliationRow {
                    account_name: row.get(0)?,
                    account_type: CashAccountType::parse(&account_type),
                    beginning_balance: decimal(row, 2)?,
                    ending_balance: decimal(row, 3)?,
                    difference: decimal(row, 4)?,
                    is_escrow_account: row.get(5)?,
                    is_negative_balance: row.get(6)?,
                    is_total_row: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn mortgage_statements(&self, property_id: &str, period_id: i64) -> Result<Vec<MortgageStatement>> {
        self.records("mortgage_statement_data", property_id, period_id)
    }

    fn rent_roll(&self, property_id: &str, period_id: i64) -> Result<Vec<RentRollEntry>> {
        self.records("rent_roll_data", property_id, period_id)
    }
}

// ============================================================================
// RULE CATALOG
// ============================================================================

/// Validation rule catalog in the validation_rules table
pub struct SqliteRuleCatalog<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRuleCatalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteRuleCatalog { conn }
    }

    fn read_rule(row: &Row) -> rusqlite::Result<ValidationRule> {
        let document_type: String = row.get(2)?;
        let severity: String = row.get(6)?;
        Ok(ValidationRule {
            id: row.get(0)?,
            rule_name: row.get(1)?,
            document_type: StatementType::from_str(&document_type)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
            rule_type: row.get(3)?,
            description: row.get(4)?,
            formula_text: row.get(5)?,
            severity: ValidationSeverity::parse(&severity).ok_or(rusqlite::Error::InvalidColumnType(
                6,
                "severity".to_string(),
                Type::Text,
            ))?,
        })
    }
}

impl RuleCatalog for SqliteRuleCatalog<'_> {
    fn get_or_create(&self, d: &RuleDefinition) -> Result<ValidationRule> {
        // The first definition stored under a name wins
        self.conn.execute(
            "INSERT OR IGNORE INTO validation_rules (
                rule_name, document_type, rule_type, description, formula_text, severity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                d.rule_name,
                d.document_type.as_str(),
                d.rule_type,
                d.description,
                d.formula,
                d.severity.as_str(),
            ],
        )?;
        self.conn
            .query_row(
                "SELECT id, rule_name, document_type, rule_type, description, formula_text, severity
                 FROM validation_rules WHERE rule_name = ?1",
                params![d.rule_name],
                Self::read_rule,
            )
            .with_context(|| format!("Failed to load validation rule {}", d.rule_name))
    }

    fn rules(&self) -> Result<Vec<ValidationRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rule_name, document_type, rule_type, description, formula_text, severity
             FROM validation_rules ORDER BY id",
        )?;
        let rules = stmt.query_map([], Self::read_rule)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }
}

// ============================================================================
// RESULT WRITERS
// ============================================================================

/// Append one audit run. Earlier runs stay untouched.
pub fn insert_reconciliation_results(conn: &mut Connection, run: &AuditRun) -> Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO reconciliation_results (
                run_id, property_id, period_id, rule_id, rule_name, category, status,
                source_value, target_value, difference, variance_pct, details, severity,
                formula, intermediate_calculations, detected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )?;
        for r in &run.results {
            stmt.execute(params![
                run.run_id,
                run.property_id,
                run.period_id,
                r.rule_id,
                r.rule_name,
                r.category,
                r.status.as_str(),
                text(r.source_value),
                text(r.target_value),
                text(r.difference),
                text(r.variance_pct),
                r.details,
                r.severity.as_str(),
                r.formula,
                serde_json::to_string(&r.intermediate_calculations)?,
                run.detected_at.to_rfc3339(),
            ])?;
        }
    }
    tx.commit().context("Failed to commit reconciliation results")?;
    info!(run = %run.run_id, results = run.results.len(), "stored audit run");
    Ok(run.results.len())
}

pub fn insert_validation_results(conn: &mut Connection, report: &ValidationReport) -> Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO validation_results (
                run_id, upload_id, rule_id, rule_name, passed, expected_value, actual_value,
                difference, difference_percentage, error_message, severity, validated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for r in &report.results {
            stmt.execute(params![
                report.run_id,
                r.upload_id,
                r.rule_id,
                r.rule_name,
                r.passed,
                text(r.expected_value),
                text(r.actual_value),
                text(r.difference),
                text(r.difference_percentage),
                r.error_message,
                r.severity.as_str(),
                report.validated_at.to_rfc3339(),
            ])?;
        }
    }
    tx.commit().context("Failed to commit validation results")?;
    Ok(report.results.len())
}

/// Row count of a stored audit run
pub fn count_reconciliation_results(conn: &Connection, run_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM reconciliation_results WHERE run_id = ?1",
        params![run_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// CSV EXPORT
// ============================================================================

#[derive(Serialize)]
struct CsvRow<'a> {
    run_id: &'a str,
    property_id: &'a str,
    period_id: i64,
    rule_id: &'a str,
    rule_name: &'a str,
    category: &'a str,
    status: &'static str,
    severity: &'static str,
    source_value: Option<Decimal>,
    target_value: Option<Decimal>,
    difference: Option<Decimal>,
    variance_pct: Option<Decimal>,
    formula: &'a str,
    details: &'a str,
}

/// Write one row per result, in execution order
pub fn export_results_csv<P: AsRef<Path>>(run: &AuditRun, path: P) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("Failed to create CSV: {:?}", path.as_ref()))?;
    for r in &run.results {
        writer.serialize(CsvRow {
            run_id: &run.run_id,
            property_id: &run.property_id,
            period_id: run.period_id,
            rule_id: &r.rule_id,
            rule_name: &r.rule_name,
            category: &r.category,
            status: r.status.as_str(),
            severity: r.severity.as_str(),
            source_value: r.source_value,
            target_value: r.target_value,
            difference: r.difference,
            variance_pct: r.variance_pct,
            formula: &r.formula,
            details: &r.details,
        })?;
    }
    writer.flush()?;
    Ok(run.results.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::parser::{MortgageExtraction, RentRollExtraction, StatementExtraction};
    use crate::reconciliation::{AuditEngine, Status};
    use crate::validation::ValidationService;
    use rust_decimal_macros::dec;

    fn item(code: &str, name: &str, amount: Decimal, total: bool) -> ExtractedLineItem {
        let mut item = ExtractedLineItem::new(name, amount, 1).with_code(Some(code.to_string()));
        item.is_total = total;
        item
    }

    fn balance_sheet(cash: Decimal) -> ExtractedStatement {
        ExtractedStatement::BalanceSheet(StatementExtraction {
            header: Default::default(),
            line_items: vec![
                item("0122-0000", "Cash - Operating", cash, false),
                item("1999-0000", "TOTAL ASSETS", cash, true),
                item("2999-0000", "Total Liabilities", dec!(0), true),
                item("3999-0000", "Total Capital", cash, true),
            ],
        })
    }

    #[test]
    fn test_replace_statement_deletes_previous_rows() {
        let mut store = SqliteStore::in_memory().unwrap();
        let period = store.add_period("P1", 2024, 12).unwrap();

        store.replace_statement("P1", period.id, &balance_sheet(dec!(150000.00))).unwrap();
        store.replace_statement("P1", period.id, &balance_sheet(dec!(90000.55))).unwrap();

        let lines = store.balance_sheet("P1", period.id).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].amount, dec!(90000.55));
        assert!(lines[1].is_total);
        assert!(store.income_statement("P1", period.id).unwrap().is_empty());
    }

    #[test]
    fn test_periods_are_reused_and_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        let dec_period = store.add_period("P1", 2024, 12).unwrap();
        let nov = store.add_period("P1", 2024, 11).unwrap();
        assert_eq!(store.add_period("P1", 2024, 12).unwrap().id, dec_period.id);

        let periods = store.periods("P1").unwrap();
        assert_eq!(periods, vec![nov, dec_period]);
        assert!(store.periods("P2").unwrap().is_empty());
    }

    #[test]
    fn test_records_round_trip_through_json_columns() {
        let mut store = SqliteStore::in_memory().unwrap();
        let period = store.add_period("P1", 2024, 12).unwrap();

        let statement = MortgageStatement {
            loan_number: Some("LN-7".to_string()),
            principal_balance: dec!(1000000),
            principal_due: dec!(2000),
            ..Default::default()
        };
        let mut unit = RentRollEntry::new(1, "101", 1);
        unit.monthly_rent = Some(dec!(1850.25));

        store
            .replace_statement(
                "P1",
                period.id,
                &ExtractedStatement::MortgageStatement(MortgageExtraction {
                    header: Default::default(),
                    statement: statement.clone(),
                }),
            )
            .unwrap();
        store
            .replace_statement(
                "P1",
                period.id,
                &ExtractedStatement::RentRoll(RentRollExtraction {
                    header: Default::default(),
                    entries: vec![unit.clone()],
                }),
            )
            .unwrap();

        assert_eq!(store.mortgage_statements("P1", period.id).unwrap(), vec![statement]);
        assert_eq!(store.rent_roll("P1", period.id).unwrap(), vec![unit]);
        assert!(store.cash_flow_header("P1", period.id).unwrap().is_none());
    }

    #[test]
    fn test_rule_catalog_get_or_create() {
        let store = SqliteStore::in_memory().unwrap();
        let catalog = store.rule_catalog();
        let d = crate::validation::definition("bs_balance_equation").unwrap();

        let first = catalog.get_or_create(d).unwrap();
        let second = catalog.get_or_create(d).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.document_type, StatementType::BalanceSheet);
        assert_eq!(catalog.rules().unwrap().len(), 1);
    }

    #[test]
    fn test_runs_are_appended_and_exported() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("audit.db")).unwrap();
        let period = store.add_period("P1", 2024, 12).unwrap();
        store.replace_statement("P1", period.id, &balance_sheet(dec!(150000))).unwrap();

        let config = EngineConfig::default();
        let run = AuditEngine::new(&store, &config).run("P1", period.id).unwrap();
        assert!(!run.results.is_empty());
        assert_eq!(run.results[0].status, Status::Pass);

        let report = {
            let catalog = store.rule_catalog();
            ValidationService::new(&store, &catalog, &config.validation)
                .validate("P1", period.id, StatementType::BalanceSheet)
                .unwrap()
        };

        insert_reconciliation_results(store.connection_mut(), &run).unwrap();
        insert_reconciliation_results(store.connection_mut(), &run).unwrap();
        insert_validation_results(store.connection_mut(), &report).unwrap();
        assert_eq!(
            count_reconciliation_results(store.connection(), &run.run_id).unwrap(),
            2 * run.results.len() as i64
        );

        let csv_path = dir.path().join("results.csv");
        let written = export_results_csv(&run, &csv_path).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.records().count(), written);
    }
}
