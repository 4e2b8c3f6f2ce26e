// 🗃️ Statement Store - What the audit and validation engines read
//
// The engines only need point lookups and name-pattern sums keyed by
// (property, period). Any backing store that answers these is
// interchangeable: SQLite (db::SqliteStore) or the in-memory map below.

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::parser::ExtractedStatement;
use crate::patterns::code_prefix;
use crate::period::FinancialPeriod;
use crate::statements::{
    Adjustment, CashAccountReconciliationRow, CashFlowHeader, ExtractedLineItem, MortgageStatement,
    RentRollEntry,
};

// ============================================================================
// STATEMENT LINE
// ============================================================================

/// One persisted statement row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub account_code: Option<String>,
    pub account_name: String,
    pub amount: Decimal,
    pub ytd_amount: Option<Decimal>,
    pub period_percentage: Option<Decimal>,
    pub is_total: bool,
    pub is_subtotal: bool,
    pub is_below_the_line: bool,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub section: Option<String>,
}

impl StatementLine {
    pub fn detail(code: Option<&str>, name: &str, amount: Decimal) -> Self {
        StatementLine {
            account_code: code.map(|c| c.to_string()),
            account_name: name.to_string(),
            amount,
            ytd_amount: None,
            period_percentage: None,
            is_total: false,
            is_subtotal: false,
            is_below_the_line: false,
            category: None,
            subcategory: None,
            section: None,
        }
    }

    pub fn total(code: Option<&str>, name: &str, amount: Decimal) -> Self {
        StatementLine {
            is_total: true,
            ..StatementLine::detail(code, name, amount)
        }
    }

    pub fn with_ytd(mut self, ytd: Decimal) -> Self {
        self.ytd_amount = Some(ytd);
        self
    }

    pub fn with_subcategory(mut self, category: &str, subcategory: &str) -> Self {
        self.category = Some(category.to_string());
        self.subcategory = Some(subcategory.to_string());
        self
    }

    pub fn below_the_line(mut self) -> Self {
        self.is_below_the_line = true;
        self
    }

    pub fn with_section(mut self, section: &str) -> Self {
        self.section = Some(section.to_string());
        self
    }

    pub fn is_detail(&self) -> bool {
        !self.is_total && !self.is_subtotal
    }

    /// Uppercased name contains any pattern
    pub fn name_matches(&self, patterns: &[String]) -> bool {
        let upper = self.account_name.to_uppercase();
        patterns.iter().any(|p| upper.contains(p.as_str()))
    }

    fn name_contains_any(&self, patterns: &[&str]) -> bool {
        let upper = self.account_name.to_uppercase();
        patterns.iter().any(|p| upper.contains(p))
    }
}

impl From<&ExtractedLineItem> for StatementLine {
    fn from(item: &ExtractedLineItem) -> Self {
        StatementLine {
            account_code: item.account_code.clone(),
            account_name: item.account_name.clone(),
            amount: item.period_amount,
            ytd_amount: item.ytd_amount,
            period_percentage: item.period_percentage,
            is_total: item.is_total,
            is_subtotal: item.is_subtotal,
            is_below_the_line: item.is_below_the_line,
            category: item.line_category.clone(),
            subcategory: item.line_subcategory.clone(),
            section: item.line_section.clone(),
        }
    }
}

// ============================================================================
// LOOKUPS
// ============================================================================

/// Sum of detail rows whose name contains any include pattern and none of
/// the excludes. None when no row matched.
pub fn sum_matching(lines: &[StatementLine], include: &[String], exclude: &[&str]) -> Option<Decimal> {
    sum_where(lines, |l| l.is_detail() && l.name_matches(include) && !l.name_contains_any(exclude), |l| l.amount)
}

/// Same as `sum_matching` over YTD amounts (rows without YTD count as zero)
pub fn sum_matching_ytd(lines: &[StatementLine], include: &[String], exclude: &[&str]) -> Option<Decimal> {
    sum_where(
        lines,
        |l| l.is_detail() && l.name_matches(include) && !l.name_contains_any(exclude),
        |l| l.ytd_amount.unwrap_or_default(),
    )
}

/// Sum of detail rows in a subcategory
pub fn sum_subcategory(lines: &[StatementLine], subcategory: &str) -> Option<Decimal> {
    sum_where(lines, |l| l.is_detail() && l.subcategory.as_deref() == Some(subcategory), |l| l.amount)
}

/// Sum of detail rows in a category
pub fn sum_category(lines: &[StatementLine], category: &str) -> Option<Decimal> {
    sum_where(lines, |l| l.is_detail() && l.category.as_deref() == Some(category), |l| l.amount)
}

/// Sum of detail rows whose code prefix falls in [lo, hi]
pub fn sum_code_range(lines: &[StatementLine], lo: u32, hi: u32) -> Option<Decimal> {
    sum_where(
        lines,
        |l| {
            l.is_detail()
                && l.account_code
                    .as_deref()
                    .and_then(code_prefix)
                    .map(|p| (lo..=hi).contains(&p))
                    .unwrap_or(false)
        },
        |l| l.amount,
    )
}

fn sum_where(
    lines: &[StatementLine],
    keep: impl Fn(&StatementLine) -> bool,
    value: impl Fn(&StatementLine) -> Decimal,
) -> Option<Decimal> {
    let mut found = false;
    let mut total = Decimal::ZERO;
    for line in lines.iter().filter(|l| keep(l)) {
        found = true;
        total += value(line);
    }
    found.then_some(total)
}

/// First total row whose name contains any pattern and none of the excludes
pub fn total_named<'a>(lines: &'a [StatementLine], patterns: &[&str], exclude: &[&str]) -> Option<&'a StatementLine> {
    lines
        .iter()
        .filter(|l| l.is_total || l.is_subtotal)
        .find(|l| l.name_contains_any(patterns) && !l.name_contains_any(exclude))
}

/// First row (any kind) in a subcategory
pub fn line_in_subcategory<'a>(lines: &'a [StatementLine], subcategory: &str) -> Option<&'a StatementLine> {
    lines.iter().find(|l| l.subcategory.as_deref() == Some(subcategory))
}

pub fn by_code<'a>(lines: &'a [StatementLine], code: &str) -> Option<&'a StatementLine> {
    lines.iter().find(|l| l.account_code.as_deref() == Some(code))
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// StatementStore - read side used by the context builder and every rule
pub trait StatementStore {
    fn periods(&self, property_id: &str) -> Result<Vec<FinancialPeriod>>;

    fn balance_sheet(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>>;

    fn income_statement(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>>;

    fn cash_flow(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>>;

    fn cash_flow_header(&self, property_id: &str, period_id: i64) -> Result<Option<CashFlowHeader>>;

    fn adjustments(&self, property_id: &str, period_id: i64) -> Result<Vec<Adjustment>>;

    fn cash_accounts(&self, property_id: &str, period_id: i64) -> Result<Vec<CashAccountReconciliationRow>>;

    fn mortgage_statements(&self, property_id: &str, period_id: i64) -> Result<Vec<MortgageStatement>>;

    fn rent_roll(&self, property_id: &str, period_id: i64) -> Result<Vec<RentRollEntry>>;

    fn period(&self, property_id: &str, period_id: i64) -> Result<Option<FinancialPeriod>> {
        Ok(self.periods(property_id)?.into_iter().find(|p| p.id == period_id))
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct PeriodData {
    balance_sheet: Vec<StatementLine>,
    income_statement: Vec<StatementLine>,
    cash_flow: Vec<StatementLine>,
    cash_flow_header: Option<CashFlowHeader>,
    adjustments: Vec<Adjustment>,
    cash_accounts: Vec<CashAccountReconciliationRow>,
    mortgage_statements: Vec<MortgageStatement>,
    rent_roll: Vec<RentRollEntry>,
}

/// Map-backed store for tests and one-shot runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    periods: Vec<FinancialPeriod>,
    data: HashMap<(String, i64), PeriodData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_period(&mut self, period: FinancialPeriod) -> &mut Self {
        if !self.periods.iter().any(|p| p.id == period.id && p.property_id == period.property_id) {
            self.periods.push(period);
        }
        self
    }

    fn entry(&mut self, property_id: &str, period_id: i64) -> &mut PeriodData {
        self.data
            .entry((property_id.to_string(), period_id))
            .or_default()
    }

    pub fn set_balance_sheet(&mut self, property_id: &str, period_id: i64, lines: Vec<StatementLine>) -> &mut Self {
        self.entry(property_id, period_id).balance_sheet = lines;
        self
    }

    pub fn set_income_statement(&mut self, property_id: &str, period_id: i64, lines: Vec<StatementLine>) -> &mut Self {
        self.entry(property_id, period_id).income_statement = lines;
        self
    }

    pub fn set_cash_flow(&mut self, property_id: &str, period_id: i64, lines: Vec<StatementLine>) -> &mut Self {
        self.entry(property_id, period_id).cash_flow = lines;
        self
    }

    pub fn set_cash_flow_header(&mut self, property_id: &str, period_id: i64, header: CashFlowHeader) -> &mut Self {
        self.entry(property_id, period_id).cash_flow_header = Some(header);
        self
    }

    pub fn set_adjustments(&mut self, property_id: &str, period_id: i64, adjustments: Vec<Adjustment>) -> &mut Self {
        self.entry(property_id, period_id).adjustments = adjustments;
        self
    }

    pub fn set_cash_accounts(&mut self, property_id: &str, period_id: i64, rows: Vec<CashAccountReconciliationRow>) -> &mut Self {
        self.entry(property_id, period_id).cash_accounts = rows;
        self
    }

    pub fn set_mortgage_statements(&mut self, property_id: &str, period_id: i64, statements: Vec<MortgageStatement>) -> &mut Self {
        self.entry(property_id, period_id).mortgage_statements = statements;
        self
    }

    pub fn set_rent_roll(&mut self, property_id: &str, period_id: i64, entries: Vec<RentRollEntry>) -> &mut Self {
        self.entry(property_id, period_id).rent_roll = entries;
        self
    }

    /// Replace everything for the extraction's statement type
    pub fn load_extraction(&mut self, property_id: &str, period_id: i64, extraction: &ExtractedStatement) -> &mut Self {
        let lines = |items: &[ExtractedLineItem]| items.iter().map(StatementLine::from).collect::<Vec<_>>();
        match extraction {
            ExtractedStatement::BalanceSheet(e) => self.set_balance_sheet(property_id, period_id, lines(&e.line_items)),
            ExtractedStatement::IncomeStatement(e) => self.set_income_statement(property_id, period_id, lines(&e.line_items)),
            ExtractedStatement::CashFlow(e) => {
                self.set_cash_flow(property_id, period_id, lines(&e.line_items))
                    .set_cash_flow_header(property_id, period_id, e.totals.clone())
                    .set_adjustments(property_id, period_id, e.adjustments.clone())
                    .set_cash_accounts(property_id, period_id, e.cash_accounts.clone())
            }
            ExtractedStatement::RentRoll(e) => self.set_rent_roll(property_id, period_id, e.entries.clone()),
            ExtractedStatement::MortgageStatement(e) => {
                self.set_mortgage_statements(property_id, period_id, vec![e.statement.clone()])
            }
        }
    }

    fn read<T: Clone>(&self, property_id: &str, period_id: i64, f: impl Fn(&PeriodData) -> T) -> T
    where
        T: Default,
    {
        self.data
            .get(&(property_id.to_string(), period_id))
            .map(f)
            .unwrap_or_default()
    }
}

impl StatementStore for InMemoryStore {
    fn periods(&self, property_id: &str) -> Result<Vec<FinancialPeriod>> {
        Ok(self
            .periods
            .iter()
            .filter(|p| p.property_id == property_id)
            .cloned()
            .collect())
    }

    fn balance_sheet(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>> {
        Ok(self.read(property_id, period_id, |d| d.balance_sheet.clone()))
    }

    fn income_statement(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>> {
        Ok(self.read(property_id, period_id, |d| d.income_statement.clone()))
    }

    fn cash_flow(&self, property_id: &str, period_id: i64) -> Result<Vec<StatementLine>> {
        Ok(self.read(property_id, period_id, |d| d.cash_flow.clone()))
    }

    fn cash_flow_header(&self, property_id: &str, period_id: i64) -> Result<Option<CashFlowHeader>> {
        Ok(self.read(property_id, period_id, |d| d.cash_flow_header.clone()))
    }

    fn adjustments(&self, property_id: &str, period_id: i64) -> Result<Vec<Adjustment>> {
        Ok(self.read(property_id, period_id, |d| d.adjustments.clone()))
    }

    fn cash_accounts(&self, property_id: &str, period_id: i64) -> Result<Vec<CashAccountReconciliationRow>> {
        Ok(self.read(property_id, period_id, |d| d.cash_accounts.clone()))
    }

    fn mortgage_statements(&self, property_id: &str, period_id: i64) -> Result<Vec<MortgageStatement>> {
        Ok(self.read(property_id, period_id, |d| d.mortgage_statements.clone()))
    }

    fn rent_roll(&self, property_id: &str, period_id: i64) -> Result<Vec<RentRollEntry>> {
        Ok(self.read(property_id, period_id, |d| d.rent_roll.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn patterns(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    fn lines() -> Vec<StatementLine> {
        vec![
            StatementLine::detail(Some("0122-0000"), "Cash - Operating", dec!(100)),
            StatementLine::detail(Some("0125-0000"), "Cash - Tax Escrow", dec!(40)),
            StatementLine::detail(Some("2610-0000"), "Wells Fargo", dec!(500)),
            StatementLine::total(Some("1999-0000"), "TOTAL ASSETS", dec!(140)),
        ]
    }

    #[test]
    fn test_sum_matching_with_excludes() {
        let l = lines();
        assert_eq!(sum_matching(&l, &patterns(&["CASH"]), &[]), Some(dec!(140)));
        assert_eq!(sum_matching(&l, &patterns(&["CASH"]), &["ESCROW"]), Some(dec!(100)));
        assert_eq!(sum_matching(&l, &patterns(&["RECEIVABLE"]), &[]), None);
    }

    #[test]
    fn test_totals_are_not_summed() {
        let l = lines();
        assert_eq!(sum_matching(&l, &patterns(&["ASSETS"]), &[]), None);
        assert_eq!(total_named(&l, &["TOTAL ASSETS"], &[]).map(|t| t.amount), Some(dec!(140)));
    }

    #[test]
    fn test_code_range() {
        let l = lines();
        assert_eq!(sum_code_range(&l, 0, 1999), Some(dec!(140)));
        assert_eq!(sum_code_range(&l, 2000, 2999), Some(dec!(500)));
        assert_eq!(sum_code_range(&l, 3000, 3999), None);
    }

    #[test]
    fn test_in_memory_store_scopes_by_property_and_period() {
        let mut store = InMemoryStore::new();
        store
            .add_period(FinancialPeriod::new(1, "P1", 2024, 12))
            .add_period(FinancialPeriod::new(2, "P2", 2024, 12))
            .set_balance_sheet("P1", 1, lines());

        assert_eq!(store.periods("P1").unwrap().len(), 1);
        assert_eq!(store.balance_sheet("P1", 1).unwrap().len(), 4);
        assert!(store.balance_sheet("P2", 2).unwrap().is_empty());
        assert!(store.cash_flow_header("P1", 1).unwrap().is_none());
        assert_eq!(store.period("P1", 1).unwrap().map(|p| p.month), Some(12));
    }
}
