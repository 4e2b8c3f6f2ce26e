// 📚 Validation Rule Catalog - Definitions held as data, get-or-create by name

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::ValidationSeverity;
use crate::statements::StatementType;

use StatementType::*;
use ValidationSeverity::*;

// ============================================================================
// DEFINITIONS
// ============================================================================

/// Static description of a check. `rule_name` is the stable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleDefinition {
    pub rule_name: &'static str,
    pub document_type: StatementType,
    pub rule_type: &'static str,
    pub description: &'static str,
    pub formula: &'static str,
    pub severity: ValidationSeverity,
}

const fn def(
    rule_name: &'static str,
    document_type: StatementType,
    rule_type: &'static str,
    severity: ValidationSeverity,
    description: &'static str,
    formula: &'static str,
) -> RuleDefinition {
    RuleDefinition {
        rule_name,
        document_type,
        rule_type,
        description,
        formula,
        severity,
    }
}

pub static RULE_DEFINITIONS: &[RuleDefinition] = &[
    // Balance sheet
    def("bs_account_code_format", BalanceSheet, "format", Error,
        "Account codes are well formed", "code matches ####-#### or a plausible 3-5 digit code"),
    def("bs_balance_equation", BalanceSheet, "balance_check", Error,
        "Assets equal liabilities plus capital", "Total Assets = Total Liabilities + Total Capital"),
    def("bs_major_sections_non_zero", BalanceSheet, "completeness", Error,
        "Assets, liabilities and capital are all present", "Assets != 0 AND Liabilities != 0 AND Capital != 0"),
    def("bs_negative_cash", BalanceSheet, "range_check", Warning,
        "No cash account is overdrawn", "Cash >= 0"),
    def("bs_debt_to_equity", BalanceSheet, "covenant", Warning,
        "Leverage within covenant", "Total Liabilities / Total Capital <= ceiling"),
    def("bs_escrow_presence", BalanceSheet, "completeness", Warning,
        "Mortgaged properties carry escrow accounts", "Mortgage present => escrow accounts present"),
    def("bs_round_numbers", BalanceSheet, "monitoring", Info,
        "Round amounts that may be estimates", "amount mod unit = 0"),
    def("bs_deprecated_codes", BalanceSheet, "monitoring", Info,
        "Deprecated account codes in use", "code in deprecated list"),
    // Income statement
    def("is_total_income_sum", IncomeStatement, "balance_check", Error,
        "Total income equals its detail", "Total Income = SUM(income accounts)"),
    def("is_total_expense_sum", IncomeStatement, "balance_check", Error,
        "Total expenses equal their detail", "Total Expenses = SUM(operating + additional expense accounts)"),
    def("is_noi_calculation", IncomeStatement, "calculation", Error,
        "NOI is income less expenses", "NOI = Total Income - Total Expenses"),
    def("is_net_income_calculation", IncomeStatement, "calculation", Error,
        "Net income is NOI less below-the-line items", "Net Income = NOI - below-the-line"),
    def("is_income_percentage_sum", IncomeStatement, "percentage_sum", Warning,
        "Income percentages add to 100", "SUM(income %) = 100"),
    def("is_ytd_not_below_period", IncomeStatement, "range_check", Warning,
        "Year-to-date never smaller than the period", "|YTD| >= |Period|"),
    def("is_negative_income", IncomeStatement, "range_check", Warning,
        "Income accounts are not negative (contra accounts excepted)", "Income >= 0"),
    def("is_round_numbers", IncomeStatement, "monitoring", Info,
        "Round amounts that may be estimates", "amount mod unit = 0"),
    // Cash flow
    def("cf_cash_roll_forward", CashFlow, "balance_check", Error,
        "Beginning cash plus net change equals ending cash", "Beginning Cash + Net Change = Ending Cash"),
    def("cf_cash_account_differences", CashFlow, "calculation", Error,
        "Each cash account's difference is ending less beginning", "Ending - Beginning = Difference"),
    def("cf_ending_cash_accounts_total", CashFlow, "balance_check", Error,
        "Cash accounts add up to ending cash", "SUM(account ending balances) = Ending Cash"),
    def("cf_negative_cash_accounts", CashFlow, "range_check", Warning,
        "No cash account ends overdrawn", "Ending Balance >= 0"),
    def("cf_adjustments_present", CashFlow, "completeness", Warning,
        "Adjustments section present", "COUNT(adjustments) > 0"),
    def("cf_round_numbers", CashFlow, "monitoring", Info,
        "Round amounts that may be estimates", "amount mod unit = 0"),
    // Rent roll
    def("rr_unit_number_present", RentRoll, "completeness", Error,
        "Every row has a unit number", "unit_number != ''"),
    def("rr_rent_per_sf_range", RentRoll, "range_check", Warning,
        "Monthly rent per square foot is plausible", "0 <= rent/sf/month <= ceiling"),
    def("rr_lease_dates_ordered", RentRoll, "range_check", Warning,
        "Lease starts before it ends", "lease_from <= lease_to"),
    def("rr_vacant_without_rent", RentRoll, "consistency", Warning,
        "Vacant units carry no rent", "vacant => monthly_rent = 0"),
    def("rr_duplicate_units", RentRoll, "consistency", Warning,
        "Unit numbers are unique", "COUNT(DISTINCT unit) = COUNT(unit)"),
    def("rr_occupancy_rate", RentRoll, "monitoring", Info,
        "Physical occupancy", "occupied units / units x 100"),
    // Mortgage statement
    def("ms_payment_composition", MortgageStatement, "balance_check", Error,
        "Payment equals its components", "Total Payment = Principal + Interest + Escrows + Reserve + Other"),
    def("ms_principal_balance_positive", MortgageStatement, "range_check", Error,
        "Outstanding principal is positive", "Principal Balance > 0"),
    def("ms_escrow_balances_non_negative", MortgageStatement, "range_check", Warning,
        "Escrow and reserve balances are not negative", "Escrow Balances >= 0"),
    def("ms_implied_rate_range", MortgageStatement, "range_check", Warning,
        "Implied annual interest rate is plausible", "min <= Interest x 12 / Principal x 100 <= max"),
    def("ms_ytd_disbursements", MortgageStatement, "monitoring", Info,
        "Year-to-date escrow disbursements", "tax + insurance + reserve YTD"),
];

pub fn definition(rule_name: &str) -> Option<&'static RuleDefinition> {
    RULE_DEFINITIONS.iter().find(|d| d.rule_name == rule_name)
}

pub fn definitions_for(document_type: StatementType) -> impl Iterator<Item = &'static RuleDefinition> {
    RULE_DEFINITIONS.iter().filter(move |d| d.document_type == document_type)
}

// ============================================================================
// PERSISTED RULE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: i64,
    pub rule_name: String,
    pub description: String,
    pub document_type: StatementType,
    pub rule_type: String,
    pub formula_text: String,
    pub severity: ValidationSeverity,
}

impl ValidationRule {
    pub fn from_definition(id: i64, d: &RuleDefinition) -> Self {
        ValidationRule {
            id,
            rule_name: d.rule_name.to_string(),
            description: d.description.to_string(),
            document_type: d.document_type,
            rule_type: d.rule_type.to_string(),
            formula_text: d.formula.to_string(),
            severity: d.severity,
        }
    }
}

/// Rule definitions keyed by name. The same name always resolves to the same rule.
pub trait RuleCatalog {
    fn get_or_create(&self, definition: &RuleDefinition) -> Result<ValidationRule>;
    fn rules(&self) -> Result<Vec<ValidationRule>>;
}

/// In-process catalog, shared across services
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleCatalog {
    rules: Arc<RwLock<HashMap<String, ValidationRule>>>,
}

impl InMemoryRuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleCatalog for InMemoryRuleCatalog {
    fn get_or_create(&self, definition: &RuleDefinition) -> Result<ValidationRule> {
        if let Some(rule) = self
            .rules
            .read()
            .map_err(|_| anyhow!("rule catalog lock poisoned"))?
            .get(definition.rule_name)
        {
            return Ok(rule.clone());
        }

        let mut rules = self.rules.write().map_err(|_| anyhow!("rule catalog lock poisoned"))?;
        let next_id = rules.len() as i64 + 1;
        let rule = rules
            .entry(definition.rule_name.to_string())
            .or_insert_with(|| ValidationRule::from_definition(next_id, definition));
        Ok(rule.clone())
    }

    fn rules(&self) -> Result<Vec<ValidationRule>> {
        let rules = self.rules.read().map_err(|_| anyhow!("rule catalog lock poisoned"))?;
        let mut all: Vec<ValidationRule> = rules.values().cloned().collect();
        all.sort_by_key(|r| r.id);
        Ok(all)
    }
}
