// ⚙️ Engine Configuration - Tolerances, covenant thresholds, account patterns
//
// Every threshold the audit and validation engines compare against lives
// here. A partial JSON file overrides only the fields it names.

use anyhow::{Context as AnyhowContext, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// TOP LEVEL
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub context: ContextConfig,
    pub audit: AuditConfig,
    pub validation: ValidationConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: EngineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Which period the delta rules compare against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeginPolicy {
    /// Sequential prior period
    #[default]
    PriorPeriod,
    /// First period on record
    Earliest,
    /// Latest period at least `n` months before the current one
    LookbackMonths(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub begin_policy: BeginPolicy,
}

// ============================================================================
// AUDIT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Identities expected to tie exactly (balance sheet equation, compositions)
    pub identity_tolerance: Decimal,
    /// Delta ties between two statements
    pub delta_tolerance: Decimal,
    /// Estimated flows: max(floor, pct% of scale)
    pub flow_tolerance_floor: Decimal,
    pub flow_tolerance_pct: Decimal,
    /// Escrow balance ties against the lender statement
    pub escrow_tolerance: Decimal,
    /// Both sides below this are "no activity"
    pub activity_floor: Decimal,

    pub dscr_pass: Decimal,
    pub dscr_warn: Decimal,
    /// Percent
    pub ltv_pass: Decimal,
    pub ltv_warn: Decimal,
    /// Cap rate (percent) used to value the property when no appraisal is configured
    pub cap_rate_pct: Decimal,
    /// Appraised values by property id
    pub property_values: BTreeMap<String, Decimal>,
    /// Months of debt service held in cash
    pub liquidity_pass_months: Decimal,
    pub liquidity_warn_months: Decimal,
    /// Percent
    pub debt_yield_pass: Decimal,
    pub debt_yield_warn: Decimal,
    pub expense_ratio_ceiling: Decimal,

    pub variance_trigger_pct: Decimal,
    pub variance_trigger_amount: Decimal,
    pub magnitude_multiple: Decimal,
    pub rent_roll_tolerance_pct: Decimal,
    /// Percentage points between rent-roll and reported occupancy
    pub occupancy_tolerance_pct: Decimal,

    pub patterns: AccountPatterns,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            identity_tolerance: dec!(1.00),
            delta_tolerance: dec!(1.00),
            flow_tolerance_floor: dec!(1000),
            flow_tolerance_pct: dec!(10),
            escrow_tolerance: dec!(100),
            activity_floor: dec!(0.01),
            dscr_pass: dec!(1.20),
            dscr_warn: dec!(1.00),
            ltv_pass: dec!(75),
            ltv_warn: dec!(80),
            cap_rate_pct: dec!(7.5),
            property_values: BTreeMap::new(),
            liquidity_pass_months: dec!(3),
            liquidity_warn_months: dec!(1),
            debt_yield_pass: dec!(8),
            debt_yield_warn: dec!(7),
            expense_ratio_ceiling: dec!(60),
            variance_trigger_pct: dec!(25),
            variance_trigger_amount: dec!(5000),
            magnitude_multiple: dec!(10),
            rent_roll_tolerance_pct: dec!(5),
            occupancy_tolerance_pct: dec!(5),
            patterns: AccountPatterns::default(),
        }
    }
}

impl AuditConfig {
    /// max(floor, pct% of |scale|)
    pub fn flow_tolerance(&self, scale: Decimal) -> Decimal {
        let by_pct = (scale.abs() * self.flow_tolerance_pct / dec!(100)).round_dp(2);
        by_pct.max(self.flow_tolerance_floor)
    }
}

/// Uppercase substrings that locate accounts by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountPatterns {
    pub mortgage: Vec<String>,
    pub cash: Vec<String>,
    pub tax_escrow: Vec<String>,
    pub insurance_escrow: Vec<String>,
    pub reserve_escrow: Vec<String>,
    pub accrued_tax: Vec<String>,
    pub prepaid_insurance: Vec<String>,
    pub accounts_receivable: Vec<String>,
    pub accounts_payable: Vec<String>,
    pub prepaid_accrued: Vec<String>,
    pub accumulated_depreciation: Vec<String>,
    pub accumulated_amortization: Vec<String>,
    pub loan_costs: Vec<String>,
    pub distributions: Vec<String>,
    pub inter_property: Vec<String>,
    pub fixed_assets: Vec<String>,
    pub security_deposits: Vec<String>,
    pub current_year_earnings: Vec<String>,
    pub constant_accounts: Vec<String>,
    pub property_tax_expense: Vec<String>,
    pub insurance_expense: Vec<String>,
    pub interest_expense: Vec<String>,
    pub depreciation_expense: Vec<String>,
    pub amortization_expense: Vec<String>,
    pub base_rent: Vec<String>,
    pub vacancy: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for AccountPatterns {
    fn default() -> Self {
        AccountPatterns {
            mortgage: strings(&["MORTGAGE", "WELLS FARGO", "LOAN PAYABLE", "NOTE PAYABLE"]),
            cash: strings(&["CASH", "CHECKING", "PETTY"]),
            tax_escrow: strings(&["TAX ESCROW", "ESCROW - TAX", "ESCROW-TAX", "ESCROW TAX", "RE TAX ESCROW"]),
            insurance_escrow: strings(&["INSURANCE ESCROW", "ESCROW - INS", "ESCROW-INS", "ESCROW INS"]),
            reserve_escrow: strings(&["REPLACEMENT RESERVE", "RESERVE ESCROW", "ESCROW - RESERVE", "CAPITAL RESERVE", "TI/LC RESERVE"]),
            accrued_tax: strings(&["ACCRUED REAL ESTATE TAX", "ACCRUED PROPERTY TAX", "ACCRUED TAX", "ACCRUED RE TAX"]),
            prepaid_insurance: strings(&["PREPAID INSURANCE"]),
            accounts_receivable: strings(&["RECEIVABLE", "A/R"]),
            accounts_payable: strings(&["ACCOUNTS PAYABLE", "A/P"]),
            prepaid_accrued: strings(&["PREPAID", "ACCRUED"]),
            accumulated_depreciation: strings(&["ACCUMULATED DEPRECIATION", "ACCUM DEPR", "ACCUM. DEPR", "A/D"]),
            accumulated_amortization: strings(&["ACCUMULATED AMORTIZATION", "ACCUM AMORT", "ACCUM. AMORT"]),
            loan_costs: strings(&["LOAN COST", "FINANCING COST", "DEFERRED FINANCING"]),
            distributions: strings(&["DISTRIBUTION"]),
            inter_property: strings(&["DUE TO", "DUE FROM", "INTERCOMPANY", "INTER-COMPANY"]),
            fixed_assets: strings(&["LAND", "BUILDING", "IMPROVEMENT", "EQUIPMENT", "FURNITURE", "CONSTRUCTION IN PROGRESS"]),
            security_deposits: strings(&["SECURITY DEPOSIT", "TENANT DEPOSIT"]),
            current_year_earnings: strings(&["CURRENT YEAR EARNINGS", "CURRENT PERIOD EARNINGS", "CURRENT YEAR NET INCOME"]),
            constant_accounts: strings(&["LAND", "CONTRIBUTION"]),
            property_tax_expense: strings(&["REAL ESTATE TAX", "PROPERTY TAX", "RE TAX"]),
            insurance_expense: strings(&["INSURANCE"]),
            interest_expense: strings(&["INTEREST"]),
            depreciation_expense: strings(&["DEPRECIATION"]),
            amortization_expense: strings(&["AMORTIZATION"]),
            base_rent: strings(&["BASE RENT", "RENTAL INCOME", "MINIMUM RENT", "BASE RENTAL"]),
            vacancy: strings(&["VACANCY"]),
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Relative tolerance (percent of expected magnitude)
    pub tolerance_pct: Decimal,
    pub debt_to_equity_max: Decimal,
    /// $/sf/month
    pub rent_per_sf_max: Decimal,
    /// Annual implied interest rate band (percent)
    pub implied_rate_min: Decimal,
    pub implied_rate_max: Decimal,
    /// Amounts at or above this that are exact multiples of it are "round"
    pub round_number_unit: Decimal,
    pub deprecated_codes: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            tolerance_pct: dec!(1),
            debt_to_equity_max: dec!(3),
            rent_per_sf_max: dec!(50),
            implied_rate_min: dec!(1),
            implied_rate_max: dec!(15),
            round_number_unit: dec!(1000),
            deprecated_codes: strings(&["9999-0000", "0000-0000"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.context.begin_policy, BeginPolicy::PriorPeriod);
        assert_eq!(config.audit.identity_tolerance, dec!(1.00));
        assert_eq!(config.validation.tolerance_pct, dec!(1));
        assert!(config.audit.patterns.mortgage.contains(&"WELLS FARGO".to_string()));
    }

    #[test]
    fn test_flow_tolerance() {
        let audit = AuditConfig::default();
        assert_eq!(audit.flow_tolerance(dec!(5000)), dec!(1000));
        assert_eq!(audit.flow_tolerance(dec!(-50000)), dec!(5000));
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"audit": {{"dscr_pass": "1.35"}}, "context": {{"begin_policy": {{"lookback_months": 12}}}}}}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.audit.dscr_pass, dec!(1.35));
        assert_eq!(config.audit.dscr_warn, dec!(1.00));
        assert_eq!(config.context.begin_policy, BeginPolicy::LookbackMonths(12));
        assert_eq!(config.validation, ValidationConfig::default());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(EngineConfig::from_file("/nonexistent/engine.json").is_err());
    }
}
