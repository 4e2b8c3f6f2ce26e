// ✅ Validation Engine - Single-document checks against a rule catalog
//
// Each document type has a fixed set of named checks. A check's definition
// (description, formula, severity) lives in the rule catalog and is fetched
// or created once by `rule_name`; a run only produces fresh
// `ValidationResult`s that point at those definitions.
//
// Severity tiers:
//   error   - failure means the document needs review
//   warning - flagged, does not block
//   info    - always passes, surfaces a monitoring signal

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::config::ValidationConfig;
use crate::statements::StatementType;
use crate::store::StatementStore;

mod balance_sheet;
pub mod catalog;
mod cash_flow;
mod income_statement;
mod mortgage;
mod rent_roll;

pub use catalog::{definition, definitions_for, InMemoryRuleCatalog, RuleCatalog, RuleDefinition, ValidationRule};

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationSeverity::Error => "error",
            ValidationSeverity::Warning => "warning",
            ValidationSeverity::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<ValidationSeverity> {
        match s {
            "error" => Some(ValidationSeverity::Error),
            "warning" => Some(ValidationSeverity::Warning),
            "info" => Some(ValidationSeverity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CHECK OUTCOME
// ============================================================================

/// Outcome of one check before it is bound to its catalog rule
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Check {
    pub passed: bool,
    pub expected_value: Option<Decimal>,
    pub actual_value: Option<Decimal>,
    pub difference: Option<Decimal>,
    pub difference_percentage: Option<Decimal>,
    pub message: Option<String>,
}

impl Check {
    pub fn pass() -> Self {
        Check {
            passed: true,
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Check {
            passed: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Passed, with a message worth surfacing
    pub fn note(message: impl Into<String>) -> Self {
        Check {
            passed: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Pass when `failures` is empty, otherwise fail listing them
    pub fn from_failures(label: &str, failures: &[String]) -> Self {
        let check = if failures.is_empty() {
            Check::pass()
        } else {
            Check::fail(format!("{}: {}", label, failures.join("; ")))
        };
        check.values(Decimal::ZERO, Decimal::from(failures.len()))
    }

    /// Relative comparison. 0 expected vs 0 actual passes at 0%.
    pub fn compare(expected: Decimal, actual: Decimal, tolerance_pct: Decimal) -> Self {
        let difference = actual - expected;
        let (passed, pct) = if expected.is_zero() {
            let pct = difference.is_zero().then_some(Decimal::ZERO);
            (difference.is_zero(), pct)
        } else {
            let pct = (difference.abs() / expected.abs() * Decimal::ONE_HUNDRED).round_dp(2);
            (pct <= tolerance_pct, Some(pct))
        };
        Check {
            passed,
            expected_value: Some(expected),
            actual_value: Some(actual),
            difference: Some(difference),
            difference_percentage: pct,
            message: (!passed).then(|| format!("Expected {}, found {} (difference {})", expected, actual, difference)),
        }
    }

    pub fn values(mut self, expected: Decimal, actual: Decimal) -> Self {
        self.expected_value = Some(expected);
        self.actual_value = Some(actual);
        self.difference = Some(actual - expected);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Informational count of round amounts (possible estimates or plugs)
pub(crate) fn round_numbers(amounts: impl Iterator<Item = Decimal>, config: &ValidationConfig) -> Check {
    let unit = config.round_number_unit;
    if unit <= Decimal::ZERO {
        return Check::pass();
    }
    let (mut total, mut round) = (0usize, 0usize);
    for amount in amounts.filter(|a| !a.is_zero()) {
        total += 1;
        if amount.abs() >= unit && (amount % unit).is_zero() {
            round += 1;
        }
    }
    Check::note(format!("{} of {} amounts are multiples of {}", round, total, unit))
        .values(Decimal::ZERO, Decimal::from(round))
}

// ============================================================================
// RESULT AND REPORT
// ============================================================================

/// One check's outcome for one upload. Created fresh per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub upload_id: String,
    pub rule_id: i64,
    pub rule_name: String,
    pub passed: bool,
    pub expected_value: Option<Decimal>,
    pub actual_value: Option<Decimal>,
    pub difference: Option<Decimal>,
    pub difference_percentage: Option<Decimal>,
    pub error_message: Option<String>,
    pub severity: ValidationSeverity,
}

impl ValidationResult {
    pub fn from_check(upload_id: &str, rule: &ValidationRule, check: Check) -> Self {
        // Informational rules never fail
        let passed = check.passed || rule.severity == ValidationSeverity::Info;
        ValidationResult {
            upload_id: upload_id.to_string(),
            rule_id: rule.id,
            rule_name: rule.rule_name.clone(),
            passed,
            expected_value: check.expected_value,
            actual_value: check.actual_value,
            difference: check.difference,
            difference_percentage: check.difference_percentage,
            error_message: check.message,
            severity: rule.severity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: String,
    pub upload_id: String,
    pub document_type: StatementType,
    pub validated_at: DateTime<Utc>,
    pub results: Vec<ValidationResult>,
    pub passed_count: usize,
    pub failed_count: usize,
    /// Any failed error-severity check
    pub needs_review: bool,
}

impl ValidationReport {
    fn new(upload_id: String, document_type: StatementType, results: Vec<ValidationResult>) -> Self {
        let passed_count = results.iter().filter(|r| r.passed).count();
        let needs_review = results
            .iter()
            .any(|r| !r.passed && r.severity == ValidationSeverity::Error);
        ValidationReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            upload_id,
            document_type,
            validated_at: Utc::now(),
            failed_count: results.len() - passed_count,
            passed_count,
            needs_review,
            results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn result(&self, rule_name: &str) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.rule_name == rule_name)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} passed, {} failed{}",
            self.document_type,
            self.passed_count,
            self.failed_count,
            if self.needs_review { " - needs review" } else { "" }
        )
    }
}

/// Identity of one uploaded document
pub fn upload_id(property_id: &str, period_id: i64, document_type: StatementType) -> String {
    format!("{}:{}:{}", property_id, period_id, document_type.as_str())
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct ValidationService<'a> {
    store: &'a dyn StatementStore,
    catalog: &'a dyn RuleCatalog,
    config: &'a ValidationConfig,
}

impl<'a> ValidationService<'a> {
    pub fn new(store: &'a dyn StatementStore, catalog: &'a dyn RuleCatalog, config: &'a ValidationConfig) -> Self {
        ValidationService { store, catalog, config }
    }

    /// Run every check for one document type against one (property, period)
    pub fn validate(&self, property_id: &str, period_id: i64, document_type: StatementType) -> Result<ValidationReport> {
        let checks = match document_type {
            StatementType::BalanceSheet => {
                balance_sheet::checks(&self.store.balance_sheet(property_id, period_id)?, self.config)
            }
            StatementType::IncomeStatement => {
                income_statement::checks(&self.store.income_statement(property_id, period_id)?, self.config)
            }
            StatementType::CashFlow => cash_flow::checks(
                &cash_flow::CashFlowDocument {
                    header: self.store.cash_flow_header(property_id, period_id)?,
                    adjustments: self.store.adjustments(property_id, period_id)?,
                    cash_accounts: self.store.cash_accounts(property_id, period_id)?,
                },
                self.config,
            ),
            StatementType::RentRoll => rent_roll::checks(&self.store.rent_roll(property_id, period_id)?, self.config),
            StatementType::MortgageStatement => {
                mortgage::checks(&self.store.mortgage_statements(property_id, period_id)?, self.config)
            }
        };

        let upload = upload_id(property_id, period_id, document_type);
        let mut results = Vec::with_capacity(checks.len());
        for (rule_name, check) in checks {
            let definition =
                definition(rule_name).ok_or_else(|| anyhow!("No catalog definition for rule {}", rule_name))?;
            let rule = self.catalog.get_or_create(definition)?;
            debug!(rule = rule_name, passed = check.passed, "validation check");
            results.push(ValidationResult::from_check(&upload, &rule, check));
        }

        let report = ValidationReport::new(upload, document_type, results);
        info!(upload = %report.upload_id, "validation complete: {}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::FinancialPeriod;
    use crate::store::{InMemoryStore, StatementLine};
    use rust_decimal_macros::dec;

    #[test]
    fn test_compare_zero_over_zero_passes() {
        let c = Check::compare(Decimal::ZERO, Decimal::ZERO, dec!(1));
        assert!(c.passed);
        assert_eq!(c.difference_percentage, Some(Decimal::ZERO));

        let c = Check::compare(Decimal::ZERO, dec!(5), dec!(1));
        assert!(!c.passed);
        assert_eq!(c.difference_percentage, None);
    }

    #[test]
    fn test_compare_relative_tolerance() {
        assert!(Check::compare(dec!(100000), dec!(100900), dec!(1)).passed);
        let c = Check::compare(dec!(100000), dec!(102000), dec!(1));
        assert!(!c.passed);
        assert_eq!(c.difference_percentage, Some(dec!(2.00)));
    }

    #[test]
    fn test_round_numbers_is_a_note() {
        let config = ValidationConfig::default();
        let c = round_numbers([dec!(5000), dec!(1234.56), dec!(0)].into_iter(), &config);
        assert!(c.passed);
        assert_eq!(c.actual_value, Some(dec!(1)));
    }

    #[test]
    fn test_service_reuses_catalog_rules() {
        let mut store = InMemoryStore::new();
        store.add_period(FinancialPeriod::new(1, "P1", 2025, 1)).set_balance_sheet(
            "P1",
            1,
            vec![
                StatementLine::detail(Some("0122-0000"), "Cash - Operating", dec!(100)),
                StatementLine::total(None, "TOTAL ASSETS", dec!(100)),
                StatementLine::detail(Some("2010-0000"), "Accounts Payable", dec!(40)),
                StatementLine::total(None, "TOTAL LIABILITIES", dec!(40)),
                StatementLine::detail(Some("3010-0000"), "Partners Capital", dec!(60)),
                StatementLine::total(None, "TOTAL CAPITAL", dec!(60)),
            ],
        );
        let catalog = InMemoryRuleCatalog::new();
        let config = ValidationConfig::default();
        let service = ValidationService::new(&store, &catalog, &config);

        let first = service.validate("P1", 1, StatementType::BalanceSheet).unwrap();
        let second = service.validate("P1", 1, StatementType::BalanceSheet).unwrap();
        assert_eq!(first.results.len(), 8);
        assert_eq!(catalog.rules().unwrap().len(), 8);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.results, second.results);
        assert!(!first.needs_review, "{:?}", first.failures().collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_document_needs_review() {
        let mut store = InMemoryStore::new();
        store.add_period(FinancialPeriod::new(1, "P1", 2025, 1));
        let catalog = InMemoryRuleCatalog::new();
        let config = ValidationConfig::default();
        let report = ValidationService::new(&store, &catalog, &config)
            .validate("P1", 1, StatementType::BalanceSheet)
            .unwrap();
        assert!(report.needs_review);
    }
}
