// 🧾 Statement Records - Shapes produced by extraction and read by the engines
//
// Extraction builds these once per pass and hands them to persistence.
// Line items are values: enrichment stages return a new item instead of
// mutating the old one, and record which stage touched it.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::classifier::Classification;

// ============================================================================
// STATEMENT TYPE
// ============================================================================

/// StatementType - closed set of documents this crate understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    RentRoll,
    MortgageStatement,
}

impl StatementType {
    pub const ALL: [StatementType; 5] = [
        StatementType::BalanceSheet,
        StatementType::IncomeStatement,
        StatementType::CashFlow,
        StatementType::RentRoll,
        StatementType::MortgageStatement,
    ];

    /// Stable key used in storage and rule catalogs
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::IncomeStatement => "income_statement",
            StatementType::CashFlow => "cash_flow",
            StatementType::RentRoll => "rent_roll",
            StatementType::MortgageStatement => "mortgage_statement",
        }
    }

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            StatementType::BalanceSheet => "Balance Sheet",
            StatementType::IncomeStatement => "Income Statement",
            StatementType::CashFlow => "Cash Flow Statement",
            StatementType::RentRoll => "Rent Roll",
            StatementType::MortgageStatement => "Mortgage Statement",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown statement type: {}", s))
    }
}

// ============================================================================
// DOCUMENT HEADER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountingBasis {
    Accrual,
    Cash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodType {
    Monthly,
    Annual,
}

/// Per-document metadata read from page 1. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub property_name: Option<String>,
    pub property_code: Option<String>,
    pub period_label: Option<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub accounting_basis: Option<AccountingBasis>,
    pub report_date: Option<NaiveDate>,
    pub period_type: Option<PeriodType>,
}

// ============================================================================
// LINE ITEMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub page: usize,
}

/// Which path produced a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Table,
    Text,
}

/// ExtractedLineItem - one recognized statement row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    pub account_code: Option<String>,
    pub account_name: String,
    pub period_amount: Decimal,
    pub ytd_amount: Option<Decimal>,
    pub period_percentage: Option<Decimal>,
    pub ytd_percentage: Option<Decimal>,
    pub is_subtotal: bool,
    pub is_total: bool,
    pub is_below_the_line: bool,
    pub line_category: Option<String>,
    pub line_subcategory: Option<String>,
    /// Cash-flow section the row was read under
    pub line_section: Option<String>,
    pub account_level: u8,
    pub page: usize,
    /// Stable 1-based position within the document, used by downstream dedup
    pub line_number: usize,
    /// 0-100
    pub confidence: f64,
    pub coordinates: Option<BoundingBox>,
    pub extraction_method: ExtractionMethod,

    // Enrichment (set by later stages)
    pub matched_account_id: Option<i64>,
    pub match_confidence: Option<f64>,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub enrichment_log: Vec<String>,
}

impl ExtractedLineItem {
    pub fn new(account_name: impl Into<String>, period_amount: Decimal, page: usize) -> Self {
        ExtractedLineItem {
            account_code: None,
            account_name: account_name.into(),
            period_amount,
            ytd_amount: None,
            period_percentage: None,
            ytd_percentage: None,
            is_subtotal: false,
            is_total: false,
            is_below_the_line: false,
            line_category: None,
            line_subcategory: None,
            line_section: None,
            account_level: 3,
            page,
            line_number: 0,
            confidence: 100.0,
            coordinates: None,
            extraction_method: ExtractionMethod::Table,
            matched_account_id: None,
            match_confidence: None,
            needs_review: false,
            review_reason: None,
            enrichment_log: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.account_code = code;
        self
    }

    pub fn with_ytd(mut self, ytd_amount: Option<Decimal>) -> Self {
        self.ytd_amount = ytd_amount;
        self
    }

    pub fn with_percentages(mut self, period: Option<Decimal>, ytd: Option<Decimal>) -> Self {
        self.period_percentage = period;
        self.ytd_percentage = ytd;
        self
    }

    pub fn with_section(mut self, section: Option<String>) -> Self {
        self.line_section = section;
        self
    }

    pub fn with_method(mut self, method: ExtractionMethod) -> Self {
        self.extraction_method = method;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 100.0);
        self
    }

    pub fn with_coordinates(mut self, coordinates: Option<BoundingBox>) -> Self {
        self.coordinates = coordinates;
        self
    }

    /// Apply a classifier verdict; level follows the hierarchy (total 1, subtotal 2, detail 3)
    pub fn with_classification(mut self, classification: &Classification) -> Self {
        self.line_category = Some(classification.category.clone());
        self.line_subcategory = Some(classification.subcategory.clone());
        self.is_total = classification.is_total;
        self.is_subtotal = classification.is_subtotal;
        self.is_below_the_line = classification.is_below_the_line;
        self.account_level = if classification.is_total {
            1
        } else if classification.is_subtotal {
            2
        } else {
            3
        };
        self
    }

    // ------------------------------------------------------------------------
    // Enrichment stages
    // ------------------------------------------------------------------------

    pub fn with_line_number(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self.enrichment_log.push(format!("numbering:{}", line_number));
        self
    }

    pub fn with_match(mut self, account_id: i64, confidence: f64) -> Self {
        self.matched_account_id = Some(account_id);
        self.match_confidence = Some(confidence);
        self.enrichment_log.push(format!("matching:{}", account_id));
        self
    }

    pub fn with_review_flag(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.needs_review = true;
        self.enrichment_log.push(format!("review:{}", reason));
        self.review_reason = Some(reason);
        self
    }

    /// Dedup key declared by the persistence layer
    pub fn natural_key(&self) -> (Option<&str>, &str, usize) {
        (self.account_code.as_deref(), &self.account_name, self.line_number)
    }
}

// ============================================================================
// CASH FLOW RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentCategory {
    ArChanges,
    PropertyEquipment,
    AccumulatedDepreciation,
    EscrowAccounts,
    LoanCosts,
    PrepaidAccrued,
    AccountsPayable,
    InterProperty,
    Loans,
    Distributions,
    Other,
}

impl AdjustmentCategory {
    pub const ALL: [AdjustmentCategory; 11] = [
        AdjustmentCategory::ArChanges,
        AdjustmentCategory::PropertyEquipment,
        AdjustmentCategory::AccumulatedDepreciation,
        AdjustmentCategory::EscrowAccounts,
        AdjustmentCategory::LoanCosts,
        AdjustmentCategory::PrepaidAccrued,
        AdjustmentCategory::AccountsPayable,
        AdjustmentCategory::InterProperty,
        AdjustmentCategory::Loans,
        AdjustmentCategory::Distributions,
        AdjustmentCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentCategory::ArChanges => "AR_CHANGES",
            AdjustmentCategory::PropertyEquipment => "PROPERTY_EQUIPMENT",
            AdjustmentCategory::AccumulatedDepreciation => "ACCUMULATED_DEPRECIATION",
            AdjustmentCategory::EscrowAccounts => "ESCROW_ACCOUNTS",
            AdjustmentCategory::LoanCosts => "LOAN_COSTS",
            AdjustmentCategory::PrepaidAccrued => "PREPAID_ACCRUED",
            AdjustmentCategory::AccountsPayable => "ACCOUNTS_PAYABLE",
            AdjustmentCategory::InterProperty => "INTER_PROPERTY",
            AdjustmentCategory::Loans => "LOANS",
            AdjustmentCategory::Distributions => "DISTRIBUTIONS",
            AdjustmentCategory::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> AdjustmentCategory {
        AdjustmentCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .unwrap_or(AdjustmentCategory::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub adjustment_name: String,
    pub adjustment_category: AdjustmentCategory,
    pub amount: Decimal,
    pub is_increase: bool,
    pub related_property: Option<String>,
    pub related_entity: Option<String>,
    pub line_number: usize,
    pub page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashAccountType {
    Escrow,
    Operating,
    Other,
}

impl CashAccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashAccountType::Escrow => "escrow",
            CashAccountType::Operating => "operating",
            CashAccountType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> CashAccountType {
        match s {
            "escrow" => CashAccountType::Escrow,
            "operating" => CashAccountType::Operating,
            _ => CashAccountType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashAccountReconciliationRow {
    pub account_name: String,
    pub account_type: CashAccountType,
    pub beginning_balance: Decimal,
    pub ending_balance: Decimal,
    pub difference: Decimal,
    pub is_escrow_account: bool,
    pub is_negative_balance: bool,
    pub is_total_row: bool,
}

/// Summary figures of a cash-flow statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlowHeader {
    pub beginning_cash_balance: Option<Decimal>,
    pub ending_cash_balance: Option<Decimal>,
    pub total_income: Option<Decimal>,
    pub total_expenses: Option<Decimal>,
    pub net_operating_income: Option<Decimal>,
    pub net_income: Option<Decimal>,
    pub net_change_in_cash: Option<Decimal>,
}

// ============================================================================
// RENT ROLL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyStatus {
    Occupied,
    Vacant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentRollEntry {
    /// Identity of this row within one extraction (1-based)
    pub row_id: usize,
    pub unit_number: String,
    pub tenant_name: Option<String>,
    pub lease_type: Option<String>,
    pub unit_area_sqft: Option<Decimal>,
    pub lease_from: Option<NaiveDate>,
    pub lease_to: Option<NaiveDate>,
    pub term_months: Option<i32>,
    pub tenancy_years: Option<Decimal>,
    pub monthly_rent: Option<Decimal>,
    pub monthly_rent_per_sqft: Option<Decimal>,
    pub annual_rent: Option<Decimal>,
    pub annual_rent_per_sqft: Option<Decimal>,
    pub annual_recoveries_per_sf: Option<Decimal>,
    pub annual_misc_per_sf: Option<Decimal>,
    pub security_deposit: Option<Decimal>,
    pub loc_amount: Option<Decimal>,
    pub occupancy_status: OccupancyStatus,
    pub is_gross_rent_row: bool,
    /// For "Gross Rent" rows: the unit row they aggregate
    pub parent_row_id: Option<usize>,
    pub page: usize,
    pub line_number: usize,
    pub confidence: f64,
}

impl RentRollEntry {
    pub fn new(row_id: usize, unit_number: impl Into<String>, page: usize) -> Self {
        RentRollEntry {
            row_id,
            unit_number: unit_number.into(),
            tenant_name: None,
            lease_type: None,
            unit_area_sqft: None,
            lease_from: None,
            lease_to: None,
            term_months: None,
            tenancy_years: None,
            monthly_rent: None,
            monthly_rent_per_sqft: None,
            annual_rent: None,
            annual_rent_per_sqft: None,
            annual_recoveries_per_sf: None,
            annual_misc_per_sf: None,
            security_deposit: None,
            loc_amount: None,
            occupancy_status: OccupancyStatus::Occupied,
            is_gross_rent_row: false,
            parent_row_id: None,
            page,
            line_number: row_id,
            confidence: 100.0,
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.occupancy_status == OccupancyStatus::Vacant
    }
}

// ============================================================================
// MORTGAGE STATEMENT
// ============================================================================

/// Lender statement figures. Dues are per-payment (monthly); YTD fields
/// accumulate from January.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MortgageStatement {
    pub lender: Option<String>,
    pub loan_number: Option<String>,
    pub statement_date: Option<NaiveDate>,
    pub principal_balance: Decimal,
    pub principal_due: Decimal,
    pub interest_due: Decimal,
    pub tax_escrow_due: Decimal,
    pub insurance_escrow_due: Decimal,
    pub reserve_due: Decimal,
    pub other_due: Decimal,
    pub total_payment_due: Decimal,
    pub tax_escrow_balance: Decimal,
    pub insurance_escrow_balance: Decimal,
    pub reserve_balance: Decimal,
    pub ytd_principal_paid: Decimal,
    pub ytd_interest_paid: Decimal,
    pub ytd_tax_disbursement: Decimal,
    pub ytd_insurance_disbursement: Decimal,
    pub ytd_reserve_disbursement: Decimal,
}

impl MortgageStatement {
    /// Sum of every component the lender bills
    pub fn component_sum(&self) -> Decimal {
        self.principal_due
            + self.interest_due
            + self.tax_escrow_due
            + self.insurance_escrow_due
            + self.reserve_due
            + self.other_due
    }

    pub fn debt_service(&self) -> Decimal {
        self.principal_due + self.interest_due
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_statement_type_round_trip() {
        for t in StatementType::ALL {
            assert_eq!(t.as_str().parse::<StatementType>().unwrap(), t);
        }
        assert!("ledger".parse::<StatementType>().is_err());
    }

    #[test]
    fn test_enrichment_returns_new_values() {
        let item = ExtractedLineItem::new("Cash - Operating", dec!(150000.00), 1)
            .with_code(Some("0122-0000".to_string()))
            .with_line_number(1);

        let matched = item.clone().with_match(42, 0.97);
        let flagged = matched.clone().with_review_flag("low confidence");

        assert_eq!(item.matched_account_id, None);
        assert_eq!(matched.matched_account_id, Some(42));
        assert!(!matched.needs_review);
        assert!(flagged.needs_review);
        assert_eq!(
            flagged.enrichment_log,
            vec!["numbering:1", "matching:42", "review:low confidence"]
        );
        assert_eq!(flagged.natural_key(), (Some("0122-0000"), "Cash - Operating", 1));
    }

    #[test]
    fn test_adjustment_category_keys() {
        for c in AdjustmentCategory::ALL {
            assert_eq!(AdjustmentCategory::parse(c.as_str()), c);
        }
        assert_eq!(AdjustmentCategory::parse("???"), AdjustmentCategory::Other);
    }

    #[test]
    fn test_mortgage_component_sum() {
        let ms = MortgageStatement {
            principal_due: dec!(10000),
            interest_due: dec!(2500),
            tax_escrow_due: dec!(1200),
            insurance_escrow_due: dec!(300),
            reserve_due: dec!(250),
            total_payment_due: dec!(14250),
            ..Default::default()
        };
        assert_eq!(ms.component_sum(), dec!(14250));
        assert_eq!(ms.debt_service(), dec!(12500));
    }
}
