// 🏷️ Line-Item Classifier - Keyword rules as data
//
// Statement rows are classified by an ordered table of keyword rules.
// First match wins and the order is load-bearing: new rules are appended
// inside their group, never reordered ahead of existing ones.
//
// Pure functions only. The same (name, section, code) always yields the
// same Classification.

use serde::{Deserialize, Serialize};

use crate::patterns::code_prefix;
use crate::statements::{AdjustmentCategory, CashAccountType};

/// Bump whenever a keyword list or rule order changes
pub const TAXONOMY_VERSION: &str = "2024.3";

// ============================================================================
// SECTIONS
// ============================================================================

/// Logical section of an income or cash-flow statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Section {
    Income,
    OperatingExpense,
    AdditionalExpense,
    PerformanceMetrics,
    Adjustments,
    CashReconciliation,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Income => "INCOME",
            Section::OperatingExpense => "OPERATING_EXPENSE",
            Section::AdditionalExpense => "ADDITIONAL_EXPENSE",
            Section::PerformanceMetrics => "PERFORMANCE_METRICS",
            Section::Adjustments => "ADJUSTMENTS",
            Section::CashReconciliation => "CASH_RECONCILIATION",
        }
    }

    pub fn parse(s: &str) -> Option<Section> {
        [
            Section::Income,
            Section::OperatingExpense,
            Section::AdditionalExpense,
            Section::PerformanceMetrics,
            Section::Adjustments,
            Section::CashReconciliation,
        ]
        .into_iter()
        .find(|sec| sec.as_str() == s)
    }

    /// Income-statement section implied by a chart-of-accounts code
    pub fn from_income_code(code: &str) -> Option<Section> {
        match code_prefix(code)? {
            4000..=4999 => Some(Section::Income),
            5000..=5999 => Some(Section::OperatingExpense),
            6000..=6999 => Some(Section::AdditionalExpense),
            7000..=9999 => Some(Section::PerformanceMetrics),
            _ => None,
        }
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub subcategory: String,
    pub is_subtotal: bool,
    pub is_total: bool,
    pub is_below_the_line: bool,
}

impl Classification {
    fn detail(category: &str, subcategory: &str, below_the_line: bool) -> Self {
        Classification {
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            is_subtotal: false,
            is_total: false,
            is_below_the_line: below_the_line,
        }
    }

    fn total(category: &str, subcategory: &str) -> Self {
        Classification {
            is_total: true,
            ..Classification::detail(category, subcategory, false)
        }
    }

    fn subtotal(category: &str, subcategory: &str) -> Self {
        Classification {
            is_subtotal: true,
            ..Classification::detail(category, subcategory, false)
        }
    }

    pub fn is_unclassified(&self) -> bool {
        self.subcategory == UNCLASSIFIED
    }
}

pub const UNCLASSIFIED: &str = "Unclassified";

// ============================================================================
// RULE TABLES
// ============================================================================

/// One keyword rule. `section: None` applies in every section.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub section: Option<Section>,
    pub keywords: &'static [&'static str],
    pub excludes: &'static [&'static str],
    pub category: Section,
    pub subcategory: &'static str,
    pub below_the_line: bool,
}

impl KeywordRule {
    fn applies(&self, upper_name: &str, section: Section) -> bool {
        if let Some(s) = self.section {
            if s != section {
                return false;
            }
        }
        self.keywords.iter().any(|k| upper_name.contains(k))
            && !self.excludes.iter().any(|x| upper_name.contains(x))
    }
}

const fn rule(
    section: Option<Section>,
    keywords: &'static [&'static str],
    excludes: &'static [&'static str],
    category: Section,
    subcategory: &'static str,
    below_the_line: bool,
) -> KeywordRule {
    KeywordRule {
        section,
        keywords,
        excludes,
        category,
        subcategory,
        below_the_line,
    }
}

use Section::*;

/// "TOTAL ..." rows: (keywords, category, subcategory, is_total)
const TOTAL_RULES: &[(&[&str], Section, &str, bool)] = &[
    (&["TOTAL INCOME", "TOTAL REVENUE", "TOTAL RENTAL REVENUE", "TOTAL OPERATING INCOME"], Income, "Total Income", true),
    (&["TOTAL OPERATING EXPENSE"], OperatingExpense, "Total Operating Expenses", true),
    (&["TOTAL ADDITIONAL", "TOTAL NON-OPERATING", "TOTAL NON OPERATING", "TOTAL OTHER EXPENSE"], AdditionalExpense, "Total Additional Expenses", true),
    (&["TOTAL EXPENSE"], OperatingExpense, "Total Expenses", true),
    (&["TOTAL ADJUSTMENT"], Adjustments, "Total Adjustments", true),
    (&["TOTAL CASH"], CashReconciliation, "Total Cash", true),
    (&["TOTAL UTILIT"], OperatingExpense, "Utility Subtotal", false),
    (&["TOTAL CONTRACT"], OperatingExpense, "Contracted Subtotal", false),
    (&["TOTAL R&M", "TOTAL REPAIR"], OperatingExpense, "R&M Subtotal", false),
    (&["TOTAL ADMIN", "TOTAL G&A", "TOTAL GENERAL"], OperatingExpense, "Admin Subtotal", false),
    (&["TOTAL LL", "TOTAL LANDLORD"], AdditionalExpense, "LL Subtotal", false),
];

/// Ordered keyword rules. Group order: adjustments, cash reconciliation,
/// below-the-line, income, operating expense, additional expense.
pub const KEYWORD_RULES: &[KeywordRule] = &[
    // --- Adjustments --------------------------------------------------------
    rule(Some(Adjustments), &["RECEIVABLE", "A/R"], &[], Adjustments, "AR Changes", false),
    rule(Some(Adjustments), &["ACCUM"], &[], Adjustments, "Accumulated Depreciation", false),
    rule(Some(Adjustments), &["LOAN COST", "FINANCING COST", "DEFERRED FINANCING"], &[], Adjustments, "Loan Costs", false),
    rule(Some(Adjustments), &["ESCROW", "RESERVE", "IMPOUND"], &[], Adjustments, "Escrow Accounts", false),
    rule(Some(Adjustments), &["DUE TO", "DUE FROM", "INTERCOMPANY", "INTER-COMPANY", "INTER PROPERTY", "INTER-PROPERTY", "AFFILIATE"], &[], Adjustments, "Inter-Property", false),
    rule(Some(Adjustments), &["LOAN", "MORTGAGE", "NOTE PAYABLE", "PRINCIPAL"], &[], Adjustments, "Loans", false),
    rule(Some(Adjustments), &["PREPAID", "ACCRUED", "DEFERRED"], &[], Adjustments, "Prepaid & Accrued", false),
    rule(Some(Adjustments), &["PAYABLE", "A/P"], &[], Adjustments, "Accounts Payable", false),
    rule(Some(Adjustments), &["DISTRIBUTION", "CONTRIBUTION", "DRAW"], &[], Adjustments, "Distributions", false),
    rule(Some(Adjustments), &["BUILDING", "EQUIPMENT", "FURNITURE", "IMPROVEMENT", "LAND", "CONSTRUCTION"], &[], Adjustments, "Property & Equipment", false),
    // --- Cash reconciliation ------------------------------------------------
    rule(Some(CashReconciliation), &["BEGINNING", "BEGIN "], &[], CashReconciliation, "Beginning Cash", false),
    rule(Some(CashReconciliation), &["ENDING", "END OF PERIOD"], &[], CashReconciliation, "Ending Cash", false),
    rule(Some(CashReconciliation), &["ESCROW", "RESERVE", "IMPOUND"], &[], CashReconciliation, "Escrow Cash Account", false),
    rule(Some(CashReconciliation), &["OPERATING", "CHECKING", "CASH", "BANK", "DEPOSITORY", "MONEY MARKET"], &[], CashReconciliation, "Operating Cash Account", false),
    // --- Below the line (any section) ---------------------------------------
    rule(None, &["MORTGAGE INTEREST", "LOAN INTEREST"], &[], PerformanceMetrics, "Mortgage Interest", true),
    rule(None, &["INTEREST"], &["INCOME", "EARNED"], PerformanceMetrics, "Interest Expense", true),
    rule(None, &["DEPRECIATION"], &[], PerformanceMetrics, "Depreciation", true),
    rule(None, &["AMORTIZATION"], &[], PerformanceMetrics, "Amortization", true),
    rule(None, &["DEBT SERVICE", "PRINCIPAL PAYMENT"], &[], PerformanceMetrics, "Debt Service", true),
    // --- Income -------------------------------------------------------------
    rule(Some(Income), &["PERCENTAGE RENT", "% RENT", "OVERAGE"], &[], Income, "Percentage Rent", false),
    rule(Some(Income), &["VACANCY", "CONCESSION", "FREE RENT", "BAD DEBT"], &[], Income, "Vacancy & Concessions", false),
    rule(Some(Income), &["RECOVER", "CAM", "REIMBURS", "ESCALATION"], &[], Income, "Recovery Income", false),
    rule(Some(Income), &["PARKING"], &[], Income, "Parking Income", false),
    rule(Some(Income), &["INTEREST"], &[], Income, "Interest Income", false),
    rule(Some(Income), &["LATE FEE", "LATE CHARGE", "NSF"], &[], Income, "Late Fees", false),
    rule(Some(Income), &["BASE RENT", "RENTAL INCOME", "MINIMUM RENT", "OFFICE RENT", "RETAIL RENT", "RENT INCOME", "RENT"], &[], Income, "Base Rental Income", false),
    rule(Some(Income), &["OTHER INCOME", "MISC", "TERMINATION", "SIGNAGE", "STORAGE", "ANTENNA", "FEE"], &[], Income, "Other Income", false),
    // --- Operating expenses -------------------------------------------------
    rule(Some(OperatingExpense), &["REAL ESTATE TAX", "PROPERTY TAX", "RE TAX", "TAXES"], &[], OperatingExpense, "Property Tax", false),
    rule(Some(OperatingExpense), &["INSURANCE"], &[], OperatingExpense, "Insurance", false),
    rule(Some(OperatingExpense), &["MANAGEMENT FEE", "MGMT FEE", "ASSET MANAGEMENT"], &[], OperatingExpense, "Management Fees", false),
    rule(Some(OperatingExpense), &["PAYROLL", "SALARIES", "WAGES", "BENEFITS"], &[], OperatingExpense, "Payroll & Benefits", false),
    rule(Some(OperatingExpense), &["CONTRACT", "JANITORIAL", "LANDSCAP", "SECURITY", "ELEVATOR", "PEST", "SNOW", "WINDOW CLEAN", "PORTER"], &[], OperatingExpense, "Contracted Services", false),
    rule(Some(OperatingExpense), &["REPAIR", "MAINT", "R&M", "PLUMBING", "PAINT", "ROOF", "HVAC", "SUPPLIES"], &[], OperatingExpense, "Repair & Maintenance", false),
    rule(Some(OperatingExpense), &["ELECTRIC", "GAS", "WATER", "SEWER", "UTILIT", "TRASH", "REFUSE", "TELEPHONE", "INTERNET"], &[], OperatingExpense, "Utility Expenses", false),
    rule(Some(OperatingExpense), &["MARKETING", "ADVERTIS", "PROMOTION", "LEASING EXPENSE"], &[], OperatingExpense, "Marketing & Leasing", false),
    rule(Some(OperatingExpense), &["LEGAL", "ACCOUNTING", "AUDIT", "CONSULT", "PROFESSIONAL"], &[], OperatingExpense, "Professional Fees", false),
    rule(Some(OperatingExpense), &["ADMIN", "OFFICE", "POSTAGE", "BANK FEE", "BANK CHARGE", "DUES", "SUBSCRIPTION", "LICENSE", "PERMIT", "TRAVEL", "COMPUTER", "G&A"], &[], OperatingExpense, "Administrative Expenses", false),
    // --- Additional expenses ------------------------------------------------
    rule(Some(AdditionalExpense), &["COMMISSION"], &[], AdditionalExpense, "Leasing Commissions", false),
    rule(Some(AdditionalExpense), &["TENANT IMPROVEMENT", "TENANT ALLOWANCE"], &[], AdditionalExpense, "Tenant Improvements", false),
    rule(Some(AdditionalExpense), &["GROUND RENT", "GROUND LEASE"], &[], AdditionalExpense, "Ground Rent", false),
    rule(Some(AdditionalExpense), &["CAPITAL", "CAPEX", "IMPROVEMENT"], &[], AdditionalExpense, "Capital Expenditures", false),
    rule(Some(AdditionalExpense), &["LANDLORD", "NON-RECOVERABLE", "NON RECOVERABLE", "LL EXP"], &[], AdditionalExpense, "Landlord Expenses", false),
    rule(Some(AdditionalExpense), &["OWNER", "PARTNERSHIP", "ENTITY"], &[], AdditionalExpense, "Owner Expenses", false),
];

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Classify an income-statement or cash-flow row.
///
/// Order: TOTAL detection, NOI / net income, section keyword rules,
/// then `(section, "Unclassified")`.
pub fn classify(account_name: &str, section: Section, account_code: Option<&str>) -> Classification {
    let upper = account_name.to_uppercase();

    // Code ranges refine the section for income-statement rows
    let section = match (section, account_code.and_then(Section::from_income_code)) {
        (Income | OperatingExpense | AdditionalExpense | PerformanceMetrics, Some(by_code)) => by_code,
        (s, _) => s,
    };

    if let Some(c) = classify_total(&upper, section) {
        return c;
    }

    if let Some(c) = classify_performance(&upper) {
        return c;
    }

    for r in KEYWORD_RULES {
        if r.applies(&upper, section) {
            return Classification::detail(r.category.as_str(), r.subcategory, r.below_the_line);
        }
    }

    Classification::detail(section.as_str(), UNCLASSIFIED, false)
}

fn classify_total(upper: &str, section: Section) -> Option<Classification> {
    if !upper.contains("TOTAL") {
        return None;
    }

    for (keywords, category, subcategory, is_total) in TOTAL_RULES {
        if keywords.iter().any(|k| upper.contains(k)) {
            return Some(if *is_total {
                Classification::total(category.as_str(), subcategory)
            } else {
                Classification::subtotal(category.as_str(), subcategory)
            });
        }
    }

    // Any other "Total ..." is a subtotal of the section it appears in
    Some(Classification::subtotal(section.as_str(), "Section Subtotal"))
}

fn classify_performance(upper: &str) -> Option<Classification> {
    if upper.contains("NET OPERATING INCOME") || upper.split_whitespace().any(|w| w == "NOI") {
        return Some(Classification::total(PerformanceMetrics.as_str(), "Net Operating Income"));
    }
    if upper.contains("NET INCOME") || upper.contains("NET LOSS") {
        return Some(Classification::total(PerformanceMetrics.as_str(), "Net Income"));
    }
    if upper.contains("NET CHANGE IN CASH") || upper.contains("NET CASH FLOW") {
        return Some(Classification::total(CashReconciliation.as_str(), "Net Change in Cash"));
    }
    None
}

/// First-match classification plus every other subcategory whose keywords
/// also matched. Conflicts are reported, never resolved.
pub fn classify_with_conflicts(
    account_name: &str,
    section: Section,
    account_code: Option<&str>,
) -> (Classification, Vec<String>) {
    let chosen = classify(account_name, section, account_code);
    let upper = account_name.to_uppercase();

    let mut conflicts: Vec<String> = Vec::new();
    for r in KEYWORD_RULES {
        if r.applies(&upper, section)
            && r.subcategory != chosen.subcategory
            && !conflicts.iter().any(|c| c == r.subcategory)
        {
            conflicts.push(r.subcategory.to_string());
        }
    }

    (chosen, conflicts)
}

/// Adjustment category for a cash-flow adjustment row
pub fn adjustment_category(account_name: &str) -> AdjustmentCategory {
    let c = classify(account_name, Adjustments, None);
    match c.subcategory.as_str() {
        "AR Changes" => AdjustmentCategory::ArChanges,
        "Property & Equipment" => AdjustmentCategory::PropertyEquipment,
        "Accumulated Depreciation" | "Depreciation" | "Amortization" => {
            AdjustmentCategory::AccumulatedDepreciation
        }
        "Escrow Accounts" => AdjustmentCategory::EscrowAccounts,
        "Loan Costs" => AdjustmentCategory::LoanCosts,
        "Prepaid & Accrued" => AdjustmentCategory::PrepaidAccrued,
        "Accounts Payable" => AdjustmentCategory::AccountsPayable,
        "Inter-Property" => AdjustmentCategory::InterProperty,
        "Loans" => AdjustmentCategory::Loans,
        "Distributions" => AdjustmentCategory::Distributions,
        _ => AdjustmentCategory::Other,
    }
}

/// Cash account typing for cash-reconciliation rows
pub fn cash_account_type(account_name: &str) -> CashAccountType {
    let upper = account_name.to_uppercase();
    if ["ESCROW", "RESERVE", "IMPOUND"].iter().any(|k| upper.contains(k)) {
        CashAccountType::Escrow
    } else if ["OPERATING", "CHECKING", "DEPOSITORY", "CASH"].iter().any(|k| upper.contains(k)) {
        CashAccountType::Operating
    } else {
        CashAccountType::Other
    }
}

// ============================================================================
// BALANCE SHEET
// ============================================================================

pub const ASSETS: &str = "ASSETS";
pub const LIABILITIES: &str = "LIABILITIES";
pub const CAPITAL: &str = "CAPITAL";

/// Balance-sheet subcategory rules: (category or "" for any, keywords, subcategory)
const BALANCE_SHEET_RULES: &[(&str, &[&str], &str)] = &[
    (ASSETS, &["ACCUM"], "Accumulated Depreciation"),
    (ASSETS, &["ESCROW", "RESERVE", "IMPOUND"], "Escrow & Reserves"),
    (ASSETS, &["CASH", "CHECKING", "PETTY", "MONEY MARKET"], "Cash"),
    (ASSETS, &["RECEIVABLE", "A/R"], "Receivables"),
    (ASSETS, &["DUE FROM", "INTERCOMPANY"], "Due From Affiliates"),
    (ASSETS, &["LOAN COST", "FINANCING COST"], "Loan Costs"),
    (ASSETS, &["PREPAID", "DEPOSIT"], "Prepaid Expenses"),
    (ASSETS, &["LAND", "BUILDING", "IMPROVEMENT", "EQUIPMENT", "FURNITURE", "CONSTRUCTION"], "Property & Equipment"),
    (LIABILITIES, &["SECURITY DEPOSIT", "TENANT DEPOSIT"], "Security Deposits"),
    (LIABILITIES, &["PREPAID RENT"], "Prepaid Rent"),
    (LIABILITIES, &["DUE TO", "INTERCOMPANY"], "Due To Affiliates"),
    (LIABILITIES, &["ACCRUED"], "Accrued Liabilities"),
    (LIABILITIES, &["MORTGAGE", "LOAN", "NOTE PAYABLE"], "Mortgage Debt"),
    (LIABILITIES, &["PAYABLE", "A/P"], "Accounts Payable"),
    (CAPITAL, &["CURRENT YEAR EARNINGS", "CURRENT PERIOD EARNINGS", "NET INCOME"], "Current Year Earnings"),
    (CAPITAL, &["RETAINED EARNINGS"], "Retained Earnings"),
    (CAPITAL, &["DISTRIBUTION"], "Distributions"),
    (CAPITAL, &["CONTRIBUTION"], "Contributions"),
];

/// Category of a balance-sheet code by chart-of-accounts range
pub fn balance_sheet_category_for_code(code: &str) -> Option<&'static str> {
    match code_prefix(code)? {
        0..=1999 => Some(ASSETS),
        2000..=2999 => Some(LIABILITIES),
        3000..=3999 => Some(CAPITAL),
        _ => None,
    }
}

/// Balance-sheet header lines that switch the current category
pub fn balance_sheet_section_header(line: &str) -> Option<&'static str> {
    let upper = line.trim().to_uppercase();
    if upper.starts_with("TOTAL") {
        return None;
    }
    if upper == "ASSETS" || upper.starts_with("ASSETS") || upper == "CURRENT ASSETS" {
        Some(ASSETS)
    } else if upper.starts_with("LIABILITIES") || upper == "CURRENT LIABILITIES" {
        Some(LIABILITIES)
    } else if upper.starts_with("CAPITAL") || upper.starts_with("EQUITY") || upper.starts_with("PARTNERS") || upper.starts_with("OWNERS") {
        Some(CAPITAL)
    } else {
        None
    }
}

/// Classify a balance-sheet row. Code range decides the category when present,
/// otherwise the caller's section cursor.
pub fn classify_balance_sheet(
    account_name: &str,
    account_code: Option<&str>,
    section: Option<&str>,
) -> Classification {
    let upper = account_name.to_uppercase();
    let category = account_code
        .and_then(balance_sheet_category_for_code)
        .or(section)
        .unwrap_or(ASSETS);

    if upper.contains("TOTAL") {
        let grand = [
            "TOTAL ASSETS",
            "TOTAL LIABILITIES",
            "TOTAL CAPITAL",
            "TOTAL EQUITY",
            "TOTAL PARTNERS",
            "TOTAL OWNERS",
        ];
        let is_grand = grand.iter().any(|g| upper.starts_with(g))
            && !upper.contains("CURRENT")
            && !upper.contains("LONG");
        // Grand totals pick their own category regardless of cursor
        let total_category = if upper.contains("LIABILITIES") && (upper.contains("CAPITAL") || upper.contains("EQUITY")) {
            LIABILITIES
        } else if upper.contains("ASSETS") {
            ASSETS
        } else if upper.contains("LIABILITIES") {
            LIABILITIES
        } else if upper.contains("CAPITAL") || upper.contains("EQUITY") || upper.contains("PARTNERS") || upper.contains("OWNERS") {
            CAPITAL
        } else {
            category
        };
        return if is_grand {
            Classification::total(total_category, "Total")
        } else {
            Classification::subtotal(total_category, "Subtotal")
        };
    }

    for (cat, keywords, subcategory) in BALANCE_SHEET_RULES {
        if *cat == category && keywords.iter().any(|k| upper.contains(k)) {
            return Classification::detail(category, subcategory, false);
        }
    }

    // Lender-named rows ("Wells Fargo", "KeyBank Loan") on the liability side
    if category == LIABILITIES && !upper.contains("PAYABLE") {
        return Classification::detail(category, "Long-Term Debt", false);
    }

    Classification::detail(category, UNCLASSIFIED, false)
}

// ============================================================================
// SECTION DETECTOR
// ============================================================================

/// Header keywords in match order (most specific first)
const SECTION_HEADERS: &[(&[&str], Section)] = &[
    (&["CASH ACCOUNT", "CASH RECONCILIATION", "CASH BALANCES", "BANK ACCOUNTS"], CashReconciliation),
    (&["ADJUSTMENTS", "BALANCE SHEET CHANGES", "CASH FLOW ADJUSTMENTS"], Adjustments),
    (&["ADDITIONAL OPERATING EXPENSE", "ADDITIONAL EXPENSE", "NON-OPERATING EXPENSE", "NON OPERATING EXPENSE", "OTHER EXPENSES"], AdditionalExpense),
    (&["NET OPERATING INCOME", "PERFORMANCE METRICS", "DEBT SERVICE", "BELOW THE LINE"], PerformanceMetrics),
    (&["OPERATING EXPENSE", "EXPENSES"], OperatingExpense),
    (&["INCOME", "REVENUE"], Income),
];

/// Tracks the current section across rows and pages.
///
/// The cursor only moves when a header keyword is seen; otherwise the
/// previous section stays in force.
#[derive(Debug, Clone, Default)]
pub struct SectionDetector {
    current: Option<Section>,
}

impl SectionDetector {
    pub fn new() -> Self {
        SectionDetector { current: None }
    }

    pub fn starting_at(section: Section) -> Self {
        SectionDetector {
            current: Some(section),
        }
    }

    pub fn current(&self) -> Option<Section> {
        self.current
    }

    /// Feed one row's text. `has_amount` rows are data rows; only the NOI
    /// row among them moves the cursor.
    pub fn observe(&mut self, line: &str, has_amount: bool) -> Option<Section> {
        let upper = line.trim().to_uppercase();
        if upper.is_empty() || upper.starts_with("TOTAL") {
            return self.current;
        }

        if has_amount {
            if upper.contains("NET OPERATING INCOME") {
                self.current = Some(PerformanceMetrics);
            }
            return self.current;
        }

        if let Some(section) = section_header(&upper) {
            self.current = Some(section);
        }
        self.current
    }
}

/// Section a header line names, if any. Header lines are short labels and
/// never totals.
pub fn section_header(line: &str) -> Option<Section> {
    let upper = line.trim().to_uppercase();
    if upper.is_empty() || upper.starts_with("TOTAL") || upper.split_whitespace().count() > 6 {
        return None;
    }
    SECTION_HEADERS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| upper.contains(k)))
        .map(|(_, section)| *section)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_detection() {
        let c = classify("Total Income", Income, None);
        assert!(c.is_total);
        assert_eq!(c.subcategory, "Total Income");

        let c = classify("TOTAL OPERATING EXPENSES", OperatingExpense, None);
        assert!(c.is_total);
        assert_eq!(c.category, "OPERATING_EXPENSE");

        let c = classify("Total Utilities", OperatingExpense, None);
        assert!(c.is_subtotal);
        assert!(!c.is_total);
        assert_eq!(c.subcategory, "Utility Subtotal");

        let c = classify("Total LL Expenses", AdditionalExpense, None);
        assert_eq!(c.subcategory, "LL Subtotal");
    }

    #[test]
    fn test_noi_and_net_income() {
        let c = classify("NET OPERATING INCOME", OperatingExpense, None);
        assert_eq!(c.subcategory, "Net Operating Income");
        assert!(c.is_total);
        let c = classify("Net Income", PerformanceMetrics, None);
        assert_eq!(c.subcategory, "Net Income");
    }

    #[test]
    fn test_keyword_classification() {
        assert_eq!(classify("Base Rentals", Income, None).subcategory, "Base Rental Income");
        assert_eq!(classify("Tax Recovery", Income, None).subcategory, "Recovery Income");
        assert_eq!(classify("Interest Income", Income, None).subcategory, "Interest Income");
        assert_eq!(classify("Electricity", OperatingExpense, None).subcategory, "Utility Expenses");
        assert_eq!(classify("Plumbing Repairs", OperatingExpense, None).subcategory, "Repair & Maintenance");
        assert_eq!(classify("Management Fees", OperatingExpense, None).subcategory, "Management Fees");
        assert_eq!(classify("Landlord Expense - Vacant", AdditionalExpense, None).subcategory, "Landlord Expenses");
    }

    #[test]
    fn test_below_the_line() {
        let c = classify("Mortgage Interest", AdditionalExpense, None);
        assert_eq!(c.subcategory, "Mortgage Interest");
        assert!(c.is_below_the_line);
        let c = classify("Depreciation Expense", PerformanceMetrics, None);
        assert!(c.is_below_the_line);
    }

    #[test]
    fn test_code_refines_section() {
        let c = classify("Misc", OperatingExpense, Some("4900-0000"));
        assert_eq!(c.category, "INCOME");
        assert_eq!(c.subcategory, "Other Income");
    }

    #[test]
    fn test_unclassified_fallback() {
        let c = classify("Zzyzx", OperatingExpense, None);
        assert_eq!(c.category, "OPERATING_EXPENSE");
        assert_eq!(c.subcategory, UNCLASSIFIED);
        assert!(c.is_unclassified());
    }

    #[test]
    fn test_classifier_is_deterministic() {
        let inputs = [
            ("Base Rent", Income, Some("4010-0000")),
            ("Electric", OperatingExpense, None),
            ("Total Income", Income, None),
            ("A/R Tenants", Adjustments, None),
        ];
        for (name, section, code) in inputs {
            assert_eq!(classify(name, section, code), classify(name, section, code));
        }
    }

    #[test]
    fn test_conflicts_are_reported() {
        let (c, conflicts) = classify_with_conflicts("HVAC Contract Repairs", OperatingExpense, None);
        assert_eq!(c.subcategory, "Contracted Services");
        assert!(conflicts.contains(&"Repair & Maintenance".to_string()));
    }

    #[test]
    fn test_adjustment_categories() {
        assert_eq!(adjustment_category("A/R Tenants"), AdjustmentCategory::ArChanges);
        assert_eq!(adjustment_category("Accum. Depreciation - Building"), AdjustmentCategory::AccumulatedDepreciation);
        assert_eq!(adjustment_category("Escrow - Taxes"), AdjustmentCategory::EscrowAccounts);
        assert_eq!(adjustment_category("Due to Sunset Plaza"), AdjustmentCategory::InterProperty);
        assert_eq!(adjustment_category("Mortgage Payable"), AdjustmentCategory::Loans);
        assert_eq!(adjustment_category("Accounts Payable"), AdjustmentCategory::AccountsPayable);
        assert_eq!(adjustment_category("Partner Distributions"), AdjustmentCategory::Distributions);
        assert_eq!(adjustment_category("Building Improvements"), AdjustmentCategory::PropertyEquipment);
        assert_eq!(adjustment_category("Something"), AdjustmentCategory::Other);
    }

    #[test]
    fn test_cash_account_type() {
        assert_eq!(cash_account_type("Tax Escrow"), CashAccountType::Escrow);
        assert_eq!(cash_account_type("Cash - Operating"), CashAccountType::Operating);
        assert_eq!(cash_account_type("Petty"), CashAccountType::Other);
    }

    #[test]
    fn test_balance_sheet_classification() {
        let c = classify_balance_sheet("Cash - Operating", Some("0122-0000"), None);
        assert_eq!(c.category, ASSETS);
        assert_eq!(c.subcategory, "Cash");

        let c = classify_balance_sheet("TOTAL ASSETS", Some("1999-0000"), None);
        assert!(c.is_total);

        let c = classify_balance_sheet("Total Current Assets", None, Some(ASSETS));
        assert!(c.is_subtotal);
        assert!(!c.is_total);

        let c = classify_balance_sheet("Wells Fargo", Some("2610-0000"), None);
        assert_eq!(c.category, LIABILITIES);
        assert_eq!(c.subcategory, "Long-Term Debt");

        let c = classify_balance_sheet("Accum Depr - Building", Some("0610-0000"), None);
        assert_eq!(c.subcategory, "Accumulated Depreciation");
    }

    #[test]
    fn test_section_detector_persists() {
        let mut d = SectionDetector::new();
        assert_eq!(d.observe("INCOME", false), Some(Income));
        assert_eq!(d.observe("Base Rent 10,000.00", true), Some(Income));
        assert_eq!(d.observe("OPERATING EXPENSES", false), Some(OperatingExpense));
        // New page with no header: section stays
        assert_eq!(d.observe("Electric 500.00", true), Some(OperatingExpense));
        assert_eq!(d.observe("ADDITIONAL OPERATING EXPENSES", false), Some(AdditionalExpense));
        assert_eq!(d.observe("NET OPERATING INCOME 9,000.00", true), Some(PerformanceMetrics));
        assert_eq!(d.observe("ADJUSTMENTS", false), Some(Adjustments));
        assert_eq!(d.observe("Cash Account Reconciliation", false), Some(CashReconciliation));
        assert_eq!(d.observe("Total Income", false), Some(CashReconciliation));
    }
}
