// Statement figures shared by the rule families: stated totals, detail
// sums, window flows and small arithmetic helpers.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::classifier::{ASSETS, CAPITAL, LIABILITIES};
use crate::context::AlignmentContext;
use crate::statements::{Adjustment, AdjustmentCategory, MortgageStatement};
use crate::store::{
    line_in_subcategory, sum_category, sum_code_range, sum_matching, total_named, StatementLine,
};

// ============================================================================
// BALANCE SHEET
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BalanceSheetFigures {
    pub total_assets: Option<Decimal>,
    pub total_liabilities: Option<Decimal>,
    pub total_capital: Option<Decimal>,
    /// "Total Liabilities & Capital" when stated
    pub liabilities_and_capital: Option<Decimal>,
    pub asset_detail: Option<Decimal>,
    pub liability_detail: Option<Decimal>,
    pub capital_detail: Option<Decimal>,
}

impl BalanceSheetFigures {
    pub fn from_lines(lines: &[StatementLine]) -> Self {
        let liabilities_and_capital = lines
            .iter()
            .filter(|l| l.is_total || l.is_subtotal)
            .find(|l| {
                let upper = l.account_name.to_uppercase();
                upper.contains("LIABILITIES") && (upper.contains("CAPITAL") || upper.contains("EQUITY"))
            })
            .map(|l| l.amount);

        BalanceSheetFigures {
            total_assets: total_named(lines, &["TOTAL ASSETS"], &[]).map(|l| l.amount),
            total_liabilities: total_named(lines, &["TOTAL LIABILITIES"], &["CAPITAL", "EQUITY"]).map(|l| l.amount),
            total_capital: total_named(
                lines,
                &["TOTAL CAPITAL", "TOTAL EQUITY", "TOTAL PARTNERS", "TOTAL OWNERS", "TOTAL MEMBERS"],
                &["LIABILITIES"],
            )
            .map(|l| l.amount),
            liabilities_and_capital,
            asset_detail: detail_sum(lines, ASSETS, 0, 1999),
            liability_detail: detail_sum(lines, LIABILITIES, 2000, 2999),
            capital_detail: detail_sum(lines, CAPITAL, 3000, 3999),
        }
    }

    /// Right-hand side of A = L + C, preferring the stated components
    pub fn claims(&self) -> Option<Decimal> {
        match (self.total_liabilities, self.total_capital) {
            (Some(l), Some(c)) => Some(l + c),
            _ => self.liabilities_and_capital.or_else(|| {
                match (self.total_liabilities.or(self.liability_detail), self.total_capital.or(self.capital_detail)) {
                    (None, None) => None,
                    (l, c) => Some(l.unwrap_or_default() + c.unwrap_or_default()),
                }
            }),
        }
    }
}

/// Detail rows by classifier category, falling back to chart-of-accounts range
pub fn detail_sum(lines: &[StatementLine], category: &str, lo: u32, hi: u32) -> Option<Decimal> {
    sum_category(lines, category).or_else(|| sum_code_range(lines, lo, hi))
}

// ============================================================================
// INCOME STATEMENT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncomeFigures {
    pub total_income: Option<Decimal>,
    pub total_operating_expenses: Option<Decimal>,
    pub total_additional_expenses: Option<Decimal>,
    pub total_expenses: Option<Decimal>,
    pub net_operating_income: Option<Decimal>,
    pub net_income: Option<Decimal>,
    pub income_detail: Option<Decimal>,
    pub operating_expense_detail: Option<Decimal>,
    pub additional_expense_detail: Option<Decimal>,
    pub below_the_line: Option<Decimal>,
}

impl IncomeFigures {
    pub fn from_lines(lines: &[StatementLine]) -> Self {
        let below: Vec<StatementLine> = lines
            .iter()
            .filter(|l| l.is_detail() && l.is_below_the_line)
            .cloned()
            .collect();
        let below_the_line = if below.is_empty() {
            sum_code_range(lines, 7000, 9999)
        } else {
            Some(below.iter().map(|l| l.amount).sum())
        };

        IncomeFigures {
            total_income: total_income_line(lines).map(|l| l.amount),
            total_operating_expenses: total_opex_line(lines).map(|l| l.amount),
            total_additional_expenses: line_in_subcategory(lines, "Total Additional Expenses")
                .or_else(|| total_named(lines, &["TOTAL ADDITIONAL", "TOTAL NON-OPERATING"], &[]))
                .map(|l| l.amount),
            total_expenses: line_in_subcategory(lines, "Total Expenses")
                .or_else(|| total_named(lines, &["TOTAL EXPENSES"], &["OPERATING", "ADDITIONAL"]))
                .map(|l| l.amount),
            net_operating_income: noi_line(lines).map(|l| l.amount),
            net_income: net_income_line(lines).map(|l| l.amount),
            income_detail: detail_sum(lines, "INCOME", 4000, 4999),
            operating_expense_detail: detail_sum(lines, "OPERATING_EXPENSE", 5000, 5999),
            additional_expense_detail: detail_sum(lines, "ADDITIONAL_EXPENSE", 6000, 6999),
            below_the_line,
        }
    }

    /// Everything deducted between total income and NOI
    pub fn expenses_above_noi(&self) -> Option<Decimal> {
        self.total_expenses.or(match (self.total_operating_expenses, self.total_additional_expenses) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or_default() + b.unwrap_or_default()),
        })
    }
}

pub fn total_income_line(lines: &[StatementLine]) -> Option<&StatementLine> {
    line_in_subcategory(lines, "Total Income")
        .or_else(|| total_named(lines, &["TOTAL INCOME", "TOTAL REVENUE"], &[]))
}

pub fn total_opex_line(lines: &[StatementLine]) -> Option<&StatementLine> {
    line_in_subcategory(lines, "Total Operating Expenses")
        .or_else(|| total_named(lines, &["TOTAL OPERATING EXPENSE"], &[]))
}

pub fn noi_line(lines: &[StatementLine]) -> Option<&StatementLine> {
    line_in_subcategory(lines, "Net Operating Income")
        .or_else(|| total_named(lines, &["NET OPERATING INCOME"], &[]))
}

pub fn net_income_line(lines: &[StatementLine]) -> Option<&StatementLine> {
    line_in_subcategory(lines, "Net Income")
        .or_else(|| total_named(lines, &["NET INCOME", "NET LOSS"], &["OPERATING"]))
}

/// Annual figure from a period line: YTD scaled to twelve months when
/// present, otherwise the period amount times twelve.
pub fn annualized(line: &StatementLine, month: u32) -> Decimal {
    match line.ytd_amount {
        Some(ytd) if month > 0 => (ytd * Decimal::from(12) / Decimal::from(month)).round_dp(2),
        _ => line.amount * Decimal::from(12),
    }
}

// ============================================================================
// FLOWS AND DELTAS
// ============================================================================

/// end - begin, treating a missing side as zero; None when both are missing
pub fn delta(end: Option<Decimal>, begin: Option<Decimal>) -> Option<Decimal> {
    match (end, begin) {
        (None, None) => None,
        (e, b) => Some(e.unwrap_or_default() - b.unwrap_or_default()),
    }
}

/// Expense incurred over the context window.
///
/// Same-year YTD difference when both statements carry YTD, otherwise the
/// current period amount times the window length.
pub fn window_expense(
    ctx: &AlignmentContext,
    current: &[StatementLine],
    begin: Option<&[StatementLine]>,
    include: &[String],
    exclude: &[&str],
) -> Option<Decimal> {
    let matched = |lines: &[StatementLine]| -> Vec<StatementLine> {
        let upper_excl = |l: &StatementLine| {
            let upper = l.account_name.to_uppercase();
            exclude.iter().any(|e| upper.contains(e))
        };
        lines
            .iter()
            .filter(|l| l.is_detail() && l.name_matches(include) && !upper_excl(l))
            .cloned()
            .collect()
    };

    let now = matched(current);
    if now.is_empty() {
        return None;
    }

    if let (Some(begin), true) = (begin, ctx.begin_in_same_year()) {
        let before = matched(begin);
        let ytd_now: Option<Decimal> = now.iter().map(|l| l.ytd_amount).sum();
        let ytd_before: Option<Decimal> = before.iter().map(|l| l.ytd_amount).sum();
        if let (Some(a), Some(b)) = (ytd_now, ytd_before) {
            if !before.is_empty() {
                return Some(a - b);
            }
        }
    }

    let period: Decimal = now.iter().map(|l| l.amount).sum();
    Some(period * ctx.window())
}

/// Lender YTD field change over the window (resets each January)
pub fn ytd_change(
    ctx: &AlignmentContext,
    current: &[MortgageStatement],
    begin: &[MortgageStatement],
    field: fn(&MortgageStatement) -> Decimal,
) -> Decimal {
    let now: Decimal = current.iter().map(field).sum();
    if ctx.begin_in_same_year() {
        now - begin.iter().map(field).sum::<Decimal>()
    } else {
        now
    }
}

pub fn adjustments_total(adjustments: &[Adjustment], category: AdjustmentCategory) -> Option<Decimal> {
    let matched: Vec<&Adjustment> = adjustments
        .iter()
        .filter(|a| a.adjustment_category == category)
        .collect();
    if matched.is_empty() {
        None
    } else {
        Some(matched.iter().map(|a| a.amount).sum())
    }
}

/// Balance of accounts matching `include`, for the delta rules
pub fn balance(lines: &[StatementLine], include: &[String], exclude: &[&str]) -> Option<Decimal> {
    sum_matching(lines, include, exclude)
}

/// Sum of |amount| over matching detail rows (contra lines shown either sign)
pub fn sum_matching_abs(lines: &[StatementLine], include: &[String], exclude: &[&str]) -> Option<Decimal> {
    let matched: Vec<&StatementLine> = lines
        .iter()
        .filter(|l| l.is_detail() && l.name_matches(include))
        .filter(|l| {
            let upper = l.account_name.to_uppercase();
            !exclude.iter().any(|e| upper.contains(e))
        })
        .collect();
    if matched.is_empty() {
        None
    } else {
        Some(matched.iter().map(|l| l.amount.abs()).sum())
    }
}

/// Lender-named rows that are not the loan itself
const MORTGAGE_EXCLUDES: &[&str] = &["INTEREST", "CASH", "CHECKING", "ESCROW", "RESERVE"];

/// Mortgage principal carried on the balance sheet, as a positive figure
pub fn mortgage_debt(lines: &[StatementLine], patterns: &[String]) -> Option<Decimal> {
    sum_matching(lines, patterns, MORTGAGE_EXCLUDES).map(|d| d.abs())
}

/// Identity of an account across periods: its code, else its name
pub fn line_key(line: &StatementLine) -> String {
    match &line.account_code {
        Some(code) => code.clone(),
        None => line.account_name.trim().to_uppercase(),
    }
}

/// Detail-row amounts keyed by `line_key`, for period-over-period lookups
pub fn amounts_by_key(lines: &[StatementLine]) -> BTreeMap<String, Decimal> {
    let mut map = BTreeMap::new();
    for l in lines.iter().filter(|l| l.is_detail()) {
        *map.entry(line_key(l)).or_insert(Decimal::ZERO) += l.amount;
    }
    map
}

/// max - min across sources
pub fn max_pairwise_deviation(values: &[Decimal]) -> Decimal {
    let max = values.iter().copied().max().unwrap_or_default();
    let min = values.iter().copied().min().unwrap_or_default();
    max - min
}

/// Every value below the activity floor
pub fn is_quiet(values: &[Decimal], floor: Decimal) -> bool {
    values.iter().all(|v| v.abs() < floor)
}

/// a / b * 100, None when b is zero
pub fn percent(a: Decimal, b: Decimal) -> Option<Decimal> {
    if b.is_zero() {
        None
    } else {
        Some((a / b * Decimal::ONE_HUNDRED).round_dp(2))
    }
}

pub fn ratio(a: Decimal, b: Decimal) -> Option<Decimal> {
    if b.is_zero() {
        None
    } else {
        Some((a / b).round_dp(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::FinancialPeriod;
    use rust_decimal_macros::dec;

    fn ctx(begin: Option<(i32, u32)>, window: i64) -> AlignmentContext {
        let period = FinancialPeriod::new(2, "P1", 2025, 3);
        let begin_period = begin.map(|(y, m)| FinancialPeriod::new(1, "P1", y, m));
        AlignmentContext {
            property_id: "P1".into(),
            period_id: 2,
            end_year: 2025,
            end_month: 3,
            begin_year: begin_period.as_ref().map(|b| b.year),
            prior_period: begin_period.clone(),
            begin_period,
            earliest_period: None,
            period,
            window_months: window,
            has_cash_flow: false,
            cf_beginning_cash: Decimal::ZERO,
            cf_ending_cash: Decimal::ZERO,
            cf_cash_delta: Decimal::ZERO,
        }
    }

    fn tax() -> Vec<String> {
        vec!["PROPERTY TAX".to_string()]
    }

    #[test]
    fn test_balance_sheet_claims_fallbacks() {
        let lines = vec![
            StatementLine::detail(Some("0122-0000"), "Cash", dec!(100)),
            StatementLine::total(Some("1999-0000"), "TOTAL ASSETS", dec!(100)),
            StatementLine::total(None, "TOTAL LIABILITIES & CAPITAL", dec!(100)),
        ];
        let f = BalanceSheetFigures::from_lines(&lines);
        assert_eq!(f.total_assets, Some(dec!(100)));
        assert_eq!(f.total_liabilities, None);
        assert_eq!(f.liabilities_and_capital, Some(dec!(100)));
        assert_eq!(f.claims(), Some(dec!(100)));
        assert_eq!(f.asset_detail, Some(dec!(100)));
    }

    #[test]
    fn test_window_expense_prefers_same_year_ytd() {
        let current = vec![StatementLine::detail(None, "Property Tax", dec!(1000)).with_ytd(dec!(3000))];
        let begin = vec![StatementLine::detail(None, "Property Tax", dec!(1000)).with_ytd(dec!(1000))];
        assert_eq!(
            window_expense(&ctx(Some((2025, 1)), 2), &current, Some(&begin), &tax(), &[]),
            Some(dec!(2000))
        );
        // Different year: period x window
        assert_eq!(
            window_expense(&ctx(Some((2024, 12)), 3), &current, Some(&begin), &tax(), &[]),
            Some(dec!(3000))
        );
        assert_eq!(window_expense(&ctx(None, 1), &[], None, &tax(), &[]), None);
    }

    #[test]
    fn test_small_helpers() {
        assert_eq!(delta(Some(dec!(5)), None), Some(dec!(5)));
        assert_eq!(delta(None, None), None);
        assert_eq!(max_pairwise_deviation(&[dec!(10), dec!(12), dec!(11)]), dec!(2));
        assert!(is_quiet(&[dec!(0), dec!(0.001)], dec!(0.01)));
        assert_eq!(percent(dec!(1), dec!(4)), Some(dec!(25.00)));
        assert_eq!(ratio(dec!(1), Decimal::ZERO), None);

        let noi = StatementLine::total(None, "NET OPERATING INCOME", dec!(10)).with_ytd(dec!(30));
        assert_eq!(annualized(&noi, 3), dec!(120));
    }
}
