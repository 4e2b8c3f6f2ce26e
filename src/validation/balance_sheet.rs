use rust_decimal::Decimal;

use super::{round_numbers, Check};
use crate::config::{AccountPatterns, ValidationConfig};
use crate::patterns::is_plausible_account_code;
use crate::reconciliation::figures::{mortgage_debt, BalanceSheetFigures};
use crate::store::{sum_matching, StatementLine};

pub(super) fn checks(lines: &[StatementLine], config: &ValidationConfig) -> Vec<(&'static str, Check)> {
    let figures = BalanceSheetFigures::from_lines(lines);
    let patterns = AccountPatterns::default();
    vec![
        ("bs_account_code_format", account_code_format(lines)),
        ("bs_balance_equation", balance_equation(&figures, config)),
        ("bs_major_sections_non_zero", major_sections(&figures)),
        ("bs_negative_cash", negative_cash(lines, &patterns)),
        ("bs_debt_to_equity", debt_to_equity(&figures, config)),
        ("bs_escrow_presence", escrow_presence(lines, &patterns)),
        ("bs_round_numbers", round_numbers(lines.iter().filter(|l| l.is_detail()).map(|l| l.amount), config)),
        ("bs_deprecated_codes", deprecated_codes(lines, config)),
    ]
}

fn account_code_format(lines: &[StatementLine]) -> Check {
    let bad: Vec<String> = lines
        .iter()
        .filter_map(|l| l.account_code.as_deref())
        .filter(|code| !is_plausible_account_code(code))
        .map(str::to_string)
        .collect();
    Check::from_failures("Malformed account codes", &bad)
}

fn balance_equation(f: &BalanceSheetFigures, config: &ValidationConfig) -> Check {
    match (f.total_assets.or(f.asset_detail), f.claims()) {
        (Some(assets), Some(claims)) => Check::compare(assets, claims, config.tolerance_pct),
        (None, _) => Check::fail("Total assets not found"),
        (_, None) => Check::fail("Total liabilities and capital not found"),
    }
}

fn major_sections(f: &BalanceSheetFigures) -> Check {
    let sections = [
        ("assets", f.total_assets.or(f.asset_detail)),
        ("liabilities", f.total_liabilities.or(f.liability_detail)),
        ("capital", f.total_capital.or(f.capital_detail)),
    ];
    let empty: Vec<String> = sections
        .iter()
        .filter(|(_, v)| v.map(|v| v.is_zero()).unwrap_or(true))
        .map(|(name, _)| name.to_string())
        .collect();
    Check::from_failures("Empty sections", &empty)
}

fn negative_cash(lines: &[StatementLine], patterns: &AccountPatterns) -> Check {
    let overdrawn: Vec<String> = lines
        .iter()
        .filter(|l| l.is_detail() && l.name_matches(&patterns.cash) && l.amount < Decimal::ZERO)
        .map(|l| format!("{} ({})", l.account_name, l.amount))
        .collect();
    Check::from_failures("Negative cash", &overdrawn)
}

fn debt_to_equity(f: &BalanceSheetFigures, config: &ValidationConfig) -> Check {
    let (Some(liabilities), Some(capital)) = (
        f.total_liabilities.or(f.liability_detail),
        f.total_capital.or(f.capital_detail),
    ) else {
        return Check::note("Liabilities or capital not stated; ratio not computed");
    };
    if capital <= Decimal::ZERO {
        return Check::fail(format!("Capital is {}; leverage is unbounded", capital))
            .values(config.debt_to_equity_max, liabilities);
    }
    let ratio = (liabilities / capital).round_dp(2);
    let check = if ratio <= config.debt_to_equity_max {
        Check::pass()
    } else {
        Check::fail(format!("Debt to equity {}:1 exceeds {}:1", ratio, config.debt_to_equity_max))
    };
    check.values(config.debt_to_equity_max, ratio)
}

fn escrow_presence(lines: &[StatementLine], patterns: &AccountPatterns) -> Check {
    if mortgage_debt(lines, &patterns.mortgage).is_none() {
        return Check::note("No mortgage on the balance sheet");
    }
    let escrow: Vec<String> = patterns
        .tax_escrow
        .iter()
        .chain(&patterns.insurance_escrow)
        .chain(&patterns.reserve_escrow)
        .cloned()
        .chain(std::iter::once("ESCROW".to_string()))
        .collect();
    match sum_matching(lines, &escrow, &[]) {
        Some(_) => Check::pass(),
        None => Check::fail("Mortgage carried without any escrow account"),
    }
}

fn deprecated_codes(lines: &[StatementLine], config: &ValidationConfig) -> Check {
    let found: Vec<&str> = lines
        .iter()
        .filter_map(|l| l.account_code.as_deref())
        .filter(|code| config.deprecated_codes.iter().any(|d| d == code))
        .collect();
    if found.is_empty() {
        Check::pass()
    } else {
        Check::note(format!("Deprecated codes in use: {}", found.join(", ")))
            .values(Decimal::ZERO, Decimal::from(found.len()))
    }
}
