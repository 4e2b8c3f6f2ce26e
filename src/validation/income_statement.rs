use rust_decimal::Decimal;

use super::{round_numbers, Check};
use crate::config::ValidationConfig;
use crate::reconciliation::figures::IncomeFigures;
use crate::store::StatementLine;

/// Income lines that are reductions by nature
const CONTRA_INCOME: &[&str] = &["VACANCY", "CONCESSION", "BAD DEBT", "LOSS", "CREDIT", "DISCOUNT", "ABATEMENT", "FREE RENT"];

pub(super) fn checks(lines: &[StatementLine], config: &ValidationConfig) -> Vec<(&'static str, Check)> {
    let f = IncomeFigures::from_lines(lines);
    let tol = config.tolerance_pct;
    vec![
        ("is_total_income_sum", stated_vs_detail("Total income", f.total_income, f.income_detail, tol)),
        ("is_total_expense_sum", total_expense_sum(&f, tol)),
        ("is_noi_calculation", noi_calculation(&f, tol)),
        ("is_net_income_calculation", net_income_calculation(&f, tol)),
        ("is_income_percentage_sum", income_percentage_sum(lines, tol)),
        ("is_ytd_not_below_period", ytd_not_below_period(lines)),
        ("is_negative_income", negative_income(lines)),
        ("is_round_numbers", round_numbers(lines.iter().filter(|l| l.is_detail()).map(|l| l.amount), config)),
    ]
}

fn is_income(line: &StatementLine) -> bool {
    line.is_detail() && line.category.as_deref() == Some("INCOME")
}

fn stated_vs_detail(label: &str, stated: Option<Decimal>, detail: Option<Decimal>, tol: Decimal) -> Check {
    match (stated, detail) {
        (Some(stated), Some(detail)) => Check::compare(stated, detail, tol),
        (None, _) => Check::fail(format!("{} line not found", label)),
        (_, None) => Check::fail(format!("No detail accounts under {}", label.to_lowercase())),
    }
}

fn total_expense_sum(f: &IncomeFigures, tol: Decimal) -> Check {
    let detail = match (f.operating_expense_detail, f.additional_expense_detail) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or_default() + b.unwrap_or_default()),
    };
    // A lone operating-expense total covers only operating detail
    let (stated, detail) = match (f.total_expenses, f.total_additional_expenses) {
        (None, None) => (f.total_operating_expenses, f.operating_expense_detail),
        _ => (f.expenses_above_noi(), detail),
    };
    stated_vs_detail("Total expenses", stated, detail, tol)
}

fn noi_calculation(f: &IncomeFigures, tol: Decimal) -> Check {
    let (Some(noi), Some(income), Some(expenses)) = (f.net_operating_income, f.total_income, f.expenses_above_noi()) else {
        return Check::fail("NOI, total income or total expenses not found");
    };
    Check::compare(income - expenses, noi, tol)
}

fn net_income_calculation(f: &IncomeFigures, tol: Decimal) -> Check {
    let (Some(noi), Some(net_income)) = (f.net_operating_income, f.net_income) else {
        return Check::fail("NOI or net income not found");
    };
    Check::compare(noi - f.below_the_line.unwrap_or_default(), net_income, tol)
}

fn income_percentage_sum(lines: &[StatementLine], tol: Decimal) -> Check {
    let pcts: Vec<Decimal> = lines.iter().filter(|l| is_income(l)).filter_map(|l| l.period_percentage).collect();
    if pcts.is_empty() {
        return Check::note("No percentage column on income lines");
    }
    Check::compare(Decimal::ONE_HUNDRED, pcts.iter().sum(), tol)
}

fn ytd_not_below_period(lines: &[StatementLine]) -> Check {
    let short: Vec<String> = lines
        .iter()
        .filter(|l| l.is_detail())
        .filter_map(|l| l.ytd_amount.map(|ytd| (l, ytd)))
        .filter(|(l, ytd)| ytd.abs() < l.amount.abs())
        .map(|(l, ytd)| format!("{} (period {}, ytd {})", l.account_name, l.amount, ytd))
        .collect();
    Check::from_failures("YTD below period", &short)
}

fn negative_income(lines: &[StatementLine]) -> Check {
    let negative: Vec<String> = lines
        .iter()
        .filter(|l| is_income(l) && l.amount < Decimal::ZERO)
        .filter(|l| {
            let upper = l.account_name.to_uppercase();
            !CONTRA_INCOME.iter().any(|c| upper.contains(c))
        })
        .map(|l| format!("{} ({})", l.account_name, l.amount))
        .collect();
    Check::from_failures("Negative income", &negative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn result<'a>(results: &'a [(&'static str, Check)], name: &str) -> &'a Check {
        &results.iter().find(|(n, _)| *n == name).unwrap().1
    }

    fn statement(noi: Decimal) -> Vec<StatementLine> {
        vec![
            StatementLine::detail(Some("4010-0000"), "Base Rentals", dec!(9000)).with_subcategory("INCOME", "Base Rental Income"),
            StatementLine::detail(Some("4090-0000"), "Vacancy Loss", dec!(-500)).with_subcategory("INCOME", "Vacancy"),
            StatementLine::detail(Some("4020-0000"), "Recoveries", dec!(1500)).with_subcategory("INCOME", "Recovery Income"),
            StatementLine::total(Some("4990-0000"), "TOTAL INCOME", dec!(10000)),
            StatementLine::detail(Some("5010-0000"), "Repairs", dec!(2500)).with_subcategory("OPERATING_EXPENSE", "Repair & Maintenance"),
            StatementLine::detail(Some("5020-0000"), "Management Fees", dec!(1500)).with_subcategory("OPERATING_EXPENSE", "Management Fees"),
            StatementLine::total(Some("5990-0000"), "TOTAL OPERATING EXPENSES", dec!(4000)),
            StatementLine::total(None, "NET OPERATING INCOME", noi),
            StatementLine::detail(Some("7010-0000"), "Mortgage Interest", dec!(3000)).below_the_line(),
            StatementLine::total(None, "NET INCOME", noi - dec!(3000)),
        ]
    }

    #[test]
    fn test_consistent_statement_passes_error_checks() {
        let config = ValidationConfig::default();
        let results = checks(&statement(dec!(6000)), &config);
        for name in ["is_total_income_sum", "is_total_expense_sum", "is_noi_calculation", "is_net_income_calculation"] {
            assert!(result(&results, name).passed, "{} {:?}", name, result(&results, name));
        }
        // Vacancy is a contra account
        assert!(result(&results, "is_negative_income").passed);
    }

    #[test]
    fn test_wrong_noi_fails() {
        let config = ValidationConfig::default();
        let results = checks(&statement(dec!(6500)), &config);
        let noi = result(&results, "is_noi_calculation");
        assert!(!noi.passed);
        assert_eq!(noi.difference, Some(dec!(500)));
    }

    #[test]
    fn test_ytd_below_period_flagged() {
        let lines = vec![StatementLine::detail(None, "Utilities", dec!(800)).with_ytd(dec!(700))];
        let results = checks(&lines, &ValidationConfig::default());
        assert!(!result(&results, "is_ytd_not_below_period").passed);
    }
}
