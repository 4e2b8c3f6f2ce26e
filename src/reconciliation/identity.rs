// Balance-identity rules: a stated total against the sum of its parts.
// These are expected to tie exactly, so they use the identity tolerance
// and FAIL outside it.

use anyhow::Result;
use rust_decimal::Decimal;

use super::figures::{BalanceSheetFigures, IncomeFigures};
use super::{ReconciliationResult, RuleInput, Severity, Status};
use crate::store::line_in_subcategory;

/// AUDIT-1: Total Assets = Total Liabilities + Total Capital
pub(super) fn balance_sheet_equation(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let bs = input.balance_sheet()?;
    let f = BalanceSheetFigures::from_lines(&bs);

    let (Some(assets), Some(claims)) = (f.total_assets.or(f.asset_detail), f.claims()) else {
        return input.skipped("Balance sheet totals not available for this period");
    };

    let r = input
        .result()
        .values(assets, claims)
        .within(input.config.identity_tolerance, Status::Fail)
        .severity(Severity::Critical)
        .formula("Total Assets = Total Liabilities + Total Capital")
        .calc("total_assets", assets)
        .calc("total_liabilities", f.total_liabilities)
        .calc("total_capital", f.total_capital)
        .calc("liabilities_and_capital", f.liabilities_and_capital)
        .calc("liabilities_plus_capital", claims);

    let details = if r.is_pass() {
        "Balance sheet balances".to_string()
    } else {
        format!("Assets {} vs liabilities + capital {}", assets, claims)
    };
    Ok(vec![r.details(details)])
}

/// AUDIT-6: Beginning cash + (net income + adjustments) = Ending cash
pub(super) fn cash_flow_roll_forward(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    if !input.ctx.has_cash_flow {
        return input.skipped("No cash flow statement for this period");
    }
    let cf = input.cash_flow()?;
    let net_income = IncomeFigures::from_lines(&cf).net_income;
    let total_adjustments = line_in_subcategory(&cf, "Total Adjustments").map(|l| l.amount);
    let stated_change = input
        .store
        .cash_flow_header(&input.ctx.property_id, input.ctx.period_id)?
        .and_then(|h| h.net_change_in_cash);

    let (change, source) = match (net_income, total_adjustments) {
        (Some(ni), Some(adj)) => (ni + adj, "net_income_plus_adjustments"),
        _ => match stated_change {
            Some(c) => (c, "stated_net_change"),
            None => return input.skipped("Neither net income with adjustments nor a net change in cash was reported"),
        },
    };

    let beginning = input.ctx.cf_beginning_cash;
    let ending = input.ctx.cf_ending_cash;
    let expected = beginning + change;

    let r = input
        .result()
        .values(expected, ending)
        .within(input.config.identity_tolerance, Status::Fail)
        .severity(Severity::High)
        .formula("Beginning Cash + Net Change in Cash = Ending Cash")
        .calc("beginning_cash", beginning)
        .calc("net_income", net_income)
        .calc("total_adjustments", total_adjustments)
        .calc("net_change", change)
        .calc("net_change_source", source)
        .calc("ending_cash", ending)
        .details(format!("{} + {} rolls to {}, reported {}", beginning, change, expected, ending));
    Ok(vec![r])
}

/// AUDIT-7: principal + interest + escrows + other = total payment due
pub(super) fn mortgage_payment_composition(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    let billed: Vec<_> = mortgages.iter().filter(|m| !m.total_payment_due.is_zero()).collect();
    if billed.is_empty() {
        return input.skipped("No mortgage statement with a total payment due");
    }

    let results = billed
        .into_iter()
        .map(|m| {
            let components = m.component_sum();
            input
                .result()
                .values(components, m.total_payment_due)
                .within(input.config.identity_tolerance, Status::Fail)
                .severity(Severity::High)
                .formula("Principal + Interest + Tax Escrow + Insurance Escrow + Reserve + Other = Total Payment Due")
                .calc("lender", &m.lender)
                .calc("loan_number", &m.loan_number)
                .calc("principal_due", m.principal_due)
                .calc("interest_due", m.interest_due)
                .calc("tax_escrow_due", m.tax_escrow_due)
                .calc("insurance_escrow_due", m.insurance_escrow_due)
                .calc("reserve_due", m.reserve_due)
                .calc("other_due", m.other_due)
                .calc("component_sum", components)
                .calc("total_payment_due", m.total_payment_due)
                .details(format!(
                    "{}: components {} vs billed {}",
                    m.lender.as_deref().unwrap_or("lender"),
                    components,
                    m.total_payment_due
                ))
        })
        .collect();
    Ok(results)
}

fn composition(
    input: &RuleInput<'_>,
    label: &str,
    detail: Option<Decimal>,
    total: Option<Decimal>,
    severity: Severity,
) -> Result<Vec<ReconciliationResult>> {
    let (Some(detail), Some(total)) = (detail, total) else {
        return input.skipped(format!("{} total or its detail rows are missing", label));
    };

    let r = input
        .result()
        .values(detail, total)
        .within(input.config.identity_tolerance, Status::Fail)
        .severity(severity)
        .formula(format!("Sum of {} detail rows = Total {}", label, label))
        .calc("detail_sum", detail)
        .calc("stated_total", total)
        .details(format!("{} detail {} vs stated {}", label, detail, total));
    Ok(vec![r])
}

/// AUDIT-10
pub(super) fn total_income_composition(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let f = IncomeFigures::from_lines(&input.income_statement()?);
    composition(input, "Income", f.income_detail, f.total_income, Severity::High)
}

/// AUDIT-11
pub(super) fn total_opex_composition(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let f = IncomeFigures::from_lines(&input.income_statement()?);
    composition(
        input,
        "Operating Expenses",
        f.operating_expense_detail,
        f.total_operating_expenses,
        Severity::High,
    )
}

/// AUDIT-12: Total Income - expenses above NOI = NOI
pub(super) fn noi_identity(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let f = IncomeFigures::from_lines(&input.income_statement()?);
    let (Some(income), Some(expenses), Some(noi)) = (f.total_income, f.expenses_above_noi(), f.net_operating_income) else {
        return input.skipped("Total income, total expenses or NOI missing from the income statement");
    };

    let computed = income - expenses;
    let r = input
        .result()
        .values(computed, noi)
        .within(input.config.identity_tolerance, Status::Fail)
        .severity(Severity::Critical)
        .formula("Total Income - Total Expenses = NOI")
        .calc("total_income", income)
        .calc("total_operating_expenses", f.total_operating_expenses)
        .calc("total_additional_expenses", f.total_additional_expenses)
        .calc("total_expenses", expenses)
        .calc("computed_noi", computed)
        .calc("reported_noi", noi)
        .details(format!("Computed NOI {} vs reported {}", computed, noi));
    Ok(vec![r])
}

/// AUDIT-32: NOI - below-the-line items = Net Income
pub(super) fn below_the_line_net_income(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let f = IncomeFigures::from_lines(&input.income_statement()?);
    let (Some(noi), Some(net_income)) = (f.net_operating_income, f.net_income) else {
        return input.skipped("NOI or net income missing from the income statement");
    };
    let below = f.below_the_line.unwrap_or_default();
    let computed = noi - below;

    let r = input
        .result()
        .values(computed, net_income)
        .within(input.config.identity_tolerance, Status::Fail)
        .severity(Severity::High)
        .formula("NOI - (Interest + Depreciation + Amortization + other below-the-line) = Net Income")
        .calc("noi", noi)
        .calc("below_the_line", below)
        .calc("computed_net_income", computed)
        .calc("reported_net_income", net_income)
        .details(format!("NOI {} less {} below the line = {}, reported {}", noi, below, computed, net_income));
    Ok(vec![r])
}

/// AUDIT-34
pub(super) fn total_liabilities_composition(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let f = BalanceSheetFigures::from_lines(&input.balance_sheet()?);
    composition(input, "Liabilities", f.liability_detail, f.total_liabilities, Severity::High)
}

/// AUDIT-35
pub(super) fn total_assets_composition(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let f = BalanceSheetFigures::from_lines(&input.balance_sheet()?);
    composition(input, "Assets", f.asset_detail, f.total_assets, Severity::High)
}

/// AUDIT-36
pub(super) fn total_capital_composition(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let f = BalanceSheetFigures::from_lines(&input.balance_sheet()?);
    composition(input, "Capital", f.capital_detail, f.total_capital, Severity::Medium)
}

/// AUDIT-42: each cash account rolls (beginning + difference = ending) and
/// the account rows sum to the total row
pub(super) fn cash_account_reconciliation(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let rows = input.cash_accounts()?;
    let detail: Vec<_> = rows.iter().filter(|r| !r.is_total_row).collect();
    if detail.is_empty() {
        return input.skipped("No cash account reconciliation rows");
    }

    let tolerance = input.config.identity_tolerance;
    let broken: Vec<String> = detail
        .iter()
        .filter(|r| (r.beginning_balance + r.difference - r.ending_balance).abs() > tolerance)
        .map(|r| r.account_name.clone())
        .collect();

    let ending_sum: Decimal = detail.iter().map(|r| r.ending_balance).sum();
    let total_row = rows.iter().find(|r| r.is_total_row).map(|r| r.ending_balance);
    let total_gap = total_row.map(|t| ending_sum - t).unwrap_or_default();

    let status = if broken.is_empty() && total_gap.abs() <= tolerance {
        Status::Pass
    } else {
        Status::Fail
    };

    let mut r = input
        .result()
        .status(status)
        .severity(Severity::High)
        .formula("Beginning + Difference = Ending per account; Sum(accounts) = Total")
        .calc("accounts_checked", detail.len())
        .calc("accounts_not_rolling", &broken)
        .calc("ending_sum", ending_sum)
        .calc("stated_total", total_row)
        .calc("tolerance", tolerance);
    if let Some(total) = total_row {
        r = r.values(ending_sum, total);
    }

    let details = if status == Status::Pass {
        format!("{} cash accounts roll forward", detail.len())
    } else if !broken.is_empty() {
        format!("Accounts not rolling forward: {}", broken.join(", "))
    } else {
        format!("Accounts sum to {} but total row shows {}", ending_sum, total_row.unwrap_or_default())
    };
    Ok(vec![r.details(details)])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Status;
    use crate::statements::{CashAccountReconciliationRow, CashAccountType, MortgageStatement};
    use crate::store::StatementLine;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn balance_sheet(liabilities: Decimal, capital: Decimal) -> Vec<StatementLine> {
        vec![
            StatementLine::detail(Some("0122-0000"), "Cash - Operating", dec!(150000)),
            StatementLine::total(Some("1999-0000"), "TOTAL ASSETS", dec!(150000)),
            StatementLine::detail(Some("2610-0000"), "Wells Fargo", liabilities),
            StatementLine::total(Some("2999-0000"), "TOTAL LIABILITIES", liabilities),
            StatementLine::detail(Some("3050-0000"), "Partners Capital", capital),
            StatementLine::total(Some("3999-0000"), "TOTAL CAPITAL", capital),
        ]
    }

    #[test]
    fn test_balanced_sheet_passes_with_zero_difference() {
        let mut store = two_period_store(2025, 1);
        store.set_balance_sheet(PROPERTY, CURRENT, balance_sheet(dec!(100000), dec!(50000)));
        let r = &run_one(&store, "AUDIT-1", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.difference, Some(Decimal::ZERO));
    }

    #[test]
    fn test_unbalanced_sheet_fails() {
        let mut store = two_period_store(2025, 1);
        store.set_balance_sheet(PROPERTY, CURRENT, balance_sheet(dec!(100000), dec!(40000)));
        let r = &run_one(&store, "AUDIT-1", CURRENT)[0];
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.difference, Some(dec!(10000)));
    }

    #[test]
    fn test_missing_balance_sheet_skips() {
        let store = two_period_store(2025, 1);
        assert_eq!(run_one(&store, "AUDIT-1", CURRENT)[0].status, Status::Skip);
    }

    #[test]
    fn test_composition_rules() {
        let mut store = two_period_store(2025, 1);
        store.set_balance_sheet(PROPERTY, CURRENT, balance_sheet(dec!(100000), dec!(50000)));
        for id in ["AUDIT-34", "AUDIT-35", "AUDIT-36"] {
            assert_eq!(run_one(&store, id, CURRENT)[0].status, Status::Pass, "{}", id);
        }
    }

    #[test]
    fn test_noi_and_below_the_line() {
        let mut store = two_period_store(2025, 1);
        store.set_income_statement(
            PROPERTY,
            CURRENT,
            vec![
                StatementLine::detail(Some("4010-0000"), "Base Rent", dec!(10000)),
                StatementLine::total(None, "Total Income", dec!(10000)),
                StatementLine::detail(Some("5110-0000"), "Electric", dec!(1000)),
                StatementLine::total(None, "Total Operating Expenses", dec!(1000)),
                StatementLine::total(None, "NET OPERATING INCOME", dec!(9000)),
                StatementLine::detail(Some("7010-0000"), "Mortgage Interest", dec!(2500)).below_the_line(),
                StatementLine::total(None, "Net Income", dec!(6000)),
            ],
        );
        assert_eq!(run_one(&store, "AUDIT-10", CURRENT)[0].status, Status::Pass);
        assert_eq!(run_one(&store, "AUDIT-11", CURRENT)[0].status, Status::Pass);
        assert_eq!(run_one(&store, "AUDIT-12", CURRENT)[0].status, Status::Pass);

        let r = &run_one(&store, "AUDIT-32", CURRENT)[0];
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.difference, Some(dec!(500)));
    }

    #[test]
    fn test_mortgage_composition() {
        let mut store = two_period_store(2025, 1);
        store.set_mortgage_statements(
            PROPERTY,
            CURRENT,
            vec![MortgageStatement {
                principal_due: dec!(10000),
                interest_due: dec!(2450),
                tax_escrow_due: dec!(1200),
                total_payment_due: dec!(13650),
                ..Default::default()
            }],
        );
        let r = &run_one(&store, "AUDIT-7", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.intermediate_calculations["component_sum"], serde_json::json!("13650"));
    }

    #[test]
    fn test_cash_account_rows() {
        let row = |name: &str, b: Decimal, e: Decimal, d: Decimal, total: bool| CashAccountReconciliationRow {
            account_name: name.to_string(),
            account_type: CashAccountType::Operating,
            beginning_balance: b,
            ending_balance: e,
            difference: d,
            is_escrow_account: false,
            is_negative_balance: false,
            is_total_row: total,
        };
        let mut store = two_period_store(2025, 1);
        store.set_cash_accounts(
            PROPERTY,
            CURRENT,
            vec![
                row("Operating", dec!(100), dec!(150), dec!(50), false),
                row("Escrow", dec!(40), dec!(45), dec!(9), false),
                row("Total Cash", dec!(140), dec!(195), dec!(55), true),
            ],
        );
        let r = &run_one(&store, "AUDIT-42", CURRENT)[0];
        assert_eq!(r.status, Status::Fail);
        assert!(r.details.contains("Escrow"));
    }
}
