// Cross-statement rules: the same figure read from two different documents
// for the same period.

use anyhow::Result;
use rust_decimal::Decimal;

use super::figures::{balance, mortgage_debt, net_income_line, percent};
use super::{ReconciliationResult, RuleInput, Severity, Status};
use crate::statements::MortgageStatement;
use crate::store::{sum_matching, StatementLine};

/// AUDIT-2: BS current-year earnings = IS net income (YTD)
pub(super) fn current_year_earnings(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let bs = input.balance_sheet()?;
    let is = input.income_statement()?;
    let earnings = any_matching(&bs, &input.patterns().current_year_earnings);
    let net_income = net_income_line(&is);

    let (Some(earnings), Some(ni_line)) = (earnings, net_income) else {
        return input.skipped("Current year earnings account or income statement net income missing");
    };
    let (net_income, basis) = match ni_line.ytd_amount {
        Some(ytd) => (ytd, "ytd"),
        None => (ni_line.amount, "period"),
    };

    let r = input
        .result()
        .values(earnings, net_income)
        .within(input.config.delta_tolerance, Status::Warning)
        .severity(Severity::High)
        .formula("BS Current Year Earnings = IS Net Income (YTD)")
        .calc("bs_current_year_earnings", earnings)
        .calc("is_net_income", net_income)
        .calc("is_net_income_basis", basis)
        .details(format!("BS earnings {} vs IS net income {} ({})", earnings, net_income, basis));
    Ok(vec![r])
}

/// Sum of every matching row, totals included when no detail row matches
fn any_matching(lines: &[StatementLine], patterns: &[String]) -> Option<Decimal> {
    sum_matching(lines, patterns, &[]).or_else(|| {
        lines
            .iter()
            .find(|l| l.name_matches(patterns))
            .map(|l| l.amount)
    })
}

/// AUDIT-4: CF ending cash = BS cash
pub(super) fn ending_cash(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    if !input.ctx.has_cash_flow {
        return input.skipped("No cash flow statement for this period");
    }
    let bs = input.balance_sheet()?;
    let Some(bs_cash) = balance(&bs, &input.patterns().cash, &[]) else {
        return input.skipped("No cash accounts on the balance sheet");
    };
    let cf_ending = input.ctx.cf_ending_cash;

    let r = input
        .result()
        .values(cf_ending, bs_cash)
        .within(input.config.identity_tolerance, Status::Fail)
        .severity(Severity::High)
        .formula("CF Ending Cash = Sum(BS cash accounts)")
        .calc("cf_ending_cash", cf_ending)
        .calc("bs_cash", bs_cash)
        .details(format!("Cash flow ending cash {} vs balance sheet cash {}", cf_ending, bs_cash));
    Ok(vec![r])
}

/// AUDIT-5-TAX / -INSURANCE / -RESERVE: BS escrow balance = lender escrow balance
pub(super) fn escrow_balances(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    let bs = input.balance_sheet()?;
    let p = input.patterns();

    let kinds: [(&str, &str, &[String], fn(&MortgageStatement) -> Decimal); 3] = [
        ("TAX", "Tax", &p.tax_escrow, |m| m.tax_escrow_balance),
        ("INSURANCE", "Insurance", &p.insurance_escrow, |m| m.insurance_escrow_balance),
        ("RESERVE", "Reserve", &p.reserve_escrow, |m| m.reserve_balance),
    ];

    let results = kinds
        .iter()
        .map(|(suffix, name, patterns, field)| {
            let base = input.sub_result(suffix, name);
            if mortgages.is_empty() {
                return base
                    .status(Status::Skip)
                    .details("No mortgage statement for this period");
            }
            let lender: Decimal = mortgages.iter().map(field).sum();
            let book = balance(&bs, patterns, &[]);
            if book.is_none() && lender.is_zero() {
                return base
                    .status(Status::Skip)
                    .details(format!("No {} escrow on either statement", name.to_lowercase()));
            }
            let book = book.unwrap_or_default();
            base.values(book, lender)
                .within(input.config.escrow_tolerance, Status::Warning)
                .severity(Severity::Medium)
                .formula(format!("BS {} Escrow = Mortgage Statement {} Escrow Balance", name, name))
                .calc("bs_escrow", book)
                .calc("lender_escrow_balance", lender)
                .details(format!("{} escrow: books {} vs lender {}", name, book, lender))
        })
        .collect();
    Ok(results)
}

/// AUDIT-8: lender principal balance = BS mortgage debt
pub(super) fn mortgage_principal(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    if mortgages.is_empty() {
        return input.skipped("No mortgage statement for this period");
    }
    let bs = input.balance_sheet()?;
    let Some(book) = mortgage_debt(&bs, &input.patterns().mortgage) else {
        return input.skipped("No mortgage account on the balance sheet");
    };
    let lender: Decimal = mortgages.iter().map(|m| m.principal_balance).sum();

    let r = input
        .result()
        .values(book, lender)
        .within(input.config.delta_tolerance, Status::Warning)
        .severity(Severity::High)
        .formula("BS Mortgage Debt = Mortgage Statement Principal Balance")
        .calc("bs_mortgage_debt", book)
        .calc("lender_principal_balance", lender)
        .calc("statements", mortgages.len())
        .details(format!("Books carry {} vs lender principal {}", book, lender));
    Ok(vec![r])
}

/// AUDIT-9: IS interest expense ~ mortgage interest due
pub(super) fn interest_expense(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    if mortgages.is_empty() {
        return input.skipped("No mortgage statement for this period");
    }
    let is = input.income_statement()?;
    let Some(expense) = sum_matching(&is, &input.patterns().interest_expense, &["INCOME", "EARNED"]) else {
        return input.skipped("No interest expense on the income statement");
    };
    let lender: Decimal = mortgages.iter().map(|m| m.interest_due).sum();
    let tolerance = input.config.flow_tolerance(lender);

    let r = input
        .result()
        .values(expense, lender)
        .within(tolerance, Status::Warning)
        .severity(Severity::Medium)
        .formula("IS Interest Expense = Mortgage Interest Due (within max(floor, pct of interest))")
        .calc("is_interest_expense", expense)
        .calc("mortgage_interest_due", lender)
        .details(format!("Interest expense {} vs lender interest {}", expense, lender));
    Ok(vec![r])
}

/// AUDIT-29: rent roll monthly rent ~ IS base rent
pub(super) fn rent_roll_to_base_rent(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let roll = input.rent_roll()?;
    let units: Vec<_> = roll.iter().filter(|e| !e.is_gross_rent_row && !e.is_vacant()).collect();
    if units.is_empty() {
        return input.skipped("No occupied units on the rent roll");
    }
    let is = input.income_statement()?;
    let Some(base_rent) = sum_matching(&is, &input.patterns().base_rent, &[]) else {
        return input.skipped("No base rent on the income statement");
    };

    let scheduled: Decimal = units.iter().filter_map(|e| e.monthly_rent).sum();
    let tolerance = (base_rent.abs() * input.config.rent_roll_tolerance_pct / Decimal::ONE_HUNDRED).round_dp(2);

    let r = input
        .result()
        .values(scheduled, base_rent)
        .within(tolerance, Status::Warning)
        .severity(Severity::Medium)
        .formula("Sum(rent roll monthly rent) = IS Base Rent (within pct)")
        .calc("rent_roll_monthly_rent", scheduled)
        .calc("is_base_rent", base_rent)
        .calc("occupied_units", units.len())
        .calc("variance_pct_of_base_rent", percent(scheduled - base_rent, base_rent))
        .details(format!("Rent roll {} across {} units vs base rent {}", scheduled, units.len(), base_rent));
    Ok(vec![r])
}

/// AUDIT-31: BS security deposits = rent roll deposits held
pub(super) fn security_deposits(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let roll = input.rent_roll()?;
    let held: Vec<Decimal> = roll
        .iter()
        .filter(|e| !e.is_gross_rent_row)
        .filter_map(|e| e.security_deposit)
        .collect();
    if held.is_empty() {
        return input.skipped("Rent roll reports no security deposits");
    }
    let bs = input.balance_sheet()?;
    let Some(book) = balance(&bs, &input.patterns().security_deposits, &[]) else {
        return input.skipped("No security deposit liability on the balance sheet");
    };

    let roll_total: Decimal = held.iter().sum();
    // Liabilities may be presented negative
    let book = book.abs();
    let tolerance = (book * input.config.rent_roll_tolerance_pct / Decimal::ONE_HUNDRED)
        .round_dp(2)
        .max(input.config.identity_tolerance);

    let r = input
        .result()
        .values(book, roll_total)
        .within(tolerance, Status::Warning)
        .severity(Severity::Medium)
        .formula("BS Security Deposits = Sum(rent roll security deposits)")
        .calc("bs_security_deposits", book)
        .calc("rent_roll_deposits", roll_total)
        .calc("tenants_with_deposit", held.len())
        .details(format!("Books {} vs rent roll {}", book, roll_total));
    Ok(vec![r])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Status;
    use crate::statements::{CashFlowHeader, MortgageStatement, RentRollEntry};
    use crate::store::StatementLine;
    use rust_decimal_macros::dec;

    #[test]
    fn test_current_year_earnings_uses_ytd() {
        let mut store = two_period_store(2025, 3);
        store
            .set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(Some("3910-0000"), "Current Year Earnings", dec!(18000))])
            .set_income_statement(PROPERTY, CURRENT, vec![StatementLine::total(None, "Net Income", dec!(6000)).with_ytd(dec!(18000))]);
        let r = &run_one(&store, "AUDIT-2", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.intermediate_calculations["is_net_income_basis"], "ytd");
    }

    #[test]
    fn test_ending_cash_tie() {
        let mut store = two_period_store(2025, 1);
        store
            .set_cash_flow_header(
                PROPERTY,
                CURRENT,
                CashFlowHeader {
                    beginning_cash_balance: Some(dec!(20000)),
                    ending_cash_balance: Some(dec!(25000)),
                    ..Default::default()
                },
            )
            .set_balance_sheet(
                PROPERTY,
                CURRENT,
                vec![
                    StatementLine::detail(None, "Cash - Operating", dec!(20000)),
                    StatementLine::detail(None, "Cash - Tax Escrow", dec!(4000)),
                ],
            );
        let r = &run_one(&store, "AUDIT-4", CURRENT)[0];
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.difference, Some(dec!(1000)));
    }

    #[test]
    fn test_escrow_sub_rules() {
        let mut store = two_period_store(2025, 1);
        store
            .set_mortgage_statements(
                PROPERTY,
                CURRENT,
                vec![MortgageStatement {
                    tax_escrow_balance: dec!(6000),
                    insurance_escrow_balance: dec!(1500),
                    ..Default::default()
                }],
            )
            .set_balance_sheet(
                PROPERTY,
                CURRENT,
                vec![
                    StatementLine::detail(None, "Tax Escrow", dec!(6050)),
                    StatementLine::detail(None, "Insurance Escrow", dec!(1000)),
                ],
            );
        let results = run_one(&store, "AUDIT-5", CURRENT);
        let ids: Vec<&str> = results.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["AUDIT-5-TAX", "AUDIT-5-INSURANCE", "AUDIT-5-RESERVE"]);
        assert_eq!(results[0].status, Status::Pass);
        assert_eq!(results[1].status, Status::Warning);
        assert_eq!(results[2].status, Status::Skip);
    }

    #[test]
    fn test_rent_roll_to_base_rent() {
        let mut unit = RentRollEntry::new(1, "101", 1);
        unit.monthly_rent = Some(dec!(9800));
        let mut vacant = RentRollEntry::new(2, "102", 1);
        vacant.occupancy_status = crate::statements::OccupancyStatus::Vacant;

        let mut store = two_period_store(2025, 1);
        store
            .set_rent_roll(PROPERTY, CURRENT, vec![unit, vacant])
            .set_income_statement(PROPERTY, CURRENT, vec![StatementLine::detail(Some("4010-0000"), "Base Rent", dec!(10000))]);
        let r = &run_one(&store, "AUDIT-29", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.intermediate_calculations["occupied_units"], 1);
    }

    #[test]
    fn test_cross_statement_rules_skip_without_mortgage() {
        let store = two_period_store(2025, 1);
        for id in ["AUDIT-8", "AUDIT-9"] {
            assert_eq!(run_one(&store, id, CURRENT)[0].status, Status::Skip, "{}", id);
        }
    }
}
