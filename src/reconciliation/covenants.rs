// Covenant and ratio rules. Two-tier thresholds: at or beyond `pass` is
// PASS, between `warn` and `pass` is WARNING, past `warn` is FAIL.

use anyhow::Result;
use rust_decimal::Decimal;

use super::figures::{annualized, mortgage_debt, noi_line, percent, ratio, total_income_line, total_opex_line, IncomeFigures};
use super::{ReconciliationResult, RuleInput, Severity, Status};
use crate::statements::MortgageStatement;
use crate::store::sum_matching;

/// Higher is better
fn floor_status(value: Decimal, pass: Decimal, warn: Decimal) -> Status {
    if value >= pass {
        Status::Pass
    } else if value >= warn {
        Status::Warning
    } else {
        Status::Fail
    }
}

/// Lower is better
fn ceiling_status(value: Decimal, pass: Decimal, warn: Decimal) -> Status {
    if value <= pass {
        Status::Pass
    } else if value <= warn {
        Status::Warning
    } else {
        Status::Fail
    }
}

fn monthly_debt_service(mortgages: &[MortgageStatement]) -> Decimal {
    mortgages.iter().map(|m| m.debt_service()).sum()
}

/// Annualized NOI from the current income statement
fn annual_noi(input: &RuleInput<'_>) -> Result<Option<Decimal>> {
    let is = input.income_statement()?;
    Ok(noi_line(&is).map(|l| annualized(l, input.ctx.end_month)))
}

/// Outstanding principal: balance sheet first, lender statements otherwise
fn outstanding_debt(input: &RuleInput<'_>, mortgages: &[MortgageStatement]) -> Result<Option<Decimal>> {
    let bs = input.balance_sheet()?;
    let from_bs = mortgage_debt(&bs, &input.patterns().mortgage).filter(|d| !d.is_zero());
    let from_lender: Decimal = mortgages.iter().map(|m| m.principal_balance).sum();
    Ok(from_bs.or_else(|| (!from_lender.is_zero()).then_some(from_lender)))
}

// ============================================================================
// DSCR
// ============================================================================

/// AUDIT-43: annualized NOI / annual debt service
pub(super) fn dscr(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    let monthly = monthly_debt_service(&mortgages);
    if monthly.is_zero() {
        return input.skipped("No mortgage debt service for this period");
    }
    let Some(noi) = annual_noi(input)? else {
        return input.skipped("Net operating income missing from the income statement");
    };
    let annual_ds = monthly * Decimal::from(12);
    let Some(dscr) = ratio(noi, annual_ds) else {
        return input.skipped("Debt service is zero");
    };

    let cfg = input.config;
    let status = floor_status(dscr, cfg.dscr_pass, cfg.dscr_warn);
    let r = input
        .result()
        .values(dscr, cfg.dscr_pass)
        .status(status)
        .severity(Severity::Critical)
        .formula("DSCR = Annualized NOI / (Monthly Debt Service x 12)")
        .calc("annualized_noi", noi)
        .calc("monthly_debt_service", monthly)
        .calc("annual_debt_service", annual_ds)
        .calc("dscr", dscr)
        .calc("pass_threshold", cfg.dscr_pass)
        .calc("warn_threshold", cfg.dscr_warn)
        .details(format!("DSCR {:.2}x against covenant {}x", dscr, cfg.dscr_pass));
    Ok(vec![r])
}

// ============================================================================
// LTV
// ============================================================================

/// AUDIT-44: outstanding debt / property value
pub(super) fn ltv(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    let Some(debt) = outstanding_debt(input, &mortgages)? else {
        return input.skipped("No mortgage debt on the balance sheet or lender statement");
    };

    let cfg = input.config;
    let appraised = cfg.property_values.get(&input.ctx.property_id).copied();
    let noi = annual_noi(input)?;
    let implied = noi
        .filter(|n| *n > Decimal::ZERO)
        .and_then(|n| ratio(n * Decimal::ONE_HUNDRED, cfg.cap_rate_pct));
    let Some(value) = appraised.or(implied) else {
        return input.skipped("No property value: none configured and NOI is not positive");
    };
    let Some(ltv_pct) = percent(debt, value) else {
        return input.skipped("Property value is zero");
    };

    let status = ceiling_status(ltv_pct, cfg.ltv_pass, cfg.ltv_warn);
    let r = input
        .result()
        .values(ltv_pct, cfg.ltv_pass)
        .status(status)
        .severity(Severity::High)
        .formula("LTV % = Outstanding Debt / Property Value x 100")
        .calc("outstanding_debt", debt)
        .calc("property_value", value)
        .calc("value_source", if appraised.is_some() { "configured" } else { "noi_over_cap_rate" })
        .calc("annualized_noi", noi)
        .calc("cap_rate_pct", cfg.cap_rate_pct)
        .calc("ltv_pct", ltv_pct)
        .calc("pass_threshold", cfg.ltv_pass)
        .calc("warn_threshold", cfg.ltv_warn)
        .details(format!("LTV {}% against covenant {}%", ltv_pct, cfg.ltv_pass));
    Ok(vec![r])
}

// ============================================================================
// LIQUIDITY
// ============================================================================

/// AUDIT-45: unrestricted cash measured in months of debt service
pub(super) fn minimum_liquidity(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    let monthly = monthly_debt_service(&mortgages);
    if monthly.is_zero() {
        return input.skipped("No mortgage debt service for this period");
    }
    let bs = input.balance_sheet()?;
    let Some(cash) = sum_matching(&bs, &input.patterns().cash, &["ESCROW", "RESERVE", "DEPOSIT"]) else {
        return input.skipped("No unrestricted cash accounts on the balance sheet");
    };
    let Some(months) = ratio(cash, monthly) else {
        return input.skipped("Debt service is zero");
    };

    let cfg = input.config;
    let status = floor_status(months, cfg.liquidity_pass_months, cfg.liquidity_warn_months);
    let r = input
        .result()
        .values(months, cfg.liquidity_pass_months)
        .status(status)
        .severity(Severity::High)
        .formula("Liquidity (months) = Unrestricted Cash / Monthly Debt Service")
        .calc("unrestricted_cash", cash)
        .calc("monthly_debt_service", monthly)
        .calc("months_of_coverage", months)
        .calc("pass_threshold", cfg.liquidity_pass_months)
        .calc("warn_threshold", cfg.liquidity_warn_months)
        .details(format!("{:.1} months of debt service in unrestricted cash", months));
    Ok(vec![r])
}

// ============================================================================
// DEBT YIELD
// ============================================================================

/// AUDIT-46: annualized NOI / outstanding debt
pub(super) fn debt_yield(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let mortgages = input.mortgages()?;
    let Some(debt) = outstanding_debt(input, &mortgages)? else {
        return input.skipped("No mortgage debt on the balance sheet or lender statement");
    };
    let Some(noi) = annual_noi(input)? else {
        return input.skipped("Net operating income missing from the income statement");
    };
    let Some(yield_pct) = percent(noi, debt) else {
        return input.skipped("Outstanding debt is zero");
    };

    let cfg = input.config;
    let status = floor_status(yield_pct, cfg.debt_yield_pass, cfg.debt_yield_warn);
    let r = input
        .result()
        .values(yield_pct, cfg.debt_yield_pass)
        .status(status)
        .severity(Severity::High)
        .formula("Debt Yield % = Annualized NOI / Outstanding Debt x 100")
        .calc("annualized_noi", noi)
        .calc("outstanding_debt", debt)
        .calc("debt_yield_pct", yield_pct)
        .calc("pass_threshold", cfg.debt_yield_pass)
        .calc("warn_threshold", cfg.debt_yield_warn)
        .details(format!("Debt yield {}% against minimum {}%", yield_pct, cfg.debt_yield_pass));
    Ok(vec![r])
}

// ============================================================================
// EXPENSE RATIO
// ============================================================================

/// AUDIT-47: operating expenses / total income. Informational: never FAIL.
pub(super) fn operating_expense_ratio(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let is = input.income_statement()?;
    let figures = IncomeFigures::from_lines(&is);
    let Some(income) = total_income_line(&is).map(|l| l.amount).or(figures.income_detail) else {
        return input.skipped("Total income missing from the income statement");
    };
    let Some(opex) = total_opex_line(&is).map(|l| l.amount).or(figures.operating_expense_detail) else {
        return input.skipped("Operating expenses missing from the income statement");
    };
    let Some(ratio_pct) = percent(opex.abs(), income) else {
        return input.skipped("Total income is zero");
    };

    let ceiling = input.config.expense_ratio_ceiling;
    let status = if ratio_pct > ceiling { Status::Warning } else { Status::Info };
    let r = input
        .result()
        .values(ratio_pct, ceiling)
        .status(status)
        .severity(Severity::Low)
        .formula("Operating Expense Ratio % = Total Operating Expenses / Total Income x 100")
        .calc("total_income", income)
        .calc("total_operating_expenses", opex)
        .calc("expense_ratio_pct", ratio_pct)
        .calc("ceiling_pct", ceiling)
        .details(format!("Operating expenses are {}% of income", ratio_pct));
    Ok(vec![r])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Status;
    use crate::statements::MortgageStatement;
    use crate::store::{InMemoryStore, StatementLine};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn levered(noi: Decimal) -> InMemoryStore {
        let mut store = two_period_store(2025, 1);
        store
            .set_income_statement(PROPERTY, CURRENT, vec![StatementLine::total(None, "NET OPERATING INCOME", noi)])
            .set_balance_sheet(
                PROPERTY,
                CURRENT,
                vec![
                    StatementLine::detail(Some("0122-0000"), "Cash - Operating", dec!(50000)),
                    StatementLine::detail(Some("2610-0000"), "Mortgage Payable", dec!(1000000)),
                ],
            )
            .set_mortgage_statements(
                PROPERTY,
                CURRENT,
                vec![MortgageStatement {
                    principal_due: dec!(2000),
                    interest_due: dec!(6000),
                    principal_balance: dec!(1000000),
                    ..Default::default()
                }],
            );
        store
    }

    #[test]
    fn test_dscr_tiers() {
        // 12,000 / 8,000 = 1.5x
        assert_eq!(run_one(&levered(dec!(12000)), "AUDIT-43", CURRENT)[0].status, Status::Pass);
        // 8,800 / 8,000 = 1.1x
        assert_eq!(run_one(&levered(dec!(8800)), "AUDIT-43", CURRENT)[0].status, Status::Warning);
        // 7,200 / 8,000 = 0.9x
        assert_eq!(run_one(&levered(dec!(7200)), "AUDIT-43", CURRENT)[0].status, Status::Fail);
    }

    #[test]
    fn test_ltv_from_cap_rate() {
        // Annual NOI 120,000 at 7.5% => value 1,600,000; LTV 62.5%
        let r = &run_one(&levered(dec!(10000)), "AUDIT-44", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.source_value, Some(dec!(62.50)));
    }

    #[test]
    fn test_liquidity_months() {
        // 50,000 / 8,000 = 6.25 months
        let r = &run_one(&levered(dec!(10000)), "AUDIT-45", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.source_value, Some(dec!(6.25)));
    }

    #[test]
    fn test_debt_yield_fail() {
        // 60,000 / 1,000,000 = 6%
        assert_eq!(run_one(&levered(dec!(5000)), "AUDIT-46", CURRENT)[0].status, Status::Fail);
    }

    #[test]
    fn test_expense_ratio_never_fails() {
        let mut store = two_period_store(2025, 1);
        store.set_income_statement(
            PROPERTY,
            CURRENT,
            vec![
                StatementLine::total(None, "TOTAL INCOME", dec!(10000)),
                StatementLine::total(None, "TOTAL OPERATING EXPENSES", dec!(9000)),
            ],
        );
        assert_eq!(run_one(&store, "AUDIT-47", CURRENT)[0].status, Status::Warning);
    }

    #[test]
    fn test_covenants_skip_without_debt() {
        let store = two_period_store(2025, 1);
        for id in ["AUDIT-43", "AUDIT-44", "AUDIT-45", "AUDIT-46", "AUDIT-47"] {
            assert_eq!(run_one(&store, id, CURRENT)[0].status, Status::Skip, "{}", id);
        }
    }
}
