// Delta-tie rules: the change in a balance-sheet account between the begin
// and current period against the income-statement or cash-flow figure that
// should explain it.
//
// Sign convention for cash-flow adjustments: an asset increase is a cash
// outflow (expected = -delta), a liability increase is an inflow
// (expected = +delta).

use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::figures::{
    adjustments_total, balance, delta, is_quiet, line_key, max_pairwise_deviation, mortgage_debt,
    net_income_line, window_expense,
};
use super::{ReconciliationResult, RuleInput, Severity, Status};
use crate::period::months_between;
use crate::statements::AdjustmentCategory;
use crate::store::StatementLine;

// ============================================================================
// NET INCOME THREE-WAY
// ============================================================================

/// AUDIT-3: IS net income = BS current-year-earnings change = CF net income
pub(super) fn net_income_three_way(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(prior) = input.ctx.prior_period.as_ref() else {
        return input.skipped("No prior period: earliest period on record");
    };
    let is = input.income_statement()?;
    let Some(is_net_income) = net_income_line(&is).map(|l| l.amount) else {
        return input.skipped("Income statement net income missing");
    };

    let patterns = &input.patterns().current_year_earnings;
    let bs = input.balance_sheet()?;
    let prior_bs = input.prior_balance_sheet()?.unwrap_or_default();
    // Earnings close to retained earnings at year end
    let year_rolled = prior.year != input.ctx.end_year;
    let end_earnings = balance(&bs, patterns, &[]);
    let begin_earnings = if year_rolled { Some(Decimal::ZERO) } else { balance(&prior_bs, patterns, &[]) };
    let bs_delta = end_earnings.and_then(|end| begin_earnings.map(|begin| end - begin));

    let cf_net_income = match input
        .store
        .cash_flow_header(&input.ctx.property_id, input.ctx.period_id)?
        .and_then(|h| h.net_income)
    {
        Some(ni) => Some(ni),
        None => net_income_line(&input.cash_flow()?).map(|l| l.amount),
    };

    let mut sources = vec![is_net_income];
    sources.extend(bs_delta);
    sources.extend(cf_net_income);
    if sources.len() < 2 {
        return input.skipped("Need at least two of IS net income, BS earnings change, CF net income");
    }

    let deviation = max_pairwise_deviation(&sources);
    let target = bs_delta.or(cf_net_income).unwrap_or_default();
    let status = if deviation <= input.config.delta_tolerance { Status::Pass } else { Status::Fail };

    let r = input
        .result()
        .values(is_net_income, target)
        .difference(deviation)
        .status(status)
        .severity(Severity::Critical)
        .formula("IS Net Income = Δ BS Current Year Earnings = CF Net Income")
        .calc("is_net_income", is_net_income)
        .calc("bs_earnings_end", end_earnings)
        .calc("bs_earnings_begin", begin_earnings)
        .calc("bs_earnings_delta", bs_delta)
        .calc("cf_net_income", cf_net_income)
        .calc("year_rolled", year_rolled)
        .calc("sources_compared", sources.len())
        .calc("max_pairwise_deviation", deviation)
        .calc("tolerance", input.config.delta_tolerance)
        .details(format!(
            "IS {} / BS Δ {} / CF {}: max deviation {}",
            is_net_income,
            fmt_opt(bs_delta),
            fmt_opt(cf_net_income),
            deviation
        ));
    Ok(vec![r])
}

fn fmt_opt(v: Option<Decimal>) -> String {
    v.map(|d| d.to_string()).unwrap_or_else(|| "n/a".to_string())
}

// ============================================================================
// BALANCE CHANGE VS CASH FLOW
// ============================================================================

/// One balance-sheet movement tied to one cash-flow adjustment category
struct AdjustmentTie<'a> {
    label: &'a str,
    formula: &'a str,
    /// Cash impact implied by the balance sheet
    expected: Option<Decimal>,
    category: AdjustmentCategory,
    severity: Severity,
    calcs: BTreeMap<&'static str, Option<Decimal>>,
}

fn adjustment_tie(input: &RuleInput<'_>, tie: AdjustmentTie<'_>) -> Result<Vec<ReconciliationResult>> {
    let reported = adjustments_total(&input.adjustments()?, tie.category);
    if tie.expected.is_none() && reported.is_none() {
        return input.skipped(format!("No {} accounts on either statement", tie.label));
    }
    let expected = tie.expected.unwrap_or_default();
    let reported_value = reported.unwrap_or_default();
    if is_quiet(&[expected, reported_value], input.config.activity_floor) {
        return input.skipped(format!("No {} activity to reconcile", tie.label));
    }

    let mut r = input
        .result()
        .values(reported_value, expected)
        .within(input.config.delta_tolerance, Status::Warning)
        .severity(tie.severity)
        .formula(tie.formula)
        .calc("expected_cash_impact", expected)
        .calc("cf_adjustment", reported)
        .calc("window_months", input.ctx.window_months);
    for (k, v) in &tie.calcs {
        r = r.calc(k, v);
    }
    let details = format!("{}: balance sheet implies {}, cash flow reports {}", tie.label, expected, reported_value);
    Ok(vec![r.details(details)])
}

/// (end, begin) balances for accounts matching `include`
fn balances(
    end: &[StatementLine],
    begin: &[StatementLine],
    include: &[String],
    exclude: &[&str],
) -> (Option<Decimal>, Option<Decimal>) {
    (balance(end, include, exclude), balance(begin, include, exclude))
}

/// Current and begin balance sheets, or a SKIP when there is no begin period
fn sheets(input: &RuleInput<'_>) -> Result<Option<(Vec<StatementLine>, Vec<StatementLine>)>> {
    match input.begin_balance_sheet()? {
        Some(begin) => Ok(Some((input.balance_sheet()?, begin))),
        None => Ok(None),
    }
}

const NO_BEGIN: &str = "No begin period to compare against";

/// AUDIT-17: CF A/R adjustment = -Δ receivables
pub(super) fn accounts_receivable_change(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let (e, b) = balances(&end, &begin, &input.patterns().accounts_receivable, &["ALLOWANCE"]);
    let d = delta(e, b);
    adjustment_tie(
        input,
        AdjustmentTie {
            label: "accounts receivable",
            formula: "CF A/R adjustment = -(End A/R - Begin A/R)",
            expected: d.map(|d| -d),
            category: AdjustmentCategory::ArChanges,
            severity: Severity::Medium,
            calcs: BTreeMap::from([("ar_end", e), ("ar_begin", b), ("ar_delta", d)]),
        },
    )
}

/// AUDIT-23: CF A/P adjustment = +Δ payables
pub(super) fn accounts_payable_change(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let (e, b) = balances(&end, &begin, &input.patterns().accounts_payable, &[]);
    let d = delta(e, b);
    adjustment_tie(
        input,
        AdjustmentTie {
            label: "accounts payable",
            formula: "CF A/P adjustment = End A/P - Begin A/P",
            expected: d,
            category: AdjustmentCategory::AccountsPayable,
            severity: Severity::Medium,
            calcs: BTreeMap::from([("ap_end", e), ("ap_begin", b), ("ap_delta", d)]),
        },
    )
}

/// AUDIT-24: CF prepaid/accrued adjustment = -Δ prepaids + Δ accruals
pub(super) fn prepaid_accrued_change(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let (prepaid, accrued): (Vec<String>, Vec<String>) = input
        .patterns()
        .prepaid_accrued
        .iter()
        .cloned()
        .partition(|p| p.contains("PREPAID"));
    let (pe, pb) = balances(&end, &begin, &prepaid, &[]);
    let (ae, ab) = balances(&end, &begin, &accrued, &["INTEREST RECEIVABLE"]);
    let dp = delta(pe, pb);
    let da = delta(ae, ab);
    let expected = match (dp, da) {
        (None, None) => None,
        (p, a) => Some(a.unwrap_or_default() - p.unwrap_or_default()),
    };
    adjustment_tie(
        input,
        AdjustmentTie {
            label: "prepaid and accrued",
            formula: "CF Prepaid/Accrued adjustment = Δ Accrued - Δ Prepaid",
            expected,
            category: AdjustmentCategory::PrepaidAccrued,
            severity: Severity::Medium,
            calcs: BTreeMap::from([
                ("prepaid_end", pe),
                ("prepaid_begin", pb),
                ("accrued_end", ae),
                ("accrued_begin", ab),
            ]),
        },
    )
}

/// AUDIT-25: CF loan cost adjustment = -Δ net loan costs
pub(super) fn loan_cost_change(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let (e, b) = balances(&end, &begin, &input.patterns().loan_costs, &[]);
    let d = delta(e, b);
    adjustment_tie(
        input,
        AdjustmentTie {
            label: "loan costs",
            formula: "CF Loan Cost adjustment = -(End Loan Costs - Begin Loan Costs)",
            expected: d.map(|d| -d),
            category: AdjustmentCategory::LoanCosts,
            severity: Severity::Low,
            calcs: BTreeMap::from([("loan_costs_end", e), ("loan_costs_begin", b), ("loan_costs_delta", d)]),
        },
    )
}

/// AUDIT-26: CF distributions = -(growth in cumulative distributions)
pub(super) fn distributions_change(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let (e, b) = balances(&end, &begin, &input.patterns().distributions, &[]);
    // Presented either sign; magnitude growth is cash paid out
    let growth = delta(e.map(|v| v.abs()), b.map(|v| v.abs()));
    adjustment_tie(
        input,
        AdjustmentTie {
            label: "distributions",
            formula: "CF Distributions = -(|End Distributions| - |Begin Distributions|)",
            expected: growth.map(|g| -g),
            category: AdjustmentCategory::Distributions,
            severity: Severity::Medium,
            calcs: BTreeMap::from([("distributions_end", e), ("distributions_begin", b), ("distributions_growth", growth)]),
        },
    )
}

/// AUDIT-27: CF inter-property = -Δ due-from + Δ due-to
pub(super) fn inter_property_change(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let due_from = vec!["DUE FROM".to_string()];
    let due_to: Vec<String> = input
        .patterns()
        .inter_property
        .iter()
        .filter(|p| p.as_str() != "DUE FROM")
        .cloned()
        .collect();
    let (fe, fb) = balances(&end, &begin, &due_from, &[]);
    let (te, tb) = balances(&end, &begin, &due_to, &["DUE FROM"]);
    let expected = match (delta(fe, fb), delta(te, tb)) {
        (None, None) => None,
        (f, t) => Some(t.unwrap_or_default() - f.unwrap_or_default()),
    };
    adjustment_tie(
        input,
        AdjustmentTie {
            label: "inter-property",
            formula: "CF Inter-Property = Δ Due To - Δ Due From",
            expected,
            category: AdjustmentCategory::InterProperty,
            severity: Severity::Medium,
            calcs: BTreeMap::from([
                ("due_from_end", fe),
                ("due_from_begin", fb),
                ("due_to_end", te),
                ("due_to_begin", tb),
            ]),
        },
    )
}

// ============================================================================
// PERFECT CIRCLES
// ============================================================================

fn perfect_circle(
    input: &RuleInput<'_>,
    label: &str,
    accumulated: &[String],
    expense: &[String],
) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let (e, b) = (balance(&end, accumulated, &[]), balance(&begin, accumulated, &[]));
    // Contra accounts are carried negative; growth in magnitude is the charge
    let growth = delta(e.map(|v| v.abs()), b.map(|v| v.abs()));

    let is = input.income_statement()?;
    let begin_is = input.begin_income_statement()?;
    let expensed = window_expense(input.ctx, &is, begin_is.as_deref(), expense, &["ACCUMULATED", "ACCUM"]);

    if growth.is_none() && expensed.is_none() {
        return input.skipped(format!("No accumulated {} or {} expense", label, label));
    }
    let growth_v = growth.unwrap_or_default();
    let expensed_v = expensed.unwrap_or_default();
    if is_quiet(&[growth_v, expensed_v], input.config.activity_floor) {
        return input.skipped(format!("No {} activity to reconcile", label));
    }

    let r = input
        .result()
        .values(expensed_v, growth_v)
        .within(input.config.delta_tolerance, Status::Warning)
        .severity(Severity::Medium)
        .formula(format!("IS {} expense (window) = Δ |Accumulated {}|", label, label))
        .calc("accumulated_end", e)
        .calc("accumulated_begin", b)
        .calc("accumulated_growth", growth)
        .calc("expense_over_window", expensed)
        .calc("window_months", input.ctx.window_months)
        .details(format!("{} expensed {} vs accumulated growth {}", label, expensed_v, growth_v));
    Ok(vec![r])
}

/// AUDIT-15
pub(super) fn depreciation_circle(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let p = input.patterns();
    perfect_circle(input, "depreciation", &p.accumulated_depreciation, &p.depreciation_expense)
}

/// AUDIT-16
pub(super) fn amortization_circle(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let p = input.patterns();
    perfect_circle(input, "amortization", &p.accumulated_amortization, &p.amortization_expense)
}

// ============================================================================
// PRINCIPAL PAYDOWN
// ============================================================================

/// AUDIT-21: begin debt - end debt = principal due x window
pub(super) fn principal_paydown(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some((end, begin)) = sheets(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let mortgages = input.mortgages()?;
    if mortgages.is_empty() {
        return input.skipped("No mortgage statement for this period");
    }
    let patterns = &input.patterns().mortgage;
    let (Some(end_debt), Some(begin_debt)) = (mortgage_debt(&end, patterns), mortgage_debt(&begin, patterns)) else {
        return input.skipped("Mortgage balance missing from the begin or current balance sheet");
    };

    let principal_due: Decimal = mortgages.iter().map(|m| m.principal_due).sum();
    let principal_applied = principal_due * input.ctx.window();
    let bs_reduction = begin_debt - end_debt;

    let r = input
        .result()
        .values(bs_reduction, principal_applied)
        .within(input.config.flow_tolerance(principal_applied), Status::Warning)
        .severity(Severity::High)
        .formula("Begin BS Mortgage - End BS Mortgage = Principal Due x Window Months")
        .calc("begin_bs_mortgage", begin_debt)
        .calc("end_bs_mortgage", end_debt)
        .calc("bs_reduction", bs_reduction)
        .calc("principal_due_monthly", principal_due)
        .calc("window_months", input.ctx.window_months)
        .calc("principal_applied", principal_applied)
        .details(format!("Debt fell {} against {} principal scheduled", bs_reduction, principal_applied));
    Ok(vec![r])
}

// ============================================================================
// YTD ACCUMULATION
// ============================================================================

/// AUDIT-33: YTD(current) = YTD(prior) + period(current); January YTD = period
pub(super) fn ytd_accumulation(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let is = input.income_statement()?;
    let with_ytd: Vec<&StatementLine> = is.iter().filter(|l| l.ytd_amount.is_some()).collect();
    if with_ytd.is_empty() {
        return input.skipped("Income statement carries no YTD column");
    }

    let fresh_year = match input.ctx.prior_period.as_ref() {
        Some(prior) if prior.year == input.ctx.end_year => {
            if months_between(prior, &input.ctx.period) != 1 {
                return input.skipped("Prior period is not the immediately preceding month");
            }
            false
        }
        Some(_) => true,
        None if input.ctx.end_month == 1 => true,
        None => return input.skipped("No prior period: earliest period on record"),
    };

    let prior_ytd: BTreeMap<String, Decimal> = if fresh_year {
        BTreeMap::new()
    } else {
        input
            .prior_income_statement()?
            .unwrap_or_default()
            .iter()
            .filter_map(|l| l.ytd_amount.map(|y| (line_key(l), y)))
            .collect()
    };

    let tolerance = input.config.delta_tolerance;
    let mut checked = 0usize;
    let mut actual_sum = Decimal::ZERO;
    let mut expected_sum = Decimal::ZERO;
    let mut mismatches: Vec<String> = Vec::new();

    for l in with_ytd {
        let ytd = l.ytd_amount.unwrap_or_default();
        let expected = if fresh_year {
            l.amount
        } else {
            match prior_ytd.get(&line_key(l)) {
                Some(p) => p + l.amount,
                None => continue,
            }
        };
        checked += 1;
        actual_sum += ytd;
        expected_sum += expected;
        if (ytd - expected).abs() > tolerance {
            mismatches.push(format!("{} (ytd {} vs expected {})", l.account_name, ytd, expected));
        }
    }

    if checked == 0 {
        return input.skipped("No accounts appear on both the current and prior income statements");
    }

    let status = if mismatches.is_empty() { Status::Pass } else { Status::Warning };
    let details = if mismatches.is_empty() {
        format!("{} accounts accumulate correctly", checked)
    } else {
        format!("YTD does not accumulate: {}", mismatches.join("; "))
    };
    let r = input
        .result()
        .values(actual_sum, expected_sum)
        .status(status)
        .severity(Severity::Medium)
        .formula("YTD(current) = YTD(prior) + Period(current)")
        .calc("fresh_year", fresh_year)
        .calc("accounts_checked", checked)
        .calc("mismatches", &mismatches)
        .calc("tolerance", tolerance)
        .details(details);
    Ok(vec![r])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Status;
    use crate::statements::{Adjustment, AdjustmentCategory, CashFlowHeader, MortgageStatement};
    use crate::store::{InMemoryStore, StatementLine};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn three_way(is_ni: Decimal, bs_end: Decimal, cf_ni: Decimal) -> InMemoryStore {
        let mut store = two_period_store(2025, 3);
        store
            .set_income_statement(PROPERTY, CURRENT, vec![StatementLine::total(None, "Net Income", is_ni)])
            .set_balance_sheet(PROPERTY, PRIOR, vec![StatementLine::detail(None, "Current Year Earnings", dec!(20000))])
            .set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(None, "Current Year Earnings", bs_end)])
            .set_cash_flow_header(
                PROPERTY,
                CURRENT,
                CashFlowHeader {
                    net_income: Some(cf_ni),
                    ..Default::default()
                },
            );
        store
    }

    #[test]
    fn test_three_way_tie_passes_when_all_agree() {
        let store = three_way(dec!(6000), dec!(26000), dec!(6000));
        let r = &run_one(&store, "AUDIT-3", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.difference, Some(Decimal::ZERO));
    }

    #[test]
    fn test_three_way_tie_perturbation_is_the_difference() {
        let store = three_way(dec!(6000), dec!(26000), dec!(6250));
        let r = &run_one(&store, "AUDIT-3", CURRENT)[0];
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.difference, Some(dec!(250)));
    }

    #[test]
    fn test_three_way_skips_on_earliest_period() {
        let store = three_way(dec!(6000), dec!(26000), dec!(6000));
        assert_eq!(run_one(&store, "AUDIT-3", PRIOR)[0].status, Status::Skip);
    }

    #[test]
    fn test_principal_paydown() {
        let mut store = two_period_store(2025, 1);
        store
            .set_balance_sheet(PROPERTY, PRIOR, vec![StatementLine::detail(Some("2610-0000"), "Wells Fargo", dec!(500000))])
            .set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(Some("2610-0000"), "Wells Fargo", dec!(490000))])
            .set_mortgage_statements(
                PROPERTY,
                CURRENT,
                vec![MortgageStatement {
                    principal_due: dec!(10000),
                    ..Default::default()
                }],
            );
        let r = &run_one(&store, "AUDIT-21", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.difference, Some(Decimal::ZERO));
        assert_eq!(r.intermediate_calculations["principal_applied"], serde_json::json!("10000"));
        assert_eq!(r.intermediate_calculations["bs_reduction"], serde_json::json!("10000"));
    }

    #[test]
    fn test_receivable_change_sign() {
        let mut store = two_period_store(2025, 1);
        store
            .set_balance_sheet(PROPERTY, PRIOR, vec![StatementLine::detail(None, "A/R Tenants", dec!(1000))])
            .set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(None, "A/R Tenants", dec!(1500))])
            .set_adjustments(
                PROPERTY,
                CURRENT,
                vec![Adjustment {
                    adjustment_name: "A/R Tenants".into(),
                    adjustment_category: AdjustmentCategory::ArChanges,
                    amount: dec!(-500),
                    is_increase: false,
                    related_property: None,
                    related_entity: None,
                    line_number: 1,
                    page: 1,
                }],
            );
        assert_eq!(run_one(&store, "AUDIT-17", CURRENT)[0].status, Status::Pass);
    }

    #[test]
    fn test_quiet_accounts_skip() {
        let mut store = two_period_store(2025, 1);
        store
            .set_balance_sheet(PROPERTY, PRIOR, vec![StatementLine::detail(None, "Accounts Payable", dec!(700))])
            .set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(None, "Accounts Payable", dec!(700))]);
        assert_eq!(run_one(&store, "AUDIT-23", CURRENT)[0].status, Status::Skip);
    }

    #[test]
    fn test_depreciation_circle() {
        let mut store = two_period_store(2025, 1);
        store
            .set_balance_sheet(PROPERTY, PRIOR, vec![StatementLine::detail(None, "Accumulated Depreciation", dec!(-12000))])
            .set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(None, "Accumulated Depreciation", dec!(-13000))])
            .set_income_statement(PROPERTY, CURRENT, vec![StatementLine::detail(None, "Depreciation Expense", dec!(1000)).below_the_line()]);
        let r = &run_one(&store, "AUDIT-15", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
    }

    #[test]
    fn test_ytd_accumulation() {
        let mut store = two_period_store(2025, 3);
        store
            .set_income_statement(PROPERTY, PRIOR, vec![StatementLine::detail(Some("4010-0000"), "Base Rent", dec!(10000)).with_ytd(dec!(20000))])
            .set_income_statement(PROPERTY, CURRENT, vec![StatementLine::detail(Some("4010-0000"), "Base Rent", dec!(10000)).with_ytd(dec!(31000))]);
        let r = &run_one(&store, "AUDIT-33", CURRENT)[0];
        assert_eq!(r.status, Status::Warning);
        assert_eq!(r.difference, Some(dec!(1000)));
    }
}
