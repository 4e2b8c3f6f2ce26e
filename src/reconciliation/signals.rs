// Signal rules. PASS here means "no trigger fired", not "verified correct";
// a WARNING carries the list of triggers for a reviewer to chase.

use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::figures::{amounts_by_key, balance, delta, line_key, net_income_line, percent, total_income_line};
use super::{ReconciliationResult, RuleInput, Severity, Status};
use crate::store::StatementLine;

fn triggered(
    input: &RuleInput<'_>,
    formula: &str,
    triggers: Vec<String>,
    checked: usize,
) -> ReconciliationResult {
    let status = if triggers.is_empty() { Status::Pass } else { Status::Warning };
    let details = if triggers.is_empty() {
        format!("No triggers across {} items", checked)
    } else {
        format!("{} trigger(s): {}", triggers.len(), triggers.join("; "))
    };
    input
        .result()
        .status(status)
        .severity(Severity::Low)
        .formula(formula)
        .calc("items_checked", checked)
        .calc("trigger_count", triggers.len())
        .calc("triggers", &triggers)
        .details(details)
}

/// Detail rows of `current` paired with the prior amount under the same key
fn paired<'a>(current: &'a [StatementLine], prior: &BTreeMap<String, Decimal>) -> Vec<(&'a StatementLine, Decimal)> {
    current
        .iter()
        .filter(|l| l.is_detail())
        .filter_map(|l| prior.get(&line_key(l)).map(|p| (l, *p)))
        .collect()
}

// ============================================================================
// MAGNITUDE
// ============================================================================

/// AUDIT-38: an account jumping by an order of magnitude (often a decimal or
/// sign slip in the source)
pub(super) fn magnitude_reasonability(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let (Some(prior_bs), Some(prior_is)) = (input.prior_balance_sheet()?, input.prior_income_statement()?) else {
        return input.skipped("No prior period: earliest period on record");
    };
    let bs = input.balance_sheet()?;
    let is = input.income_statement()?;

    let multiple = input.config.magnitude_multiple;
    let floor = input.config.variance_trigger_amount;
    let mut checked = 0usize;
    let mut triggers = Vec::new();
    for (lines, prior, label) in [(&bs, &prior_bs, "BS"), (&is, &prior_is, "IS")] {
        let before = amounts_by_key(prior);
        for (l, prev) in paired(lines, &before) {
            checked += 1;
            let (now, prev) = (l.amount.abs(), prev.abs());
            if (now - prev).abs() < floor {
                continue;
            }
            let grew = !prev.is_zero() && now >= prev * multiple;
            let shrank = !now.is_zero() && prev >= now * multiple;
            if grew || shrank {
                triggers.push(format!("{} {}: {} -> {}", label, l.account_name, prev, now));
            }
        }
    }
    if checked == 0 {
        return input.skipped("No accounts appear in both the current and prior period");
    }

    let r = triggered(input, "max(|current|, |prior|) < multiple x min(|current|, |prior|)", triggers, checked)
        .calc("magnitude_multiple", multiple)
        .calc("minimum_change", floor);
    Ok(vec![r])
}

// ============================================================================
// TIMING DIFFERENCES
// ============================================================================

/// AUDIT-41: working-capital swings large enough to explain a gap between
/// accrual income and cash
pub(super) fn timing_differences(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(begin) = input.begin_balance_sheet()? else {
        return input.skipped("No begin period to compare against");
    };
    let bs = input.balance_sheet()?;
    let is = input.income_statement()?;
    let Some(income) = total_income_line(&is).map(|l| l.amount.abs()) else {
        return input.skipped("Income statement total income missing");
    };
    let scale = income * input.ctx.window();
    let pct = input.config.variance_trigger_pct;
    let p = input.patterns();

    let swings = [
        ("receivables", delta(balance(&bs, &p.accounts_receivable, &["ALLOWANCE"]), balance(&begin, &p.accounts_receivable, &["ALLOWANCE"]))),
        ("payables", delta(balance(&bs, &p.accounts_payable, &[]), balance(&begin, &p.accounts_payable, &[]))),
        ("prepaid and accrued", delta(balance(&bs, &p.prepaid_accrued, &[]), balance(&begin, &p.prepaid_accrued, &[]))),
    ];

    let mut triggers = Vec::new();
    let mut swing_calcs: Vec<(String, Option<Decimal>)> = Vec::new();
    for (label, swing) in swings {
        swing_calcs.push((format!("{}_delta", label.replace(' ', "_")), swing));
        let Some(swing) = swing else { continue };
        if let Some(share) = percent(swing.abs(), scale) {
            if share >= pct && swing.abs() >= input.config.variance_trigger_amount {
                triggers.push(format!("{} moved {} ({}% of income)", label, swing, share));
            }
        }
    }

    let net_income = net_income_line(&is).map(|l| l.amount);
    let cash_change = input.ctx.has_cash_flow.then_some(input.ctx.cf_cash_delta);
    if let (Some(ni), Some(cash)) = (net_income, cash_change) {
        let gap = (ni * input.ctx.window() - cash).abs();
        if gap >= input.config.variance_trigger_amount {
            if let Some(share) = percent(gap, scale) {
                if share >= pct {
                    triggers.push(format!("net income and cash change differ by {}", gap));
                }
            }
        }
    }

    let mut r = triggered(input, "|Δ working capital| >= trigger % of income (and >= trigger amount)", triggers, swings.len())
        .calc("income_over_window", scale)
        .calc("net_income", net_income)
        .calc("cash_change", cash_change)
        .calc("trigger_pct", pct);
    for (k, v) in &swing_calcs {
        r = r.calc(k, v);
    }
    Ok(vec![r])
}

// ============================================================================
// VARIANCE
// ============================================================================

/// AUDIT-48: income-statement lines whose period-over-period change exceeds
/// both the percentage and the dollar trigger
pub(super) fn variance_triggers(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(prior) = input.prior_income_statement()? else {
        return input.skipped("No prior period: earliest period on record");
    };
    let is = input.income_statement()?;
    if is.is_empty() || prior.is_empty() {
        return input.skipped("Income statement missing for the current or prior period");
    }

    let pct_trigger = input.config.variance_trigger_pct;
    let amount_trigger = input.config.variance_trigger_amount;
    let before = amounts_by_key(&prior);
    let mut triggers = Vec::new();
    let mut checked = 0usize;
    for l in is.iter().filter(|l| l.is_detail()) {
        checked += 1;
        let prev = before.get(&line_key(l)).copied().unwrap_or_default();
        let change = l.amount - prev;
        if change.abs() < amount_trigger {
            continue;
        }
        match percent(change.abs(), prev.abs()) {
            Some(p) if p >= pct_trigger => {
                triggers.push(format!("{}: {} -> {} ({}%)", l.account_name, prev, l.amount, p));
            }
            None => triggers.push(format!("{}: new activity {}", l.account_name, l.amount)),
            _ => {}
        }
    }

    let r = triggered(input, "|Δ| >= trigger amount AND |Δ| / |prior| >= trigger %", triggers, checked)
        .calc("trigger_pct", pct_trigger)
        .calc("trigger_amount", amount_trigger);
    Ok(vec![r])
}
