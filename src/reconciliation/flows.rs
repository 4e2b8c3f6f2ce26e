// Cross-statement flow rules: money that moves through more than one
// statement over the context window (expense accrued, lender disbursement,
// balance-sheet change, cash-flow line).

use anyhow::Result;
use rust_decimal::Decimal;

use super::figures::{
    adjustments_total, balance, delta, is_quiet, max_pairwise_deviation, window_expense, ytd_change,
};
use super::{ReconciliationResult, RuleInput, Severity, Status};
use crate::statements::{AdjustmentCategory, MortgageStatement};
use crate::store::StatementLine;

const NO_BEGIN: &str = "No begin period to compare against";

/// Everything a flow rule reads: both balance sheets, the current income
/// statement, and lender statements at both ends of the window
struct WindowData {
    end_bs: Vec<StatementLine>,
    begin_bs: Vec<StatementLine>,
    is: Vec<StatementLine>,
    begin_is: Option<Vec<StatementLine>>,
    mortgages: Vec<MortgageStatement>,
    begin_mortgages: Vec<MortgageStatement>,
}

impl WindowData {
    fn load(input: &RuleInput<'_>) -> Result<Option<Self>> {
        let Some(begin_bs) = input.begin_balance_sheet()? else {
            return Ok(None);
        };
        Ok(Some(WindowData {
            end_bs: input.balance_sheet()?,
            begin_bs,
            is: input.income_statement()?,
            begin_is: input.begin_income_statement()?,
            mortgages: input.mortgages()?,
            begin_mortgages: input.begin_mortgages()?.unwrap_or_default(),
        }))
    }

    fn bs_delta(&self, include: &[String], exclude: &[&str]) -> Option<Decimal> {
        delta(balance(&self.end_bs, include, exclude), balance(&self.begin_bs, include, exclude))
    }

    fn expense(&self, input: &RuleInput<'_>, include: &[String], exclude: &[&str]) -> Option<Decimal> {
        window_expense(input.ctx, &self.is, self.begin_is.as_deref(), include, exclude)
    }

    fn disbursed(&self, input: &RuleInput<'_>, field: fn(&MortgageStatement) -> Decimal) -> Decimal {
        ytd_change(input.ctx, &self.mortgages, &self.begin_mortgages, field)
    }

    fn billed(&self, input: &RuleInput<'_>, field: fn(&MortgageStatement) -> Decimal) -> Decimal {
        self.mortgages.iter().map(field).sum::<Decimal>() * input.ctx.window()
    }
}

// ============================================================================
// PROPERTY TAX
// ============================================================================

/// AUDIT-13: tax expensed = tax disbursed by lender + Δ accrued tax
pub(super) fn property_tax_flow(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(w) = WindowData::load(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let p = input.patterns();
    let Some(expensed) = w.expense(input, &p.property_tax_expense, &["ESCROW", "ACCRUED"]) else {
        return input.skipped("No property tax expense on the income statement");
    };
    let accrued_delta = w.bs_delta(&p.accrued_tax, &[]);
    if w.mortgages.is_empty() && accrued_delta.is_none() {
        return input.skipped("No lender disbursements or accrued tax account to trace the expense");
    }
    let disbursed = w.disbursed(input, |m| m.ytd_tax_disbursement);
    let explained = disbursed + accrued_delta.unwrap_or_default();
    if is_quiet(&[expensed, explained], input.config.activity_floor) {
        return input.skipped("No property tax activity to reconcile");
    }

    let r = input
        .result()
        .values(expensed, explained)
        .within(input.config.flow_tolerance(expensed), Status::Warning)
        .severity(Severity::Medium)
        .formula("IS Property Tax (window) = Lender Tax Disbursed (window) + Δ Accrued Tax")
        .calc("tax_expensed", expensed)
        .calc("tax_disbursed", disbursed)
        .calc("accrued_tax_delta", accrued_delta)
        .calc("window_months", input.ctx.window_months)
        .details(format!("Expensed {} vs disbursed {} plus accrual change {}", expensed, disbursed, accrued_delta.unwrap_or_default()));
    Ok(vec![r])
}

// ============================================================================
// PREPAID INSURANCE
// ============================================================================

/// AUDIT-14: Δ prepaid insurance = premiums paid - insurance expensed
pub(super) fn prepaid_insurance_cycle(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(w) = WindowData::load(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let p = input.patterns();
    let Some(prepaid_delta) = w.bs_delta(&p.prepaid_insurance, &[]) else {
        return input.skipped("No prepaid insurance account on the balance sheet");
    };
    let expensed = w.expense(input, &p.insurance_expense, &["ESCROW", "PREPAID"]).unwrap_or_default();
    let paid = w.disbursed(input, |m| m.ytd_insurance_disbursement);
    let expected = paid - expensed;
    if is_quiet(&[prepaid_delta, expected], input.config.activity_floor) {
        return input.skipped("No insurance activity to reconcile");
    }

    let r = input
        .result()
        .values(prepaid_delta, expected)
        .within(input.config.flow_tolerance(expensed), Status::Warning)
        .severity(Severity::Medium)
        .formula("Δ Prepaid Insurance = Insurance Paid (window) - IS Insurance (window)")
        .calc("prepaid_insurance_delta", prepaid_delta)
        .calc("insurance_paid", paid)
        .calc("insurance_expensed", expensed)
        .calc("window_months", input.ctx.window_months)
        .details(format!("Prepaid moved {} against paid {} less expensed {}", prepaid_delta, paid, expensed));
    Ok(vec![r])
}

// ============================================================================
// CAPEX AND RESERVES
// ============================================================================

const FIXED_ASSET_EXCLUDES: &[&str] = &["ACCUM", "DEPRECIATION", "A/D", "RESERVE", "ESCROW"];

/// AUDIT-18: CF property & equipment = -Δ gross fixed assets
pub(super) fn capex_flow(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(w) = WindowData::load(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let fixed_delta = w.bs_delta(&input.patterns().fixed_assets, FIXED_ASSET_EXCLUDES);
    let reported = adjustments_total(&input.adjustments()?, AdjustmentCategory::PropertyEquipment);
    if fixed_delta.is_none() && reported.is_none() {
        return input.skipped("No fixed asset accounts or property & equipment cash flow");
    }
    let expected = -fixed_delta.unwrap_or_default();
    let reported_value = reported.unwrap_or_default();
    if is_quiet(&[expected, reported_value], input.config.activity_floor) {
        return input.skipped("No capital expenditure activity to reconcile");
    }

    let r = input
        .result()
        .values(reported_value, expected)
        .within(input.config.flow_tolerance(expected), Status::Warning)
        .severity(Severity::Medium)
        .formula("CF Property & Equipment = -(End Fixed Assets - Begin Fixed Assets)")
        .calc("fixed_assets_delta", fixed_delta)
        .calc("expected_cash_impact", expected)
        .calc("cf_property_equipment", reported)
        .details(format!("Fixed assets grew {} while cash flow shows {}", fixed_delta.unwrap_or_default(), reported_value));
    Ok(vec![r])
}

/// AUDIT-19: Δ reserve balance = reserve deposits billed - reserve disbursed
pub(super) fn reserve_funding(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(w) = WindowData::load(input)? else {
        return input.skipped(NO_BEGIN);
    };
    if w.mortgages.is_empty() {
        return input.skipped("No mortgage statement for this period");
    }
    let Some(reserve_delta) = w.bs_delta(&input.patterns().reserve_escrow, &[]) else {
        return input.skipped("No replacement reserve account on the balance sheet");
    };
    let deposited = w.billed(input, |m| m.reserve_due);
    let disbursed = w.disbursed(input, |m| m.ytd_reserve_disbursement);
    let expected = deposited - disbursed;
    if is_quiet(&[reserve_delta, expected], input.config.activity_floor) {
        return input.skipped("No reserve activity to reconcile");
    }

    let r = input
        .result()
        .values(reserve_delta, expected)
        .within(input.config.flow_tolerance(deposited), Status::Warning)
        .severity(Severity::Medium)
        .formula("Δ BS Reserve = Reserve Due x Window - Reserve Disbursed (window)")
        .calc("reserve_delta", reserve_delta)
        .calc("reserve_deposited", deposited)
        .calc("reserve_disbursed", disbursed)
        .calc("window_months", input.ctx.window_months)
        .details(format!("Reserve moved {} against {} deposited less {} drawn", reserve_delta, deposited, disbursed));
    Ok(vec![r])
}

/// AUDIT-20: reserve draws should be matched by capital spending
pub(super) fn reserve_draw_to_capex(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(w) = WindowData::load(input)? else {
        return input.skipped(NO_BEGIN);
    };
    if w.mortgages.is_empty() {
        return input.skipped("No mortgage statement for this period");
    }
    let draws = w.disbursed(input, |m| m.ytd_reserve_disbursement);
    if is_quiet(&[draws], input.config.activity_floor) {
        let r = input
            .result()
            .status(Status::Info)
            .severity(Severity::Low)
            .formula("Reserve Draws <= CapEx (window)")
            .calc("reserve_draws", draws)
            .details("No reserve draws in the window");
        return Ok(vec![r]);
    }

    let fixed_growth = w.bs_delta(&input.patterns().fixed_assets, FIXED_ASSET_EXCLUDES);
    let cf_capex = adjustments_total(&input.adjustments()?, AdjustmentCategory::PropertyEquipment).map(|c| -c);
    let capex = fixed_growth.or(cf_capex).unwrap_or_default().max(Decimal::ZERO);
    let tolerance = input.config.flow_tolerance(draws);
    let status = if draws > capex + tolerance { Status::Warning } else { Status::Pass };

    let r = input
        .result()
        .values(draws, capex)
        .status(status)
        .severity(Severity::Medium)
        .formula("Reserve Draws <= CapEx (window)")
        .calc("reserve_draws", draws)
        .calc("fixed_assets_growth", fixed_growth)
        .calc("cf_capex", cf_capex)
        .calc("capex", capex)
        .calc("tolerance", tolerance)
        .details(if status == Status::Pass {
            format!("Draws {} covered by capital spending {}", draws, capex)
        } else {
            format!("Draws {} exceed capital spending {}", draws, capex)
        });
    Ok(vec![r])
}

// ============================================================================
// ESCROW ACTIVITY
// ============================================================================

/// AUDIT-22: escrow balance change seen three ways
pub(super) fn escrow_activity(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(w) = WindowData::load(input)? else {
        return input.skipped(NO_BEGIN);
    };
    let p = input.patterns();
    let escrow_patterns: Vec<String> = p
        .tax_escrow
        .iter()
        .chain(&p.insurance_escrow)
        .chain(&p.reserve_escrow)
        .cloned()
        .collect();
    let bs_delta = w.bs_delta(&escrow_patterns, &[]);

    let lender_net = if w.mortgages.is_empty() {
        None
    } else {
        let deposits = w.billed(input, |m| m.tax_escrow_due + m.insurance_escrow_due + m.reserve_due);
        let disbursed = w.disbursed(input, |m| {
            m.ytd_tax_disbursement + m.ytd_insurance_disbursement + m.ytd_reserve_disbursement
        });
        Some(deposits - disbursed)
    };

    // Escrow is an asset: an increase is a cash outflow on the CF
    let cf_escrow = adjustments_total(&input.adjustments()?, AdjustmentCategory::EscrowAccounts).map(|c| -c);

    let sources: Vec<Decimal> = [bs_delta, lender_net, cf_escrow].into_iter().flatten().collect();
    if sources.len() < 2 {
        return input.skipped("Need at least two of BS escrow change, lender activity, CF escrow line");
    }
    if is_quiet(&sources, input.config.activity_floor) {
        return input.skipped("No escrow activity to reconcile");
    }

    let deviation = max_pairwise_deviation(&sources);
    let source = bs_delta.or(lender_net).unwrap_or_default();
    let target = if bs_delta.is_some() { lender_net.or(cf_escrow) } else { cf_escrow }.unwrap_or_default();
    let scale = sources.iter().map(|v| v.abs()).max().unwrap_or_default();
    let tolerance = input.config.flow_tolerance(scale);
    let status = if deviation <= tolerance { Status::Pass } else { Status::Warning };

    let r = input
        .result()
        .values(source, target)
        .difference(deviation)
        .status(status)
        .severity(Severity::Medium)
        .formula("Δ BS Escrow = Lender Deposits - Lender Disbursements = -CF Escrow")
        .calc("bs_escrow_delta", bs_delta)
        .calc("lender_net_activity", lender_net)
        .calc("cf_escrow_change", cf_escrow)
        .calc("window_months", input.ctx.window_months)
        .calc("max_pairwise_deviation", deviation)
        .calc("tolerance", tolerance)
        .details(format!("{} escrow views differ by at most {}", sources.len(), deviation));
    Ok(vec![r])
}
