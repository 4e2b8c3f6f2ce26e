// Structural rules: presence, sign and stability scans rather than numeric ties.

use anyhow::Result;
use rust_decimal::Decimal;

use super::figures::{amounts_by_key, line_key, mortgage_debt, percent, sum_matching_abs};
use super::{ReconciliationResult, RuleInput, Severity, Status};
use crate::classifier::ASSETS;
use crate::patterns::code_prefix;
use crate::statements::MortgageStatement;
use crate::store::{sum_matching, StatementLine};

// ============================================================================
// CONSTANT ACCOUNTS
// ============================================================================

/// AUDIT-28: accounts that should not move period to period (land, contributed capital)
pub(super) fn constant_accounts(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(prior) = input.prior_balance_sheet()? else {
        return input.skipped("No prior period: earliest period on record");
    };
    let patterns = &input.patterns().constant_accounts;
    let current: Vec<StatementLine> = input
        .balance_sheet()?
        .into_iter()
        .filter(|l| l.is_detail() && l.name_matches(patterns))
        .collect();
    if current.is_empty() {
        return input.skipped("No constant accounts on the balance sheet");
    }

    let before = amounts_by_key(&prior);
    let tolerance = input.config.delta_tolerance;
    let mut compared = 0usize;
    let mut now_sum = Decimal::ZERO;
    let mut before_sum = Decimal::ZERO;
    let mut moved = Vec::new();
    for l in &current {
        let Some(prev) = before.get(&line_key(l)) else {
            continue;
        };
        compared += 1;
        now_sum += l.amount;
        before_sum += prev;
        if (l.amount - prev).abs() > tolerance {
            moved.push(format!("{}: {} -> {}", l.account_name, prev, l.amount));
        }
    }
    if compared == 0 {
        return input.skipped("Constant accounts do not appear on the prior balance sheet");
    }

    let status = if moved.is_empty() { Status::Pass } else { Status::Warning };
    let r = input
        .result()
        .values(now_sum, before_sum)
        .status(status)
        .severity(Severity::Medium)
        .formula("Constant account balance(current) = balance(prior)")
        .calc("accounts_compared", compared)
        .calc("changed_accounts", &moved)
        .calc("tolerance", tolerance)
        .details(if moved.is_empty() {
            format!("{} constant accounts unchanged", compared)
        } else {
            format!("Constant accounts moved: {}", moved.join("; "))
        });
    Ok(vec![r])
}

// ============================================================================
// OCCUPANCY
// ============================================================================

/// AUDIT-30: rent-roll occupancy vs economic occupancy implied by vacancy loss
pub(super) fn occupancy_consistency(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let units: Vec<_> = input
        .rent_roll()?
        .into_iter()
        .filter(|e| !e.is_gross_rent_row)
        .collect();
    if units.is_empty() {
        return input.skipped("No rent roll for this period");
    }

    let occupied = units.iter().filter(|e| !e.is_vacant()).count();
    let total_area: Decimal = units.iter().filter_map(|e| e.unit_area_sqft).sum();
    let occupied_area: Decimal = units
        .iter()
        .filter(|e| !e.is_vacant())
        .filter_map(|e| e.unit_area_sqft)
        .sum();
    let all_have_area = units.iter().all(|e| e.unit_area_sqft.is_some());
    let rent_roll_occupancy = if all_have_area && !total_area.is_zero() {
        percent(occupied_area, total_area)
    } else {
        percent(Decimal::from(occupied), Decimal::from(units.len()))
    }
    .unwrap_or_default();

    let is = input.income_statement()?;
    let p = input.patterns();
    let vacancy = sum_matching_abs(&is, &p.vacancy, &[]);
    let base_rent = sum_matching(&is, &p.base_rent, &["VACANCY"]);

    let (Some(vacancy), Some(base_rent)) = (vacancy, base_rent) else {
        let r = input
            .result()
            .status(Status::Info)
            .severity(Severity::Low)
            .formula("Rent Roll Occupancy % ≈ 100 - Vacancy Loss / Gross Potential Rent x 100")
            .calc("rent_roll_occupancy_pct", rent_roll_occupancy)
            .calc("units", units.len())
            .calc("occupied_units", occupied)
            .details(format!("Rent roll occupancy {}%; no vacancy line to compare", rent_roll_occupancy));
        return Ok(vec![r]);
    };

    let potential = base_rent.abs() + vacancy;
    let Some(vacancy_pct) = percent(vacancy, potential) else {
        return input.skipped("No gross potential rent to measure vacancy against");
    };
    let reported_occupancy = Decimal::ONE_HUNDRED - vacancy_pct;

    let r = input
        .result()
        .values(rent_roll_occupancy, reported_occupancy)
        .within(input.config.occupancy_tolerance_pct, Status::Warning)
        .severity(Severity::Low)
        .formula("Rent Roll Occupancy % ≈ 100 - Vacancy Loss / Gross Potential Rent x 100")
        .calc("rent_roll_occupancy_pct", rent_roll_occupancy)
        .calc("units", units.len())
        .calc("occupied_units", occupied)
        .calc("total_area_sqft", total_area)
        .calc("occupied_area_sqft", occupied_area)
        .calc("vacancy_loss", vacancy)
        .calc("base_rent", base_rent)
        .calc("vacancy_pct", vacancy_pct)
        .details(format!(
            "Rent roll {}% occupied vs {}% implied by vacancy loss",
            rent_roll_occupancy, reported_occupancy
        ));
    Ok(vec![r])
}

// ============================================================================
// NEGATIVE BALANCES
// ============================================================================

const CONTRA_ACCOUNTS: &[&str] = &["ACCUM", "A/D", "ALLOWANCE", "DEPRECIATION", "AMORTIZATION", "DISTRIBUTION"];

fn is_asset(line: &StatementLine) -> bool {
    if let Some(category) = &line.category {
        return category == ASSETS;
    }
    line.account_code
        .as_deref()
        .and_then(code_prefix)
        .map(|p| p < 2000)
        .unwrap_or(false)
}

/// AUDIT-37: asset and cash accounts carried below zero
pub(super) fn negative_balances(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let bs = input.balance_sheet()?;
    let cash_accounts = input.cash_accounts()?;
    if bs.is_empty() && cash_accounts.is_empty() {
        return input.skipped("No balance sheet or cash account rows for this period");
    }

    let cash_patterns = &input.patterns().cash;
    let upper_contra = |l: &StatementLine| {
        let upper = l.account_name.to_uppercase();
        CONTRA_ACCOUNTS.iter().any(|c| upper.contains(c))
    };
    let mut found: Vec<String> = bs
        .iter()
        .filter(|l| l.is_detail() && l.amount < Decimal::ZERO)
        .filter(|l| (is_asset(l) || l.name_matches(cash_patterns)) && !upper_contra(l))
        .map(|l| format!("{} ({})", l.account_name, l.amount))
        .collect();
    found.extend(
        cash_accounts
            .iter()
            .filter(|c| !c.is_total_row && (c.is_negative_balance || c.ending_balance < Decimal::ZERO))
            .map(|c| format!("{} cash account ({})", c.account_name, c.ending_balance)),
    );

    let status = if found.is_empty() { Status::Pass } else { Status::Warning };
    let r = input
        .result()
        .status(status)
        .severity(Severity::High)
        .formula("Asset and cash balances >= 0 (contra accounts excepted)")
        .calc("negative_accounts", &found)
        .calc("balance_sheet_rows", bs.len())
        .calc("cash_account_rows", cash_accounts.len())
        .details(if found.is_empty() {
            "No negative asset or cash balances".to_string()
        } else {
            format!("Negative balances: {}", found.join("; "))
        });
    Ok(vec![r])
}

// ============================================================================
// DISBURSEMENT MONOTONICITY
// ============================================================================

const YTD_FIELDS: [(&str, fn(&MortgageStatement) -> Decimal); 5] = [
    ("ytd_principal_paid", |m| m.ytd_principal_paid),
    ("ytd_interest_paid", |m| m.ytd_interest_paid),
    ("ytd_tax_disbursement", |m| m.ytd_tax_disbursement),
    ("ytd_insurance_disbursement", |m| m.ytd_insurance_disbursement),
    ("ytd_reserve_disbursement", |m| m.ytd_reserve_disbursement),
];

/// AUDIT-39: lender YTD totals never decrease within a calendar year
pub(super) fn disbursement_monotonicity(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let Some(prior_period) = input.ctx.prior_period.as_ref() else {
        return input.skipped("No prior period: earliest period on record");
    };
    if prior_period.year != input.ctx.end_year {
        return input.skipped("Prior period is in a different year; YTD totals reset");
    }
    let current = input.mortgages()?;
    let prior = input.prior_mortgages()?.unwrap_or_default();
    if current.is_empty() || prior.is_empty() {
        return input.skipped("Mortgage statement missing for the current or prior period");
    }

    let tolerance = input.config.delta_tolerance;
    let mut r = input.result();
    let mut decreased = Vec::new();
    for (name, field) in YTD_FIELDS {
        let now: Decimal = current.iter().map(field).sum();
        let before: Decimal = prior.iter().map(field).sum();
        if now + tolerance < before {
            decreased.push(format!("{} fell {} -> {}", name, before, now));
        }
        r = r.calc(&format!("{}_current", name), now).calc(&format!("{}_prior", name), before);
    }

    let status = if decreased.is_empty() { Status::Pass } else { Status::Warning };
    let r = r
        .status(status)
        .severity(Severity::Medium)
        .formula("Lender YTD(current) >= Lender YTD(prior) within a year")
        .calc("tolerance", tolerance)
        .details(if decreased.is_empty() {
            "Lender YTD totals are non-decreasing".to_string()
        } else {
            decreased.join("; ")
        });
    Ok(vec![r])
}

// ============================================================================
// COMPLETENESS
// ============================================================================

/// AUDIT-40: every statement the other rules need is on file
pub(super) fn completeness(input: &RuleInput<'_>) -> Result<Vec<ReconciliationResult>> {
    let bs = input.balance_sheet()?;
    let is = input.income_statement()?;
    let cf_present = input.ctx.has_cash_flow || !input.cash_flow()?.is_empty();
    let mortgages = input.mortgages()?;
    let rent_roll = input.rent_roll()?;
    let carries_debt = mortgage_debt(&bs, &input.patterns().mortgage).is_some();

    let mut missing = Vec::new();
    if bs.is_empty() {
        missing.push("balance sheet");
    }
    if is.is_empty() {
        missing.push("income statement");
    }
    if !cf_present {
        missing.push("cash flow statement");
    }
    if carries_debt && mortgages.is_empty() {
        missing.push("mortgage statement");
    }

    let status = if missing.is_empty() { Status::Pass } else { Status::Warning };
    let r = input
        .result()
        .status(status)
        .severity(Severity::High)
        .formula("Balance sheet, income statement and cash flow present; mortgage statement when debt is carried")
        .calc("balance_sheet_rows", bs.len())
        .calc("income_statement_rows", is.len())
        .calc("cash_flow_present", cf_present)
        .calc("mortgage_statements", mortgages.len())
        .calc("rent_roll_rows", rent_roll.len())
        .calc("balance_sheet_debt", carries_debt)
        .calc("missing", &missing)
        .details(if missing.is_empty() {
            "All core statements present".to_string()
        } else {
            format!("Missing: {}", missing.join(", "))
        });
    Ok(vec![r])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Status;
    use crate::statements::{MortgageStatement, OccupancyStatus, RentRollEntry};
    use crate::store::StatementLine;
    use rust_decimal_macros::dec;

    #[test]
    fn test_constant_account_moved() {
        let mut store = two_period_store(2025, 3);
        store
            .set_balance_sheet(PROPERTY, PRIOR, vec![StatementLine::detail(Some("0510-0000"), "Land", dec!(250000))])
            .set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(Some("0510-0000"), "Land", dec!(260000))]);
        let r = &run_one(&store, "AUDIT-28", CURRENT)[0];
        assert_eq!(r.status, Status::Warning);
        assert_eq!(r.difference, Some(dec!(10000)));
    }

    #[test]
    fn test_negative_cash_flagged_but_contra_ignored() {
        let mut store = two_period_store(2025, 3);
        store.set_balance_sheet(
            PROPERTY,
            CURRENT,
            vec![
                StatementLine::detail(Some("0610-0000"), "Accumulated Depreciation", dec!(-50000)),
                StatementLine::detail(Some("0122-0000"), "Cash - Operating", dec!(2500)),
            ],
        );
        assert_eq!(run_one(&store, "AUDIT-37", CURRENT)[0].status, Status::Pass);

        store.set_balance_sheet(PROPERTY, CURRENT, vec![StatementLine::detail(Some("0122-0000"), "Cash - Operating", dec!(-10))]);
        assert_eq!(run_one(&store, "AUDIT-37", CURRENT)[0].status, Status::Warning);
    }

    #[test]
    fn test_ytd_disbursement_decrease_warns() {
        let mut store = two_period_store(2025, 3);
        store
            .set_mortgage_statements(
                PROPERTY,
                PRIOR,
                vec![MortgageStatement {
                    ytd_tax_disbursement: dec!(9000),
                    ..Default::default()
                }],
            )
            .set_mortgage_statements(
                PROPERTY,
                CURRENT,
                vec![MortgageStatement {
                    ytd_tax_disbursement: dec!(4000),
                    ..Default::default()
                }],
            );
        assert_eq!(run_one(&store, "AUDIT-39", CURRENT)[0].status, Status::Warning);

        // January resets the year
        let mut store = two_period_store(2025, 1);
        store
            .set_mortgage_statements(PROPERTY, PRIOR, vec![MortgageStatement::default()])
            .set_mortgage_statements(PROPERTY, CURRENT, vec![MortgageStatement::default()]);
        assert_eq!(run_one(&store, "AUDIT-39", CURRENT)[0].status, Status::Skip);
    }

    #[test]
    fn test_completeness_warns_never_fails() {
        let store = two_period_store(2025, 3);
        let r = &run_one(&store, "AUDIT-40", CURRENT)[0];
        assert_eq!(r.status, Status::Warning);
        assert!(r.details.contains("balance sheet"));
    }

    #[test]
    fn test_occupancy_against_vacancy_loss() {
        let mut occupied = RentRollEntry::new(1, "101", 1);
        occupied.unit_area_sqft = Some(dec!(900));
        let mut vacant = RentRollEntry::new(2, "102", 1);
        vacant.unit_area_sqft = Some(dec!(100));
        vacant.occupancy_status = OccupancyStatus::Vacant;

        let mut store = two_period_store(2025, 3);
        store.set_rent_roll(PROPERTY, CURRENT, vec![occupied, vacant]).set_income_statement(
            PROPERTY,
            CURRENT,
            vec![
                StatementLine::detail(Some("4010-0000"), "Base Rentals", dec!(9000)),
                StatementLine::detail(Some("4090-0000"), "Vacancy Loss", dec!(-1000)),
            ],
        );
        let r = &run_one(&store, "AUDIT-30", CURRENT)[0];
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.difference, Some(dec!(0)));
    }
}
