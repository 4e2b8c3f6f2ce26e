use rust_decimal::Decimal;

use super::Check;
use crate::config::ValidationConfig;
use crate::statements::MortgageStatement;

pub(super) fn checks(statements: &[MortgageStatement], config: &ValidationConfig) -> Vec<(&'static str, Check)> {
    vec![
        ("ms_payment_composition", payment_composition(statements, config.tolerance_pct)),
        ("ms_principal_balance_positive", principal_balance_positive(statements)),
        ("ms_escrow_balances_non_negative", escrow_balances_non_negative(statements)),
        ("ms_implied_rate_range", implied_rate_range(statements, config)),
        ("ms_ytd_disbursements", ytd_disbursements(statements)),
    ]
}

fn label(m: &MortgageStatement, i: usize) -> String {
    m.loan_number.clone().unwrap_or_else(|| format!("statement {}", i + 1))
}

fn payment_composition(statements: &[MortgageStatement], tol: Decimal) -> Check {
    if statements.is_empty() {
        return Check::fail("No mortgage statement");
    }
    let components: Decimal = statements.iter().map(|m| m.component_sum()).sum();
    let total: Decimal = statements.iter().map(|m| m.total_payment_due).sum();
    Check::compare(total, components, tol)
}

fn principal_balance_positive(statements: &[MortgageStatement]) -> Check {
    if statements.is_empty() {
        return Check::fail("No mortgage statement");
    }
    let bad: Vec<String> = statements
        .iter()
        .enumerate()
        .filter(|(_, m)| m.principal_balance <= Decimal::ZERO)
        .map(|(i, m)| format!("{} ({})", label(m, i), m.principal_balance))
        .collect();
    Check::from_failures("Principal balance not positive", &bad)
}

fn escrow_balances_non_negative(statements: &[MortgageStatement]) -> Check {
    let mut negative = Vec::new();
    for (i, m) in statements.iter().enumerate() {
        for (name, value) in [
            ("tax escrow", m.tax_escrow_balance),
            ("insurance escrow", m.insurance_escrow_balance),
            ("reserve", m.reserve_balance),
        ] {
            if value < Decimal::ZERO {
                negative.push(format!("{} {} ({})", label(m, i), name, value));
            }
        }
    }
    Check::from_failures("Negative escrow balances", &negative)
}

fn implied_rate_range(statements: &[MortgageStatement], config: &ValidationConfig) -> Check {
    let principal: Decimal = statements.iter().map(|m| m.principal_balance).sum();
    let interest: Decimal = statements.iter().map(|m| m.interest_due).sum();
    if principal <= Decimal::ZERO || interest.is_zero() {
        return Check::note("Principal or interest not stated; rate not computed");
    }
    let rate = (interest * Decimal::from(12) / principal * Decimal::ONE_HUNDRED).round_dp(2);
    let check = if rate < config.implied_rate_min || rate > config.implied_rate_max {
        Check::fail(format!(
            "Implied rate {}% outside {}%-{}%",
            rate, config.implied_rate_min, config.implied_rate_max
        ))
    } else {
        Check::pass()
    };
    check.values(config.implied_rate_max, rate)
}

fn ytd_disbursements(statements: &[MortgageStatement]) -> Check {
    let tax: Decimal = statements.iter().map(|m| m.ytd_tax_disbursement).sum();
    let insurance: Decimal = statements.iter().map(|m| m.ytd_insurance_disbursement).sum();
    let reserve: Decimal = statements.iter().map(|m| m.ytd_reserve_disbursement).sum();
    Check::note(format!("YTD disbursed: tax {}, insurance {}, reserve {}", tax, insurance, reserve))
        .values(Decimal::ZERO, tax + insurance + reserve)
}
