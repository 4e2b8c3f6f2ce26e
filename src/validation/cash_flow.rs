use rust_decimal::Decimal;

use super::{round_numbers, Check};
use crate::config::ValidationConfig;
use crate::statements::{Adjustment, CashAccountReconciliationRow, CashFlowHeader};

/// The parts of one cash-flow upload the checks read
pub(super) struct CashFlowDocument {
    pub header: Option<CashFlowHeader>,
    pub adjustments: Vec<Adjustment>,
    pub cash_accounts: Vec<CashAccountReconciliationRow>,
}

impl CashFlowDocument {
    fn accounts(&self) -> impl Iterator<Item = &CashAccountReconciliationRow> {
        self.cash_accounts.iter().filter(|c| !c.is_total_row)
    }
}

pub(super) fn checks(doc: &CashFlowDocument, config: &ValidationConfig) -> Vec<(&'static str, Check)> {
    let tol = config.tolerance_pct;
    let amounts = doc
        .adjustments
        .iter()
        .map(|a| a.amount)
        .chain(doc.accounts().map(|c| c.ending_balance));
    vec![
        ("cf_cash_roll_forward", cash_roll_forward(doc, tol)),
        ("cf_cash_account_differences", cash_account_differences(doc, tol)),
        ("cf_ending_cash_accounts_total", ending_cash_accounts_total(doc, tol)),
        ("cf_negative_cash_accounts", negative_cash_accounts(doc)),
        ("cf_adjustments_present", adjustments_present(doc)),
        ("cf_round_numbers", round_numbers(amounts, config)),
    ]
}

fn cash_roll_forward(doc: &CashFlowDocument, tol: Decimal) -> Check {
    let Some(header) = &doc.header else {
        return Check::fail("Cash flow summary not found");
    };
    let (Some(beginning), Some(ending)) = (header.beginning_cash_balance, header.ending_cash_balance) else {
        return Check::fail("Beginning or ending cash not stated");
    };
    // Without a stated net change, the account rows supply it
    let net_change = header.net_change_in_cash.or_else(|| {
        let rows: Vec<_> = doc.accounts().collect();
        (!rows.is_empty()).then(|| rows.iter().map(|c| c.difference).sum())
    });
    match net_change {
        Some(change) => Check::compare(ending, beginning + change, tol),
        None => Check::fail("Net change in cash not stated"),
    }
}

fn cash_account_differences(doc: &CashFlowDocument, tol: Decimal) -> Check {
    let mut wrong = Vec::new();
    for c in doc.accounts() {
        let check = Check::compare(c.ending_balance - c.beginning_balance, c.difference, tol);
        if !check.passed {
            wrong.push(format!(
                "{}: {} - {} != {}",
                c.account_name, c.ending_balance, c.beginning_balance, c.difference
            ));
        }
    }
    Check::from_failures("Account differences do not roll", &wrong)
}

fn ending_cash_accounts_total(doc: &CashFlowDocument, tol: Decimal) -> Check {
    let rows: Vec<_> = doc.accounts().collect();
    if rows.is_empty() {
        return Check::note("No cash account rows");
    }
    let total: Decimal = rows.iter().map(|c| c.ending_balance).sum();
    let stated = doc
        .header
        .as_ref()
        .and_then(|h| h.ending_cash_balance)
        .or_else(|| doc.cash_accounts.iter().find(|c| c.is_total_row).map(|c| c.ending_balance));
    match stated {
        Some(ending) => Check::compare(ending, total, tol),
        None => Check::fail("Ending cash not stated"),
    }
}

fn negative_cash_accounts(doc: &CashFlowDocument) -> Check {
    let negative: Vec<String> = doc
        .accounts()
        .filter(|c| c.is_negative_balance || c.ending_balance < Decimal::ZERO)
        .map(|c| format!("{} ({})", c.account_name, c.ending_balance))
        .collect();
    Check::from_failures("Negative cash accounts", &negative)
}

fn adjustments_present(doc: &CashFlowDocument) -> Check {
    if doc.adjustments.is_empty() {
        Check::fail("No adjustments section")
    } else {
        Check::pass().values(Decimal::ONE, Decimal::from(doc.adjustments.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::CashAccountType;
    use rust_decimal_macros::dec;

    fn account(name: &str, beginning: Decimal, ending: Decimal, difference: Decimal) -> CashAccountReconciliationRow {
        CashAccountReconciliationRow {
            account_name: name.to_string(),
            account_type: CashAccountType::Operating,
            beginning_balance: beginning,
            ending_balance: ending,
            difference,
            is_escrow_account: false,
            is_negative_balance: ending < Decimal::ZERO,
            is_total_row: false,
        }
    }

    fn result<'a>(results: &'a [(&'static str, Check)], name: &str) -> &'a Check {
        &results.iter().find(|(n, _)| *n == name).unwrap().1
    }

    #[test]
    fn test_roll_forward_from_account_rows() {
        let doc = CashFlowDocument {
            header: Some(CashFlowHeader {
                beginning_cash_balance: Some(dec!(20000)),
                ending_cash_balance: Some(dec!(26500)),
                ..Default::default()
            }),
            adjustments: vec![],
            cash_accounts: vec![
                account("Operating", dec!(15000), dec!(19000), dec!(4000)),
                account("Tax Escrow", dec!(5000), dec!(7500), dec!(2500)),
            ],
        };
        let results = checks(&doc, &ValidationConfig::default());
        assert!(result(&results, "cf_cash_roll_forward").passed);
        assert!(result(&results, "cf_cash_account_differences").passed);
        assert!(result(&results, "cf_ending_cash_accounts_total").passed);
        assert!(!result(&results, "cf_adjustments_present").passed);
    }

    #[test]
    fn test_account_difference_mismatch() {
        let doc = CashFlowDocument {
            header: None,
            adjustments: vec![],
            cash_accounts: vec![account("Operating", dec!(100), dec!(50), dec!(40))],
        };
        let results = checks(&doc, &ValidationConfig::default());
        assert!(!result(&results, "cf_cash_account_differences").passed);
        assert!(!result(&results, "cf_cash_roll_forward").passed);
    }
}
