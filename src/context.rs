// 🧭 Alignment Context - Shared period facts for one audit run
//
// Built once per (property, period) and handed by reference to every rule.
// Rules never look up "the prior period" themselves, so every rule in a
// run agrees on what prior and begin mean.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BeginPolicy, ContextConfig};
use crate::period::{earliest_period, months_between, prior_period, FinancialPeriod};
use crate::store::StatementStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentContext {
    pub property_id: String,
    pub period_id: i64,
    pub period: FinancialPeriod,
    /// Most recent period strictly before the current one, by calendar
    pub prior_period: Option<FinancialPeriod>,
    /// Comparison period for delta rules, chosen by `BeginPolicy`
    pub begin_period: Option<FinancialPeriod>,
    pub earliest_period: Option<FinancialPeriod>,
    /// Months from begin to current, never below 1
    pub window_months: i64,
    /// False when no cash-flow summary exists; the cf_* figures are then zero
    pub has_cash_flow: bool,
    pub cf_beginning_cash: Decimal,
    pub cf_ending_cash: Decimal,
    pub cf_cash_delta: Decimal,
    pub end_year: i32,
    pub end_month: u32,
    pub begin_year: Option<i32>,
}

impl AlignmentContext {
    /// Resolve prior/begin periods and cash-flow figures for one run
    pub fn build(
        store: &dyn StatementStore,
        property_id: &str,
        period_id: i64,
        config: &ContextConfig,
    ) -> Result<Self> {
        let periods = store.periods(property_id)?;
        let period = periods
            .iter()
            .find(|p| p.id == period_id)
            .cloned()
            .ok_or_else(|| anyhow!("Period {} not found for property {}", period_id, property_id))?;

        let prior = prior_period(&periods, &period).cloned();
        let earliest = earliest_period(&periods)
            .filter(|p| p.id != period.id)
            .cloned();

        let begin = match config.begin_policy {
            BeginPolicy::PriorPeriod => prior.clone(),
            BeginPolicy::Earliest => earliest.clone(),
            BeginPolicy::LookbackMonths(n) => lookback(&periods, &period, n).or_else(|| earliest.clone()),
        };

        let window_months = begin
            .as_ref()
            .map(|b| months_between(b, &period))
            .unwrap_or(1)
            .max(1);

        let header = store.cash_flow_header(property_id, period_id)?;
        let has_cash_flow = header.is_some();
        let header = header.unwrap_or_default();
        let cf_beginning_cash = header.beginning_cash_balance.unwrap_or_default();
        let cf_ending_cash = header.ending_cash_balance.unwrap_or_default();

        debug!(
            property = property_id,
            period = %period.label(),
            prior = ?prior.as_ref().map(|p| p.label()),
            begin = ?begin.as_ref().map(|p| p.label()),
            window_months,
            "built alignment context"
        );

        Ok(AlignmentContext {
            property_id: property_id.to_string(),
            period_id,
            end_year: period.year,
            end_month: period.month,
            begin_year: begin.as_ref().map(|b| b.year),
            period,
            prior_period: prior,
            begin_period: begin,
            earliest_period: earliest,
            window_months,
            has_cash_flow,
            cf_beginning_cash,
            cf_ending_cash,
            cf_cash_delta: cf_ending_cash - cf_beginning_cash,
        })
    }

    pub fn prior_period_id(&self) -> Option<i64> {
        self.prior_period.as_ref().map(|p| p.id)
    }

    pub fn begin_period_id(&self) -> Option<i64> {
        self.begin_period.as_ref().map(|p| p.id)
    }

    /// Begin and current fall in the same fiscal (calendar) year
    pub fn begin_in_same_year(&self) -> bool {
        self.begin_year == Some(self.end_year)
    }

    pub fn window(&self) -> Decimal {
        Decimal::from(self.window_months)
    }
}

/// Latest period at least `months` before `current`
fn lookback(periods: &[FinancialPeriod], current: &FinancialPeriod, months: u32) -> Option<FinancialPeriod> {
    periods
        .iter()
        .filter(|p| months_between(p, current) >= i64::from(months.max(1)))
        .max_by(|a, b| a.calendar_cmp(b))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::CashFlowHeader;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store
            .add_period(FinancialPeriod::new(7, "P1", 2024, 10))
            .add_period(FinancialPeriod::new(3, "P1", 2025, 1))
            .add_period(FinancialPeriod::new(5, "P1", 2024, 12))
            .set_cash_flow_header(
                "P1",
                3,
                CashFlowHeader {
                    beginning_cash_balance: Some(dec!(20000)),
                    ending_cash_balance: Some(dec!(26500)),
                    ..Default::default()
                },
            );
        store
    }

    #[test]
    fn test_prior_period_policy() {
        let ctx = AlignmentContext::build(&store(), "P1", 3, &ContextConfig::default()).unwrap();
        assert_eq!(ctx.prior_period_id(), Some(5));
        assert_eq!(ctx.begin_period_id(), Some(5));
        assert_eq!(ctx.window_months, 1);
        assert!(!ctx.begin_in_same_year());
        assert!(ctx.has_cash_flow);
        assert_eq!(ctx.cf_cash_delta, dec!(6500));
    }

    #[test]
    fn test_earliest_and_lookback_policies() {
        let earliest = ContextConfig { begin_policy: BeginPolicy::Earliest };
        let ctx = AlignmentContext::build(&store(), "P1", 3, &earliest).unwrap();
        assert_eq!(ctx.begin_period_id(), Some(7));
        assert_eq!(ctx.window_months, 3);

        let lookback = ContextConfig { begin_policy: BeginPolicy::LookbackMonths(2) };
        let ctx = AlignmentContext::build(&store(), "P1", 3, &lookback).unwrap();
        assert_eq!(ctx.begin_period_id(), Some(7));
    }

    #[test]
    fn test_earliest_period_has_no_begin() {
        let ctx = AlignmentContext::build(&store(), "P1", 7, &ContextConfig::default()).unwrap();
        assert_eq!(ctx.prior_period_id(), None);
        assert_eq!(ctx.begin_period_id(), None);
        assert_eq!(ctx.window_months, 1);
        assert!(!ctx.has_cash_flow);
        assert_eq!(ctx.cf_ending_cash, Decimal::ZERO);
    }

    #[test]
    fn test_unknown_period_is_error() {
        assert!(AlignmentContext::build(&store(), "P1", 99, &ContextConfig::default()).is_err());
    }
}
