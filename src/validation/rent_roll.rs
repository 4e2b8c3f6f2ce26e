use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::Check;
use crate::config::ValidationConfig;
use crate::statements::RentRollEntry;

pub(super) fn checks(entries: &[RentRollEntry], config: &ValidationConfig) -> Vec<(&'static str, Check)> {
    let units: Vec<&RentRollEntry> = entries.iter().filter(|e| !e.is_gross_rent_row).collect();
    vec![
        ("rr_unit_number_present", unit_number_present(entries)),
        ("rr_rent_per_sf_range", rent_per_sf_range(&units, config)),
        ("rr_lease_dates_ordered", lease_dates_ordered(&units)),
        ("rr_vacant_without_rent", vacant_without_rent(&units)),
        ("rr_duplicate_units", duplicate_units(&units)),
        ("rr_occupancy_rate", occupancy_rate(&units)),
    ]
}

fn unit_number_present(entries: &[RentRollEntry]) -> Check {
    if entries.is_empty() {
        return Check::fail("Rent roll has no rows");
    }
    let missing: Vec<String> = entries
        .iter()
        .filter(|e| e.unit_number.trim().is_empty())
        .map(|e| format!("row {} (page {})", e.row_id, e.page))
        .collect();
    Check::from_failures("Rows without a unit number", &missing)
}

fn rent_per_sf_range(units: &[&RentRollEntry], config: &ValidationConfig) -> Check {
    let out: Vec<String> = units
        .iter()
        .filter_map(|e| e.monthly_rent_per_sqft.map(|r| (e, r)))
        .filter(|(_, r)| *r < Decimal::ZERO || *r > config.rent_per_sf_max)
        .map(|(e, r)| format!("unit {} at {}/sf", e.unit_number, r))
        .collect();
    Check::from_failures("Rent per square foot out of range", &out)
}

fn lease_dates_ordered(units: &[&RentRollEntry]) -> Check {
    let reversed: Vec<String> = units
        .iter()
        .filter(|e| matches!((e.lease_from, e.lease_to), (Some(from), Some(to)) if from > to))
        .map(|e| e.unit_number.clone())
        .collect();
    Check::from_failures("Lease ends before it starts", &reversed)
}

fn vacant_without_rent(units: &[&RentRollEntry]) -> Check {
    let billed: Vec<String> = units
        .iter()
        .filter(|e| e.is_vacant() && e.monthly_rent.map(|r| !r.is_zero()).unwrap_or(false))
        .map(|e| e.unit_number.clone())
        .collect();
    Check::from_failures("Vacant units with rent", &billed)
}

fn duplicate_units(units: &[&RentRollEntry]) -> Check {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for e in units.iter().filter(|e| !e.unit_number.trim().is_empty()) {
        *counts.entry(e.unit_number.trim()).or_default() += 1;
    }
    let dupes: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(unit, n)| format!("{} x{}", unit, n))
        .collect();
    Check::from_failures("Duplicate units", &dupes)
}

fn occupancy_rate(units: &[&RentRollEntry]) -> Check {
    if units.is_empty() {
        return Check::note("No units");
    }
    let occupied = units.iter().filter(|e| !e.is_vacant()).count();
    let rate = (Decimal::from(occupied) / Decimal::from(units.len()) * Decimal::ONE_HUNDRED).round_dp(2);
    Check::note(format!("{} of {} units occupied ({}%)", occupied, units.len(), rate))
        .values(Decimal::ONE_HUNDRED, rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::OccupancyStatus;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn result<'a>(results: &'a [(&'static str, Check)], name: &str) -> &'a Check {
        &results.iter().find(|(n, _)| *n == name).unwrap().1
    }

    #[test]
    fn test_rent_roll_checks() {
        let mut a = RentRollEntry::new(1, "101", 1);
        a.monthly_rent = Some(dec!(2000));
        a.monthly_rent_per_sqft = Some(dec!(2.5));
        a.lease_from = NaiveDate::from_ymd_opt(2025, 1, 1);
        a.lease_to = NaiveDate::from_ymd_opt(2024, 12, 31);

        let mut gross = RentRollEntry::new(2, "101", 1);
        gross.is_gross_rent_row = true;
        gross.parent_row_id = Some(1);

        let mut vacant = RentRollEntry::new(3, "102", 1);
        vacant.occupancy_status = OccupancyStatus::Vacant;
        vacant.monthly_rent = Some(dec!(500));

        let results = checks(&[a, gross, vacant], &ValidationConfig::default());
        assert!(result(&results, "rr_unit_number_present").passed);
        assert!(result(&results, "rr_rent_per_sf_range").passed);
        // Gross rent rows share the unit number and are not duplicates
        assert!(result(&results, "rr_duplicate_units").passed);
        assert!(!result(&results, "rr_lease_dates_ordered").passed);
        assert!(!result(&results, "rr_vacant_without_rent").passed);
        assert_eq!(result(&results, "rr_occupancy_rate").actual_value, Some(dec!(50)));
    }
}
