// Document header: labeled fields from the first page only.
// A field that does not match stays None; nothing here can fail a document.

use chrono::{Datelike, NaiveDate};

use crate::patterns::{month_number, BOOK_FIELD, LONG_DATE, MONTH_YEAR, PERIOD_FIELD, PROPERTY_IDENTIFIER};
use crate::statements::{AccountingBasis, DocumentHeader, PeriodType};

pub fn extract_header(first_page_text: &str) -> DocumentHeader {
    let mut header = DocumentHeader::default();

    if let Some(caps) = PROPERTY_IDENTIFIER.captures(first_page_text) {
        header.property_name = Some(caps[1].trim().to_string());
        header.property_code = Some(caps[2].to_string());
    }

    if let Some(caps) = PERIOD_FIELD.captures(first_page_text) {
        let label = caps[1].trim().to_string();
        let months: Vec<(i32, u32)> = MONTH_YEAR
            .captures_iter(&label)
            .filter_map(|m| Some((m[2].parse().ok()?, month_number(&m[1])?)))
            .collect();

        if let (Some(first), Some(last)) = (months.first(), months.last()) {
            header.period_start = NaiveDate::from_ymd_opt(first.0, first.1, 1);
            header.period_end = last_day_of_month(last.0, last.1);

            let span = (last.0 - first.0) * 12 + (last.1 as i32 - first.1 as i32) + 1;
            header.period_type = if span >= 12 {
                Some(PeriodType::Annual)
            } else if span == 1 {
                Some(PeriodType::Monthly)
            } else {
                None
            };
        }
        header.period_label = Some(label);
    }

    if let Some(caps) = BOOK_FIELD.captures(first_page_text) {
        header.accounting_basis = match caps[1].to_uppercase().as_str() {
            "ACCRUAL" => Some(AccountingBasis::Accrual),
            "CASH" => Some(AccountingBasis::Cash),
            _ => None,
        };
    }

    if let Some(caps) = LONG_DATE.captures(first_page_text) {
        header.report_date = month_number(&caps[1]).and_then(|month| {
            let day: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        });
    }

    header
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// (year, month) a header describes, from the period end
pub fn header_period(header: &DocumentHeader) -> Option<(i32, u32)> {
    header.period_end.map(|d| (d.year(), d.month()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_header() {
        let text = "Sunset Plaza (SUNP)\nIncome Statement\nPeriod = Jan 2024-Dec 2024\nBook = Accrual\nJanuary 15, 2025\n";
        let h = extract_header(text);
        assert_eq!(h.property_name.as_deref(), Some("Sunset Plaza"));
        assert_eq!(h.property_code.as_deref(), Some("SUNP"));
        assert_eq!(h.period_label.as_deref(), Some("Jan 2024-Dec 2024"));
        assert_eq!(h.period_start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(h.period_end, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(h.period_type, Some(PeriodType::Annual));
        assert_eq!(h.accounting_basis, Some(AccountingBasis::Accrual));
        assert_eq!(h.report_date, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(header_period(&h), Some((2024, 12)));
    }

    #[test]
    fn test_monthly_period() {
        let h = extract_header("Period = Feb 2024\nBook = Cash");
        assert_eq!(h.period_end, NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(h.period_type, Some(PeriodType::Monthly));
        assert_eq!(h.accounting_basis, Some(AccountingBasis::Cash));
    }

    #[test]
    fn test_missing_fields_stay_none() {
        let h = extract_header("Balance Sheet\n0122-0000 Cash 100.00");
        assert_eq!(h, DocumentHeader::default());
    }
}
