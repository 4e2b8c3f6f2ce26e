// 🏢 Rent Roll - Unit rows keyed by a located header row
//
// The header row is the first row containing UNIT plus TENANT or LEASE.
// Columns are mapped by label; the mapping carries across pages until a new
// header row appears.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::amounts::parse_amount;
use crate::patterns::is_mdy_date;
use crate::statements::{OccupancyStatus, RentRollEntry, StatementType};

use super::document::{split_columns, Document, TableRow};
use super::header::extract_header;
use super::lines::TABLE_CONFIDENCE;
use super::{ExtractedStatement, RentRollExtraction, StatementParser};

/// Derived rent/sf above these is a divide-by-near-zero artifact
const MAX_MONTHLY_RENT_PER_SF: Decimal = dec!(50);
const MAX_ANNUAL_RENT_PER_SF: Decimal = dec!(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RentColumn {
    Unit,
    Tenant,
    LeaseType,
    Area,
    LeaseFrom,
    LeaseTo,
    Term,
    Tenancy,
    MonthlyRent,
    MonthlyRentPerSf,
    AnnualRent,
    AnnualRentPerSf,
    AnnualRecoveriesPerSf,
    AnnualMiscPerSf,
    SecurityDeposit,
    Loc,
}

/// Map a header cell label to a column. Order matters: the more specific
/// labels are tested first.
pub fn map_header_label(label: &str) -> Option<RentColumn> {
    let upper = label.to_uppercase();
    let per_sf = upper.contains("/SF") || upper.contains("PSF") || upper.contains("PER SF") || upper.contains("/ SF");
    let words: Vec<&str> = upper.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()).collect();
    let has_word = |w: &str| words.iter().any(|x| *x == w);

    let column = if upper.contains("TENANT") {
        RentColumn::Tenant
    } else if upper.contains("SECURITY") {
        RentColumn::SecurityDeposit
    } else if has_word("LOC") || upper.contains("LETTER OF CREDIT") {
        RentColumn::Loc
    } else if upper.contains("REC") && upper.contains("ANNUAL") {
        RentColumn::AnnualRecoveriesPerSf
    } else if upper.contains("MISC") {
        RentColumn::AnnualMiscPerSf
    } else if upper.contains("MONTHLY") && per_sf {
        RentColumn::MonthlyRentPerSf
    } else if upper.contains("MONTHLY") {
        RentColumn::MonthlyRent
    } else if upper.contains("ANNUAL") && per_sf {
        RentColumn::AnnualRentPerSf
    } else if upper.contains("ANNUAL") {
        RentColumn::AnnualRent
    } else if upper.contains("TENANCY") {
        RentColumn::Tenancy
    } else if upper.contains("TERM") {
        RentColumn::Term
    } else if upper.contains("TYPE") {
        RentColumn::LeaseType
    } else if upper.contains("FROM") || upper.contains("START") || upper.contains("COMMENCE") {
        RentColumn::LeaseFrom
    } else if has_word("TO") || upper.contains("EXPIR") || has_word("END") {
        RentColumn::LeaseTo
    } else if upper.contains("AREA") || upper.contains("SQ") || has_word("SF") {
        RentColumn::Area
    } else if upper.contains("UNIT") || upper.contains("SUITE") {
        RentColumn::Unit
    } else {
        return None;
    };
    Some(column)
}

fn is_header_row(text: &str) -> bool {
    let upper = text.to_uppercase();
    upper.contains("UNIT") && (upper.contains("TENANT") || upper.contains("LEASE"))
}

#[derive(Debug, Clone, Default)]
struct ColumnMap {
    columns: Vec<(usize, RentColumn)>,
}

impl ColumnMap {
    fn from_header(row: &TableRow) -> Self {
        let mut columns: Vec<(usize, RentColumn)> = Vec::new();
        for (i, cell) in row.cells.iter().enumerate() {
            if let Some(column) = cell.as_deref().and_then(map_header_label) {
                // First cell wins for a column
                if !columns.iter().any(|(_, c)| *c == column) {
                    columns.push((i, column));
                }
            }
        }
        ColumnMap { columns }
    }

    fn get<'a>(&self, row: &'a TableRow, column: RentColumn) -> Option<&'a str> {
        self.columns
            .iter()
            .find(|(_, c)| *c == column)
            .and_then(|(i, _)| row.cell(*i))
    }

    fn amount(&self, row: &TableRow, column: RentColumn) -> Option<Decimal> {
        self.get(row, column).and_then(parse_amount)
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%m/%d/%Y").ok()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RentRollParser;

impl RentRollParser {
    pub fn new() -> Self {
        RentRollParser
    }

    pub fn extract(&self, document: &Document) -> RentRollExtraction {
        let header = extract_header(document.first_page_text());
        let mut map = ColumnMap::default();
        let mut entries: Vec<RentRollEntry> = Vec::new();
        let mut line_number = 0;

        for page in &document.pages {
            let rows: Vec<TableRow> = if page.tables.is_empty() {
                page.text_lines().map(split_columns).collect()
            } else {
                page.tables.iter().flat_map(|t| t.rows.iter().cloned()).collect()
            };

            for row in rows {
                line_number += 1;
                if row.is_blank() {
                    continue;
                }
                if is_header_row(&row.text()) {
                    map = ColumnMap::from_header(&row);
                    continue;
                }
                if map.is_empty() {
                    continue;
                }

                let row_id = entries.len() + 1;
                if let Some(mut entry) = self.parse_row(&map, &row, row_id, page.number) {
                    entry.line_number = line_number;
                    entries.push(entry);
                }
            }
        }

        link_gross_rent_rows(&mut entries);

        RentRollExtraction { header, entries }
    }

    fn parse_row(&self, map: &ColumnMap, row: &TableRow, row_id: usize, page: usize) -> Option<RentRollEntry> {
        let unit = map.get(row, RentColumn::Unit).map(str::trim).unwrap_or("");
        let tenant = map.get(row, RentColumn::Tenant).map(str::trim);
        let row_upper = row.text().to_uppercase();

        if unit.to_uppercase().starts_with("TOTAL") || row_upper.starts_with("TOTAL") || row_upper.starts_with("GRAND TOTAL") {
            return None;
        }

        let is_gross = row_upper.contains("GROSS RENT");

        if let Some(t) = tenant {
            if is_mdy_date(t) {
                warn!(page, unit, tenant = t, "rent roll row rejected: date in tenant column");
                return None;
            }
        }

        if unit.is_empty() && !is_gross {
            debug!(page, row = %row.text(), "rent roll row without unit");
            return None;
        }

        let mut entry = RentRollEntry::new(row_id, unit, page);
        entry.confidence = TABLE_CONFIDENCE;
        entry.tenant_name = tenant.filter(|t| !t.is_empty()).map(|t| t.to_string());
        entry.unit_area_sqft = map.amount(row, RentColumn::Area);
        entry.is_gross_rent_row = is_gross;

        let vacant = tenant
            .map(|t| {
                let u = t.to_uppercase();
                u.contains("VACANT") || u.contains("AVAILABLE")
            })
            .unwrap_or(false);

        if vacant {
            entry.occupancy_status = OccupancyStatus::Vacant;
            return Some(entry);
        }

        entry.lease_type = map.get(row, RentColumn::LeaseType).map(|s| s.to_string());
        entry.lease_from = map.get(row, RentColumn::LeaseFrom).and_then(parse_date);
        entry.lease_to = map.get(row, RentColumn::LeaseTo).and_then(parse_date);
        entry.term_months = map
            .amount(row, RentColumn::Term)
            .and_then(|d| d.trunc().to_string().parse().ok());
        entry.tenancy_years = map.amount(row, RentColumn::Tenancy);
        entry.monthly_rent = map.amount(row, RentColumn::MonthlyRent);
        entry.monthly_rent_per_sqft = map.amount(row, RentColumn::MonthlyRentPerSf);
        entry.annual_rent = map.amount(row, RentColumn::AnnualRent);
        entry.annual_rent_per_sqft = map.amount(row, RentColumn::AnnualRentPerSf);
        entry.annual_recoveries_per_sf = map.amount(row, RentColumn::AnnualRecoveriesPerSf);
        entry.annual_misc_per_sf = map.amount(row, RentColumn::AnnualMiscPerSf);
        entry.security_deposit = map.amount(row, RentColumn::SecurityDeposit);
        entry.loc_amount = map.amount(row, RentColumn::Loc);

        apply_derived_fields(&mut entry);
        Some(entry)
    }
}

/// Fill missing per-sf figures when the inputs are present and the result
/// is under the sanity ceiling.
pub fn apply_derived_fields(entry: &mut RentRollEntry) {
    let area = match entry.unit_area_sqft {
        Some(a) if a > Decimal::ZERO => a,
        _ => return,
    };

    if entry.monthly_rent_per_sqft.is_none() {
        if let Some(rent) = entry.monthly_rent {
            let per_sf = (rent / area).round_dp(4);
            if per_sf < MAX_MONTHLY_RENT_PER_SF && per_sf * dec!(12) < MAX_ANNUAL_RENT_PER_SF {
                entry.monthly_rent_per_sqft = Some(per_sf);
            }
        }
    }

    if entry.annual_rent_per_sqft.is_none() {
        if let Some(rent) = entry.annual_rent {
            let per_sf = (rent / area).round_dp(4);
            if per_sf < MAX_ANNUAL_RENT_PER_SF {
                entry.annual_rent_per_sqft = Some(per_sf);
            }
        }
    }
}

/// Link each Gross Rent row to the closest preceding unit row with the same
/// unit number. Gross rows without a unit inherit the preceding unit.
pub fn link_gross_rent_rows(entries: &mut [RentRollEntry]) {
    for i in 0..entries.len() {
        if !entries[i].is_gross_rent_row {
            continue;
        }

        if entries[i].unit_number.is_empty() {
            if let Some(prev) = entries[..i].iter().rev().find(|e| !e.is_gross_rent_row) {
                entries[i].unit_number = prev.unit_number.clone();
            }
        }

        let unit = entries[i].unit_number.clone();
        entries[i].parent_row_id = entries[..i]
            .iter()
            .rev()
            .find(|e| !e.is_gross_rent_row && e.unit_number == unit)
            .map(|e| e.row_id);
    }
}

impl StatementParser for RentRollParser {
    fn statement_type(&self) -> StatementType {
        StatementType::RentRoll
    }

    fn parse(&self, document: &Document) -> ExtractedStatement {
        ExtractedStatement::RentRoll(self.extract(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document::{Page, Table};

    fn rent_roll_table() -> Table {
        Table::from_rows(vec![
            vec!["Unit", "Tenant", "Lease Type", "Area", "Lease From", "Lease To", "Monthly Rent", "Annual Rent", "Security Deposit"],
            vec!["101", "Acme Corp", "NNN", "1,000", "01/01/2024", "12/31/2028", "2,500.00", "30,000.00", "5,000.00"],
            vec!["101", "Gross Rent", "", "", "", "", "3,100.00", "37,200.00", ""],
            vec!["102", "VACANT", "", "800", "", "", "", "", ""],
            vec!["103", "01/15/2024", "NNN", "900", "", "", "1,800.00", "", ""],
            vec!["Total", "", "", "2,700", "", "", "4,300.00", "", ""],
        ])
    }

    #[test]
    fn test_header_mapping() {
        assert_eq!(map_header_label("Unit"), Some(RentColumn::Unit));
        assert_eq!(map_header_label("Monthly Rent/SF"), Some(RentColumn::MonthlyRentPerSf));
        assert_eq!(map_header_label("Annual Rec/SF"), Some(RentColumn::AnnualRecoveriesPerSf));
        assert_eq!(map_header_label("Lease To"), Some(RentColumn::LeaseTo));
        assert_eq!(map_header_label("Area (SF)"), Some(RentColumn::Area));
        assert_eq!(map_header_label("LOC Amount"), Some(RentColumn::Loc));
        assert_eq!(map_header_label("Notes"), None);
    }

    #[test]
    fn test_gross_rent_links_to_unit_row() {
        let doc = Document::new(vec![Page::new(1, "Rent Roll").with_table(rent_roll_table())]);
        let result = RentRollParser::new().extract(&doc);

        let unit = &result.entries[0];
        let gross = &result.entries[1];
        assert_eq!(unit.unit_number, "101");
        assert!(gross.is_gross_rent_row);
        assert_eq!(gross.parent_row_id, Some(unit.row_id));
    }

    #[test]
    fn test_vacant_and_misaligned_rows() {
        let doc = Document::new(vec![Page::new(1, "Rent Roll").with_table(rent_roll_table())]);
        let result = RentRollParser::new().extract(&doc);

        // 101, 101 gross, 102 vacant; 103 rejected, Total skipped
        assert_eq!(result.entries.len(), 3);
        let vacant = &result.entries[2];
        assert!(vacant.is_vacant());
        assert_eq!(vacant.monthly_rent, None);
        assert_eq!(vacant.unit_area_sqft, Some(dec!(800)));
    }

    #[test]
    fn test_derived_rent_per_sf() {
        let doc = Document::new(vec![Page::new(1, "Rent Roll").with_table(rent_roll_table())]);
        let unit = &RentRollParser::new().extract(&doc).entries[0];
        assert_eq!(unit.monthly_rent_per_sqft, Some(dec!(2.5)));
        assert_eq!(unit.annual_rent_per_sqft, Some(dec!(30)));
        assert_eq!(unit.lease_to, NaiveDate::from_ymd_opt(2028, 12, 31));
    }

    #[test]
    fn test_derived_rent_rejects_tiny_area() {
        let mut entry = RentRollEntry::new(1, "104", 1);
        entry.unit_area_sqft = Some(dec!(1));
        entry.monthly_rent = Some(dec!(2500));
        apply_derived_fields(&mut entry);
        assert_eq!(entry.monthly_rent_per_sqft, None);
    }

    #[test]
    fn test_text_fallback_rows() {
        let text = "Unit    Tenant    Area    Monthly Rent\n201    Beta LLC    1,200    3,000.00\n";
        let doc = Document::new(vec![Page::new(1, text)]);
        let result = RentRollParser::new().extract(&doc);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].tenant_name.as_deref(), Some("Beta LLC"));
        assert_eq!(result.entries[0].monthly_rent, Some(dec!(3000.00)));
    }
}
