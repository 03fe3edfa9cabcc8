//! Typed view of one source row

use crate::types::AccrualAmounts;

use super::columns::{ColumnMap, Field};
use super::text::clean;
use super::values::{infer_vat_rate, is_nonzero, parse_decimal, parse_int};

/// Row values after locale normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRow {
    pub tenant_name: String,
    pub place_code: String,
    pub place_name: String,
    pub activity_type: String,
    pub location_type: String,
    pub discount_note: String,
    pub amounts: AccrualAmounts,
}

impl ParsedRow {
    pub fn parse(cells: &[String], map: &ColumnMap) -> Self {
        let text = |field| clean(map.cell(cells, field));
        let number = |field| parse_decimal(map.cell(cells, field));

        let area_leased = number(Field::AreaLeased);
        let area_free = number(Field::AreaFree);
        let explicit_area = number(Field::Area);
        let area = if explicit_area > 0.0 {
            explicit_area
        } else {
            area_leased.max(0.0) + area_free.max(0.0)
        };

        let total_no_vat = number(Field::TotalNoVat);
        let total_with_vat = number(Field::TotalWithVat);

        Self {
            tenant_name: text(Field::TenantName),
            place_code: text(Field::PlaceCode),
            place_name: text(Field::PlaceName),
            activity_type: text(Field::ActivityType),
            location_type: text(Field::LocationType),
            discount_note: text(Field::DiscountNote),
            amounts: AccrualAmounts {
                area_leased,
                area_free,
                area,
                rate: number(Field::Rate),
                day_count: parse_int(map.cell(cells, Field::DayCount)),
                rent_amount: number(Field::RentAmount),
                management_fee: number(Field::ManagementFee),
                utilities_amount: number(Field::Utilities),
                electricity_amount: number(Field::Electricity),
                total_no_vat,
                total_with_vat,
                vat_rate: infer_vat_rate(total_no_vat, total_with_vat, &map.header_line),
                cash_amount: number(Field::CashAmount),
            },
        }
    }

    pub fn money(&self) -> [f64; 7] {
        let a = &self.amounts;
        [
            a.rent_amount,
            a.management_fee,
            a.utilities_amount,
            a.electricity_amount,
            a.total_no_vat,
            a.total_with_vat,
            a.cash_amount,
        ]
    }

    pub fn has_money(&self) -> bool {
        self.money().iter().any(|v| is_nonzero(*v))
    }

    /// Money other than the rent itself
    pub fn has_secondary_money(&self) -> bool {
        self.money()[1..].iter().any(|v| is_nonzero(*v))
    }

    pub fn has_area(&self) -> bool {
        self.amounts.area > 0.0
    }

    /// Any measurement that identifies a space: code, area, rate or days
    pub fn has_measurements(&self) -> bool {
        !self.place_code.is_empty()
            || self.has_area()
            || is_nonzero(self.amounts.rate)
            || self.amounts.day_count.is_some_and(|d| d != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accrual_import::columns::map_columns;
    use crate::services::accrual_import::source::SourceRow;

    fn map(headers: &[&str]) -> ColumnMap {
        map_columns(&SourceRow {
            line: 1,
            cells: headers.iter().map(|h| h.to_string()).collect(),
        })
        .unwrap()
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parses_locale_numbers() {
        let m = map(&["Арендатор", "№ места", "Площадь", "Аренда", "Итого без НДС", "Итого с НДС"]);
        let row = ParsedRow::parse(
            &cells(&["ИП Петров", " 12А ", "10,5", "1\u{a0}000,00", "1000", "1200"]),
            &m,
        );
        assert_eq!(row.tenant_name, "ИП Петров");
        assert_eq!(row.place_code, "12А");
        assert_eq!(row.amounts.area, 10.5);
        assert_eq!(row.amounts.rent_amount, 1000.0);
        assert_eq!(row.amounts.vat_rate, Some(0.2));
        assert!(row.has_money());
        assert!(row.has_secondary_money());
    }

    #[test]
    fn test_area_falls_back_to_leased_plus_free() {
        let m = map(&["Арендатор", "Арендуемая площадь", "Свободная площадь"]);
        let row = ParsedRow::parse(&cells(&["x", "12", "3"]), &m);
        assert_eq!(row.amounts.area, 15.0);
        assert!(row.has_measurements());
        assert!(!row.has_money());
    }

    #[test]
    fn test_short_rows_parse_as_empty_values() {
        let m = map(&["ФИО", "№ отдела", "Сумма аренды"]);
        let row = ParsedRow::parse(&cells(&["Итого"]), &m);
        assert_eq!(row.tenant_name, "Итого");
        assert!(row.place_code.is_empty());
        assert!(!row.has_measurements());
        assert!(!row.has_money());
    }
}
