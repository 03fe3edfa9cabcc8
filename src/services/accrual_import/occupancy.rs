//! Occupancy inference from the rent amount

use std::collections::HashSet;

use crate::types::SpaceStatus;

use super::columns::{ColumnMap, Field};
use super::row::ParsedRow;
use super::values::is_nonzero;

/// Occupancy of one row plus soft consistency warnings
#[derive(Debug, Clone, PartialEq)]
pub struct Occupancy {
    pub is_leased: bool,
    pub warnings: Vec<String>,
}

impl Occupancy {
    pub fn status(&self) -> SpaceStatus {
        SpaceStatus::from_leased(self.is_leased)
    }
}

/// Derive occupancy from the rent amount alone. Area columns only produce
/// warnings, they never change the outcome.
pub fn resolve(row: &ParsedRow, map: &ColumnMap) -> Occupancy {
    let a = &row.amounts;
    let is_leased = is_nonzero(a.rent_amount);
    let areas_known = map.has(Field::AreaLeased) && map.has(Field::AreaFree);
    let mut warnings = Vec::new();

    if !is_leased && row.has_secondary_money() {
        warnings.push("no rent but other charges are present; treated as free".to_string());
    }
    if areas_known && !is_leased && a.area_leased > 0.0 && a.area_free <= 0.0 {
        warnings.push(format!(
            "no rent but leased area {} and no free area; treated as free",
            a.area_leased
        ));
    }
    if areas_known && is_leased && a.area_leased <= 0.0 && a.area_free > 0.0 {
        warnings.push(format!(
            "rent {} charged on free area {}; treated as occupied",
            a.rent_amount, a.area_free
        ));
    }

    Occupancy { is_leased, warnings }
}

/// Place codes marked occupied so far in this run
#[derive(Debug, Default)]
pub struct OccupancyTracker {
    seen_occupied: HashSet<String>,
}

impl OccupancyTracker {
    /// Status to store for `place_code`: once occupied in this run a code
    /// never falls back to free.
    pub fn record(&mut self, place_code: &str, is_leased: bool) -> SpaceStatus {
        if is_leased {
            self.seen_occupied.insert(place_code.to_string());
            SpaceStatus::Occupied
        } else if self.seen_occupied.contains(place_code) {
            SpaceStatus::Occupied
        } else {
            SpaceStatus::Free
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accrual_import::columns::map_columns;
    use crate::services::accrual_import::source::SourceRow;

    fn parse(headers: &[&str], values: &[&str]) -> (ParsedRow, ColumnMap) {
        let map = map_columns(&SourceRow {
            line: 1,
            cells: headers.iter().map(|h| h.to_string()).collect(),
        })
        .unwrap();
        let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        (ParsedRow::parse(&cells, &map), map)
    }

    const HEADERS: [&str; 6] = [
        "Арендатор",
        "№ места",
        "Арендуемая площадь",
        "Свободная площадь",
        "Аренда",
        "Коммунальные услуги",
    ];

    #[test]
    fn test_rent_decides_occupancy() {
        let (row, map) = parse(&HEADERS, &["A", "1", "0", "10", "500", "0"]);
        let occ = resolve(&row, &map);
        assert!(occ.is_leased);
        assert_eq!(occ.status(), SpaceStatus::Occupied);

        let (row, map) = parse(&HEADERS, &["A", "1", "10", "0", "0", "0"]);
        assert!(!resolve(&row, &map).is_leased);
    }

    #[test]
    fn test_tiny_rent_is_free() {
        let (row, map) = parse(&HEADERS, &["A", "1", "10", "0", "0,000001", "0"]);
        assert!(!resolve(&row, &map).is_leased);
    }

    #[test]
    fn test_warns_on_mismatches_without_changing_outcome() {
        let (row, map) = parse(&HEADERS, &["A", "1", "10", "0", "0", "120"]);
        let occ = resolve(&row, &map);
        assert!(!occ.is_leased);
        assert_eq!(occ.warnings.len(), 2);

        let (row, map) = parse(&HEADERS, &["A", "1", "0", "10", "500", "0"]);
        let occ = resolve(&row, &map);
        assert!(occ.is_leased);
        assert_eq!(occ.warnings.len(), 1);
    }

    #[test]
    fn test_consistent_rows_have_no_warnings() {
        let (row, map) = parse(&HEADERS, &["A", "1", "10", "0", "500", "120"]);
        assert!(resolve(&row, &map).warnings.is_empty());
    }

    #[test]
    fn test_tracker_never_downgrades() {
        let mut tracker = OccupancyTracker::default();
        assert_eq!(tracker.record("12", false), SpaceStatus::Free);
        assert_eq!(tracker.record("12", true), SpaceStatus::Occupied);
        assert_eq!(tracker.record("12", false), SpaceStatus::Occupied);
        assert_eq!(tracker.record("13", false), SpaceStatus::Free);
    }
}
