//! Per-row classification: data, repeated header, heading, totals, noise

use super::columns::ColumnMap;
use super::row::ParsedRow;
use super::text::{fold, is_blank};

const TOTALS_KEYWORDS: &[&str] = &["итого", "всего", "свод", "результат", "total", "subtotal"];

/// Why a row was not imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    RepeatedHeader,
    SectionHeading,
    Summary,
    Meaningless,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Empty => "empty",
            SkipReason::RepeatedHeader => "repeated header",
            SkipReason::SectionHeading => "section heading",
            SkipReason::Summary => "summary",
            SkipReason::Meaningless => "meaningless",
        }
    }
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    /// Importable row. `continued` is set when the tenant name was carried
    /// over from a previous row (merged cells in the spreadsheet).
    Data { tenant_name: String, continued: bool },
    Skip(SkipReason),
}

pub fn is_empty_row(cells: &[String]) -> bool {
    cells.iter().all(|c| is_blank(c))
}

pub fn is_repeated_header(cells: &[String], map: &ColumnMap) -> bool {
    !map.first_cell.is_empty()
        && cells.first().is_some_and(|c| fold(c) == map.first_cell)
}

pub fn is_totals_label(tenant_name: &str) -> bool {
    let folded = fold(tenant_name);
    TOTALS_KEYWORDS.iter().any(|k| folded.contains(k))
}

/// Classify a row. `carried_tenant` is the last tenant name seen on a data
/// row in this run.
pub fn classify(
    cells: &[String],
    row: &ParsedRow,
    map: &ColumnMap,
    carried_tenant: Option<&str>,
) -> RowKind {
    if is_empty_row(cells) {
        return RowKind::Skip(SkipReason::Empty);
    }
    if is_repeated_header(cells, map) {
        return RowKind::Skip(SkipReason::RepeatedHeader);
    }

    let has_money = row.has_money();

    if row.tenant_name.is_empty() && has_money {
        if let Some(carried) = carried_tenant.filter(|t| !t.is_empty()) {
            return RowKind::Data {
                tenant_name: carried.to_string(),
                continued: true,
            };
        }
    }

    if !row.tenant_name.is_empty() && !row.has_measurements() && !has_money {
        // a bare "Итого" line looks like a heading; report it as a summary
        if is_totals_label(&row.tenant_name) {
            return RowKind::Skip(SkipReason::Summary);
        }
        return RowKind::Skip(SkipReason::SectionHeading);
    }

    if is_totals_label(&row.tenant_name)
        && row.place_code.is_empty()
        && row.amounts.area <= 0.0
        && !has_money
    {
        return RowKind::Skip(SkipReason::Summary);
    }

    let meaningful = !row.tenant_name.is_empty()
        || !row.place_code.is_empty()
        || row.has_area()
        || has_money;
    if !meaningful {
        return RowKind::Skip(SkipReason::Meaningless);
    }

    RowKind::Data {
        tenant_name: row.tenant_name.clone(),
        continued: false,
    }
}
