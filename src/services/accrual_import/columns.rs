//! Header row location and keyword based column mapping
//!
//! Exports have no fixed schema, so each canonical field is found by an
//! ordered list of keyword rules evaluated once against the header row.
//! The resulting [`ColumnMap`] is immutable for the rest of the run.

use std::collections::BTreeMap;

use tracing::warn;

use super::error::ImportError;
use super::source::SourceRow;
use super::text::{fold, is_blank};

/// Canonical fields the importer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    TenantName,
    PlaceCode,
    PlaceName,
    ActivityType,
    LocationType,
    AreaLeased,
    AreaFree,
    Area,
    Rate,
    DayCount,
    RentAmount,
    ManagementFee,
    Utilities,
    Electricity,
    TotalNoVat,
    TotalWithVat,
    CashAmount,
    DiscountNote,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::TenantName => "tenant_name",
            Field::PlaceCode => "place_code",
            Field::PlaceName => "place_name",
            Field::ActivityType => "activity_type",
            Field::LocationType => "location_type",
            Field::AreaLeased => "area_leased",
            Field::AreaFree => "area_free",
            Field::Area => "area",
            Field::Rate => "rate",
            Field::DayCount => "day_count",
            Field::RentAmount => "rent_amount",
            Field::ManagementFee => "management_fee",
            Field::Utilities => "utilities_amount",
            Field::Electricity => "electricity_amount",
            Field::TotalNoVat => "total_no_vat",
            Field::TotalWithVat => "total_with_vat",
            Field::CashAmount => "cash_amount",
            Field::DiscountNote => "discount_note",
        }
    }
}

/// One matching rule: a header matches when it contains any keyword and
/// none of the excludes. Higher priority wins the shared-column guard.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub field: Field,
    pub keywords: &'static [&'static str],
    pub excludes: &'static [&'static str],
    pub priority: u8,
}

impl ColumnRule {
    fn matches(&self, folded_header: &str) -> bool {
        self.keywords.iter().any(|k| folded_header.contains(k))
            && !self.excludes.iter().any(|e| folded_header.contains(e))
    }
}

pub const COLUMN_RULES: &[ColumnRule] = &[
    ColumnRule {
        field: Field::TenantName,
        keywords: &["фио", "арендатор", "контрагент", "организация", "tenant", "lessee"],
        excludes: &["инн"],
        priority: 10,
    },
    ColumnRule {
        field: Field::PlaceCode,
        keywords: &[
            "№ отдела", "номер отдела", "№ места", "номер места", "№ павильона",
            "код места", "№ помещения", "номер помещения", "отдел", "место",
            "павильон", "помещение", "place", "unit",
        ],
        excludes: &["тип", "наименование", "название", "площадь", "вид", "name", "type"],
        priority: 10,
    },
    ColumnRule {
        field: Field::PlaceName,
        keywords: &[
            "наименование места", "наименование отдела", "название отдела",
            "название места", "наименование помещения", "вывеска", "place name", "section",
        ],
        excludes: &[],
        priority: 1,
    },
    ColumnRule {
        field: Field::ActivityType,
        keywords: &["вид деятельности", "деятельност", "профиль", "ассортимент", "activity"],
        excludes: &[],
        priority: 2,
    },
    ColumnRule {
        field: Field::LocationType,
        keywords: &["тип места", "тип локации", "тип помещения", "расположение", "локация", "зона", "location"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::AreaLeased,
        keywords: &["арендуемая площадь", "площадь аренд", "занятая площадь", "площадь занят", "leased area"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::AreaFree,
        keywords: &["свободная площадь", "площадь свобод", "free area", "vacant area"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::Area,
        keywords: &["площадь", "кв.м", "м2", "area"],
        excludes: &["аренд", "свобод", "занят", "ставка", "цена", "руб", "leased", "free", "vacant", "rate"],
        priority: 5,
    },
    ColumnRule {
        field: Field::Rate,
        keywords: &["ставка", "цена за", "тариф", "rate"],
        excludes: &["ндс", "vat"],
        priority: 5,
    },
    ColumnRule {
        field: Field::DayCount,
        keywords: &["кол-во дней", "количество дней", "дней", "дни", "days"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::RentAmount,
        keywords: &["сумма аренды", "арендная плата", "аренда", "rent"],
        excludes: &["арендатор", "площадь", "ставка", "tenant", "rate", "area"],
        priority: 5,
    },
    ColumnRule {
        field: Field::ManagementFee,
        keywords: &["управлен", "эксплуатац", "обслуживан", "management", "service"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::Utilities,
        keywords: &["коммунал", "utilities", "utility"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::Electricity,
        keywords: &["электроэнерг", "электричеств", "электр", "electric"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::TotalNoVat,
        keywords: &["без ндс", "итого без", "without vat", "net total", "excl"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::TotalWithVat,
        keywords: &["с ндс", "с учетом ндс", "к оплате", "итого", "всего", "total", "gross"],
        excludes: &["без", "without", "net", "excl"],
        priority: 5,
    },
    ColumnRule {
        field: Field::CashAmount,
        keywords: &["наличн", "нал.", "cash"],
        excludes: &[],
        priority: 5,
    },
    ColumnRule {
        field: Field::DiscountNote,
        keywords: &["скидк", "льгот", "примечан", "комментар", "discount", "note"],
        excludes: &[],
        priority: 5,
    },
];

/// Field -> column index map built from the header row
#[derive(Debug, Clone)]
pub struct ColumnMap {
    indices: BTreeMap<Field, usize>,
    /// Header cells as they appear in the file
    pub headers: Vec<String>,
    /// Folded header cells joined with spaces, used for keyword hints
    pub header_line: String,
    /// Folded first header cell, used to spot repeated header rows
    pub first_cell: String,
    /// 1-based line of the header row
    pub header_row: u64,
    /// Mapping notes for the run report
    pub notes: Vec<String>,
}

impl ColumnMap {
    pub fn index(&self, field: Field) -> Option<usize> {
        self.indices.get(&field).copied()
    }

    pub fn has(&self, field: Field) -> bool {
        self.indices.contains_key(&field)
    }

    /// Trimmed cell value of `field`, empty when unmapped or missing
    pub fn cell<'a>(&self, cells: &'a [String], field: Field) -> &'a str {
        self.index(field)
            .and_then(|idx| cells.get(idx))
            .map(|c| c.trim())
            .unwrap_or("")
    }

    /// (field, header text) pairs for the report
    pub fn describe(&self) -> Vec<(String, String)> {
        self.indices
            .iter()
            .map(|(field, &idx)| {
                let header = self.headers.get(idx).cloned().unwrap_or_default();
                (field.as_str().to_string(), header)
            })
            .collect()
    }

    /// Header text -> cell value, kept on each fact for traceability
    pub fn raw_payload(&self, cells: &[String]) -> serde_json::Value {
        let mut payload = serde_json::Map::new();
        for (idx, value) in cells.iter().enumerate() {
            let key = match self.headers.get(idx) {
                Some(h) if !is_blank(h) => h.trim().to_string(),
                _ => format!("col_{}", idx + 1),
            };
            payload
                .entry(key)
                .or_insert_with(|| serde_json::Value::String(value.clone()));
        }
        serde_json::Value::Object(payload)
    }
}

fn is_directive(first_cell: &str) -> bool {
    first_cell.trim().to_lowercase().starts_with("sep=")
}

/// Index of the header row: the first non-empty row that is not a
/// `sep=` directive.
pub fn locate_header(rows: &[SourceRow]) -> Option<usize> {
    rows.iter().position(|row| {
        let non_empty = row.cells.iter().any(|c| !is_blank(c));
        let directive = row.cells.first().is_some_and(|c| is_directive(c));
        non_empty && !directive
    })
}

/// Build the column map for a header row
pub fn map_columns(header: &SourceRow) -> Result<ColumnMap, ImportError> {
    let folded: Vec<String> = header.cells.iter().map(|c| fold(c)).collect();
    let mut indices = BTreeMap::new();
    let mut notes = Vec::new();

    for rule in COLUMN_RULES {
        if indices.contains_key(&rule.field) {
            continue;
        }
        if let Some(idx) = folded.iter().position(|h| rule.matches(h)) {
            indices.insert(rule.field, idx);
        }
    }

    if let (Some(activity), Some(place_name)) =
        (indices.get(&Field::ActivityType).copied(), indices.get(&Field::PlaceName).copied())
    {
        if activity == place_name {
            let weaker = [Field::ActivityType, Field::PlaceName]
                .into_iter()
                .min_by_key(|f| priority_of(*f))
                .unwrap_or(Field::PlaceName);
            let note = format!(
                "column '{}' matches both activity type and place name; ignoring it as {}",
                header.cells[activity].trim(),
                weaker.as_str()
            );
            warn!("{}", note);
            notes.push(note);
            indices.remove(&weaker);
        }
    }

    if !indices.contains_key(&Field::TenantName) {
        return Err(ImportError::MissingTenantColumn(folded.join(" | ")));
    }
    if !indices.contains_key(&Field::PlaceCode) {
        let note = "no place code column; accruals will be imported without space linkage".to_string();
        warn!("{}", note);
        notes.push(note);
    }

    Ok(ColumnMap {
        indices,
        headers: header.cells.clone(),
        header_line: folded.join(" "),
        first_cell: folded.first().cloned().unwrap_or_default(),
        header_row: header.line,
        notes,
    })
}

fn priority_of(field: Field) -> u8 {
    COLUMN_RULES
        .iter()
        .find(|r| r.field == field)
        .map(|r| r.priority)
        .unwrap_or(0)
}
