//! Mutable per-run state threaded through the row loop

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{ImportIssue, ImportIssueLevel, ImportOptions, ImportStats, MarketSpace};

use super::classify::SkipReason;
use super::locations::ResolvedLocation;
use super::occupancy::OccupancyTracker;
use super::store::StoreCapabilities;

/// Everything one run remembers between rows. Never shared across runs.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub market_id: i64,
    pub period: NaiveDate,
    pub source_file: String,
    pub link_tenants: bool,
    pub supersede: bool,
    pub capabilities: StoreCapabilities,

    pub stats: ImportStats,
    pub issues: Vec<ImportIssue>,

    /// Last tenant name seen on a data row (merged cells)
    pub carried_tenant: Option<String>,
    /// Last non-blank location type value
    pub carried_location_type: Option<String>,

    pub tenants: HashMap<String, i64>,
    /// Spaces touched in this run, by id
    pub spaces: HashMap<i64, MarketSpace>,
    /// Place code -> space id; several codes may point at one space
    pub space_ids: HashMap<String, i64>,
    pub locations: HashMap<String, ResolvedLocation>,
    pub occupancy: OccupancyTracker,
    pub written_hashes: HashSet<String>,
    /// (tenant name, place code) of every fact written in this run
    pub written_keys: BTreeSet<(String, Option<String>)>,
}

impl RunContext {
    pub fn new(options: &ImportOptions, capabilities: StoreCapabilities) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            market_id: options.market_id,
            period: options.period,
            source_file: options.source_name(),
            link_tenants: options.link_tenants,
            supersede: options.supersede,
            capabilities,
            stats: ImportStats::default(),
            issues: Vec::new(),
            carried_tenant: None,
            carried_location_type: None,
            tenants: HashMap::new(),
            spaces: HashMap::new(),
            space_ids: HashMap::new(),
            locations: HashMap::new(),
            occupancy: OccupancyTracker::default(),
            written_hashes: HashSet::new(),
            written_keys: BTreeSet::new(),
        }
    }

    pub fn skip(&mut self, row_number: u64, reason: SkipReason) {
        self.stats.rows_skipped += 1;
        debug!("Row {} skipped: {}", row_number, reason.as_str());
    }

    pub fn info(&mut self, row_number: u64, message: impl Into<String>) {
        self.push_issue(row_number, ImportIssueLevel::Info, None, message.into());
    }

    /// Soft warning; does not change how the row is processed
    pub fn warn(&mut self, row_number: u64, place_code: &str, message: impl Into<String>) {
        let message = message.into();
        warn!("Row {} (place '{}'): {}", row_number, place_code, message);
        self.push_issue(row_number, ImportIssueLevel::Warning, non_empty(place_code), message);
    }

    /// Row-level error: counted, the row's fact is not written
    pub fn row_error(&mut self, row_number: u64, place_code: &str, message: impl Into<String>) {
        let message = message.into();
        warn!("Row {} (place '{}') error: {}", row_number, place_code, message);
        self.stats.rows_errors += 1;
        self.push_issue(row_number, ImportIssueLevel::Error, non_empty(place_code), message);
    }

    fn push_issue(
        &mut self,
        row_number: u64,
        level: ImportIssueLevel,
        place_code: Option<String>,
        message: String,
    ) {
        self.issues.push(ImportIssue {
            row_number,
            level,
            place_code,
            message,
        });
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
