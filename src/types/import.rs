//! Import run types: options, statistics, issues and the final report

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Import issue level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportIssueLevel {
    Info,
    Warning,
    Error,
}

/// Single row-level issue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportIssue {
    pub row_number: u64,
    pub level: ImportIssueLevel,
    pub place_code: Option<String>,
    pub message: String,
}

/// Inputs of one import run, validated by the caller
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub file: PathBuf,
    pub market_id: i64,
    /// First day of the accrual month
    pub period: NaiveDate,
    pub dry_run: bool,
    /// Stop after this many rows following the header
    pub row_limit: Option<usize>,
    /// Encoding label of the source file (e.g. "utf-8", "cp1251")
    pub encoding: String,
    pub delimiter: Option<u8>,
    /// Link occupied spaces to their tenant
    pub link_tenants: bool,
    /// Stamp older facts of the same tenant/place as superseded
    pub supersede: bool,
}

impl ImportOptions {
    pub fn new(file: impl Into<PathBuf>, market_id: i64, period: NaiveDate) -> Self {
        Self {
            file: file.into(),
            market_id,
            period,
            dry_run: false,
            row_limit: None,
            encoding: "utf-8".to_string(),
            delimiter: None,
            link_tenants: false,
            supersede: true,
        }
    }

    /// File name recorded as provenance on every fact
    pub fn source_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string())
    }
}

/// Counters accumulated during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub rows_total: u32,
    pub rows_skipped: u32,
    pub rows_errors: u32,
    pub tenants_created: u32,
    pub spaces_created: u32,
    pub location_types_created: u32,
    pub locations_created: u32,
    pub spaces_marked_occupied: u32,
    pub spaces_marked_free: u32,
    pub location_assignments_attempted: u32,
    pub accruals_inserted: u32,
    pub accruals_updated: u32,
    pub accruals_superseded: u32,
}

/// Result of a finished (committed or rolled back) run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub run_id: Uuid,
    pub source_file: String,
    pub market_id: i64,
    pub period: NaiveDate,
    pub dry_run: bool,
    pub delimiter: char,
    /// Canonical field name -> header text it was mapped from
    pub columns: Vec<(String, String)>,
    pub stats: ImportStats,
    pub issues: Vec<ImportIssue>,
}

const MAX_REPORTED_ISSUES: usize = 20;

impl ImportReport {
    /// Human readable summary for the console
    pub fn render(&self) -> String {
        let s = &self.stats;
        let mut report = format!(
            "Import of '{}' (market {}, period {}){}\n",
            self.source_file,
            self.market_id,
            self.period.format("%Y-%m"),
            if self.dry_run { " [dry run, rolled back]" } else { "" },
        );
        report.push_str(&format!("Run: {}\n", self.run_id));
        report.push_str(&format!("Delimiter: {:?}\n", self.delimiter));
        report.push_str(&format!(
            "Rows: {} total, {} skipped, {} errors\n",
            s.rows_total, s.rows_skipped, s.rows_errors
        ));
        report.push_str(&format!(
            "Created: {} tenants, {} spaces, {} location types, {} locations\n",
            s.tenants_created, s.spaces_created, s.location_types_created, s.locations_created
        ));
        report.push_str(&format!(
            "Spaces marked: {} occupied, {} free; location assignments: {}\n",
            s.spaces_marked_occupied, s.spaces_marked_free, s.location_assignments_attempted
        ));
        report.push_str(&format!(
            "Accruals: {} inserted, {} updated, {} superseded\n",
            s.accruals_inserted, s.accruals_updated, s.accruals_superseded
        ));

        if !self.issues.is_empty() {
            report.push_str("\nIssues:\n");
            for (i, issue) in self.issues.iter().take(MAX_REPORTED_ISSUES).enumerate() {
                let place = issue.place_code.as_deref().unwrap_or("-");
                report.push_str(&format!(
                    "{}. row {} [{}] place {}: {}\n",
                    i + 1,
                    issue.row_number,
                    match issue.level {
                        ImportIssueLevel::Info => "info",
                        ImportIssueLevel::Warning => "warning",
                        ImportIssueLevel::Error => "error",
                    },
                    place,
                    issue.message
                ));
            }
            if self.issues.len() > MAX_REPORTED_ISSUES {
                report.push_str(&format!(
                    "... and {} more\n",
                    self.issues.len() - MAX_REPORTED_ISSUES
                ));
            }
        }

        report
    }
}
