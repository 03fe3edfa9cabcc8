//! CLI argument parsing for the accrual-import binary.

use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};

use crate::services::accrual_import::source::parse_delimiter;
use crate::services::accrual_import::ImportError;

#[derive(Parser)]
#[command(name = "accrual-import", about = "Monthly rent-accrual importer", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import an accrual export into the database
    Import {
        /// Delimited text export
        file: PathBuf,
        #[arg(long)]
        market_id: i64,
        /// Accrual month: YYYY-MM or the first day of the month
        #[arg(long, value_parser = parse_period)]
        period: NaiveDate,
        /// Run everything, then roll back
        #[arg(long)]
        dry_run: bool,
        /// Process at most N rows after the header
        #[arg(long)]
        limit: Option<usize>,
        /// Source encoding label (utf-8, cp1251, ...)
        #[arg(long)]
        encoding: Option<String>,
        /// Field delimiter; sniffed when omitted
        #[arg(long, value_parser = parse_delimiter)]
        delimiter: Option<u8>,
        /// Link occupied spaces to their tenant
        #[arg(long)]
        link_tenants: bool,
        /// Keep older facts of a changed row current
        #[arg(long)]
        no_supersede: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse and classify a file without a database
    Check {
        file: PathBuf,
        #[arg(long)]
        encoding: Option<String>,
        #[arg(long, value_parser = parse_delimiter)]
        delimiter: Option<u8>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List current accrual facts of a market and period
    List {
        #[arg(long)]
        market_id: i64,
        #[arg(long, value_parser = parse_period)]
        period: NaiveDate,
        #[arg(long)]
        json: bool,
    },
    /// Run database migrations and exit
    Migrate,
}

/// Parse `YYYY-MM` or `YYYY-MM-01` into the first day of the month
pub fn parse_period(raw: &str) -> Result<NaiveDate, ImportError> {
    let raw = raw.trim();
    let invalid = || ImportError::InvalidPeriod(raw.to_string());

    let date = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| invalid())?;

    if date.day() != 1 {
        return Err(invalid());
    }
    Ok(date)
}
