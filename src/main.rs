//! Accrual Import - loads monthly rent-accrual exports into the market database
//!
//! Commands: `import` (transactional, optionally dry-run), `check` (offline,
//! in-memory), `list` and `migrate`.

mod cli;
mod config;
mod db;
mod services;
mod types;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::services::accrual_import::{run_import, MemoryStore};
use crate::types::{ImportOptions, ImportReport};

/// Market registered in the in-memory store used by `check`
const CHECK_MARKET_ID: i64 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.logs_dir, "accrual-import.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Logs go to stderr so that stdout carries only the report
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,accrual_import=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    if let Err(e) = run(cli.command, &config).await {
        error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Import {
            file,
            market_id,
            period,
            dry_run,
            limit,
            encoding,
            delimiter,
            link_tenants,
            no_supersede,
            json,
        } => {
            let pool = db::create_pool(config.require_database_url()?, config.db_max_connections).await?;
            info!("Connected to PostgreSQL");
            let store = db::PgAccrualStore::new(pool);

            let mut options = ImportOptions::new(file, market_id, period);
            options.dry_run = dry_run;
            options.row_limit = limit;
            options.encoding = encoding.unwrap_or_else(|| config.default_encoding.clone());
            options.delimiter = delimiter;
            options.link_tenants = link_tenants || config.link_tenants;
            options.supersede = !no_supersede;

            let report = run_import(&store, &options).await?;
            print_report(&report, json)
        }
        Command::Check {
            file,
            encoding,
            delimiter,
            limit,
            json,
        } => {
            let store = MemoryStore::new();
            store.add_market(CHECK_MARKET_ID);

            let mut options = ImportOptions::new(file, CHECK_MARKET_ID, current_period()?);
            options.dry_run = true;
            options.row_limit = limit;
            options.encoding = encoding.unwrap_or_else(|| config.default_encoding.clone());
            options.delimiter = delimiter;

            let report = run_import(&store, &options).await?;
            print_report(&report, json)
        }
        Command::List {
            market_id,
            period,
            json,
        } => {
            let pool = db::create_pool(config.require_database_url()?, 1).await?;
            let mut conn = pool.acquire().await?;
            let accruals = db::queries::accrual::list_current_accruals(&mut conn, market_id, period).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&accruals)?);
            } else {
                for a in &accruals {
                    println!(
                        "{:>5}  {:<40} {:<10} {:>12.2} {:>12.2}  {}",
                        a.source_row,
                        a.tenant_name,
                        a.place_code.as_deref().unwrap_or("-"),
                        a.rent_amount,
                        a.total_with_vat,
                        a.status.as_str()
                    );
                }
                println!("{} current accrual(s)", accruals.len());
            }
            Ok(())
        }
        Command::Migrate => {
            let pool = db::create_pool(config.require_database_url()?, 1).await?;
            db::run_migrations(&pool).await
        }
    }
}

fn current_period() -> Result<NaiveDate> {
    let today = Utc::now().date_naive();
    NaiveDate::from_ymd_opt(today.year(), today.month(), 1).context("invalid current month")
}

fn print_report(report: &ImportReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}
