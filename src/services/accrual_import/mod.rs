//! Monthly accrual import pipeline.
//!
//! A run reads a delimited export, maps its header to known fields,
//! classifies every row and writes tenants, spaces, locations and
//! content-hashed accrual facts inside one transaction. Dry runs always
//! roll back.

pub mod accruals;
pub mod classify;
pub mod columns;
pub mod context;
pub mod entities;
pub mod error;
pub mod locations;
pub mod occupancy;
pub mod row;
pub mod source;
pub mod store;
pub mod text;
pub mod values;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::types::{ImportOptions, ImportReport, NewTenantAccrual};

use self::accruals::{content_hash, supersede_stale, write_accrual};
use self::classify::{classify, is_totals_label, RowKind, SkipReason};
use self::columns::{locate_header, map_columns, ColumnMap};
use self::context::RunContext;
use self::entities::{resolve_tenant, touch_space, SpaceTouch};
use self::locations::resolve_location;
use self::row::ParsedRow;
use self::source::{read_table, resolve_encoding, SourceRow, SourceTable};
use self::store::{AccrualStore, StoreTx};

pub use self::error::ImportError;
pub use self::store::{MemoryStore, StoreCapabilities};

/// Import the file named in `options`
pub async fn run_import<S: AccrualStore>(store: &S, options: &ImportOptions) -> Result<ImportReport> {
    let bytes = tokio::fs::read(&options.file)
        .await
        .map_err(|source| ImportError::UnreadableFile {
            path: options.file.display().to_string(),
            source,
        })?;
    import_bytes(store, options, &bytes).await
}

/// Import already loaded file content
pub async fn import_bytes<S: AccrualStore>(
    store: &S,
    options: &ImportOptions,
    bytes: &[u8],
) -> Result<ImportReport> {
    let encoding = resolve_encoding(&options.encoding)?;
    let table = read_table(bytes, options.delimiter, encoding)?;
    let header_idx = locate_header(&table.rows).ok_or(ImportError::MissingHeader)?;
    let map = map_columns(&table.rows[header_idx])?;

    info!(
        "Importing '{}' into market {} for {} ({} records, delimiter {:?}, encoding {}, store {})",
        options.source_name(),
        options.market_id,
        options.period.format("%Y-%m"),
        table.rows.len(),
        table.delimiter as char,
        table.encoding.name(),
        store.name()
    );
    debug!("Column map: {:?}", map.describe());

    let mut tx = store.begin().await?;
    let ctx = match process_rows(&mut tx, options, &table, header_idx, &map).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Import of '{}' failed, rolling back: {:#}", options.source_name(), e);
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed: {:#}", rollback_err);
            }
            return Err(e);
        }
    };

    if options.dry_run {
        tx.rollback().await?;
        info!("Dry run finished, all changes rolled back");
    } else {
        tx.commit().await?;
    }

    let s = &ctx.stats;
    info!(
        "Import {} done: {} rows, {} skipped, {} errors, {} accruals inserted, {} updated, {} superseded",
        ctx.run_id,
        s.rows_total,
        s.rows_skipped,
        s.rows_errors,
        s.accruals_inserted,
        s.accruals_updated,
        s.accruals_superseded
    );

    Ok(ImportReport {
        run_id: ctx.run_id,
        source_file: ctx.source_file,
        market_id: ctx.market_id,
        period: ctx.period,
        dry_run: options.dry_run,
        delimiter: table.delimiter as char,
        columns: map.describe(),
        stats: ctx.stats,
        issues: ctx.issues,
    })
}

async fn process_rows<T: StoreTx>(
    tx: &mut T,
    options: &ImportOptions,
    table: &SourceTable,
    header_idx: usize,
    map: &ColumnMap,
) -> Result<RunContext> {
    if !tx.market_exists(options.market_id).await? {
        return Err(ImportError::UnknownMarket(options.market_id).into());
    }

    let capabilities = tx.capabilities().await?;
    debug!("Store capabilities: {:?}", capabilities);

    let mut ctx = RunContext::new(options, capabilities);
    info!("Import run {} started", ctx.run_id);
    for note in &map.notes {
        ctx.info(map.header_row, note.clone());
    }

    let mut truncated = false;
    for source_row in &table.rows[header_idx + 1..] {
        if let Some(limit) = options.row_limit {
            if ctx.stats.rows_total as usize >= limit {
                info!("Row limit {} reached at line {}", limit, source_row.line);
                truncated = true;
                break;
            }
        }
        ctx.stats.rows_total += 1;
        process_row(tx, &mut ctx, map, source_row).await?;
    }

    // facts past the limit were never read, so they cannot count as stale
    if truncated {
        info!("Supersession skipped for truncated run {}", ctx.run_id);
    } else {
        supersede_stale(tx, &mut ctx).await?;
    }

    Ok(ctx)
}

async fn process_row<T: StoreTx>(
    tx: &mut T,
    ctx: &mut RunContext,
    map: &ColumnMap,
    source_row: &SourceRow,
) -> Result<()> {
    let line = source_row.line;
    let cells = &source_row.cells;
    let row = ParsedRow::parse(cells, map);
    let kind = classify(cells, &row, map, ctx.carried_tenant.as_deref());

    let structural = matches!(kind, RowKind::Skip(SkipReason::Empty | SkipReason::RepeatedHeader));
    if !structural && !row.location_type.is_empty() {
        ctx.carried_location_type = Some(row.location_type.clone());
    }

    let (tenant_name, continued) = match kind {
        RowKind::Data { tenant_name, continued } => (tenant_name, continued),
        RowKind::Skip(reason) => {
            ctx.skip(line, reason);
            return Ok(());
        }
    };

    if continued {
        debug!("Row {} continues tenant '{}'", line, tenant_name);
    } else if !tenant_name.is_empty() {
        ctx.carried_tenant = Some(tenant_name.clone());
    }
    if is_totals_label(&tenant_name) {
        ctx.warn(line, &row.place_code, "totals label carries amounts; imported as a data row");
    }

    let occupancy = occupancy::resolve(&row, map);
    for warning in &occupancy.warnings {
        ctx.warn(line, &row.place_code, warning.clone());
    }

    let location = match ctx.carried_location_type.clone() {
        Some(name) if ctx.capabilities.locations => resolve_location(tx, ctx, &name).await?,
        _ => None,
    };

    let tenant_id = if occupancy.is_leased && !tenant_name.is_empty() {
        Some(resolve_tenant(tx, ctx, &tenant_name).await?)
    } else {
        None
    };
    if occupancy.is_leased && tenant_id.is_none() {
        ctx.row_error(
            line,
            &row.place_code,
            format!("rent {} charged without a tenant name; accrual skipped", row.amounts.rent_amount),
        );
    }

    let space = if row.place_code.is_empty() {
        None
    } else {
        let touch = SpaceTouch {
            place_code: &row.place_code,
            place_name: &row.place_name,
            activity_type: &row.activity_type,
            area: row.amounts.area,
            is_leased: occupancy.is_leased,
            location: location.as_ref(),
            tenant_id,
        };
        Some(touch_space(tx, ctx, &touch).await?)
    };

    let Some(tenant_id) = tenant_id else {
        return Ok(());
    };

    let mut fact = NewTenantAccrual {
        market_id: ctx.market_id,
        period: ctx.period,
        content_hash: String::new(),
        tenant_id,
        tenant_name,
        space_id: space.map(|s| s.id),
        place_code: non_empty(&row.place_code),
        amounts: row.amounts.clone(),
        discount_note: non_empty(&row.discount_note),
        activity_type: non_empty(&row.activity_type),
        location_type: ctx.carried_location_type.clone(),
        status: occupancy.status(),
        source_file: ctx.source_file.clone(),
        source_row: line as i64,
        source_payload: map.raw_payload(cells),
        import_run_id: ctx.run_id,
    };
    fact.content_hash = content_hash(&fact);
    write_accrual(tx, ctx, &fact).await?;

    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImportIssueLevel, SpaceStatus};
    use chrono::NaiveDate;

    const SCENARIO_A: &str = "ФИО;№ отдела;Сумма аренды\n\"ООО Ромашка\";\"12\";\"1000\"\n";

    fn options() -> ImportOptions {
        ImportOptions::new("jan.csv", 1, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_market(1);
        store
    }

    async fn import(store: &MemoryStore, opts: &ImportOptions, content: &str) -> ImportReport {
        import_bytes(store, opts, content.as_bytes()).await.unwrap()
    }

    #[tokio::test]
    async fn test_scenario_occupied_row_creates_everything() {
        let store = store();
        let report = import(&store, &options(), SCENARIO_A).await;

        assert_eq!(report.stats.rows_total, 1);
        assert_eq!(report.stats.tenants_created, 1);
        assert_eq!(report.stats.spaces_created, 1);
        assert_eq!(report.stats.spaces_marked_occupied, 1);
        assert_eq!(report.stats.accruals_inserted, 1);
        assert_eq!(report.delimiter, ';');

        let state = store.snapshot();
        let tenant = state.tenant(1, "ООО Ромашка").unwrap();
        assert_eq!(tenant.legal_form_hint, Some(crate::types::LegalFormHint::Company));
        let space = state.space(1, "12").unwrap();
        assert_eq!(space.status, SpaceStatus::Occupied);
        assert_eq!(space.display_name.as_deref(), Some("Место 12"));

        assert_eq!(state.accruals.len(), 1);
        let fact = &state.accruals[0].fact;
        assert_eq!(fact.amounts.rent_amount, 1000.0);
        assert_eq!(fact.status, SpaceStatus::Occupied);
        assert_eq!(fact.tenant_id, tenant.id);
        assert_eq!(fact.space_id, Some(space.id));
        assert_eq!(fact.source_row, 2);
        assert_eq!(fact.source_payload["Сумма аренды"], "1000");
        assert_eq!(fact.import_run_id, report.run_id);
    }

    #[tokio::test]
    async fn test_scenario_zero_rent_marks_space_free() {
        let store = store();
        let report = import(&store, &options(), "ФИО;№ отдела;Сумма аренды\nООО Ромашка;12;0\n").await;

        assert_eq!(report.stats.accruals_inserted, 0);
        assert_eq!(report.stats.spaces_marked_free, 1);
        assert_eq!(report.stats.rows_errors, 0);
        let state = store.snapshot();
        assert_eq!(state.space(1, "12").unwrap().status, SpaceStatus::Free);
        assert!(state.accruals.is_empty());
        assert!(state.tenants.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_totals_row_is_skipped() {
        let store = store();
        let report = import(&store, &options(), "ФИО;№ отдела;Сумма аренды\nИтого;;\n").await;

        assert_eq!(report.stats.rows_total, 1);
        assert_eq!(report.stats.rows_skipped, 1);
        let state = store.snapshot();
        assert!(state.tenants.is_empty());
        assert!(state.spaces.is_empty());
        assert!(state.accruals.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_dry_run_leaves_no_trace() {
        let store = store();
        let mut opts = options();
        opts.dry_run = true;
        let report = import(&store, &opts, SCENARIO_A).await;

        assert!(report.dry_run);
        assert_eq!(report.stats.tenants_created, 1);
        assert_eq!(report.stats.spaces_created, 1);
        assert_eq!(report.stats.accruals_inserted, 1);

        let state = store.snapshot();
        assert!(state.tenants.is_empty());
        assert!(state.spaces.is_empty());
        assert!(state.accruals.is_empty());
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let store = store();
        let first = import(&store, &options(), SCENARIO_A).await;
        let second = import(&store, &options(), SCENARIO_A).await;

        assert_eq!(first.stats.accruals_inserted, 1);
        assert_eq!(second.stats.accruals_inserted, 0);
        assert_eq!(second.stats.accruals_updated, 1);
        assert_eq!(second.stats.accruals_superseded, 0);
        assert_eq!(second.stats.tenants_created, 0);
        assert_eq!(second.stats.spaces_created, 0);
        assert_eq!(store.snapshot().accruals.len(), 1);
    }

    #[tokio::test]
    async fn test_occupied_place_is_never_downgraded() {
        for content in [
            "ФИО;№ отдела;Сумма аренды\nА;7;500\nБ;7;0\n",
            "ФИО;№ отдела;Сумма аренды\nБ;7;0\nА;7;500\n",
        ] {
            let store = store();
            import(&store, &options(), content).await;
            assert_eq!(store.snapshot().space(1, "7").unwrap().status, SpaceStatus::Occupied);
        }
    }

    #[tokio::test]
    async fn test_status_follows_rent_only() {
        let content = "Арендатор;№ места;Арендуемая площадь;Свободная площадь;Аренда\n\
                       А;1;0;25;100\n\
                       Б;2;25;0;0\n";
        let store = store();
        let report = import(&store, &options(), content).await;

        let state = store.snapshot();
        assert_eq!(state.space(1, "1").unwrap().status, SpaceStatus::Occupied);
        assert_eq!(state.space(1, "2").unwrap().status, SpaceStatus::Free);
        assert_eq!(state.space(1, "1").unwrap().area, Some(25.0));
        let warnings = report.issues.iter().filter(|i| i.level == ImportIssueLevel::Warning).count();
        assert_eq!(warnings, 2);
        assert_eq!(report.stats.rows_errors, 0);
    }

    #[tokio::test]
    async fn test_manual_display_name_survives_reimport() {
        let content = "ФИО;№ отдела;Наименование отдела;Сумма аренды\nООО Ромашка;12;Цветы;1000\n";
        let store = store();
        import(&store, &options(), content).await;
        assert_eq!(store.snapshot().space(1, "12").unwrap().display_name.as_deref(), Some("Цветы"));

        store.edit(|s| {
            let id = s.space(1, "12").unwrap().id;
            s.space_mut(id).unwrap().display_name = Some("Цветочный павильон".into());
        });
        import(&store, &options(), content).await;

        assert_eq!(
            store.snapshot().space(1, "12").unwrap().display_name.as_deref(),
            Some("Цветочный павильон")
        );
    }

    #[tokio::test]
    async fn test_continuation_rows_inherit_tenant() {
        let content = "ФИО;№ отдела;Сумма аренды\nИП Сидоров;13;500\n;14;700\n";
        let store = store();
        let report = import(&store, &options(), content).await;

        assert_eq!(report.stats.tenants_created, 1);
        assert_eq!(report.stats.accruals_inserted, 2);
        let state = store.snapshot();
        assert!(state.accruals.iter().all(|a| a.fact.tenant_name == "ИП Сидоров"));
    }

    #[tokio::test]
    async fn test_rent_without_tenant_is_a_row_error() {
        let content = "№ отдела;Сумма аренды;ФИО\n13;500;\n";
        let store = store();
        let report = import(&store, &options(), content).await;

        assert_eq!(report.stats.rows_errors, 1);
        assert_eq!(report.stats.accruals_inserted, 0);
        let issue = report.issues.iter().find(|i| i.level == ImportIssueLevel::Error).unwrap();
        assert_eq!(issue.row_number, 2);
        assert_eq!(issue.place_code.as_deref(), Some("13"));
        // the space still exists and is occupied
        assert_eq!(store.snapshot().space(1, "13").unwrap().status, SpaceStatus::Occupied);
    }

    #[tokio::test]
    async fn test_location_context_is_carried_and_cached() {
        let content = "Арендатор;№ места;Тип места;Аренда\n\
                       ;;Крытый ряд;\n\
                       А;1;;100\n\
                       Б;2;;200\n\
                       В;3;Outdoor zone;300\n";
        let store = store();
        let report = import(&store, &options(), content).await;

        assert_eq!(report.stats.location_types_created, 2);
        assert_eq!(report.stats.locations_created, 2);
        assert_eq!(report.stats.location_assignments_attempted, 3);
        assert_eq!(report.stats.rows_skipped, 1);

        let state = store.snapshot();
        let indoor = state.space(1, "1").unwrap().location_id;
        assert!(indoor.is_some());
        assert_eq!(state.space(1, "2").unwrap().location_id, indoor);
        assert_ne!(state.space(1, "3").unwrap().location_id, indoor);
        assert_eq!(state.accruals[0].fact.location_type.as_deref(), Some("Крытый ряд"));
    }

    #[tokio::test]
    async fn test_locations_are_skipped_without_capability() {
        let store = MemoryStore::with_capabilities(StoreCapabilities {
            locations: false,
            ..StoreCapabilities::full()
        });
        store.add_market(1);
        let content = "Арендатор;№ места;Тип места;Аренда\nА;1;Крытый ряд;100\n";
        let report = import(&store, &options(), content).await;

        assert_eq!(report.stats.location_types_created, 0);
        assert_eq!(report.stats.location_assignments_attempted, 0);
        assert_eq!(report.stats.accruals_inserted, 1);
        assert!(store.snapshot().space(1, "1").unwrap().location_id.is_none());
    }

    #[tokio::test]
    async fn test_corrected_file_supersedes_old_facts() {
        let store = store();
        import(&store, &options(), SCENARIO_A).await;
        let report = import(&store, &options(), "ФИО;№ отдела;Сумма аренды\nООО Ромашка;12;1200\n").await;

        assert_eq!(report.stats.accruals_inserted, 1);
        assert_eq!(report.stats.accruals_superseded, 1);
        let state = store.snapshot();
        let current: Vec<_> = state.accruals.iter().filter(|a| a.superseded_at.is_none()).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].fact.amounts.rent_amount, 1200.0);
    }

    #[tokio::test]
    async fn test_unknown_market_is_fatal() {
        let store = MemoryStore::new();
        let err = import_bytes(&store, &options(), SCENARIO_A.as_bytes()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ImportError>(), Some(ImportError::UnknownMarket(1))));
    }

    #[tokio::test]
    async fn test_missing_tenant_column_is_fatal() {
        let store = store();
        let err = import_bytes(&store, &options(), "№ отдела;Сумма аренды\n12;100\n".as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::MissingTenantColumn(_))
        ));
        assert!(store.snapshot().spaces.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_encoding_is_fatal() {
        let store = store();
        let mut opts = options();
        opts.encoding = "klingon-8".into();
        let err = import_bytes(&store, &opts, SCENARIO_A.as_bytes()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::UnsupportedEncoding(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let store = store();
        let opts = ImportOptions::new("/nonexistent/jan.csv", 1, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        let err = run_import(&store, &opts).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::UnreadableFile { .. })
        ));
    }

    #[tokio::test]
    async fn test_row_limit_truncates_loop() {
        let content = "ФИО;№ отдела;Сумма аренды\nА;1;100\nБ;2;200\nВ;3;300\n";
        let store = store();
        let mut opts = options();
        opts.row_limit = Some(2);
        let report = import(&store, &opts, content).await;

        assert_eq!(report.stats.rows_total, 2);
        assert_eq!(report.stats.accruals_inserted, 2);
        assert!(store.snapshot().space(1, "3").is_none());
    }

    const SPLIT_CHARGES: &str = "ФИО;№ отдела;Сумма аренды\nА;12;1000\nА;12;50\n";

    #[tokio::test]
    async fn test_rerun_keeps_charges_sharing_tenant_and_place() {
        let store = store();
        let first = import(&store, &options(), SPLIT_CHARGES).await;
        assert_eq!(first.stats.accruals_inserted, 2);
        assert_eq!(first.stats.accruals_superseded, 0);

        let second = import(&store, &options(), SPLIT_CHARGES).await;
        assert_eq!(second.stats.accruals_inserted, 0);
        assert_eq!(second.stats.accruals_updated, 2);
        assert_eq!(second.stats.accruals_superseded, 0);

        let state = store.snapshot();
        assert_eq!(state.accruals.len(), 2);
        assert!(state.accruals.iter().all(|a| a.superseded_at.is_none()));
    }

    #[tokio::test]
    async fn test_truncated_run_does_not_supersede() {
        let store = store();
        import(&store, &options(), SPLIT_CHARGES).await;

        let mut opts = options();
        opts.row_limit = Some(1);
        let report = import(&store, &opts, SPLIT_CHARGES).await;
        assert_eq!(report.stats.rows_total, 1);
        assert_eq!(report.stats.accruals_superseded, 0);

        let current = store.snapshot().accruals.iter().filter(|a| a.superseded_at.is_none()).count();
        assert_eq!(current, 2);
    }

    #[tokio::test]
    async fn test_legacy_encoding_and_directive_line() {
        let content = "sep=;\nФИО;№ отдела;Сумма аренды\nИП Петров;5;1 500,50\n";
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(content);
        let store = store();
        let mut opts = options();
        opts.encoding = "cp1251".into();
        let report = import_bytes(&store, &opts, &bytes).await.unwrap();

        assert_eq!(report.stats.rows_total, 1);
        assert_eq!(report.stats.accruals_inserted, 1);
        let state = store.snapshot();
        assert!(state.tenant(1, "ИП Петров").is_some());
        assert_eq!(state.accruals[0].fact.amounts.rent_amount, 1500.5);
        assert_eq!(state.accruals[0].fact.source_row, 3);
    }

    #[tokio::test]
    async fn test_repeated_header_and_headings_are_skipped() {
        let content = "ФИО;№ отдела;Сумма аренды\n\
                       Ряд 1;;\n\
                       А;1;100\n\
                       ФИО;№ отдела;Сумма аренды\n\
                       ;;\n\
                       Б;2;200\n";
        let store = store();
        let report = import(&store, &options(), content).await;

        assert_eq!(report.stats.rows_total, 5);
        assert_eq!(report.stats.rows_skipped, 3);
        assert_eq!(report.stats.accruals_inserted, 2);
    }
}
