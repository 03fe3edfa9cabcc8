//! Tenant accrual database queries

use anyhow::Result;
use sqlx::PgConnection;

use crate::services::accrual_import::store::SupersedeKey;
use crate::services::accrual_import::StoreCapabilities;
use crate::types::{AccrualWrite, NewTenantAccrual, TenantAccrual};

const FACT_COLUMNS: &[&str] = &[
    "market_id", "period", "content_hash", "tenant_id", "tenant_name", "space_id", "place_code",
    "area_leased", "area_free", "area", "rate", "day_count",
    "rent_amount", "management_fee", "utilities_amount", "electricity_amount",
    "total_no_vat", "total_with_vat", "vat_rate", "cash_amount",
    "discount_note", "activity_type", "location_type", "status",
    "source_file", "source_row", "import_run_id",
];

fn upsert_sql(caps: &StoreCapabilities) -> String {
    let mut columns: Vec<&str> = FACT_COLUMNS.to_vec();
    if caps.accrual_source_payload {
        columns.push("source_payload");
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    let mut refresh = vec!["updated_at = NOW()", "status = EXCLUDED.status"];
    if caps.accrual_supersession {
        refresh.push("superseded_at = NULL");
    }

    format!(
        r#"
        INSERT INTO tenant_accruals ({})
        VALUES ({})
        ON CONFLICT (market_id, period, content_hash)
        DO UPDATE SET {}
        RETURNING (xmax = 0) AS inserted
        "#,
        columns.join(", "),
        placeholders.join(", "),
        refresh.join(", ")
    )
}

/// Insert a fact or refresh an existing one with the same hash.
/// Creation time and payload of an existing fact are preserved.
pub async fn upsert_accrual(
    conn: &mut PgConnection,
    caps: &StoreCapabilities,
    accrual: &NewTenantAccrual,
) -> Result<AccrualWrite> {
    let sql = upsert_sql(caps);
    let a = &accrual.amounts;

    let mut query = sqlx::query_scalar::<_, bool>(&sql)
        .bind(accrual.market_id)
        .bind(accrual.period)
        .bind(&accrual.content_hash)
        .bind(accrual.tenant_id)
        .bind(&accrual.tenant_name)
        .bind(accrual.space_id)
        .bind(&accrual.place_code)
        .bind(a.area_leased)
        .bind(a.area_free)
        .bind(a.area)
        .bind(a.rate)
        .bind(a.day_count)
        .bind(a.rent_amount)
        .bind(a.management_fee)
        .bind(a.utilities_amount)
        .bind(a.electricity_amount)
        .bind(a.total_no_vat)
        .bind(a.total_with_vat)
        .bind(a.vat_rate)
        .bind(a.cash_amount)
        .bind(&accrual.discount_note)
        .bind(&accrual.activity_type)
        .bind(&accrual.location_type)
        .bind(accrual.status)
        .bind(&accrual.source_file)
        .bind(accrual.source_row)
        .bind(accrual.import_run_id);
    if caps.accrual_source_payload {
        query = query.bind(&accrual.source_payload);
    }

    let inserted = query.fetch_one(conn).await?;
    Ok(if inserted {
        AccrualWrite::Inserted
    } else {
        AccrualWrite::Updated
    })
}

/// Stamp current facts of the same tenant and place whose hash was not
/// written by this run
pub async fn supersede_accruals(conn: &mut PgConnection, key: &SupersedeKey<'_>) -> Result<u64> {
    let keep: Vec<String> = key.keep_hashes.iter().cloned().collect();

    let result = sqlx::query(
        r#"
        UPDATE tenant_accruals
        SET superseded_at = NOW()
        WHERE market_id = $1
          AND period = $2
          AND tenant_name = $3
          AND place_code IS NOT DISTINCT FROM $4
          AND superseded_at IS NULL
          AND NOT (content_hash = ANY($5))
        "#
    )
    .bind(key.market_id)
    .bind(key.period)
    .bind(key.tenant_name)
    .bind(key.place_code)
    .bind(&keep)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Current (not superseded) facts of a market and period
pub async fn list_current_accruals(
    conn: &mut PgConnection,
    market_id: i64,
    period: chrono::NaiveDate,
) -> Result<Vec<TenantAccrual>> {
    let accruals = sqlx::query_as::<_, TenantAccrual>(
        r#"
        SELECT id, market_id, period, content_hash, tenant_id, tenant_name, space_id, place_code,
               rent_amount, total_with_vat, status, source_file, source_row,
               created_at, updated_at, superseded_at
        FROM tenant_accruals
        WHERE market_id = $1 AND period = $2 AND superseded_at IS NULL
        ORDER BY source_row
        "#
    )
    .bind(market_id)
    .bind(period)
    .fetch_all(conn)
    .await?;

    Ok(accruals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_binds_match_columns() {
        let sql = upsert_sql(&StoreCapabilities::full());
        assert!(sql.contains("source_payload"));
        assert!(sql.contains("$28"));
        assert!(!sql.contains("$29"));
        assert!(sql.contains("superseded_at = NULL"));
    }

    #[test]
    fn test_upsert_without_optional_columns() {
        let caps = StoreCapabilities {
            accrual_source_payload: false,
            accrual_supersession: false,
            ..StoreCapabilities::full()
        };
        let sql = upsert_sql(&caps);
        assert!(!sql.contains("source_payload"));
        assert!(!sql.contains("superseded_at"));
        assert!(sql.contains("$27"));
        assert!(!sql.contains("$28"));
    }
}
