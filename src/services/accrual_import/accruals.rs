//! Content-hashed accrual facts

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{AccrualWrite, NewTenantAccrual};

use super::context::RunContext;
use super::store::{StoreTx, SupersedeKey};

fn number(value: f64) -> Value {
    // -0.0 and 0.0 must hash the same
    let value = if value == 0.0 { 0.0 } else { value };
    Value::String(format!("{:.4}", value))
}

fn text(value: &Option<String>) -> Value {
    value.as_deref().map_or(Value::Null, |v| Value::String(v.to_string()))
}

/// SHA-256 over the semantic fields of a fact. Provenance (file, row,
/// payload, run) and the stored ids are not part of the hash.
pub fn content_hash(fact: &NewTenantAccrual) -> String {
    let a = &fact.amounts;
    let mut fields: BTreeMap<&str, Value> = BTreeMap::new();

    fields.insert("market_id", json!(fact.market_id));
    fields.insert("period", Value::String(fact.period.format("%Y-%m-%d").to_string()));
    fields.insert("tenant_name", Value::String(fact.tenant_name.clone()));
    fields.insert("place_code", text(&fact.place_code));
    fields.insert("area_leased", number(a.area_leased));
    fields.insert("area_free", number(a.area_free));
    fields.insert("area", number(a.area));
    fields.insert("rate", number(a.rate));
    fields.insert("day_count", a.day_count.map_or(Value::Null, |d| json!(d)));
    fields.insert("rent_amount", number(a.rent_amount));
    fields.insert("management_fee", number(a.management_fee));
    fields.insert("utilities_amount", number(a.utilities_amount));
    fields.insert("electricity_amount", number(a.electricity_amount));
    fields.insert("total_no_vat", number(a.total_no_vat));
    fields.insert("total_with_vat", number(a.total_with_vat));
    fields.insert("vat_rate", a.vat_rate.map_or(Value::Null, number));
    fields.insert("cash_amount", number(a.cash_amount));
    fields.insert("discount_note", text(&fact.discount_note));
    fields.insert("activity_type", text(&fact.activity_type));
    fields.insert("location_type", text(&fact.location_type));

    // BTreeMap keys serialize in sorted order
    let canonical = Value::Object(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect());
    hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
}

/// Upsert the fact and remember its hash and logical key for supersession
pub async fn write_accrual<T: StoreTx>(
    tx: &mut T,
    ctx: &mut RunContext,
    fact: &NewTenantAccrual,
) -> Result<AccrualWrite> {
    let outcome = tx.upsert_accrual(fact).await?;
    match outcome {
        AccrualWrite::Inserted => ctx.stats.accruals_inserted += 1,
        AccrualWrite::Updated => ctx.stats.accruals_updated += 1,
    }
    ctx.written_hashes.insert(fact.content_hash.clone());
    ctx.written_keys.insert((fact.tenant_name.clone(), fact.place_code.clone()));
    debug!(
        "Accrual row {} for '{}' {:?} (hash {})",
        fact.source_row,
        fact.tenant_name,
        outcome,
        &fact.content_hash[..12.min(fact.content_hash.len())]
    );
    Ok(outcome)
}

/// Retire current facts of every key written in this run whose hash was
/// not produced by the run. Must run once, after all rows are written.
pub async fn supersede_stale<T: StoreTx>(tx: &mut T, ctx: &mut RunContext) -> Result<u64> {
    if !ctx.supersede || !ctx.capabilities.accrual_supersession {
        return Ok(0);
    }

    let mut total = 0;
    for (tenant_name, place_code) in &ctx.written_keys {
        let key = SupersedeKey {
            market_id: ctx.market_id,
            period: ctx.period,
            tenant_name,
            place_code: place_code.as_deref(),
            keep_hashes: &ctx.written_hashes,
        };
        let retired = tx.supersede_accruals(&key).await?;
        if retired > 0 {
            debug!("Superseded {} older accrual(s) of '{}'", retired, tenant_name);
        }
        total += retired;
    }

    ctx.stats.accruals_superseded += total as u32;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accrual_import::store::{AccrualStore, MemoryStore, StoreCapabilities};
    use crate::types::{AccrualAmounts, ImportOptions, SpaceStatus};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn fact(row: i64, rent: f64) -> NewTenantAccrual {
        let mut f = NewTenantAccrual {
            market_id: 1,
            period: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            content_hash: String::new(),
            tenant_id: 10,
            tenant_name: "ООО Ромашка".into(),
            space_id: Some(20),
            place_code: Some("12".into()),
            amounts: AccrualAmounts { rent_amount: rent, ..Default::default() },
            discount_note: None,
            activity_type: None,
            location_type: None,
            status: SpaceStatus::Occupied,
            source_file: "jan.csv".into(),
            source_row: row,
            source_payload: serde_json::json!({ "Сумма аренды": rent.to_string() }),
            import_run_id: Uuid::new_v4(),
        };
        f.content_hash = content_hash(&f);
        f
    }

    fn context() -> RunContext {
        let options = ImportOptions::new("jan.csv", 1, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        RunContext::new(&options, StoreCapabilities::full())
    }

    #[test]
    fn test_hash_ignores_provenance() {
        let a = fact(2, 1000.0);
        let b = fact(17, 1000.0);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_rent() {
        assert_ne!(fact(2, 1000.0).content_hash, fact(2, 1000.5).content_hash);
    }

    #[test]
    fn test_negative_zero_hashes_like_zero() {
        let mut a = fact(2, 1000.0);
        a.amounts.cash_amount = -0.0;
        assert_eq!(content_hash(&a), fact(2, 1000.0).content_hash);
    }

    #[tokio::test]
    async fn test_second_write_is_update() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut ctx = context();

        assert_eq!(write_accrual(&mut tx, &mut ctx, &fact(2, 1000.0)).await.unwrap(), AccrualWrite::Inserted);
        assert_eq!(write_accrual(&mut tx, &mut ctx, &fact(3, 1000.0)).await.unwrap(), AccrualWrite::Updated);
        tx.commit().await.unwrap();

        assert_eq!(ctx.stats.accruals_inserted, 1);
        assert_eq!(ctx.stats.accruals_updated, 1);
        let stored = store.snapshot().accruals;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fact.source_row, 2);
    }

    #[tokio::test]
    async fn test_corrected_fact_supersedes_previous_one() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            let mut ctx = context();
            write_accrual(&mut tx, &mut ctx, &fact(2, 1000.0)).await.unwrap();
            tx.commit().await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let mut ctx = context();
        write_accrual(&mut tx, &mut ctx, &fact(2, 1100.0)).await.unwrap();
        assert_eq!(supersede_stale(&mut tx, &mut ctx).await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert_eq!(ctx.stats.accruals_superseded, 1);
        let stored = store.snapshot().accruals;
        assert_eq!(stored.len(), 2);
        assert!(stored[0].superseded_at.is_some());
        assert!(stored[1].superseded_at.is_none());
    }

    #[tokio::test]
    async fn test_supersession_can_be_disabled() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut ctx = context();
        ctx.supersede = false;

        write_accrual(&mut tx, &mut ctx, &fact(2, 1000.0)).await.unwrap();
        write_accrual(&mut tx, &mut ctx, &fact(2, 1100.0)).await.unwrap();
        assert_eq!(supersede_stale(&mut tx, &mut ctx).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert_eq!(ctx.stats.accruals_superseded, 0);
        assert!(store.snapshot().accruals.iter().all(|a| a.superseded_at.is_none()));
    }

    #[tokio::test]
    async fn test_facts_written_in_one_run_keep_each_other() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut ctx = context();

        write_accrual(&mut tx, &mut ctx, &fact(2, 1000.0)).await.unwrap();
        write_accrual(&mut tx, &mut ctx, &fact(3, 50.0)).await.unwrap();
        assert_eq!(supersede_stale(&mut tx, &mut ctx).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert_eq!(ctx.written_keys.len(), 1);
        let stored = store.snapshot().accruals;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|a| a.superseded_at.is_none()));
    }
}
