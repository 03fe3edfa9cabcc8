//! Schema introspection for optional import features

use std::collections::HashSet;

use anyhow::Result;
use sqlx::PgConnection;

use crate::services::accrual_import::StoreCapabilities;

/// Resolve which optional tables and columns the connected schema has
pub async fn load_capabilities(conn: &mut PgConnection) -> Result<StoreCapabilities> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT table_name::text, column_name::text
        FROM information_schema.columns
        WHERE table_schema = current_schema()
          AND table_name IN ('market_spaces', 'tenant_accruals', 'market_location_types', 'market_locations')
        "#
    )
    .fetch_all(conn)
    .await?;

    let columns: HashSet<(String, String)> = rows.into_iter().collect();
    let has = |table: &str, column: &str| columns.contains(&(table.to_string(), column.to_string()));

    Ok(StoreCapabilities {
        locations: has("market_location_types", "code")
            && has("market_locations", "code")
            && has("market_spaces", "location_id"),
        space_activity_type: has("market_spaces", "activity_type"),
        space_tenant_link: has("market_spaces", "tenant_id"),
        accrual_source_payload: has("tenant_accruals", "source_payload"),
        accrual_supersession: has("tenant_accruals", "superseded_at"),
    })
}
