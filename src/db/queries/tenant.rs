//! Tenant database queries

use anyhow::Result;
use sqlx::PgConnection;

use crate::types::{NewTenant, Tenant};

/// Find a tenant by exact name
pub async fn find_tenant(conn: &mut PgConnection, market_id: i64, name: &str) -> Result<Option<Tenant>> {
    let tenant = sqlx::query_as::<_, Tenant>(
        r#"
        SELECT id, market_id, name, legal_form_hint, is_active
        FROM tenants
        WHERE market_id = $1 AND name = $2
        "#
    )
    .bind(market_id)
    .bind(name)
    .fetch_optional(conn)
    .await?;

    Ok(tenant)
}

/// Create an active tenant
pub async fn create_tenant(conn: &mut PgConnection, tenant: &NewTenant) -> Result<Tenant> {
    let created = sqlx::query_as::<_, Tenant>(
        r#"
        INSERT INTO tenants (market_id, name, legal_form_hint, is_active)
        VALUES ($1, $2, $3, true)
        RETURNING id, market_id, name, legal_form_hint, is_active
        "#
    )
    .bind(tenant.market_id)
    .bind(&tenant.name)
    .bind(tenant.legal_form_hint)
    .fetch_one(conn)
    .await?;

    Ok(created)
}
