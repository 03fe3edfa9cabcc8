//! Market database queries

use anyhow::Result;
use sqlx::PgConnection;

/// Check that a market exists
pub async fn market_exists(conn: &mut PgConnection, market_id: i64) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM markets WHERE id = $1)")
        .bind(market_id)
        .fetch_one(conn)
        .await?;

    Ok(exists)
}
