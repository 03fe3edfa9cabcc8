//! Location type and location database queries

use anyhow::Result;
use sqlx::PgConnection;

use crate::types::{MarketLocation, MarketLocationType};

pub async fn find_location_type(
    conn: &mut PgConnection,
    market_id: i64,
    code: &str,
) -> Result<Option<MarketLocationType>> {
    let location_type = sqlx::query_as::<_, MarketLocationType>(
        "SELECT id, market_id, code, name FROM market_location_types WHERE market_id = $1 AND code = $2"
    )
    .bind(market_id)
    .bind(code)
    .fetch_optional(conn)
    .await?;

    Ok(location_type)
}

pub async fn create_location_type(
    conn: &mut PgConnection,
    market_id: i64,
    code: &str,
    name: &str,
) -> Result<MarketLocationType> {
    let created = sqlx::query_as::<_, MarketLocationType>(
        r#"
        INSERT INTO market_location_types (market_id, code, name)
        VALUES ($1, $2, $3)
        RETURNING id, market_id, code, name
        "#
    )
    .bind(market_id)
    .bind(code)
    .bind(name)
    .fetch_one(conn)
    .await?;

    Ok(created)
}

/// Update the display name; a blank name never overwrites
pub async fn rename_location_type(conn: &mut PgConnection, location_type_id: i64, name: &str) -> Result<()> {
    sqlx::query(
        "UPDATE market_location_types SET name = $1 WHERE id = $2 AND $1 <> ''"
    )
    .bind(name)
    .bind(location_type_id)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_location(
    conn: &mut PgConnection,
    market_id: i64,
    code: &str,
) -> Result<Option<MarketLocation>> {
    let location = sqlx::query_as::<_, MarketLocation>(
        "SELECT id, market_id, location_type_id, code, name FROM market_locations WHERE market_id = $1 AND code = $2"
    )
    .bind(market_id)
    .bind(code)
    .fetch_optional(conn)
    .await?;

    Ok(location)
}

pub async fn create_location(
    conn: &mut PgConnection,
    market_id: i64,
    location_type_id: i64,
    code: &str,
    name: &str,
) -> Result<MarketLocation> {
    let created = sqlx::query_as::<_, MarketLocation>(
        r#"
        INSERT INTO market_locations (market_id, location_type_id, code, name)
        VALUES ($1, $2, $3, $4)
        RETURNING id, market_id, location_type_id, code, name
        "#
    )
    .bind(market_id)
    .bind(location_type_id)
    .bind(code)
    .bind(name)
    .fetch_one(conn)
    .await?;

    Ok(created)
}
