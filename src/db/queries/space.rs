//! Market space database queries.
//!
//! `activity_type`, `location_id` and `tenant_id` are optional columns; the
//! statements are assembled from the run's capabilities.

use anyhow::Result;
use sqlx::PgConnection;

use crate::services::accrual_import::StoreCapabilities;
use crate::types::{MarketSpace, NewMarketSpace, SpacePatch};

fn select_columns(caps: &StoreCapabilities) -> String {
    let optional = |present: bool, column: &str, null: &str| {
        if present {
            column.to_string()
        } else {
            format!("{} AS {}", null, column)
        }
    };

    format!(
        "id, market_id, number, code, area, status, display_name, {}, {}, {}",
        optional(caps.space_activity_type, "activity_type", "NULL::text"),
        optional(caps.locations, "location_id", "NULL::bigint"),
        optional(caps.space_tenant_link, "tenant_id", "NULL::bigint"),
    )
}

/// Find a space whose number or code equals the place code
pub async fn find_space(
    conn: &mut PgConnection,
    caps: &StoreCapabilities,
    market_id: i64,
    place_code: &str,
) -> Result<Option<MarketSpace>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM market_spaces
        WHERE market_id = $1 AND (number = $2 OR code = $2)
        ORDER BY (number = $2) IS TRUE DESC, id
        LIMIT 1
        "#,
        select_columns(caps)
    );

    let space = sqlx::query_as::<_, MarketSpace>(&sql)
        .bind(market_id)
        .bind(place_code)
        .fetch_optional(conn)
        .await?;

    Ok(space)
}

/// Create a space numbered and coded by the place code
pub async fn create_space(
    conn: &mut PgConnection,
    caps: &StoreCapabilities,
    space: &NewMarketSpace,
) -> Result<MarketSpace> {
    let mut columns = vec!["market_id", "number", "code", "area", "status", "display_name"];
    if caps.space_activity_type {
        columns.push("activity_type");
    }
    if caps.locations {
        columns.push("location_id");
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    let sql = format!(
        "INSERT INTO market_spaces ({}) VALUES ({}) RETURNING {}",
        columns.join(", "),
        placeholders.join(", "),
        select_columns(caps)
    );

    let mut query = sqlx::query_as::<_, MarketSpace>(&sql)
        .bind(space.market_id)
        .bind(&space.code)
        .bind(&space.code)
        .bind(space.area)
        .bind(space.status)
        .bind(&space.display_name);
    if caps.space_activity_type {
        query = query.bind(&space.activity_type);
    }
    if caps.locations {
        query = query.bind(space.location_id);
    }

    Ok(query.fetch_one(conn).await?)
}

/// Apply a partial update; unset patch fields keep their column value
pub async fn update_space(
    conn: &mut PgConnection,
    caps: &StoreCapabilities,
    space_id: i64,
    patch: &SpacePatch,
) -> Result<()> {
    let mut assignments = vec![
        "area = COALESCE($2, area)".to_string(),
        "status = COALESCE($3, status)".to_string(),
        "display_name = COALESCE($4, display_name)".to_string(),
    ];
    let mut next = 5;
    let mut optional = |present: bool, column: &str| {
        if present {
            assignments.push(format!("{0} = COALESCE(${1}, {0})", column, next));
            next += 1;
        }
    };
    optional(caps.space_activity_type, "activity_type");
    optional(caps.locations, "location_id");
    optional(caps.space_tenant_link, "tenant_id");

    let sql = format!(
        "UPDATE market_spaces SET {}, updated_at = NOW() WHERE id = $1",
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql)
        .bind(space_id)
        .bind(patch.area)
        .bind(patch.status)
        .bind(&patch.display_name);
    if caps.space_activity_type {
        query = query.bind(&patch.activity_type);
    }
    if caps.locations {
        query = query.bind(patch.location_id);
    }
    if caps.space_tenant_link {
        query = query.bind(patch.tenant_id);
    }
    query.execute(conn).await?;

    Ok(())
}
