//! Tenant accrual fact types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::market::SpaceStatus;

/// Monetary breakdown and measurements of one accrual row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualAmounts {
    pub area_leased: f64,
    pub area_free: f64,
    /// Area attributed to the space (explicit column, else leased + free)
    pub area: f64,
    pub rate: f64,
    pub day_count: Option<i64>,
    pub rent_amount: f64,
    pub management_fee: f64,
    pub utilities_amount: f64,
    pub electricity_amount: f64,
    pub total_no_vat: f64,
    pub total_with_vat: f64,
    pub vat_rate: Option<f64>,
    pub cash_amount: f64,
}

/// Accrual fact ready to be written
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTenantAccrual {
    pub market_id: i64,
    pub period: NaiveDate,
    pub content_hash: String,
    pub tenant_id: i64,
    pub tenant_name: String,
    pub space_id: Option<i64>,
    pub place_code: Option<String>,
    #[serde(flatten)]
    pub amounts: AccrualAmounts,
    pub discount_note: Option<String>,
    pub activity_type: Option<String>,
    pub location_type: Option<String>,
    pub status: SpaceStatus,
    pub source_file: String,
    pub source_row: i64,
    pub source_payload: serde_json::Value,
    pub import_run_id: Uuid,
}

/// Stored accrual fact
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantAccrual {
    pub id: i64,
    pub market_id: i64,
    pub period: NaiveDate,
    pub content_hash: String,
    pub tenant_id: i64,
    pub tenant_name: String,
    pub space_id: Option<i64>,
    pub place_code: Option<String>,
    pub rent_amount: f64,
    pub total_with_vat: f64,
    pub status: SpaceStatus,
    pub source_file: String,
    pub source_row: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
}

/// Outcome of an accrual upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualWrite {
    Inserted,
    Updated,
}
