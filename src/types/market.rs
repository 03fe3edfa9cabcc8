//! Market entity types: tenants, leasable spaces and the location hierarchy

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Occupancy status of a leasable space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "space_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SpaceStatus {
    Occupied,
    Free,
}

impl SpaceStatus {
    pub fn from_leased(is_leased: bool) -> Self {
        if is_leased {
            SpaceStatus::Occupied
        } else {
            SpaceStatus::Free
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceStatus::Occupied => "occupied",
            SpaceStatus::Free => "free",
        }
    }
}

impl Default for SpaceStatus {
    fn default() -> Self {
        SpaceStatus::Free
    }
}

/// Legal form guessed from keywords in the tenant name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "legal_form_hint", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LegalFormHint {
    Company,
    Partnership,
    SoleTrader,
}

/// Tenant (lessee) of a market
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: i64,
    pub market_id: i64,
    pub name: String,
    pub legal_form_hint: Option<LegalFormHint>,
    pub is_active: bool,
}

/// Values needed to create a tenant
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub market_id: i64,
    pub name: String,
    pub legal_form_hint: Option<LegalFormHint>,
}

/// Leasable unit of a market
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarketSpace {
    pub id: i64,
    pub market_id: i64,
    pub number: Option<String>,
    pub code: Option<String>,
    pub area: Option<f64>,
    pub status: SpaceStatus,
    pub display_name: Option<String>,
    pub activity_type: Option<String>,
    pub location_id: Option<i64>,
    pub tenant_id: Option<i64>,
}

/// Values needed to create a space
#[derive(Debug, Clone)]
pub struct NewMarketSpace {
    pub market_id: i64,
    pub code: String,
    pub area: Option<f64>,
    pub status: SpaceStatus,
    pub display_name: String,
    pub activity_type: Option<String>,
    pub location_id: Option<i64>,
}

/// Partial update of a space; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpacePatch {
    pub area: Option<f64>,
    pub status: Option<SpaceStatus>,
    pub display_name: Option<String>,
    pub activity_type: Option<String>,
    pub location_id: Option<i64>,
    pub tenant_id: Option<i64>,
}

impl SpacePatch {
    pub fn is_empty(&self) -> bool {
        *self == SpacePatch::default()
    }

    /// Apply the patch to an in-memory copy of the space
    pub fn apply_to(&self, space: &mut MarketSpace) {
        if let Some(area) = self.area {
            space.area = Some(area);
        }
        if let Some(status) = self.status {
            space.status = status;
        }
        if let Some(ref name) = self.display_name {
            space.display_name = Some(name.clone());
        }
        if let Some(ref activity) = self.activity_type {
            space.activity_type = Some(activity.clone());
        }
        if let Some(location_id) = self.location_id {
            space.location_id = Some(location_id);
        }
        if let Some(tenant_id) = self.tenant_id {
            space.tenant_id = Some(tenant_id);
        }
    }
}

/// Category of locations (e.g. indoor row, outdoor zone)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarketLocationType {
    pub id: i64,
    pub market_id: i64,
    pub code: String,
    pub name: String,
}

/// Root location of a location type
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarketLocation {
    pub id: i64,
    pub market_id: i64,
    pub location_type_id: i64,
    pub code: String,
    pub name: String,
}
